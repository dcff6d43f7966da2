//! Relay engine: copies a remote resource into a resumable upload endpoint
//! without buffering it.
//!
//! The source is fetched with `GET`, redirects are followed by an explicit
//! bounded loop, and the body is streamed chunk by chunk into a single `PUT`
//! to the destination over its own HTTP/1.1 connection. The destination's
//! JSON answer is parsed into an [`UploadReceipt`].

pub mod config;
mod destination;
pub mod error;
pub mod relay;
pub mod response;
pub mod source;

pub use config::{DEFAULT_CONTENT_TYPE, RelayConfig, create_client};
pub use error::{BoxError, RelayError, RelayErrorKind};
pub use relay::{RelayClient, RelayOutcome};
pub use response::{UploadReceipt, parse_receipt};
pub use source::{SourceResponse, open_source};

//! Asynchronous media relay service.
//!
//! Accepts `{ videoUrl, resumableUrl }` over HTTP, answers with a job id
//! immediately, and streams the source media into the resumable upload
//! session in the background. Job state is kept in memory and polled via
//! `GET /upload-status/{id}`.

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod transfer;

pub use error::{Error, Result};

//! Background transfers from a source URL into a resumable upload endpoint.

pub mod orchestrator;

pub use orchestrator::{TransferOrchestrator, TransferRequest};

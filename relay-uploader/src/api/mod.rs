//! REST API server module.
//!
//! Provides HTTP endpoints for starting uploads and polling their status.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};

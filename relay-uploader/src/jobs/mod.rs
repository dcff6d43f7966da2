//! Upload jobs and the registry that tracks them.

pub mod model;
pub mod registry;

pub use model::{Job, JobStatus, JobTransition};
pub use registry::{InMemoryJobRegistry, JobRegistry};

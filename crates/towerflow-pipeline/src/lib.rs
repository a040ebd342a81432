//! fly pipeline client for TowerFlow
//!
//! Logs in to the running CI server and keeps the self-update pipeline
//! set. Unless a fly binary is configured, the client downloads the one
//! served by the CI server so the versions always match.

pub mod error;
pub mod fly;
pub mod pipeline;

pub use error::{PipelineError, Result};
pub use fly::{FlyClient, FlySource};
pub use pipeline::AwsCredentials;

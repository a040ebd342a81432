//! Data model
//!
//! The persisted configuration record, its read-only view and the values
//! that flow between the orchestrator and its collaborators.

mod args;
mod config;
mod inputs;
mod instance;
pub mod outputs;
mod params;
mod view;

// Re-exports
pub use args::*;
pub use config::*;
pub use inputs::*;
pub use instance::*;
pub use outputs::*;
pub use params::*;
pub use view::*;

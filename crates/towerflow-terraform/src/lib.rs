//! Terraform provisioner for TowerFlow
//!
//! Drives the `terraform` CLI against a module directory. Input variables
//! are checked against the module's declared variables and passed through
//! a JSON var file; state lives in the config bucket (or a local directory).

pub mod cli;
pub mod error;
pub mod module;

pub use cli::{StateBackend, TerraformCli};
pub use error::{Result, TerraformError};

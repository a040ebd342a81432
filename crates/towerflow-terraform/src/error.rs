//! Terraform provisioner error types

use thiserror::Error;
use towerflow_core::TowerError;

#[derive(Error, Debug)]
pub enum TerraformError {
    #[error("terraform not found at {0}")]
    BinaryNotFound(String),

    #[error("terraform {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("terraform module directory not found: {0}")]
    ModuleNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<TerraformError> for TowerError {
    fn from(err: TerraformError) -> Self {
        match err {
            TerraformError::IoError(e) => TowerError::Io(e),
            TerraformError::JsonError(e) => TowerError::Json(e),
            other => TowerError::tool("terraform", other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TerraformError>;

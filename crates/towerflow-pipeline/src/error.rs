//! Pipeline client error types

use thiserror::Error;
use towerflow_core::TowerError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("fly not found at {0}")]
    BinaryNotFound(String),

    #[error("fly {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("failed to log in to {api} after {seconds} seconds")]
    LoginTimeout { api: String, seconds: u64 },

    #[error("failed to download fly from {url}: {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("unknown os: `{0}`")]
    UnsupportedPlatform(String),

    #[error("self-update pipeline is not supported on {0}")]
    UnsupportedIaas(String),

    #[error("AWS credentials are required to set the self-update pipeline")]
    MissingCredentials,

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl From<PipelineError> for TowerError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::IoError(e) => TowerError::Io(e),
            PipelineError::YamlError(e) => TowerError::Yaml(e),
            other => TowerError::tool("fly", other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

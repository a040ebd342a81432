//! AWS provider error types

use thiserror::Error;
use towerflow_cloud::CloudError;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("aws CLI not found. Please install: https://aws.amazon.com/cli/")]
    CliNotFound,

    #[error("aws command failed: {0}")]
    CommandFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Security group not found: {0}")]
    SecurityGroupNotFound(String),

    #[error("Invalid CIDR in security group rule: {0}")]
    InvalidCidr(String),

    #[error("Invalid IP address: {0}")]
    InvalidIp(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::NotFound(what) | AwsError::SecurityGroupNotFound(what) => {
                CloudError::ResourceNotFound(what)
            }
            AwsError::InvalidCidr(_) | AwsError::InvalidIp(_) => {
                CloudError::InvalidConfig(err.to_string())
            }
            AwsError::IoError(e) => CloudError::Io(e),
            AwsError::JsonError(e) => CloudError::Json(e),
            AwsError::CliNotFound | AwsError::CommandFailed(_) => {
                CloudError::CommandFailed(err.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;

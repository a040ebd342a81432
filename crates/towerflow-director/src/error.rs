//! Director client error types

use thiserror::Error;
use towerflow_core::TowerError;

#[derive(Error, Debug)]
pub enum DirectorError {
    #[error("bosh not found at {0}")]
    BinaryNotFound(String),

    #[error("bosh {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("manifest file not found: {0}")]
    ManifestNotFound(String),

    #[error("{manifest} uses variables that are not provided: {names}")]
    UnboundVariables { manifest: String, names: String },

    #[error("did not find stemcell version in {0}")]
    StemcellVersionNotFound(String),

    #[error("release {0} not found in dependency list")]
    ReleaseNotFound(String),

    #[error("could not split tag {0:?}")]
    InvalidTag(String),

    #[error("director deploys are not supported on {0}")]
    UnsupportedIaas(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("template error: {0}")]
    TemplateError(#[from] tera::Error),
}

impl From<DirectorError> for TowerError {
    fn from(err: DirectorError) -> Self {
        match err {
            DirectorError::IoError(e) => TowerError::Io(e),
            DirectorError::JsonError(e) => TowerError::Json(e),
            DirectorError::YamlError(e) => TowerError::Yaml(e),
            DirectorError::TemplateError(e) => TowerError::Template(e),
            other => TowerError::tool("bosh", other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DirectorError>;

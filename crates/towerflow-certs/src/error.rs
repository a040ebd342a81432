//! Certificate issuer error types

use thiserror::Error;
use towerflow_core::TowerError;

#[derive(Error, Debug)]
pub enum CertError {
    #[error("no subjects given for certificate {0}")]
    NoSubjects(String),

    #[error("failed to generate {what} for {name}: {message}")]
    Generation {
        what: &'static str,
        name: String,
        message: String,
    },
}

impl CertError {
    pub(crate) fn generation(what: &'static str, name: &str, err: impl std::fmt::Display) -> Self {
        CertError::Generation {
            what,
            name: name.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<CertError> for TowerError {
    fn from(err: CertError) -> Self {
        TowerError::tool("certs", err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CertError>;

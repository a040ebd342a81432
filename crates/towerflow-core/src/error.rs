use thiserror::Error;
use towerflow_cloud::CloudError;

/// Broad class of a [`TowerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or contradictory arguments, or a change to an immutable field
    Validation,
    /// The environment is not in a state we can deploy into
    Precondition,
    /// An external tool, store or API failed
    External,
    /// The director deploy exited before its task started
    Detach,
}

#[derive(Error, Debug)]
pub enum TowerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    ImmutableField(String),

    #[error("{0}")]
    Precondition(String),

    #[error(
        "found previous deployment in {previous}. Refusing to deploy to {requested} as changing regions for existing deployments is not supported"
    )]
    RegionMismatch { previous: String, requested: String },

    #[error(
        "Do you need to add your IP {ip} to the {deployment}-director security group/source range entry for director firewall (for ports 22, 6868, and 25555)?"
    )]
    NotWhitelisted { ip: String, deployment: String },

    #[error("{tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("Didn't detect successful task start in BOSH command: {command}")]
    DetachFailed { command: String },

    #[error("missing infrastructure output: {0}")]
    MissingOutput(String),

    #[error("{context}: [{source}]")]
    Context {
        context: String,
        #[source]
        source: Box<TowerError>,
    },

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),
}

impl TowerError {
    pub fn validation(message: impl Into<String>) -> Self {
        TowerError::Validation(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        TowerError::Precondition(message.into())
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        TowerError::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Wrap the error with a description of what was being attempted
    pub fn context(self, context: impl Into<String>) -> Self {
        TowerError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TowerError::Validation(_) | TowerError::ImmutableField(_) => ErrorKind::Validation,
            TowerError::Precondition(_)
            | TowerError::RegionMismatch { .. }
            | TowerError::NotWhitelisted { .. } => ErrorKind::Precondition,
            TowerError::DetachFailed { .. } => ErrorKind::Detach,
            TowerError::Context { source, .. } => source.kind(),
            TowerError::Cloud(CloudError::ResourceNotFound(_)) => ErrorKind::Precondition,
            TowerError::Tool { .. }
            | TowerError::MissingOutput(_)
            | TowerError::Cloud(_)
            | TowerError::Io(_)
            | TowerError::Json(_)
            | TowerError::Yaml(_)
            | TowerError::Template(_) => ErrorKind::External,
        }
    }
}

/// Attach context to a fallible result
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<TowerError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }
}

pub type Result<T> = std::result::Result<T, TowerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_kind() {
        let err = TowerError::validation("minimum number of workers is 1").context("deploy");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "deploy: [minimum number of workers is 1]");
    }

    #[test]
    fn test_region_mismatch_message() {
        let err = TowerError::RegionMismatch {
            previous: "eu-west-1".into(),
            requested: "us-east-1".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(err.to_string().starts_with("found previous deployment in eu-west-1."));
    }

    #[test]
    fn test_missing_zone_is_precondition() {
        let err: TowerError = CloudError::ResourceNotFound("no matching hosted zone".into()).into();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }
}

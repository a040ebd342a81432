//! Read-only snapshot of the configuration record

use super::config::Config;
use std::ops::Deref;
use std::sync::Arc;

/// Immutable view of a [`Config`] handed to collaborators.
///
/// Collaborators can read every field but have no way to write back; only
/// the orchestrator owns the mutable record.
#[derive(Debug, Clone)]
pub struct ConfigView(Arc<Config>);

impl ConfigView {
    pub fn new(config: &Config) -> Self {
        Self(Arc::new(config.clone()))
    }
}

impl Deref for ConfigView {
    type Target = Config;

    fn deref(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for ConfigView {
    fn from(config: Config) -> Self {
        Self(Arc::new(config))
    }
}

//! TowerFlow Core
//!
//! Orchestrates a CI cluster (a BOSH director plus a Concourse fleet) from
//! a single persisted configuration record:
//!
//! - [`lifecycle`] merges stored state, generated defaults and CLI arguments
//! - [`deploy`] sequences provisioning, certificates, the director deploy
//!   and the self-update pipeline, in foreground or self-update mode
//! - [`destroy`] tears everything down again
//! - [`info`] reports on a running deployment
//! - [`detach`] follows a director deploy until it has started, then lets
//!   it run on without us
//!
//! Every external system is reached through the traits in
//! [`collaborators`] and [`store`], so the orchestration can be exercised
//! against in-memory fakes.

pub mod certs;
pub mod collaborators;
pub mod deploy;
pub mod destroy;
pub mod detach;
pub mod error;
pub mod info;
pub mod lifecycle;
pub mod messages;
pub mod model;
pub mod network;
pub mod secrets;
pub mod store;
pub mod terminal;

#[cfg(feature = "test-utils")]
pub mod testing;

pub use collaborators::{
    CertBundle, CertificateIssuer, DirectorClient, DirectorDeployment, IpResolver, PipelineClient,
    PipelineCredentials, Provisioner,
};
pub use deploy::{Collaborators, ExecutionContext, Orchestrator};
pub use error::{ErrorKind, Result, ResultExt, TowerError};
pub use info::{Info, TerraformInfo};
pub use model::*;
pub use store::{BucketConfigStore, ConfigStore};
pub use terminal::{Terminal, TerminalOutput};

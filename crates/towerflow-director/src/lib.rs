//! BOSH director client for TowerFlow
//!
//! Creates the director VM with `bosh create-env`, then configures it and
//! deploys the CI cluster. Manifests and ops files are read from the
//! manifest directory (see [`manifest`]); variables are passed as typed
//! vars files that are checked against the manifests before bosh runs.

pub mod cli;
pub mod client;
pub mod error;
pub mod manifest;
pub mod vars;

pub use cli::{BoshCli, DirectorAuth};
pub use client::BoshDirector;
pub use error::{DirectorError, Result};
pub use manifest::ManifestSet;

//! TowerFlow Cloud Abstraction
//!
//! This crate provides the cloud-provider seam used by the deployment
//! orchestrator: hosted-zone lookup, firewall inspection, VM teardown and
//! the object store that holds the persisted deployment config.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 towerflow-core                   │
//! │          (deploy / destroy / info)               │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                towerflow-cloud                   │
//! │  ┌──────────────────┐  ┌──────────────────┐     │
//! │  │ trait            │  │ trait            │     │
//! │  │ CloudProvider    │  │ ObjectStore      │     │
//! │  └──────────────────┘  └──────────────────┘     │
//! │  ┌──────────────┐  ┌──────────────────────┐     │
//! │  │ Hosted zones │  │ LocalObjectStore     │     │
//! │  └──────────────┘  └──────────────────────┘     │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │      aws      │
//! │   provider    │
//! └───────────────┘
//! ```

pub mod error;
pub mod iaas;
pub mod local;
pub mod provider;
pub mod zone;

// Re-exports
pub use error::{CloudError, Result};
pub use iaas::Iaas;
pub use local::LocalObjectStore;
pub use provider::{CloudProvider, ObjectStore};
pub use zone::{HostedZone, HostedZoneMatch, longest_match};

//! AWS provider for TowerFlow
//!
//! Implements [`CloudProvider`](towerflow_cloud::CloudProvider) and
//! [`ObjectStore`](towerflow_cloud::ObjectStore) on top of the `aws` CLI:
//!
//! - Route 53 hosted-zone lookup
//! - director security-group inspection (ports 22, 6868, 25555)
//! - VM and EBS volume teardown inside the deployment VPC
//! - versioned S3 buckets for the deployment config
//!
//! # Requirements
//!
//! - `aws` CLI v2 must be installed; credentials come from the usual AWS
//!   environment variables or profiles

pub mod cli;
pub mod error;
pub mod firewall;
pub mod provider;

pub use cli::AwsCli;
pub use error::{AwsError, Result};
pub use firewall::ip_has_director_access;
pub use provider::AwsProvider;

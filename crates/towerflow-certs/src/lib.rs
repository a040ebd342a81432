//! TowerFlow certificates
//!
//! [`SelfSignedIssuer`] backs the [`towerflow_core::CertificateIssuer`]
//! capability: each request gets its own CA and a leaf certificate whose
//! subject alternative names cover the given IPs and domains.

pub mod error;
pub mod issuer;

pub use error::{CertError, Result};
pub use issuer::SelfSignedIssuer;

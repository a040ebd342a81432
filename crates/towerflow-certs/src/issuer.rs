//! Self-signed CA and leaf certificates

use crate::error::{CertError, Result};
use async_trait::async_trait;
use chrono::{Datelike, Duration, Utc};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose, SanType,
};
use std::net::IpAddr;
use towerflow_core::{CertBundle, CertificateIssuer};

const CA_VALIDITY_DAYS: i64 = 3650;
const LEAF_VALIDITY_DAYS: i64 = 365;

/// Issues a fresh CA per request and signs one leaf certificate with it
#[derive(Debug, Clone)]
pub struct SelfSignedIssuer {
    ca_validity: Duration,
    leaf_validity: Duration,
}

impl Default for SelfSignedIssuer {
    fn default() -> Self {
        Self {
            ca_validity: Duration::days(CA_VALIDITY_DAYS),
            leaf_validity: Duration::days(LEAF_VALIDITY_DAYS),
        }
    }
}

impl SelfSignedIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_leaf_validity(mut self, validity: Duration) -> Self {
        self.leaf_validity = validity;
        self
    }

    /// Generate the CA, leaf and leaf key for `name`
    pub fn issue(&self, name: &str, subjects: &[String]) -> Result<CertBundle> {
        let common_name = subjects
            .first()
            .ok_or_else(|| CertError::NoSubjects(name.to_string()))?;

        let ca = Certificate::from_params(self.ca_params(name))
            .map_err(|e| CertError::generation("CA", name, e))?;
        let leaf = Certificate::from_params(self.leaf_params(common_name, subjects))
            .map_err(|e| CertError::generation("certificate", name, e))?;

        let ca_cert = ca
            .serialize_pem()
            .map_err(|e| CertError::generation("CA", name, e))?;
        let cert = leaf
            .serialize_pem_with_signer(&ca)
            .map_err(|e| CertError::generation("certificate", name, e))?;

        tracing::debug!("Issued certificate for {} covering {:?}", name, subjects);

        Ok(CertBundle {
            ca_cert,
            cert,
            key: leaf.serialize_private_key_pem(),
        })
    }

    fn ca_params(&self, name: &str) -> CertificateParams {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        set_validity(&mut params, self.ca_validity);
        params
    }

    fn leaf_params(&self, common_name: &str, subjects: &[String]) -> CertificateParams {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(common_name);
        params.subject_alt_names = subjects.iter().map(|s| san(s)).collect();
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        set_validity(&mut params, self.leaf_validity);
        params
    }
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "TowerFlow");
    dn.push(DnType::CommonName, common_name);
    dn
}

/// IP subjects become IP SANs, anything else a DNS name
fn san(subject: &str) -> SanType {
    match subject.parse::<IpAddr>() {
        Ok(ip) => SanType::IpAddress(ip),
        Err(_) => SanType::DnsName(subject.to_string()),
    }
}

fn set_validity(params: &mut CertificateParams, validity: Duration) {
    let ymd = |at: chrono::DateTime<Utc>| {
        rcgen::date_time_ymd(at.year(), at.month() as u8, at.day() as u8)
    };
    let now = Utc::now();
    // Backdated a day so freshly issued certificates are valid in every timezone
    params.not_before = ymd(now - Duration::days(1));
    params.not_after = ymd(now + validity);
}

#[async_trait]
impl CertificateIssuer for SelfSignedIssuer {
    async fn generate(&self, name: &str, subjects: &[String]) -> towerflow_core::Result<CertBundle> {
        Ok(self.issue(name, subjects)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_san_kinds() {
        assert!(matches!(san("10.0.0.6"), SanType::IpAddress(_)));
        assert!(matches!(san("ci.example.com"), SanType::DnsName(ref d) if d == "ci.example.com"));
    }

    #[test]
    fn test_no_subjects() {
        let err = SelfSignedIssuer::new().issue("control-tower-ci", &[]).unwrap_err();
        assert_eq!(err.to_string(), "no subjects given for certificate control-tower-ci");
    }

    #[test]
    fn test_pem_output() {
        let bundle = SelfSignedIssuer::new()
            .issue("control-tower-ci", &["ci.example.com".to_string()])
            .unwrap();
        assert!(bundle.ca_cert.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(bundle.cert.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(bundle.key.contains("PRIVATE KEY"));
        assert_ne!(bundle.ca_cert, bundle.cert);
    }
}

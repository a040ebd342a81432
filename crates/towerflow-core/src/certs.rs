//! Certificate expiry checks

use chrono::{DateTime, Duration, Utc};
use x509_parser::pem::parse_x509_pem;

/// Public certificates are reissued once they get this close to expiry
pub const RENEWAL_THRESHOLD_DAYS: i64 = 28;

pub fn renewal_threshold() -> Duration {
    Duration::days(RENEWAL_THRESHOLD_DAYS)
}

/// Expiry of the first certificate in a PEM document
pub fn not_after(pem: &str) -> Option<DateTime<Utc>> {
    let (_, pem) = parse_x509_pem(pem.as_bytes()).ok()?;
    let cert = pem.parse_x509().ok()?;
    DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
}

/// Time left until the certificate expires. Anything unparseable counts
/// as already expired.
pub fn time_till_expiry(pem: &str) -> Duration {
    time_till_expiry_at(pem, Utc::now())
}

pub fn time_till_expiry_at(pem: &str, now: DateTime<Utc>) -> Duration {
    match not_after(pem) {
        Some(expiry) => expiry - now,
        None => Duration::zero(),
    }
}

/// Whether a stored certificate is still good enough to keep
pub fn is_fresh(pem: &str) -> bool {
    time_till_expiry(pem) > renewal_threshold()
}

//! DNS hosted zones and longest-suffix matching

use serde::{Deserialize, Serialize};

/// A DNS zone managed by the cloud provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZone {
    /// Zone name without the trailing dot (e.g. `example.com`)
    pub name: String,

    /// Provider identifier of the zone
    pub id: String,
}

impl HostedZone {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name: name.trim_end_matches('.').to_string(),
            id: id.into(),
        }
    }

    /// Record prefix of `domain` inside this zone, if the zone covers it.
    ///
    /// The apex of the zone yields an empty prefix. A match must land on a
    /// label boundary, so `notexample.com` is not inside `example.com`.
    /// Names compare case-insensitively; the prefix is returned lowercased.
    pub fn record_prefix(&self, domain: &str) -> Option<String> {
        let domain = domain.trim_end_matches('.').to_ascii_lowercase();
        let zone = self.name.to_ascii_lowercase();
        if domain == zone {
            return Some(String::new());
        }
        domain
            .strip_suffix(zone.as_str())
            .and_then(|head| head.strip_suffix('.'))
            .filter(|prefix| !prefix.is_empty())
            .map(str::to_string)
    }
}

/// Zone resolved for a candidate domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZoneMatch {
    pub name: String,
    pub id: String,
    pub record_prefix: String,
}

/// Picks the zone with the longest name that covers `domain`
pub fn longest_match(zones: &[HostedZone], domain: &str) -> Option<HostedZoneMatch> {
    zones
        .iter()
        .filter_map(|zone| zone.record_prefix(domain).map(|prefix| (zone, prefix)))
        .max_by_key(|(zone, _)| zone.name.len())
        .map(|(zone, record_prefix)| HostedZoneMatch {
            name: zone.name.clone(),
            id: zone.id.clone(),
            record_prefix,
        })
}

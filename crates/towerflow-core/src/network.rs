//! CIDR helpers
//!
//! Allow-lists, default network layouts and host addressing inside the
//! public and private subnets.

use crate::error::{Result, TowerError};
use ipnetwork::{IpNetwork, Ipv4Network};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use towerflow_cloud::Iaas;

/// Host index of the subnet gateway
pub const GATEWAY_HOST: u32 = 1;
/// Host index of the director inside the public subnet
pub const DIRECTOR_HOST: u32 = 6;
/// Host index of the CI web node inside the public subnet
pub const WEB_HOST: u32 = 8;

/// Parse a CIDR block and normalize it to its network address
pub fn parse_cidr(value: &str) -> Result<IpNetwork> {
    let value = value.trim();
    let network = if value.contains('/') {
        value.parse::<IpNetwork>().map_err(|e| {
            TowerError::validation(format!(
                "could not parse {:?} as an IP address or CIDR range: {}",
                value, e
            ))
        })?
    } else {
        let ip = value.parse::<IpAddr>().map_err(|_| {
            TowerError::validation(format!(
                "could not parse {:?} as an IP address or CIDR range",
                value
            ))
        })?;
        IpNetwork::from(ip)
    };

    IpNetwork::new(network.network(), network.prefix())
        .map_err(|e| TowerError::validation(e.to_string()))
}

fn parse_v4(value: &str) -> Result<Ipv4Network> {
    match parse_cidr(value)? {
        IpNetwork::V4(net) => Ok(net),
        IpNetwork::V6(_) => Err(TowerError::validation(format!(
            "{} is not an IPv4 range",
            value
        ))),
    }
}

/// The n-th host address of an IPv4 CIDR block
pub fn host(cidr: &str, n: u32) -> Result<Ipv4Addr> {
    let net = parse_v4(cidr)?;
    net.nth(n).ok_or_else(|| {
        TowerError::validation(format!("host {} is outside of {}", n, net))
    })
}

/// Render selected hosts of a block as `[a<sep>b]`, the form the director's
/// cloud config expects for static and reserved ranges
pub fn format_ip_range(cidr: &str, separator: &str, positions: &[u32]) -> Result<String> {
    let ips = positions
        .iter()
        .map(|pos| host(cidr, *pos).map(|ip| ip.to_string()))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("[{}]", ips.join(separator)))
}

/// Whether `value` is a bare IPv4 address rather than a domain name
pub fn is_ipv4(value: &str) -> bool {
    value.parse::<Ipv4Addr>().is_ok()
}

/// Source ranges allowed to reach the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList(Vec<IpNetwork>);

impl AllowList {
    /// Parse a comma-separated list of IPs and CIDRs. Bare IPs become /32.
    pub fn parse(input: &str) -> Result<Self> {
        let blocks = input
            .split(',')
            .map(parse_cidr)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(blocks))
    }

    pub fn blocks(&self) -> &[IpNetwork] {
        &self.0
    }
}

impl fmt::Display for AllowList {
    /// `"10.0.0.1/32", "192.168.0.0/24"`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "\"{}\"", block)?;
        }
        Ok(())
    }
}

/// Network layout a new deployment starts with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkLayout {
    pub network: Option<&'static str>,
    pub public: &'static str,
    pub private: &'static str,
    pub rds1: Option<&'static str>,
    pub rds2: Option<&'static str>,
}

impl NetworkLayout {
    pub fn default_for(iaas: Iaas) -> Self {
        match iaas {
            Iaas::Aws => Self {
                network: Some("10.0.0.0/16"),
                public: "10.0.0.0/24",
                private: "10.0.1.0/24",
                rds1: Some("10.0.4.0/24"),
                rds2: Some("10.0.5.0/24"),
            },
            Iaas::Gcp => Self {
                network: None,
                public: "10.0.0.0/24",
                private: "10.0.1.0/24",
                rds1: None,
                rds2: None,
            },
        }
    }
}

//! Public IP lookup over HTTP

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use towerflow_core::{IpResolver, TowerError};

const LOOKUP_URL: &str = "https://api.ipify.org";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Asks a plain-text echo service which address our traffic leaves from
pub struct HttpIpResolver {
    http: reqwest::Client,
    url: String,
}

impl HttpIpResolver {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?,
            url: LOOKUP_URL.to_string(),
        })
    }
}

fn parse_ip(body: &str) -> Result<String, TowerError> {
    let body = body.trim();
    body.parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| TowerError::tool("ip lookup", format!("unexpected response {:?}", body)))
}

#[async_trait]
impl IpResolver for HttpIpResolver {
    async fn public_ip(&self) -> towerflow_core::Result<String> {
        tracing::debug!("Looking up public IP via {}", self.url);

        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TowerError::tool("ip lookup", e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| TowerError::tool("ip lookup", e.to_string()))?;

        parse_ip(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip() {
        assert_eq!(parse_ip("203.0.113.7\n").unwrap(), "203.0.113.7");
        assert!(parse_ip("<html>").is_err());
    }
}

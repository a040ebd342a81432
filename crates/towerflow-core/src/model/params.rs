//! Credentials produced by a director deploy

use super::config::Config;
use crate::error::Result;
use serde::Deserialize;

pub const CREDHUB_USERNAME: &str = "credhub-cli";
pub const CONCOURSE_USERNAME: &str = "admin";
pub const CREDHUB_PORT: u16 = 8844;

/// Credentials and certificates carried from the director deploy back
/// into the configuration record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployCredentials {
    pub credhub_password: String,
    pub credhub_admin_client_secret: String,
    pub credhub_ca_cert: String,
    pub credhub_url: String,
    pub credhub_username: String,
    pub concourse_username: String,
    pub concourse_password: String,
    pub grafana_password: String,
    pub director_username: String,
    pub director_password: String,
    pub director_ca_cert: String,
}

#[derive(Debug, Default, Deserialize)]
struct InternalTls {
    #[serde(default)]
    ca: String,
}

/// The subset of the director's vars-store we read back
#[derive(Debug, Default, Deserialize)]
struct DirectorCreds {
    #[serde(default)]
    credhub_cli_password: String,
    #[serde(default)]
    credhub_admin_client_secret: String,
    #[serde(default)]
    internal_tls: InternalTls,
    #[serde(default)]
    atc_password: String,
}

impl DeployCredentials {
    pub fn from_config(c: &Config) -> Self {
        Self {
            credhub_password: c.credhub_password.clone(),
            credhub_admin_client_secret: c.credhub_admin_client_secret.clone(),
            credhub_ca_cert: c.credhub_ca_cert.clone(),
            credhub_url: c.credhub_url.clone(),
            credhub_username: c.credhub_username.clone(),
            concourse_username: c.concourse_username.clone(),
            concourse_password: c.concourse_password.clone(),
            grafana_password: c.grafana_password.clone(),
            director_username: c.director_username.clone(),
            director_password: c.director_password.clone(),
            director_ca_cert: c.director_ca_cert.clone(),
        }
    }

    /// Overlay the values found in the director creds YAML
    pub fn merge_creds_yaml(&mut self, creds: &[u8], domain: &str) -> Result<()> {
        let parsed: DirectorCreds = if creds.is_empty() {
            DirectorCreds::default()
        } else {
            serde_yaml::from_slice(creds)?
        };

        self.credhub_password = parsed.credhub_cli_password;
        self.credhub_admin_client_secret = parsed.credhub_admin_client_secret;
        self.credhub_ca_cert = parsed.internal_tls.ca;
        self.credhub_url = format!("https://{}:{}/", domain, CREDHUB_PORT);
        self.credhub_username = CREDHUB_USERNAME.to_string();
        self.concourse_username = CONCOURSE_USERNAME.to_string();
        if !parsed.atc_password.is_empty() {
            self.concourse_password = parsed.atc_password.clone();
            self.grafana_password = parsed.atc_password;
        }
        Ok(())
    }

    pub fn apply_to(&self, c: &mut Config) {
        c.credhub_password = self.credhub_password.clone();
        c.credhub_admin_client_secret = self.credhub_admin_client_secret.clone();
        c.credhub_ca_cert = self.credhub_ca_cert.clone();
        c.credhub_url = self.credhub_url.clone();
        c.credhub_username = self.credhub_username.clone();
        c.concourse_username = self.concourse_username.clone();
        c.concourse_password = self.concourse_password.clone();
        c.grafana_password = self.grafana_password.clone();
        c.director_username = self.director_username.clone();
        c.director_password = self.director_password.clone();
        c.director_ca_cert = self.director_ca_cert.clone();
    }
}

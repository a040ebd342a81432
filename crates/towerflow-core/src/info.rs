//! Information about a running deployment

use crate::certs;
use crate::deploy::Orchestrator;
use crate::error::{Result, ResultExt, TowerError};
use crate::messages;
use crate::model::{Config, ConfigView, Instance, outputs};
use crate::store::DIRECTOR_CREDS_FILE;
use serde::Serialize;
use std::io::Write;

const INFO_TEMPLATE: &str = r#"Deployment:
	Namespace: {{ config.namespace }}
	IAAS:      {{ config.iaas }}
	Region:    {{ config.region }}

Workers:
	Count:              {{ config.concourse_worker_count }}
	Size:               {{ config.concourse_worker_size }}
	Outbound Public IP: {{ terraform.nat_gateway_ip }}

Instances:
{% for instance in instance_rows %}
	{{ instance.name }} {{ instance.ip }} {{ instance.state }}
{% endfor %}

Concourse credentials:
	username: {{ config.concourse_username }}
	password: {{ config.concourse_password }}
	URL:      https://{{ config.domain }}

Credhub credentials:
	username: {{ config.credhub_username }}
	password: {{ config.credhub_password }}
	URL:      {{ config.credhub_url }}
	CA Cert:
		{{ credhub_ca_cert }}

Grafana credentials (if metrics are enabled):
	username: {{ config.concourse_username }}
	password: {{ config.concourse_password }}
	URL:      https://{{ config.domain }}:3000

Bosh credentials:
	username: {{ config.director_username }}
	password: {{ config.director_password }}
	IP:       {{ terraform.director_public_ip }}
	CA Cert:
		{{ director_ca_cert }}

BOSH-generated NAT certs will expire on: {{ cert_expiry }}

Uses Control-Tower version {{ config.version }}
"#;

const ENV_TEMPLATE: &str = r#"
export BOSH_ENVIRONMENT={{ terraform.director_public_ip }}
export BOSH_GW_HOST={{ terraform.director_public_ip }}
export BOSH_CA_CERT='{{ config.director_ca_cert }}'
export BOSH_DEPLOYMENT=concourse
export BOSH_CLIENT={{ config.director_username }}
export BOSH_CLIENT_SECRET={{ config.director_password }}
export BOSH_GW_USER={{ gateway_user }}
export BOSH_GW_PRIVATE_KEY={{ private_key_path }}
export CREDHUB_SERVER={{ config.credhub_url }}
export CREDHUB_CA_CERT='{{ config.credhub_ca_cert }}'
export CREDHUB_CLIENT=credhub_admin
export CREDHUB_SECRET={{ config.credhub_admin_client_secret }}
export NAMESPACE={{ config.namespace }}
"#;

#[derive(Debug, Clone, Serialize)]
pub struct TerraformInfo {
    pub director_public_ip: String,
    pub nat_gateway_ip: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Info {
    pub terraform: TerraformInfo,
    pub config: Config,
    pub instances: Vec<Instance>,
    /// Expiry of the director's NATS CA, empty before the first director
    /// deploy
    pub cert_expiry: String,
    pub gateway_user: String,
}

#[derive(Serialize)]
struct TextContext<'a> {
    #[serde(flatten)]
    info: &'a Info,
    instance_rows: Vec<Instance>,
    credhub_ca_cert: String,
    director_ca_cert: String,
}

#[derive(Serialize)]
struct EnvContext<'a> {
    #[serde(flatten)]
    info: &'a Info,
    private_key_path: String,
}

impl Info {
    pub fn render_text(&self) -> Result<String> {
        let instance_rows = self
            .instances
            .iter()
            .map(|i| Instance {
                ip: i.ip.replace('\n', ","),
                ..i.clone()
            })
            .collect();

        messages::render(
            INFO_TEMPLATE,
            &TextContext {
                info: self,
                instance_rows,
                credhub_ca_cert: self.config.credhub_ca_cert.replace('\n', "\n\t\t"),
                director_ca_cert: self.config.director_ca_cert.replace('\n', "\n\t\t"),
            },
        )
    }

    /// Shell exports for the director and credential store CLIs. The
    /// gateway private key is written to a temp file left in place for the
    /// shell to use.
    pub fn render_env(&self) -> Result<String> {
        let mut file = tempfile::Builder::new().prefix("tower-gw-").tempfile()?;
        file.write_all(self.config.private_key.as_bytes())?;
        let (_, path) = file.keep().map_err(|e| e.error)?;

        messages::render(
            ENV_TEMPLATE,
            &EnvContext {
                info: self,
                private_key_path: path.display().to_string(),
            },
        )
    }
}

/// The NATS CA the director generated, if any
fn nats_ca(creds: &[u8]) -> Result<Option<String>> {
    if creds.is_empty() {
        return Ok(None);
    }
    let doc: serde_yaml::Value = serde_yaml::from_slice(creds)?;
    Ok(doc
        .get("nats_server_tls")
        .and_then(|tls| tls.get("ca"))
        .and_then(|ca| ca.as_str())
        .map(str::to_string))
}

impl Orchestrator {
    pub async fn info(&self) -> Result<Info> {
        let config = self
            .c
            .store
            .load()
            .await
            .context("error loading config before info")?;

        let creds = self.c.store.load_asset_or_empty(DIRECTOR_CREDS_FILE).await?;
        let cert_expiry = nats_ca(&creds)?
            .and_then(|ca| certs::not_after(&ca))
            .map(|expiry| expiry.format("%b %e %H:%M:%S %Y GMT").to_string())
            .unwrap_or_default();

        let view = ConfigView::new(&config);
        let inputs = self.c.input_vars.new_input_vars(&view);
        let outputs = self.c.provisioner.build_output(&inputs).await?;
        let terraform = TerraformInfo {
            director_public_ip: outputs.get(outputs::DIRECTOR_PUBLIC_IP)?.to_string(),
            nat_gateway_ip: outputs.get(outputs::NAT_GATEWAY_IP)?.to_string(),
        };

        let ip = self.c.ip_resolver.public_ip().await?;
        let security_group = outputs.get(outputs::DIRECTOR_SECURITY_GROUP_ID)?;
        if !self
            .c
            .provider
            .check_for_whitelisted_ip(&ip, security_group)
            .await?
        {
            return Err(TowerError::NotWhitelisted {
                ip,
                deployment: config.deployment.clone(),
            });
        }

        let instances = self
            .c
            .director
            .instances(&view, &outputs)
            .await
            .context("Error getting BOSH instances")?;

        Ok(Info {
            terraform,
            instances,
            cert_expiry,
            gateway_user: self.c.provider.iaas().gateway_user().to_string(),
            config,
        })
    }
}

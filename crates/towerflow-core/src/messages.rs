//! Operator-facing message templates

use crate::error::Result;
use serde::Serialize;
use tera::{Context, Tera};

pub const CONFIG_LOADED: &str = "\nUSING PREVIOUS DEPLOYMENT CONFIG\n";
pub const UPGRADE_RUNNING: &str = "\nUPGRADE RUNNING IN BACKGROUND\n\n";
pub const DESTROY_SUCCESSFUL: &str = "DESTROY SUCCESSFUL\n";

const DEPLOY_SUCCESS: &str = r#"DEPLOY SUCCESSFUL. Log in with:
fly --target {{ project }} login{% if not user_provided_cert %} --insecure{% endif %} --concourse-url https://{{ domain }} --username {{ username }} --password {{ password }}

Metrics available at https://{{ domain }}:3000 using the same username and password

Log into credhub with:
eval "$(tower info --region {{ region }}{% if namespace != region %} --namespace {{ namespace }}{% endif %} --iaas {{ iaas }} --env {{ project }})"
"#;

pub fn access_ip_warning(ip: &str) -> String {
    format!(
        "\nWARNING: allowing access from local machine (address: {})\n\n",
        ip
    )
}

pub fn dns_record_warning(domain: &str, zone_name: &str, zone_id: &str) -> String {
    format!(
        "\nWARNING: adding record {} to DNS zone {} with name {}\n\n",
        domain, zone_name, zone_id
    )
}

pub fn director_cert_notice(public_ip: &str, internal_ip: &str) -> String {
    format!(
        "\nGENERATING BOSH DIRECTOR CERTIFICATE ({}, {})\n",
        public_ip, internal_ip
    )
}

#[derive(Debug, Serialize)]
pub struct DeploySuccess<'a> {
    pub project: &'a str,
    pub domain: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub user_provided_cert: bool,
    pub region: &'a str,
    pub namespace: &'a str,
    pub iaas: &'a str,
}

pub fn deploy_success(params: &DeploySuccess<'_>) -> Result<String> {
    render(DEPLOY_SUCCESS, params)
}

/// Render a one-off template with `params` as its context
pub(crate) fn render<T: Serialize>(template: &str, params: &T) -> Result<String> {
    let context = Context::from_serialize(params)?;
    Ok(Tera::one_off(template, &context, false)?)
}

//! The persisted deployment configuration record

use crate::error::{Result, TowerError};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use towerflow_cloud::Iaas;

/// Prefix of the tag that records which version deployed the cluster
pub const VERSION_TAG_KEY: &str = "control-tower-version";

/// How worker VMs are bought from the IAAS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmProvisioningType {
    #[serde(rename = "spot")]
    Spot,
    #[serde(rename = "on-demand")]
    OnDemand,
}

impl VmProvisioningType {
    pub fn from_spot(spot: bool) -> Self {
        if spot {
            VmProvisioningType::Spot
        } else {
            VmProvisioningType::OnDemand
        }
    }
}

impl fmt::Display for VmProvisioningType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmProvisioningType::Spot => write!(f, "spot"),
            VmProvisioningType::OnDemand => write!(f, "on-demand"),
        }
    }
}

impl FromStr for VmProvisioningType {
    type Err = TowerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "spot" => Ok(VmProvisioningType::Spot),
            "on-demand" => Ok(VmProvisioningType::OnDemand),
            other => Err(TowerError::validation(format!(
                "unknown vm provisioning type `{}`",
                other
            ))),
        }
    }
}

/// Deserialize `""` and `null` as `None`, anything else through `FromStr`
fn empty_as_none<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(de::Error::custom),
    }
}

/// The single source of truth for a named deployment.
///
/// Field names match the JSON document stored in the config bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Identity
    pub project: String,
    pub namespace: String,
    pub region: String,
    #[serde(deserialize_with = "empty_as_none")]
    pub iaas: Option<Iaas>,
    pub deployment: String,
    pub config_bucket: String,
    pub tf_state_path: String,

    // Network (write-once)
    pub network_cidr: String,
    pub public_cidr: String,
    pub private_cidr: String,
    pub rds1_cidr: String,
    pub rds2_cidr: String,
    pub availability_zone: String,

    // Access
    pub allow_ips: String,
    pub allow_ips_unformatted: String,
    pub source_access_ip: String,

    // Credentials
    pub director_username: String,
    pub director_password: String,
    pub director_hm_user_password: String,
    pub director_mbus_password: String,
    pub director_nats_password: String,
    pub director_registry_password: String,
    pub concourse_username: String,
    pub concourse_password: String,
    pub grafana_password: String,
    pub credhub_username: String,
    pub credhub_password: String,
    pub credhub_admin_client_secret: String,
    pub credhub_ca_cert: String,
    pub credhub_url: String,
    pub encryption_key: String,
    pub private_key: String,
    pub public_key: String,
    pub rds_username: String,
    pub rds_password: String,
    pub rds_default_database_name: String,

    // Certificates
    pub director_ca_cert: String,
    pub director_cert: String,
    pub director_key: String,
    pub concourse_ca_cert: String,
    pub concourse_cert: String,
    pub concourse_key: String,
    pub concourse_user_provided_cert: bool,

    // Sizing and features
    pub concourse_web_size: String,
    pub concourse_worker_count: u32,
    pub concourse_worker_size: String,
    pub worker_type: String,
    pub rds_instance_class: String,
    pub rds_disk_encryption: bool,
    pub persistent_disk: String,
    #[serde(deserialize_with = "empty_as_none")]
    pub vm_provisioning_type: Option<VmProvisioningType>,
    /// Superseded by `vm_provisioning_type`; only read to migrate old records
    pub spot: bool,
    pub no_metrics: bool,
    #[serde(rename = "influx_db_retention_period")]
    pub influx_db_retention: String,
    pub enable_global_resources: bool,
    pub enable_pipeline_instances: bool,
    pub tags: Vec<String>,

    // Third-party auth
    pub github_client_id: String,
    pub github_client_secret: String,
    pub github_host: String,
    pub github_ca_cert: String,
    pub main_github_users: String,
    pub main_github_teams: String,
    pub main_github_orgs: String,
    pub microsoft_client_id: String,
    pub microsoft_client_secret: String,
    pub microsoft_tenant: String,
    pub bitbucket_client_id: String,
    pub bitbucket_client_secret: String,

    // Resolved during a run
    pub domain: String,
    pub hosted_zone_id: String,
    pub hosted_zone_record_prefix: String,
    pub director_public_ip: String,
    pub version: String,
}

impl Config {
    /// Populate fields added since the record was last saved from the
    /// legacy fields they replace
    pub fn migrate_legacy_fields(&mut self) {
        if self.vm_provisioning_type.is_none() {
            self.vm_provisioning_type = Some(VmProvisioningType::from_spot(self.spot));
        }
    }

    /// Fill every zero-valued field from `defaults`, leaving set fields alone.
    ///
    /// A field counts as unset when it is an empty string, zero, `false`,
    /// an empty list or absent.
    pub fn fill_missing_from(&mut self, defaults: &Config) -> Result<()> {
        let mut current = serde_json::to_value(&*self)?;
        let defaults = serde_json::to_value(defaults)?;

        if let (Some(current), Some(defaults)) = (current.as_object_mut(), defaults.as_object()) {
            for (key, default) in defaults {
                let unset = current.get(key).is_none_or(is_zero);
                if unset {
                    current.insert(key.clone(), default.clone());
                }
            }
        }

        *self = serde_json::from_value(current)?;
        Ok(())
    }

    /// Remove any previous version tag and prepend the one for `version`
    pub fn stamp_version_tag(&mut self, version: &str) {
        self.tags.retain(|tag| !tag.starts_with(VERSION_TAG_KEY));
        self.tags
            .insert(0, format!("{}={}", VERSION_TAG_KEY, version));
    }

    pub fn is_spot(&self) -> bool {
        self.vm_provisioning_type == Some(VmProvisioningType::Spot)
    }

    pub fn is_github_auth_set(&self) -> bool {
        !self.github_client_id.is_empty() && !self.github_client_secret.is_empty()
    }

    pub fn is_microsoft_auth_set(&self) -> bool {
        !self.microsoft_client_id.is_empty() && !self.microsoft_client_secret.is_empty()
    }

    pub fn is_bitbucket_auth_set(&self) -> bool {
        !self.bitbucket_client_id.is_empty() && !self.bitbucket_client_secret.is_empty()
    }
}

fn is_zero(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Bool(b) => !b,
        serde_json::Value::Number(n) => n.as_f64() == Some(0.0),
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
    }
}

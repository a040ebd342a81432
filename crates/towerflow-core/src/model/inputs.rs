//! Typed input variables for the infrastructure provisioner
//!
//! Each IAAS has its own variable set. The provisioner checks the set
//! against the variables its module declares before running, so a
//! template that grows a new required variable fails loudly instead of
//! prompting.

use super::view::ConfigView;
use crate::error::{Result, TowerError};
use serde::Serialize;
use std::collections::BTreeSet;
use towerflow_cloud::{CloudProvider, Iaas};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AwsInputVars {
    pub network_cidr: String,
    pub public_cidr: String,
    pub private_cidr: String,
    pub allow_ips: String,
    pub availability_zone: String,
    pub config_bucket: String,
    pub deployment: String,
    pub hosted_zone_id: String,
    pub hosted_zone_record_prefix: String,
    pub namespace: String,
    pub project: String,
    pub public_key: String,
    pub rds_default_database_name: String,
    pub rds_instance_class: String,
    pub rds_password: String,
    pub rds_username: String,
    pub rds1_cidr: String,
    pub rds2_cidr: String,
    pub region: String,
    pub source_access_ip: String,
    pub tf_state_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcpInputVars {
    pub allow_ips: String,
    pub config_bucket: String,
    pub db_name: String,
    pub db_password: String,
    pub db_tier: String,
    pub db_username: String,
    pub deployment: String,
    pub dns_managed_zone_name: String,
    pub dns_record_set_prefix: String,
    pub external_ip: String,
    pub gcp_credentials_json: String,
    pub namespace: String,
    pub project: String,
    pub region: String,
    pub tags: String,
    pub zone: String,
    pub public_cidr: String,
    pub private_cidr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerraformInputs {
    Aws(AwsInputVars),
    Gcp(GcpInputVars),
}

impl TerraformInputs {
    pub fn iaas(&self) -> Iaas {
        match self {
            TerraformInputs::Aws(_) => Iaas::Aws,
            TerraformInputs::Gcp(_) => Iaas::Gcp,
        }
    }

    pub fn config_bucket(&self) -> &str {
        match self {
            TerraformInputs::Aws(vars) => &vars.config_bucket,
            TerraformInputs::Gcp(vars) => &vars.config_bucket,
        }
    }

    pub fn region(&self) -> &str {
        match self {
            TerraformInputs::Aws(vars) => &vars.region,
            TerraformInputs::Gcp(vars) => &vars.region,
        }
    }

    /// Variables as the JSON object written to a `-var-file`
    pub fn to_vars(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        let value = match self {
            TerraformInputs::Aws(vars) => serde_json::to_value(vars)?,
            TerraformInputs::Gcp(vars) => serde_json::to_value(vars)?,
        };
        match value {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(TowerError::validation("input variables must serialize to an object")),
        }
    }

    /// Fail when the module declares a required variable we do not supply
    pub fn validate_against<S: AsRef<str>>(&self, required: &[S]) -> Result<()> {
        let vars = self.to_vars()?;
        let provided: BTreeSet<&str> = vars.keys().map(String::as_str).collect();
        let missing: Vec<&str> = required
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !provided.contains(name))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TowerError::validation(format!(
                "terraform module requires variables that are not provided: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Project-level settings only GCP needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpProject {
    pub credentials_path: String,
    pub project: String,
}

/// Builds [`TerraformInputs`] from a configuration view
#[derive(Debug, Clone)]
pub enum InputVarsFactory {
    Aws,
    Gcp {
        project: GcpProject,
        region: String,
        zone: String,
    },
}

impl InputVarsFactory {
    pub fn for_provider(provider: &dyn CloudProvider, gcp: Option<GcpProject>) -> Result<Self> {
        match provider.iaas() {
            Iaas::Aws => Ok(InputVarsFactory::Aws),
            Iaas::Gcp => {
                let project = gcp.ok_or_else(|| {
                    TowerError::validation("Error finding attribute [credentials_path]")
                })?;
                Ok(InputVarsFactory::Gcp {
                    project,
                    region: provider.region().to_string(),
                    zone: provider.zone(None),
                })
            }
        }
    }

    pub fn new_input_vars(&self, c: &ConfigView) -> TerraformInputs {
        match self {
            InputVarsFactory::Aws => TerraformInputs::Aws(AwsInputVars {
                network_cidr: c.network_cidr.clone(),
                public_cidr: c.public_cidr.clone(),
                private_cidr: c.private_cidr.clone(),
                allow_ips: c.allow_ips.clone(),
                availability_zone: c.availability_zone.clone(),
                config_bucket: c.config_bucket.clone(),
                deployment: c.deployment.clone(),
                hosted_zone_id: c.hosted_zone_id.clone(),
                hosted_zone_record_prefix: c.hosted_zone_record_prefix.clone(),
                namespace: c.namespace.clone(),
                project: c.project.clone(),
                public_key: c.public_key.clone(),
                rds_default_database_name: c.rds_default_database_name.clone(),
                rds_instance_class: c.rds_instance_class.clone(),
                rds_password: c.rds_password.clone(),
                rds_username: c.rds_username.clone(),
                rds1_cidr: c.rds1_cidr.clone(),
                rds2_cidr: c.rds2_cidr.clone(),
                region: c.region.clone(),
                source_access_ip: c.source_access_ip.clone(),
                tf_state_path: c.tf_state_path.clone(),
            }),
            InputVarsFactory::Gcp {
                project,
                region,
                zone,
            } => TerraformInputs::Gcp(GcpInputVars {
                allow_ips: c.allow_ips.clone(),
                config_bucket: c.config_bucket.clone(),
                db_name: c.rds_default_database_name.clone(),
                db_password: c.rds_password.clone(),
                db_tier: c.rds_instance_class.clone(),
                db_username: c.rds_username.clone(),
                deployment: c.deployment.clone(),
                dns_managed_zone_name: c.hosted_zone_id.clone(),
                dns_record_set_prefix: c.hosted_zone_record_prefix.clone(),
                external_ip: c.source_access_ip.clone(),
                gcp_credentials_json: project.credentials_path.clone(),
                namespace: c.namespace.clone(),
                project: project.project.clone(),
                region: region.clone(),
                tags: String::new(),
                zone: zone.clone(),
                public_cidr: c.public_cidr.clone(),
                private_cidr: c.private_cidr.clone(),
            }),
        }
    }
}

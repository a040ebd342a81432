//! Named outputs of the infrastructure provisioner

use crate::error::{Result, TowerError};
use serde::Deserialize;
use std::collections::BTreeMap;
use towerflow_cloud::Iaas;

pub const DIRECTOR_PUBLIC_IP: &str = "director_public_ip";
pub const DIRECTOR_SECURITY_GROUP_ID: &str = "director_security_group_id";
pub const ATC_PUBLIC_IP: &str = "atc_public_ip";
pub const NAT_GATEWAY_IP: &str = "nat_gateway_ip";
pub const VPC_ID: &str = "vpc_id";
pub const NETWORK: &str = "network";
pub const BOSH_DB_ADDRESS: &str = "bosh_db_address";
pub const BOSH_DB_PORT: &str = "bosh_db_port";
pub const PUBLIC_SUBNET_ID: &str = "public_subnet_id";
pub const PRIVATE_SUBNET_ID: &str = "private_subnet_id";
pub const SELF_UPDATE_ACCESS_KEY_ID: &str = "self_update_user_access_key_id";
pub const SELF_UPDATE_SECRET_ACCESS_KEY: &str = "self_update_secret_access_key";
pub const BOSH_USER_ACCESS_KEY_ID: &str = "bosh_user_access_key_id";
pub const BOSH_SECRET_ACCESS_KEY: &str = "bosh_secret_access_key";
pub const ATC_SECURITY_GROUP_ID: &str = "atc_security_group_id";
pub const VMS_SECURITY_GROUP_ID: &str = "vms_security_group_id";
pub const BLOBSTORE_BUCKET: &str = "blobstore_bucket";
pub const BLOBSTORE_USER_ACCESS_KEY_ID: &str = "blobstore_user_access_key_id";
pub const BLOBSTORE_SECRET_ACCESS_KEY: &str = "blobstore_secret_access_key";
pub const DIRECTOR_KEY_PAIR: &str = "director_key_pair";

#[derive(Deserialize)]
struct OutputValue {
    value: serde_json::Value,
}

/// String outputs read back after the provisioner has converged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfraOutputs {
    values: BTreeMap<String, String>,
}

impl InfraOutputs {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Parse the `{"name": {"value": ...}}` document printed by
    /// `terraform output -json`. Non-string values keep their JSON form.
    pub fn from_json(document: &[u8]) -> Result<Self> {
        let raw: BTreeMap<String, OutputValue> = serde_json::from_slice(document)?;
        let values = raw
            .into_iter()
            .map(|(name, output)| {
                let value = match output.value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, value)
            })
            .collect();
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Result<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| TowerError::MissingOutput(name.to_string()))
    }

    /// Output naming the network the cluster's VMs live in
    pub fn network_id(&self, iaas: Iaas) -> Result<&str> {
        match iaas {
            Iaas::Aws => self.get(VPC_ID),
            Iaas::Gcp => self.get(NETWORK),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InfraOutputs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

//! Cloud provider trait definitions

use crate::error::{CloudError, Result};
use crate::iaas::Iaas;
use crate::zone::{self, HostedZone, HostedZoneMatch};
use async_trait::async_trait;

/// Cloud provider abstraction trait
///
/// Every IAAS TowerFlow can deploy onto implements this trait. The
/// orchestrator only ever talks to the provider through it.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Which IAAS this provider drives
    fn iaas(&self) -> Iaas;

    /// Region the provider was configured for
    fn region(&self) -> &str;

    /// Availability zone for a new deployment.
    ///
    /// An explicitly requested zone always wins.
    fn zone(&self, requested: Option<&str>) -> String;

    /// List every hosted DNS zone visible to the account
    async fn list_hosted_zones(&self) -> Result<Vec<HostedZone>>;

    /// Resolve the zone whose name is the longest suffix of `domain`
    async fn find_longest_matching_hosted_zone(&self, domain: &str) -> Result<HostedZoneMatch> {
        let zones = self.list_hosted_zones().await?;
        zone::longest_match(&zones, domain).ok_or_else(|| {
            CloudError::ResourceNotFound(format!(
                "no matching hosted zone found for domain {}",
                domain
            ))
        })
    }

    /// Check that `ip` may reach the director through the given security group
    async fn check_for_whitelisted_ip(&self, ip: &str, security_group_id: &str) -> Result<bool>;

    /// Terminate every VM inside the network and return the ids of the
    /// volumes that were left behind
    async fn delete_vms_in_vpc(&self, vpc_id: &str) -> Result<Vec<String>>;

    /// Delete detached volumes. Volumes that are already gone are skipped.
    async fn delete_volumes(&self, volume_ids: &[String]) -> Result<()>;
}

/// Bucket-style blob storage used for the persisted config and assets
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    async fn has_file(&self, bucket: &str, key: &str) -> Result<bool>;

    async fn load_file(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    async fn write_file(&self, bucket: &str, key: &str, contents: &[u8]) -> Result<()>;

    /// Delete the bucket including every stored version of every object
    async fn delete_versioned_bucket(&self, bucket: &str) -> Result<()>;
}

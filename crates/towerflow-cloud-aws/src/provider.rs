//! AWS provider implementation

use crate::cli::AwsCli;
use crate::error::AwsError;
use crate::firewall;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use towerflow_cloud::{CloudProvider, HostedZone, Iaas, ObjectStore, Result};

/// Volumes still attached are rechecked this many times
const IN_USE_CHECKS: usize = 3;
const IN_USE_DELAY: Duration = Duration::from_secs(10);

/// AWS provider backed by the aws CLI
pub struct AwsProvider {
    cli: AwsCli,
}

impl AwsProvider {
    pub fn new(aws_path: impl Into<PathBuf>, region: impl Into<String>) -> Self {
        Self {
            cli: AwsCli::new(aws_path, region),
        }
    }

    /// Access key pair the operator is running with: the standard
    /// environment variables first, then the CLI's configuration
    pub async fn credentials(&self) -> Result<Option<(String, String)>> {
        let from_env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        if let (Some(id), Some(secret)) = (
            from_env("AWS_ACCESS_KEY_ID"),
            from_env("AWS_SECRET_ACCESS_KEY"),
        ) {
            return Ok(Some((id, secret)));
        }

        let id = self.cli.configure_get("aws_access_key_id").await?;
        let secret = self.cli.configure_get("aws_secret_access_key").await?;
        Ok(id.zip(secret))
    }

    /// Wait for volumes detaching from terminated instances. Volumes still
    /// in use after the last check are reported and left for the caller.
    async fn wait_for_volumes_to_detach(&self, volume_ids: &[String]) -> Result<()> {
        for attempt in 1..=IN_USE_CHECKS {
            let in_use = self.cli.volumes_with_status(volume_ids, &["in-use"]).await?;
            if in_use.is_empty() {
                return Ok(());
            }
            if attempt == IN_USE_CHECKS {
                tracing::warn!("There are still volumes in use: {:?}", in_use);
                return Ok(());
            }
            tracing::info!(
                "There are {} volumes in use. Sleeping for {} seconds.",
                in_use.len(),
                IN_USE_DELAY.as_secs()
            );
            tokio::time::sleep(IN_USE_DELAY).await;
        }
        Ok(())
    }
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn iaas(&self) -> Iaas {
        Iaas::Aws
    }

    fn region(&self) -> &str {
        self.cli.region()
    }

    fn zone(&self, requested: Option<&str>) -> String {
        match requested {
            Some(zone) => zone.to_string(),
            None => format!("{}a", self.cli.region()),
        }
    }

    async fn list_hosted_zones(&self) -> Result<Vec<HostedZone>> {
        let zones = self.cli.list_hosted_zones().await?;
        Ok(zones
            .iter()
            .map(|z| HostedZone::new(z.name.as_str(), z.short_id()))
            .collect())
    }

    async fn check_for_whitelisted_ip(&self, ip: &str, security_group_id: &str) -> Result<bool> {
        let group = self.cli.describe_security_group(security_group_id).await?;
        Ok(firewall::ip_has_director_access(ip, &group.ip_permissions)?)
    }

    async fn delete_vms_in_vpc(&self, vpc_id: &str) -> Result<Vec<String>> {
        let instances = self.cli.describe_instances_in_vpc(vpc_id).await?;
        if instances.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = instances.iter().map(|i| i.instance_id.clone()).collect();
        let volumes: Vec<String> = instances
            .iter()
            .flat_map(|i| i.volume_ids())
            .map(str::to_string)
            .collect();

        for id in &ids {
            tracing::info!("Terminating instance {}", id);
        }
        self.cli.terminate_instances(&ids).await.map_err(|e| {
            AwsError::CommandFailed(format!("terminate instances {:?}: {}", ids, e))
        })?;
        self.cli.wait_instances_terminated(&ids).await.map_err(|e| {
            AwsError::CommandFailed(format!("wait for instance termination: {}", e))
        })?;

        Ok(volumes)
    }

    async fn delete_volumes(&self, volume_ids: &[String]) -> Result<()> {
        if volume_ids.is_empty() {
            return Ok(());
        }

        self.wait_for_volumes_to_detach(volume_ids).await?;

        let deletable = self
            .cli
            .volumes_with_status(volume_ids, &["available", "creating"])
            .await?;
        for volume_id in deletable {
            tracing::info!("Deleting volume: {}", volume_id);
            self.cli.delete_volume(&volume_id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for AwsProvider {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.cli.head_bucket(bucket).await?)
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        tracing::info!("Creating versioned bucket {}", bucket);
        Ok(self.cli.create_bucket(bucket).await?)
    }

    async fn has_file(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self.cli.head_object(bucket, key).await?)
    }

    async fn load_file(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("object");
        self.cli.get_object(bucket, key, &target).await?;
        Ok(tokio::fs::read(&target).await?)
    }

    async fn write_file(&self, bucket: &str, key: &str, contents: &[u8]) -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("object");
        tokio::fs::write(&source, contents).await?;
        Ok(self.cli.put_object(bucket, key, &source).await?)
    }

    async fn delete_versioned_bucket(&self, bucket: &str) -> Result<()> {
        for version in self.cli.list_object_versions(bucket).await? {
            self.cli.delete_object_version(bucket, &version).await?;
        }
        Ok(self.cli.delete_bucket(bucket).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_defaults_to_first_in_region() {
        let provider = AwsProvider::new("aws", "eu-west-2");
        assert_eq!(provider.zone(None), "eu-west-2a");
        assert_eq!(provider.zone(Some("eu-west-2c")), "eu-west-2c");
        assert_eq!(provider.region(), "eu-west-2");
        assert_eq!(provider.iaas(), Iaas::Aws);
    }

    #[tokio::test]
    async fn test_missing_cli_is_reported() {
        let provider = AwsProvider::new("/nonexistent/aws-cli", "eu-west-1");
        let err = provider.list_hosted_zones().await.unwrap_err();
        assert!(err.to_string().contains("aws CLI not found"));
    }
}

//! Persisted configuration record and assets
//!
//! A deployment keeps everything in one bucket: the JSON configuration
//! record plus opaque assets such as the director state and its vars-store.

use crate::error::{Result, ResultExt, TowerError};
use crate::model::{Config, ConfigView};
use async_trait::async_trait;
use std::sync::Arc;
use towerflow_cloud::ObjectStore;

pub const CONFIG_FILE: &str = "config.json";
pub const TERRAFORM_STATE_FILE: &str = "terraform.tfstate";
/// Director state written by `create-env`
pub const DIRECTOR_STATE_FILE: &str = "director-state.json";
/// Director vars-store holding the generated credentials
pub const DIRECTOR_CREDS_FILE: &str = "director-creds.yml";

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// A fresh record carrying only the identity fields of this deployment
    fn new_config(&self) -> Config;

    async fn config_exists(&self) -> Result<bool>;

    async fn load(&self) -> Result<Config>;

    async fn update(&self, config: &Config) -> Result<()>;

    async fn has_asset(&self, name: &str) -> Result<bool>;

    async fn load_asset(&self, name: &str) -> Result<Vec<u8>>;

    async fn store_asset(&self, name: &str, contents: &[u8]) -> Result<()>;

    async fn ensure_bucket_exists(&self) -> Result<()>;

    /// Delete the bucket with every version of every object in it
    async fn delete_all(&self, config: &ConfigView) -> Result<()>;

    /// Load an asset, or an empty blob when it has never been written
    async fn load_asset_or_empty(&self, name: &str) -> Result<Vec<u8>> {
        if self.has_asset(name).await? {
            self.load_asset(name).await
        } else {
            Ok(Vec::new())
        }
    }
}

/// `control-tower-<project>`
pub fn deployment_name(project: &str) -> String {
    format!("control-tower-{}", project)
}

fn bucket_name(deployment: &str, extension: &str) -> String {
    format!("{}-{}-config", deployment, extension)
}

/// [`ConfigStore`] on top of an [`ObjectStore`] bucket
pub struct BucketConfigStore {
    objects: Arc<dyn ObjectStore>,
    project: String,
    namespace: String,
    region: String,
    bucket: String,
}

impl BucketConfigStore {
    /// Resolve the bucket for `project`.
    ///
    /// The namespace defaults to the region. Deployments created before
    /// namespaces existed keep using their region-named bucket.
    pub async fn connect(
        objects: Arc<dyn ObjectStore>,
        region: &str,
        project: &str,
        namespace: Option<&str>,
    ) -> Result<Self> {
        let namespace = match namespace {
            Some(ns) if !ns.is_empty() => ns.to_string(),
            _ => region.to_string(),
        };

        let deployment = deployment_name(project);
        let region_bucket = bucket_name(&deployment, region);
        let namespace_bucket = bucket_name(&deployment, &namespace);

        let bucket = if region_bucket != namespace_bucket
            && objects
                .bucket_exists(&region_bucket)
                .await
                .context(format!(
                    "error looking for possible config buckets [{}] or [{}]",
                    region_bucket, namespace_bucket
                ))?
        {
            region_bucket
        } else {
            namespace_bucket
        };

        tracing::debug!("Using config bucket {}", bucket);

        Ok(Self {
            objects,
            project: project.to_string(),
            namespace,
            region: region.to_string(),
            bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl ConfigStore for BucketConfigStore {
    fn new_config(&self) -> Config {
        Config {
            config_bucket: self.bucket.clone(),
            deployment: deployment_name(&self.project),
            namespace: self.namespace.clone(),
            project: self.project.clone(),
            region: self.region.clone(),
            tf_state_path: TERRAFORM_STATE_FILE.to_string(),
            ..Default::default()
        }
    }

    async fn config_exists(&self) -> Result<bool> {
        self.has_asset(CONFIG_FILE).await
    }

    async fn load(&self) -> Result<Config> {
        let bytes = self.objects.load_file(&self.bucket, CONFIG_FILE).await?;
        let mut config: Config = serde_json::from_slice(&bytes)?;
        config.migrate_legacy_fields();
        Ok(config)
    }

    async fn update(&self, config: &Config) -> Result<()> {
        let bytes = serde_json::to_vec(config)?;
        self.objects
            .write_file(&self.bucket, CONFIG_FILE, &bytes)
            .await?;
        tracing::info!("Saved config to bucket {}", self.bucket);
        Ok(())
    }

    async fn has_asset(&self, name: &str) -> Result<bool> {
        Ok(self.objects.has_file(&self.bucket, name).await?)
    }

    async fn load_asset(&self, name: &str) -> Result<Vec<u8>> {
        Ok(self.objects.load_file(&self.bucket, name).await?)
    }

    async fn store_asset(&self, name: &str, contents: &[u8]) -> Result<()> {
        Ok(self.objects.write_file(&self.bucket, name, contents).await?)
    }

    async fn ensure_bucket_exists(&self) -> Result<()> {
        let exists = self
            .objects
            .bucket_exists(&self.bucket)
            .await
            .context(format!("error determining if bucket [{}] exists", self.bucket))?;

        if !exists {
            self.objects
                .create_bucket(&self.bucket)
                .await
                .context(format!("error creating config bucket [{}]", self.bucket))?;
            tracing::info!("Created config bucket {}", self.bucket);
        }
        Ok(())
    }

    async fn delete_all(&self, config: &ConfigView) -> Result<()> {
        let bucket = if config.config_bucket.is_empty() {
            &self.bucket
        } else {
            &config.config_bucket
        };
        if bucket.is_empty() {
            return Err(TowerError::precondition("no config bucket to delete"));
        }
        Ok(self.objects.delete_versioned_bucket(bucket).await?)
    }
}

//! Capability traits for the external systems the orchestrator drives
//!
//! Concrete implementations live in their own crates and are wired
//! together by the CLI. The orchestrator only ever sees these traits.

use crate::error::{Result, TowerError};
use crate::model::{ConfigView, Instance, InfraOutputs, TerraformInputs};
use async_trait::async_trait;

/// Infrastructure-as-code tool converging the cloud resources
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn apply(&self, inputs: &TerraformInputs) -> Result<()>;

    async fn destroy(&self, inputs: &TerraformInputs) -> Result<()>;

    /// Read back the named outputs of the last apply
    async fn build_output(&self, inputs: &TerraformInputs) -> Result<InfraOutputs>;
}

/// State and credential blobs after a director deploy, returned even when
/// the deploy itself failed
#[derive(Debug)]
pub struct DirectorDeployment {
    pub state: Vec<u8>,
    pub creds: Vec<u8>,
    pub outcome: Result<()>,
}

impl DirectorDeployment {
    pub fn succeeded(state: Vec<u8>, creds: Vec<u8>) -> Self {
        Self {
            state,
            creds,
            outcome: Ok(()),
        }
    }

    pub fn failed(state: Vec<u8>, creds: Vec<u8>, error: TowerError) -> Self {
        Self {
            state,
            creds,
            outcome: Err(error),
        }
    }
}

/// VM orchestration director
#[async_trait]
pub trait DirectorClient: Send + Sync {
    /// Create or update the director and deploy the CI cluster onto it.
    ///
    /// With `detach` the call returns as soon as the cluster deploy task
    /// has started.
    async fn deploy(
        &self,
        config: &ConfigView,
        outputs: &InfraOutputs,
        state: Vec<u8>,
        creds: Vec<u8>,
        detach: bool,
    ) -> DirectorDeployment;

    async fn instances(&self, config: &ConfigView, outputs: &InfraOutputs) -> Result<Vec<Instance>>;

    /// Raw JSON lock listing of the director. Not driven by deploy, destroy
    /// or info; available to callers that inspect a running director.
    async fn locks(&self, config: &ConfigView, outputs: &InfraOutputs) -> Result<Vec<u8>>;

    /// Recreate every VM of the CI deployment. Not driven by deploy,
    /// destroy or info.
    async fn recreate(&self, config: &ConfigView, outputs: &InfraOutputs) -> Result<()>;
}

/// Login details for the running CI server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineCredentials {
    pub target: String,
    pub api: String,
    pub username: String,
    pub password: String,
}

/// CLI setting pipelines on the running CI server
#[async_trait]
pub trait PipelineClient: Send + Sync {
    async fn can_connect(&self, credentials: &PipelineCredentials) -> Result<bool>;

    /// Set, pause and unpause the self-update pipeline.
    ///
    /// `allow_skew` tolerates a CLI that does not match the server version.
    async fn set_default_pipeline(
        &self,
        config: &ConfigView,
        credentials: &PipelineCredentials,
        allow_skew: bool,
    ) -> Result<()>;
}

/// CA, leaf certificate and key in PEM form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertBundle {
    pub ca_cert: String,
    pub cert: String,
    pub key: String,
}

#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Issue a certificate for `name` covering every subject (IPs or
    /// domain names)
    async fn generate(&self, name: &str, subjects: &[String]) -> Result<CertBundle>;
}

/// Resolves the public address the operator's traffic leaves from
#[async_trait]
pub trait IpResolver: Send + Sync {
    async fn public_ip(&self) -> Result<String>;
}

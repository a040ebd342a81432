//! Concrete collaborators behind the orchestrator

use crate::TargetArgs;
use crate::ip::HttpIpResolver;
use std::sync::Arc;
use towerflow_certs::SelfSignedIssuer;
use towerflow_cloud::{Iaas, LocalObjectStore, ObjectStore};
use towerflow_cloud_aws::AwsProvider;
use towerflow_config::{Settings, StateBackend};
use towerflow_core::secrets::RandomSecrets;
use towerflow_core::{
    BucketConfigStore, Collaborators, ExecutionContext, InputVarsFactory, Orchestrator, Terminal,
};
use towerflow_director::BoshDirector;
use towerflow_pipeline::{AwsCredentials, FlyClient, FlySource};
use towerflow_terraform::TerraformCli;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Whether the self-update pipeline will need the operator's AWS keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineCreds {
    Lookup,
    Skip,
}

pub async fn orchestrator(
    settings: &Settings,
    target: &TargetArgs,
    context: ExecutionContext,
    pipeline_creds: PipelineCreds,
) -> anyhow::Result<Orchestrator> {
    if target.iaas != Iaas::Aws {
        anyhow::bail!(
            "{} is not supported by this build of tower, only AWS deployments can be managed",
            target.iaas
        );
    }

    let provider = Arc::new(AwsProvider::new(&settings.aws_path, target.region.as_str()));

    let objects: Arc<dyn ObjectStore> = match settings.state_backend {
        StateBackend::S3 => provider.clone(),
        StateBackend::Local => Arc::new(LocalObjectStore::new(&settings.local_state_dir)),
    };
    let store = BucketConfigStore::connect(
        objects,
        &target.region,
        &target.name,
        target.namespace.as_deref(),
    )
    .await?;

    let terraform_state = match settings.state_backend {
        StateBackend::S3 => towerflow_terraform::StateBackend::S3,
        StateBackend::Local => {
            towerflow_terraform::StateBackend::Local(settings.local_state_dir.clone())
        }
    };
    let provisioner = TerraformCli::new(
        &settings.terraform_path,
        settings.terraform_module_dir(target.iaas.slug()),
        terraform_state,
    );

    let aws = match pipeline_creds {
        PipelineCreds::Lookup => aws_credentials(&provider).await,
        PipelineCreds::Skip => None,
    };
    let fly_source = match &settings.fly_path {
        Some(path) => FlySource::Path(path.clone()),
        None => FlySource::Download,
    };

    let input_vars = InputVarsFactory::for_provider(provider.as_ref(), None)?;

    let terminal = Terminal::stdio();
    let director = BoshDirector::new(&settings.bosh_path, &settings.manifest_dir)
        .with_terminal(terminal.clone());

    let collaborators = Collaborators {
        store: Arc::new(store),
        provider: provider.clone(),
        provisioner: Arc::new(provisioner),
        director: Arc::new(director),
        pipeline: Arc::new(FlyClient::new(fly_source, aws)?),
        issuer: Arc::new(SelfSignedIssuer::new()),
        ip_resolver: Arc::new(HttpIpResolver::new()?),
        secrets: Arc::new(RandomSecrets),
        input_vars,
    };

    Ok(Orchestrator::new(collaborators, context, terminal))
}

/// A failed lookup only matters once the pipeline is set, which reports
/// the missing keys itself
async fn aws_credentials(provider: &AwsProvider) -> Option<AwsCredentials> {
    match provider.credentials().await {
        Ok(Some((access_key_id, secret_access_key))) => Some(AwsCredentials {
            access_key_id,
            secret_access_key,
        }),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Could not read AWS credentials: {}", e);
            None
        }
    }
}

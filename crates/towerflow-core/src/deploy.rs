//! Deploy orchestration
//!
//! A deploy runs in a fixed order: bucket, effective config, pre-terraform
//! checks, terraform, certificates, then the director and pipeline. The
//! order of the last step flips in self-update mode, where the running
//! cluster is updating itself and the director deploy must detach.

use crate::certs;
use crate::collaborators::{
    CertificateIssuer, DirectorClient, IpResolver, PipelineClient, PipelineCredentials,
    Provisioner,
};
use crate::error::{Result, ResultExt, TowerError};
use crate::lifecycle::{ConfigLifecycle, EffectiveConfig};
use crate::messages::{self, DeploySuccess};
use crate::model::{
    Config, ConfigView, DeployArgs, DeployCredentials, InfraOutputs, InputVarsFactory, outputs,
};
use crate::network;
use crate::secrets::SecretGenerator;
use crate::store::{ConfigStore, DIRECTOR_CREDS_FILE, DIRECTOR_STATE_FILE};
use crate::terminal::Terminal;
use std::sync::Arc;
use towerflow_cloud::CloudProvider;

/// Everything the orchestrator talks to
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ConfigStore>,
    pub provider: Arc<dyn CloudProvider>,
    pub provisioner: Arc<dyn Provisioner>,
    pub director: Arc<dyn DirectorClient>,
    pub pipeline: Arc<dyn PipelineClient>,
    pub issuer: Arc<dyn CertificateIssuer>,
    pub ip_resolver: Arc<dyn IpResolver>,
    pub secrets: Arc<dyn SecretGenerator>,
    pub input_vars: InputVarsFactory,
}

/// How the current process was invoked
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Version stamped into the record and the cluster tags
    pub version: String,
    /// Running inside the cluster's own self-update pipeline
    pub self_update: bool,
}

pub struct Orchestrator {
    pub(crate) c: Collaborators,
    pub(crate) ctx: ExecutionContext,
    pub(crate) terminal: Terminal,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, context: ExecutionContext, terminal: Terminal) -> Self {
        Self {
            c: collaborators,
            ctx: context,
            terminal,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub async fn deploy(&self, args: &DeployArgs) -> Result<()> {
        args.validate()?;

        self.c
            .store
            .ensure_bucket_exists()
            .await
            .context("error ensuring config bucket exists before deploy")?;

        let lifecycle = ConfigLifecycle {
            store: self.c.store.as_ref(),
            provider: self.c.provider.as_ref(),
            secrets: self.c.secrets.as_ref(),
            terminal: &self.terminal,
        };
        let EffectiveConfig {
            mut config,
            domain_updated,
        } = lifecycle
            .resolve(args)
            .await
            .context("error getting initial config before deploy")?;

        self.check_pre_terraform(&mut config).await?;

        let inputs = self.c.input_vars.new_input_vars(&ConfigView::new(&config));
        tracing::info!("Applying {} infrastructure for {}", inputs.iaas(), config.deployment);
        self.c.provisioner.apply(&inputs).await?;
        let outputs = self.c.provisioner.build_output(&inputs).await?;

        self.c.store.update(&config).await?;

        config.stamp_version_tag(&self.ctx.version);
        config.version = self.ctx.version.clone();

        self.check_pre_deploy(&mut config, args, domain_updated, &outputs)
            .await?;

        let view = ConfigView::new(&config);
        let (creds, result) = if self.ctx.self_update {
            self.update_director_and_pipeline(&view, &outputs).await
        } else {
            self.deploy_director_and_pipeline(&view, &outputs).await
        };

        // Credentials are persisted whatever the outcome; the deploy error
        // takes precedence over a failed write.
        creds.apply_to(&mut config);
        let persisted = self.c.store.update(&config).await;
        result?;
        persisted
    }

    async fn check_pre_terraform(&self, config: &mut Config) -> Result<()> {
        let region = self.c.provider.region();
        if !config.region.is_empty() && config.region != region {
            return Err(TowerError::RegionMismatch {
                previous: config.region.clone(),
                requested: region.to_string(),
            });
        }
        config.region = region.to_string();

        if !self.ctx.self_update {
            let ip = self.c.ip_resolver.public_ip().await?;
            if ip != config.source_access_ip {
                self.terminal.warn(&messages::access_ip_warning(&ip))?;
            }
            config.source_access_ip = ip;
        }

        if !config.domain.is_empty() {
            let zone = self
                .c
                .provider
                .find_longest_matching_hosted_zone(&config.domain)
                .await?;
            self.terminal
                .warn(&messages::dns_record_warning(&config.domain, &zone.name, &zone.id))?;
            config.hosted_zone_id = zone.id;
            config.hosted_zone_record_prefix = zone.record_prefix;
        }

        Ok(())
    }

    async fn check_pre_deploy(
        &self,
        config: &mut Config,
        args: &DeployArgs,
        domain_updated: bool,
        outputs: &InfraOutputs,
    ) -> Result<()> {
        if config.domain.is_empty() {
            config.domain = outputs.get(outputs::ATC_PUBLIC_IP)?.to_string();
        }

        self.ensure_director_certs(config, outputs).await?;
        self.ensure_concourse_certs(config, args, domain_updated)
            .await?;

        config.director_public_ip = outputs.get(outputs::DIRECTOR_PUBLIC_IP)?.to_string();
        Ok(())
    }

    /// Director certificates are issued once and never renewed
    async fn ensure_director_certs(&self, config: &mut Config, outputs: &InfraOutputs) -> Result<()> {
        if !config.director_ca_cert.is_empty() {
            return Ok(());
        }

        let public_ip = outputs.get(outputs::DIRECTOR_PUBLIC_IP)?.to_string();
        let internal_ip = network::host(&config.public_cidr, network::DIRECTOR_HOST)?.to_string();
        self.terminal
            .print(&messages::director_cert_notice(&public_ip, &internal_ip))?;

        let bundle = self
            .c
            .issuer
            .generate(&config.deployment, &[public_ip, internal_ip])
            .await?;
        config.director_ca_cert = bundle.ca_cert;
        config.director_cert = bundle.cert;
        config.director_key = bundle.key;
        Ok(())
    }

    async fn ensure_concourse_certs(
        &self,
        config: &mut Config,
        args: &DeployArgs,
        domain_updated: bool,
    ) -> Result<()> {
        if let Some(cert) = args.tls_cert.as_deref().filter(|c| !c.is_empty()) {
            config.concourse_cert = cert.to_string();
            config.concourse_key = args.tls_key.clone().unwrap_or_default();
            config.concourse_user_provided_cert = true;
            return Ok(());
        }

        if !config.concourse_cert.is_empty()
            && !domain_updated
            && certs::is_fresh(&config.concourse_cert)
        {
            return Ok(());
        }

        tracing::info!("Issuing CI server certificate for {}", config.domain);
        let bundle = self
            .c
            .issuer
            .generate(&config.deployment, &[config.domain.clone()])
            .await?;
        config.concourse_ca_cert = bundle.ca_cert;
        config.concourse_cert = bundle.cert;
        config.concourse_key = bundle.key;
        config.concourse_user_provided_cert = false;
        Ok(())
    }

    /// Deploy the director and read its credentials back. State and creds
    /// blobs are stored even when the deploy fails.
    async fn deploy_director(
        &self,
        view: &ConfigView,
        outputs: &InfraOutputs,
        detach: bool,
    ) -> Result<DeployCredentials> {
        let state = self.c.store.load_asset_or_empty(DIRECTOR_STATE_FILE).await?;
        let creds = self.c.store.load_asset_or_empty(DIRECTOR_CREDS_FILE).await?;

        let deployment = self
            .c
            .director
            .deploy(view, outputs, state, creds, detach)
            .await;

        let stored_state = self
            .c
            .store
            .store_asset(DIRECTOR_STATE_FILE, &deployment.state)
            .await;
        let stored_creds = self
            .c
            .store
            .store_asset(DIRECTOR_CREDS_FILE, &deployment.creds)
            .await;

        deployment.outcome?;
        stored_state?;
        stored_creds?;

        let mut params = DeployCredentials::from_config(view);
        params.merge_creds_yaml(&deployment.creds, &view.domain)?;
        Ok(params)
    }

    async fn deploy_director_and_pipeline(
        &self,
        view: &ConfigView,
        outputs: &InfraOutputs,
    ) -> (DeployCredentials, Result<()>) {
        let creds = match self.deploy_director(view, outputs, false).await {
            Ok(creds) => creds,
            Err(e) => return (DeployCredentials::from_config(view), Err(e)),
        };

        let result = self.set_pipeline_and_report(view, &creds).await;
        (creds, result)
    }

    async fn set_pipeline_and_report(
        &self,
        view: &ConfigView,
        creds: &DeployCredentials,
    ) -> Result<()> {
        let login = pipeline_credentials(view, creds);
        self.c
            .pipeline
            .set_default_pipeline(view, &login, false)
            .await?;

        let iaas = view.iaas.map(|i| i.to_string()).unwrap_or_default();
        let message = messages::deploy_success(&DeploySuccess {
            project: &view.project,
            domain: &view.domain,
            username: &creds.concourse_username,
            password: &creds.concourse_password,
            user_provided_cert: view.concourse_user_provided_cert,
            region: &view.region,
            namespace: &view.namespace,
            iaas: &iaas,
        })?;
        self.terminal.print(&message)
    }

    async fn update_director_and_pipeline(
        &self,
        view: &ConfigView,
        outputs: &InfraOutputs,
    ) -> (DeployCredentials, Result<()>) {
        let fallback = DeployCredentials::from_config(view);
        let login = pipeline_credentials(view, &fallback);

        match self.c.pipeline.can_connect(&login).await {
            Ok(true) => {}
            Ok(false) => {
                return (
                    fallback,
                    Err(TowerError::precondition(
                        "In detach mode but it seems that concourse is not currently running",
                    )),
                );
            }
            Err(e) => return (fallback, Err(e)),
        }

        if let Err(e) = self.c.pipeline.set_default_pipeline(view, &login, true).await {
            return (fallback, Err(e));
        }

        match self.deploy_director(view, outputs, true).await {
            Ok(creds) => {
                let printed = self.terminal.print(messages::UPGRADE_RUNNING);
                (creds, printed)
            }
            Err(e) => (fallback, Err(e)),
        }
    }
}

fn pipeline_credentials(view: &ConfigView, creds: &DeployCredentials) -> PipelineCredentials {
    PipelineCredentials {
        target: view.deployment.clone(),
        api: format!("https://{}", view.domain),
        username: creds.concourse_username.clone(),
        password: creds.concourse_password.clone(),
    }
}

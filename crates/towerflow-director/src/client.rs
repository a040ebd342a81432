//! Director client over the bosh CLI

use crate::cli::{BoshCli, CreateEnvFiles, DeployFiles, DirectorAuth};
use crate::error::DirectorError;
use crate::manifest::{self, ManifestSet};
use crate::vars::{AwsCloudConfigParams, AwsDirectorVars, ConcoursePlan};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use towerflow_cloud::Iaas;
use towerflow_core::{
    ConfigView, DirectorClient, DirectorDeployment, InfraOutputs, Instance, Result, Terminal,
    TowerError, outputs,
};

const STATE_FILE: &str = "state.json";
const CREDS_FILE: &str = "creds.yml";

/// Deploys the director with create-env and the CI cluster onto it
pub struct BoshDirector {
    cli: BoshCli,
    manifests: ManifestSet,
}

impl BoshDirector {
    pub fn new(bosh_path: impl Into<PathBuf>, manifest_dir: impl Into<PathBuf>) -> Self {
        Self {
            cli: BoshCli::new(bosh_path),
            manifests: ManifestSet::new(manifest_dir),
        }
    }

    /// Operator terminal that receives detached deploy output
    pub fn with_terminal(mut self, terminal: Terminal) -> Self {
        self.cli = self.cli.with_terminal(terminal);
        self
    }

    fn auth(config: &ConfigView, out: &InfraOutputs) -> Result<DirectorAuth> {
        Ok(DirectorAuth::new(
            out.get(outputs::DIRECTOR_PUBLIC_IP)?,
            &config.director_password,
            &config.director_ca_cert,
        ))
    }

    async fn create_env(
        &self,
        workdir: &Path,
        config: &ConfigView,
        out: &InfraOutputs,
        db_ca_cert: &str,
    ) -> Result<()> {
        let deps = self.manifests.load_dependencies().await?;
        let vars = AwsDirectorVars::build(config, out, &deps, db_ca_cert)?;

        let manifest = self.manifests.director_manifest();
        let ops_files = self.manifests.director_ops(Iaas::Aws);
        let vars_file = write_vars(workdir, "director-vars.yml", &vars).await?;
        check_bound(&manifest, &ops_files, &vars, &[]).await?;

        self.cli
            .create_env(&CreateEnvFiles {
                manifest,
                ops_files,
                vars_file,
                state: workdir.join(STATE_FILE),
                vars_store: workdir.join(CREDS_FILE),
            })
            .await?;
        Ok(())
    }

    async fn update_cloud_config(
        &self,
        workdir: &Path,
        auth: &DirectorAuth,
        config: &ConfigView,
        out: &InfraOutputs,
    ) -> Result<()> {
        let template = manifest::read(&self.manifests.cloud_config(Iaas::Aws)).await?;
        let rendered = AwsCloudConfigParams::build(config, out)?.render(&template)?;

        let path = workdir.join("cloud-config.yml");
        tokio::fs::write(&path, rendered).await?;
        self.cli.update_cloud_config(auth, &path).await?;
        Ok(())
    }

    async fn deploy_concourse(
        &self,
        workdir: &Path,
        auth: &DirectorAuth,
        config: &ConfigView,
        out: &InfraOutputs,
        db_ca_cert: &str,
        detach: bool,
    ) -> Result<()> {
        let plan = ConcoursePlan::build(config, out, db_ca_cert)?;

        let manifest = self.manifests.concourse_manifest();
        let mut ops_files = vec![
            self.manifests.concourse_versions(Iaas::Aws),
            self.manifests.concourse_shas(Iaas::Aws),
        ];
        ops_files.extend(plan.ops_files.iter().map(|name| self.manifests.concourse_ops(name)));

        let grafana = self.manifests.grafana_dashboard();
        let vars_file = write_vars(workdir, "concourse-vars.yml", &plan.vars).await?;
        check_bound(&manifest, &ops_files, &plan.vars, std::slice::from_ref(&grafana)).await?;

        let files = DeployFiles {
            manifest,
            vars_store: workdir.join(CREDS_FILE),
            ops_files,
            vars_files: vec![grafana, vars_file],
        };
        self.cli.deploy(auth, &files, detach).await
    }

    async fn run_deploy(
        &self,
        workdir: &Path,
        config: &ConfigView,
        out: &InfraOutputs,
        detach: bool,
    ) -> Result<()> {
        match config.iaas {
            Some(Iaas::Aws) => {}
            other => {
                let name = other.map(|i| i.to_string()).unwrap_or_default();
                return Err(DirectorError::UnsupportedIaas(name).into());
            }
        }

        let db_ca_cert = manifest::read(&self.manifests.db_ca_cert(Iaas::Aws)).await?;

        self.create_env(workdir, config, out, &db_ca_cert).await?;

        let auth = Self::auth(config, out)?;
        self.update_cloud_config(workdir, &auth, config, out).await?;

        let stemcell = self.manifests.stemcell_url(Iaas::Aws).await?;
        self.cli.upload_stemcell(&auth, &stemcell).await?;

        self.deploy_concourse(workdir, &auth, config, out, &db_ca_cert, detach)
            .await
    }
}

async fn write_vars<T: Serialize>(dir: &Path, name: &str, vars: &T) -> Result<PathBuf> {
    let path = dir.join(name);
    tokio::fs::write(&path, serde_yaml::to_string(vars)?).await?;
    Ok(path)
}

/// Check a manifest and its ops files only use variables that are provided
/// or that the director generates
async fn check_bound<T: Serialize>(
    manifest: &Path,
    ops_files: &[PathBuf],
    vars: &T,
    extra_vars_files: &[PathBuf],
) -> Result<()> {
    let mut sources = vec![manifest::read(manifest).await?];
    for ops in ops_files {
        sources.push(manifest::read(ops).await?);
    }

    let mut provided = manifest::provided_keys(&serde_yaml::to_value(vars)?);
    for file in extra_vars_files {
        let doc: serde_yaml::Value = serde_yaml::from_str(&manifest::read(file).await?)?;
        provided.extend(manifest::provided_keys(&doc));
    }

    manifest::check_bound(&manifest.display().to_string(), &sources, &provided)?;
    Ok(())
}

/// Seed a blob into the working directory; empty blobs are left for bosh
/// to create
async fn seed(path: &Path, contents: &[u8]) -> Result<()> {
    if !contents.is_empty() {
        tokio::fs::write(path, contents).await?;
    }
    Ok(())
}

/// Read back a blob bosh may have rewritten, keeping `previous` when the
/// file was never created or cannot be read
async fn read_back(path: &Path, previous: Vec<u8>) -> (Vec<u8>, Option<TowerError>) {
    match tokio::fs::read(path).await {
        Ok(contents) => (contents, None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (previous, None),
        Err(e) => {
            tracing::warn!("Could not read back {}: {}", path.display(), e);
            (previous, Some(TowerError::Io(e)))
        }
    }
}

#[async_trait]
impl DirectorClient for BoshDirector {
    async fn deploy(
        &self,
        config: &ConfigView,
        outputs: &InfraOutputs,
        state: Vec<u8>,
        creds: Vec<u8>,
        detach: bool,
    ) -> DirectorDeployment {
        let workdir = match tempfile::Builder::new().prefix("tower-bosh-").tempdir() {
            Ok(dir) => dir,
            Err(e) => return DirectorDeployment::failed(state, creds, e.into()),
        };
        let state_path = workdir.path().join(STATE_FILE);
        let creds_path = workdir.path().join(CREDS_FILE);

        let mut outcome = match seed(&state_path, &state).await {
            Ok(()) => seed(&creds_path, &creds).await,
            Err(e) => Err(e),
        };
        if outcome.is_ok() {
            outcome = self.run_deploy(workdir.path(), config, outputs, detach).await;
        }

        let (state, state_err) = read_back(&state_path, state).await;
        let (creds, creds_err) = read_back(&creds_path, creds).await;
        if let Some(e) = state_err.or(creds_err) {
            outcome = outcome.and(Err(e));
        }

        DirectorDeployment {
            state,
            creds,
            outcome,
        }
    }

    async fn instances(&self, config: &ConfigView, outputs: &InfraOutputs) -> Result<Vec<Instance>> {
        let auth = Self::auth(config, outputs)?;
        Ok(self.cli.instances(&auth).await?)
    }

    async fn locks(&self, config: &ConfigView, outputs: &InfraOutputs) -> Result<Vec<u8>> {
        let auth = Self::auth(config, outputs)?;
        Ok(self.cli.locks(&auth).await?)
    }

    async fn recreate(&self, config: &ConfigView, outputs: &InfraOutputs) -> Result<()> {
        let auth = Self::auth(config, outputs)?;
        Ok(self.cli.recreate(&auth).await?)
    }
}

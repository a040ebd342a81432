//! terraform CLI wrapper

use crate::error::{Result, TerraformError};
use crate::module;
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use towerflow_core::store::TERRAFORM_STATE_FILE;
use towerflow_core::{InfraOutputs, Provisioner, TerraformInputs};

/// Where terraform keeps its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateBackend {
    /// The deployment's config bucket
    S3,
    /// A local directory, one state file per config bucket
    Local(PathBuf),
}

/// terraform CLI wrapper
pub struct TerraformCli {
    binary: PathBuf,
    module_dir: PathBuf,
    backend: StateBackend,
}

impl TerraformCli {
    pub fn new(binary: impl Into<PathBuf>, module_dir: impl Into<PathBuf>, backend: StateBackend) -> Self {
        Self {
            binary: binary.into(),
            module_dir: module_dir.into(),
            backend,
        }
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    /// Run a terraform command against the module and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let chdir = format!("-chdir={}", self.module_dir.display());
        let mut cmd = Command::new(&self.binary);
        cmd.arg(&chdir);
        cmd.args(args);
        cmd.env("TF_IN_AUTOMATION", "1");
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} {} {}", self.binary.display(), chdir, args.join(" "));

        let output = cmd.output().await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => TerraformError::BinaryNotFound(self.binary.display().to_string()),
            _ => TerraformError::IoError(e),
        })?;

        if !output.status.success() {
            return Err(TerraformError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// `-backend-config` flags for `init`
    pub fn backend_args(&self, inputs: &TerraformInputs) -> Vec<String> {
        match &self.backend {
            StateBackend::S3 => vec![
                format!("-backend-config=bucket={}", inputs.config_bucket()),
                format!("-backend-config=key={}", TERRAFORM_STATE_FILE),
                format!("-backend-config=region={}", inputs.region()),
            ],
            StateBackend::Local(dir) => vec![format!(
                "-backend-config=path={}",
                dir.join(inputs.config_bucket())
                    .join(TERRAFORM_STATE_FILE)
                    .display()
            )],
        }
    }

    async fn init(&self, inputs: &TerraformInputs) -> Result<()> {
        if let StateBackend::Local(dir) = &self.backend {
            tokio::fs::create_dir_all(dir.join(inputs.config_bucket())).await?;
        }

        let backend = self.backend_args(inputs);
        let mut args = vec!["init", "-input=false", "-reconfigure"];
        args.extend(backend.iter().map(String::as_str));
        self.run_command(&args).await?;
        Ok(())
    }

    /// Check the inputs against the module, then write them to a var file
    /// that lives as long as the returned handle
    async fn prepare(&self, inputs: &TerraformInputs) -> towerflow_core::Result<tempfile::NamedTempFile> {
        let required = module::module_required_variables(&self.module_dir).await?;
        inputs.validate_against(&required)?;

        let vars = inputs.to_vars()?;
        let mut file = tempfile::Builder::new()
            .prefix("tower-vars-")
            .suffix(".tfvars.json")
            .tempfile()?;
        file.write_all(&serde_json::to_vec_pretty(&vars)?)?;
        file.flush()?;

        self.init(inputs).await?;
        Ok(file)
    }

    fn var_file_arg(file: &tempfile::NamedTempFile) -> String {
        format!("-var-file={}", file.path().display())
    }
}

#[async_trait]
impl Provisioner for TerraformCli {
    async fn apply(&self, inputs: &TerraformInputs) -> towerflow_core::Result<()> {
        let vars = self.prepare(inputs).await?;
        tracing::info!("Applying terraform module {}", self.module_dir.display());
        self.run_command(&["apply", "-auto-approve", "-input=false", &Self::var_file_arg(&vars)])
            .await?;
        Ok(())
    }

    async fn destroy(&self, inputs: &TerraformInputs) -> towerflow_core::Result<()> {
        let vars = self.prepare(inputs).await?;
        tracing::info!("Destroying terraform module {}", self.module_dir.display());
        self.run_command(&["destroy", "-auto-approve", "-input=false", &Self::var_file_arg(&vars)])
            .await?;
        Ok(())
    }

    async fn build_output(&self, inputs: &TerraformInputs) -> towerflow_core::Result<InfraOutputs> {
        self.init(inputs).await?;
        let output = self.run_command(&["output", "-json"]).await?;
        InfraOutputs::from_json(output.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use towerflow_core::AwsInputVars;

    fn inputs() -> TerraformInputs {
        TerraformInputs::Aws(AwsInputVars {
            config_bucket: "control-tower-ci-eu-west-1-config".to_string(),
            region: "eu-west-1".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_s3_backend_args() {
        let cli = TerraformCli::new("terraform", "/tf", StateBackend::S3);
        assert_eq!(
            cli.backend_args(&inputs()),
            vec![
                "-backend-config=bucket=control-tower-ci-eu-west-1-config",
                "-backend-config=key=terraform.tfstate",
                "-backend-config=region=eu-west-1",
            ]
        );
    }

    #[test]
    fn test_local_backend_args() {
        let cli = TerraformCli::new("terraform", "/tf", StateBackend::Local("/state".into()));
        assert_eq!(
            cli.backend_args(&inputs()),
            vec!["-backend-config=path=/state/control-tower-ci-eu-west-1-config/terraform.tfstate"]
        );
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let cli = TerraformCli::new("/nonexistent/terraform", "/tf", StateBackend::S3);
        let err = cli.run_command(&["version"]).await.unwrap_err();
        assert!(matches!(err, TerraformError::BinaryNotFound(_)));
    }
}

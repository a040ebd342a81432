//! bosh CLI wrapper

use crate::error::{DirectorError, Result};
use crate::vars::CONCOURSE_DEPLOYMENT;
use serde::Deserialize;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use towerflow_core::{Instance, Terminal, detach};

/// Credentials for commands run against a live director
#[derive(Debug, Clone)]
pub struct DirectorAuth {
    pub environment: String,
    pub client_secret: String,
    pub ca_cert: String,
}

impl DirectorAuth {
    pub fn new(ip: &str, client_secret: &str, ca_cert: &str) -> Self {
        Self {
            environment: format!("https://{}", ip),
            client_secret: client_secret.to_string(),
            ca_cert: ca_cert.to_string(),
        }
    }

    /// Authenticate through the environment so secrets stay out of argv
    fn apply(&self, cmd: &mut Command) {
        cmd.env("BOSH_ENVIRONMENT", &self.environment);
        cmd.env("BOSH_CLIENT", "admin");
        cmd.env("BOSH_CLIENT_SECRET", &self.client_secret);
        cmd.env("BOSH_CA_CERT", &self.ca_cert);
    }
}

/// Files handed to `bosh create-env`
#[derive(Debug, Clone)]
pub struct CreateEnvFiles {
    pub manifest: PathBuf,
    pub ops_files: Vec<PathBuf>,
    pub vars_file: PathBuf,
    pub state: PathBuf,
    pub vars_store: PathBuf,
}

/// Files handed to `bosh deploy`
#[derive(Debug, Clone)]
pub struct DeployFiles {
    pub manifest: PathBuf,
    pub vars_store: PathBuf,
    pub ops_files: Vec<PathBuf>,
    pub vars_files: Vec<PathBuf>,
}

#[derive(Deserialize)]
struct TableOutput {
    #[serde(rename = "Tables", default)]
    tables: Vec<Table>,
}

#[derive(Deserialize)]
struct Table {
    #[serde(rename = "Rows", default)]
    rows: Vec<InstanceRow>,
}

#[derive(Deserialize)]
struct InstanceRow {
    #[serde(default)]
    instance: String,
    #[serde(default)]
    ips: String,
    #[serde(default)]
    process_state: String,
}

/// Parse the table printed by `bosh instances --json`
pub fn parse_instances(json: &str) -> Result<Vec<Instance>> {
    let output: TableOutput = serde_json::from_str(json)?;
    Ok(output
        .tables
        .into_iter()
        .flat_map(|table| table.rows)
        .map(|row| Instance {
            name: row.instance,
            ip: row.ips,
            state: row.process_state,
        })
        .collect())
}

/// bosh CLI wrapper
pub struct BoshCli {
    binary: PathBuf,
    terminal: Terminal,
}

impl BoshCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            terminal: Terminal::stdio(),
        }
    }

    /// Send detached deploy output to `terminal` instead of stdout
    pub fn with_terminal(mut self, terminal: Terminal) -> Self {
        self.terminal = terminal;
        self
    }

    fn command(&self, auth: Option<&DirectorAuth>, args: &[OsString]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--non-interactive");
        cmd.args(args);
        if let Some(auth) = auth {
            auth.apply(&mut cmd);
        }
        cmd
    }

    fn describe(&self, args: &[OsString]) -> String {
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy()).collect();
        format!("{} {}", self.binary.display(), args.join(" "))
    }

    fn map_spawn_error(&self, e: std::io::Error) -> DirectorError {
        match e.kind() {
            ErrorKind::NotFound => DirectorError::BinaryNotFound(self.binary.display().to_string()),
            _ => DirectorError::IoError(e),
        }
    }

    /// Run a command and capture its stdout
    async fn run_command(&self, auth: Option<&DirectorAuth>, args: &[OsString]) -> Result<String> {
        let mut cmd = self.command(auth, args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {}", self.describe(args));

        let output = cmd.output().await.map_err(|e| self.map_spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stderr = if stderr.is_empty() {
                // `--json` reports errors on stdout
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            };
            return Err(DirectorError::CommandFailed {
                command: subcommand(args),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a long command with its output passed through to the operator
    async fn run_streaming(&self, auth: Option<&DirectorAuth>, args: &[OsString]) -> Result<()> {
        let mut cmd = self.command(auth, args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        tracing::debug!("Running: {}", self.describe(args));

        let status = cmd.status().await.map_err(|e| self.map_spawn_error(e))?;
        if !status.success() {
            return Err(DirectorError::CommandFailed {
                command: subcommand(args),
                stderr: status.to_string(),
            });
        }
        Ok(())
    }

    /// Create or update the director VM
    pub async fn create_env(&self, files: &CreateEnvFiles) -> Result<()> {
        let mut args = vec![
            OsString::from("create-env"),
            flag_path("--state=", &files.state),
            flag_path("--vars-store=", &files.vars_store),
            flag_path("--vars-file=", &files.vars_file),
        ];
        for ops in &files.ops_files {
            args.push(flag_path("--ops-file=", ops));
        }
        args.push(files.manifest.clone().into_os_string());

        tracing::info!("Creating director from {}", files.manifest.display());
        self.run_streaming(None, &args).await
    }

    pub async fn update_cloud_config(&self, auth: &DirectorAuth, cloud_config: &Path) -> Result<()> {
        let args = [
            OsString::from("update-cloud-config"),
            cloud_config.as_os_str().to_owned(),
        ];
        self.run_streaming(Some(auth), &args).await
    }

    pub async fn upload_stemcell(&self, auth: &DirectorAuth, url: &str) -> Result<()> {
        let args = [OsString::from("upload-stemcell"), OsString::from(url)];
        tracing::info!("Uploading stemcell {}", url);
        self.run_streaming(Some(auth), &args).await
    }

    fn deploy_args(files: &DeployFiles) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("--deployment"),
            OsString::from(CONCOURSE_DEPLOYMENT),
            OsString::from("deploy"),
            files.manifest.clone().into_os_string(),
            OsString::from("--vars-store"),
            files.vars_store.clone().into_os_string(),
        ];
        for ops in &files.ops_files {
            args.push(OsString::from("--ops-file"));
            args.push(ops.clone().into_os_string());
        }
        for vars in &files.vars_files {
            args.push(OsString::from("--vars-file"));
            args.push(vars.clone().into_os_string());
        }
        args
    }

    /// Deploy the CI cluster. With `detach` this returns once the director
    /// has started the deploy task.
    pub async fn deploy(
        &self,
        auth: &DirectorAuth,
        files: &DeployFiles,
        detach: bool,
    ) -> towerflow_core::Result<()> {
        let args = Self::deploy_args(files);
        if detach {
            let cmd = self.command(Some(auth), &args);
            let mut out = self.terminal.output();
            return detach::run_detached(cmd, &self.describe(&args), &mut out).await;
        }
        Ok(self.run_streaming(Some(auth), &args).await?)
    }

    pub async fn instances(&self, auth: &DirectorAuth) -> Result<Vec<Instance>> {
        let args = [
            OsString::from("--deployment"),
            OsString::from(CONCOURSE_DEPLOYMENT),
            OsString::from("instances"),
            OsString::from("--json"),
        ];
        let output = self.run_command(Some(auth), &args).await?;
        parse_instances(&output)
    }

    pub async fn locks(&self, auth: &DirectorAuth) -> Result<Vec<u8>> {
        let args = [OsString::from("locks"), OsString::from("--json")];
        Ok(self.run_command(Some(auth), &args).await?.into_bytes())
    }

    pub async fn recreate(&self, auth: &DirectorAuth) -> Result<()> {
        let args = [
            OsString::from("--deployment"),
            OsString::from(CONCOURSE_DEPLOYMENT),
            OsString::from("recreate"),
        ];
        self.run_streaming(Some(auth), &args).await
    }
}

fn flag_path(flag: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(flag);
    arg.push(path.as_os_str());
    arg
}

/// First non-flag argument, used to name the failed command
fn subcommand(args: &[OsString]) -> String {
    let mut skip_value = false;
    for arg in args {
        let arg = arg.to_string_lossy();
        if skip_value {
            skip_value = false;
            continue;
        }
        if arg == "--deployment" {
            skip_value = true;
            continue;
        }
        if !arg.starts_with('-') {
            return arg.to_string();
        }
    }
    String::new()
}

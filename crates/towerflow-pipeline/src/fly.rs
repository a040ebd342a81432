//! fly CLI wrapper

use crate::error::{PipelineError, Result};
use crate::pipeline::{self, AwsCredentials, PIPELINE_NAME};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use towerflow_core::{ConfigView, PipelineClient, PipelineCredentials};

const LOGIN_ATTEMPTS: u32 = 50;
const LOGIN_INTERVAL: Duration = Duration::from_secs(4);

/// stderr of `fly login` while the web node is still starting
const UNREACHABLE: &str = "could not reach the Concourse server";

/// Where the fly binary comes from
#[derive(Debug, Clone)]
pub enum FlySource {
    /// An installed binary
    Path(PathBuf),
    /// Downloaded from the CI server on first use, matching its version
    Download,
}

/// `<api>/api/v1/cli` download URL for this platform
pub fn download_url(api: &str) -> Result<String> {
    let platform = match std::env::consts::OS {
        "linux" => "linux",
        "macos" => "darwin",
        other => return Err(PipelineError::UnsupportedPlatform(other.to_string())),
    };
    Ok(format!(
        "{}/api/v1/cli?arch=amd64&platform={}",
        api.trim_end_matches('/'),
        platform
    ))
}

/// Pipeline client driving the fly CLI
pub struct FlyClient {
    source: FlySource,
    aws: Option<AwsCredentials>,
    workdir: tempfile::TempDir,
    binary: OnceCell<PathBuf>,
    http: reqwest::Client,
    login_attempts: u32,
    login_interval: Duration,
}

impl FlyClient {
    pub fn new(source: FlySource, aws: Option<AwsCredentials>) -> Result<Self> {
        let workdir = tempfile::Builder::new().prefix("tower-fly-").tempdir()?;
        // The web node serves a self-signed certificate until one is provided
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            source,
            aws,
            workdir,
            binary: OnceCell::new(),
            http,
            login_attempts: LOGIN_ATTEMPTS,
            login_interval: LOGIN_INTERVAL,
        })
    }

    /// Override how long `set_default_pipeline` waits for the server
    pub fn with_login_retry(mut self, attempts: u32, interval: Duration) -> Self {
        self.login_attempts = attempts;
        self.login_interval = interval;
        self
    }

    async fn binary(&self, api: &str) -> Result<&Path> {
        let path = self
            .binary
            .get_or_try_init(|| async {
                match &self.source {
                    FlySource::Path(path) => Ok(path.clone()),
                    FlySource::Download => self.download(api).await,
                }
            })
            .await?;
        Ok(path.as_path())
    }

    async fn download(&self, api: &str) -> Result<PathBuf> {
        let url = download_url(api)?;
        tracing::info!("Downloading fly from {}", url);

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PipelineError::DownloadStatus {
                url,
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await?;

        let path = self.workdir.path().join("fly");
        tokio::fs::write(&path, &bytes).await?;
        make_executable(&path).await?;
        Ok(path)
    }

    fn command(&self, binary: &Path, target: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(binary);
        cmd.arg("--target").arg(target);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Run a fly command against `target` and return stdout
    async fn run_command(&self, creds: &PipelineCredentials, args: &[&str]) -> Result<String> {
        let binary = self.binary(&creds.api).await?;
        let mut cmd = self.command(binary, &creds.target, args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(
            "Running: {} --target {} {}",
            binary.display(),
            creds.target,
            redact(args).join(" ")
        );

        let output = cmd.output().await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => PipelineError::BinaryNotFound(binary.display().to_string()),
            _ => PipelineError::IoError(e),
        })?;

        if !output.status.success() {
            return Err(PipelineError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// One login attempt. `Ok(false)` means the server is not up yet.
    async fn try_login(&self, creds: &PipelineCredentials) -> Result<bool> {
        let args: [&str; 8] = [
            "login",
            "--insecure",
            "--concourse-url",
            &creds.api,
            "--username",
            &creds.username,
            "--password",
            &creds.password,
        ];
        match self.run_command(creds, &args).await {
            Ok(_) => Ok(true),
            Err(PipelineError::CommandFailed { stderr, .. }) if stderr.contains(UNREACHABLE) => {
                Ok(false)
            }
            Err(PipelineError::HttpError(e)) if e.is_connect() || e.is_timeout() => {
                tracing::debug!("CI server not reachable for download: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Poll until the server accepts a login
    async fn login(&self, creds: &PipelineCredentials) -> Result<()> {
        tracing::info!("Waiting for Concourse ATC to start...");

        for attempt in 1..=self.login_attempts {
            if self.try_login(creds).await? {
                return Ok(());
            }
            if attempt < self.login_attempts {
                tokio::time::sleep(self.login_interval).await;
            }
        }

        Err(PipelineError::LoginTimeout {
            api: creds.api.clone(),
            seconds: self.login_interval.as_secs() * u64::from(self.login_attempts),
        })
    }

    async fn set_pipeline(&self, config: &ConfigView, creds: &PipelineCredentials) -> Result<()> {
        let rendered = pipeline::render(config, self.aws.as_ref())?;
        let path = self.workdir.path().join("default-pipeline.yml");
        tokio::fs::write(&path, rendered).await?;

        let path_arg = path.display().to_string();
        let result = self
            .run_command(
                creds,
                &[
                    "set-pipeline",
                    "--pipeline",
                    PIPELINE_NAME,
                    "--config",
                    &path_arg,
                    "--non-interactive",
                ],
            )
            .await;
        tokio::fs::remove_file(&path).await?;
        result?;

        self.run_command(creds, &["pause-job", "--job", &pipeline::job_path()])
            .await?;
        self.run_command(creds, &["unpause-pipeline", "--pipeline", PIPELINE_NAME])
            .await?;
        Ok(())
    }
}

/// Hide the value following `--password` in logged arguments
fn redact<'a>(args: &[&'a str]) -> Vec<&'a str> {
    let mut redacted = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        if hide_next {
            redacted.push("<redacted>");
            hide_next = false;
        } else {
            redacted.push(*arg);
            hide_next = *arg == "--password";
        }
    }
    redacted
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl PipelineClient for FlyClient {
    async fn can_connect(&self, credentials: &PipelineCredentials) -> towerflow_core::Result<bool> {
        Ok(self.try_login(credentials).await?)
    }

    async fn set_default_pipeline(
        &self,
        config: &ConfigView,
        credentials: &PipelineCredentials,
        allow_skew: bool,
    ) -> towerflow_core::Result<()> {
        self.login(credentials).await?;

        if allow_skew {
            self.run_command(credentials, &["sync"]).await?;
            self.login(credentials).await?;
        }

        self.set_pipeline(config, credentials).await?;
        tracing::info!("Set pipeline {}", PIPELINE_NAME);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url() {
        let url = download_url("https://ci.example.com/").unwrap();
        assert!(url.starts_with("https://ci.example.com/api/v1/cli?arch=amd64&platform="));
    }

    #[test]
    fn test_redact_password() {
        let args = ["login", "--username", "admin", "--password", "hunter2"];
        assert_eq!(
            redact(&args),
            vec!["login", "--username", "admin", "--password", "<redacted>"]
        );
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let client = FlyClient::new(FlySource::Path("/nonexistent/fly".into()), None).unwrap();
        let creds = PipelineCredentials {
            target: "t".into(),
            api: "https://ci.example.com".into(),
            username: "admin".into(),
            password: "pw".into(),
        };
        let err = client.run_command(&creds, &["status"]).await.unwrap_err();
        assert!(matches!(err, PipelineError::BinaryNotFound(_)));
    }
}

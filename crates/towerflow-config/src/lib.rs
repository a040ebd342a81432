pub mod error;

pub use error::*;

use std::path::PathBuf;
use std::str::FromStr;

pub const ENV_TERRAFORM_PATH: &str = "TOWER_TERRAFORM_PATH";
pub const ENV_BOSH_PATH: &str = "TOWER_BOSH_PATH";
pub const ENV_FLY_PATH: &str = "TOWER_FLY_PATH";
pub const ENV_AWS_PATH: &str = "TOWER_AWS_PATH";
pub const ENV_TERRAFORM_DIR: &str = "TOWER_TERRAFORM_DIR";
pub const ENV_MANIFEST_DIR: &str = "TOWER_MANIFEST_DIR";
pub const ENV_STATE_BACKEND: &str = "TOWER_STATE_BACKEND";
pub const ENV_LOCAL_STATE_DIR: &str = "TOWER_LOCAL_STATE_DIR";

/// TowerFlowの設定ディレクトリを取得 (`~/.config/towerflow`)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("towerflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Where the deployment config and assets are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateBackend {
    /// The IAAS object store (S3 on AWS)
    S3,
    /// Directories below [`Settings::local_state_dir`]
    Local,
}

impl FromStr for StateBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(StateBackend::S3),
            "local" => Ok(StateBackend::Local),
            other => Err(ConfigError::InvalidBackend(other.to_string())),
        }
    }
}

/// Paths of the external tools and template directories
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_dir: PathBuf,
    pub terraform_path: PathBuf,
    pub bosh_path: PathBuf,
    /// When unset the fly CLI is downloaded from the running CI server
    pub fly_path: Option<PathBuf>,
    pub aws_path: PathBuf,
    terraform_dir: Option<PathBuf>,
    pub manifest_dir: PathBuf,
    pub state_backend: StateBackend,
    pub local_state_dir: PathBuf,
}

impl Settings {
    /// Resolve settings from `TOWER_*` environment variables
    ///
    /// 優先順位:
    /// 1. 環境変数 (TOWER_TERRAFORM_PATH など)
    /// 2. PATH 上のコマンド名 / ~/.config/towerflow 以下のデフォルト
    pub fn from_env() -> Result<Self> {
        let config_dir = get_config_dir()?;
        Self::from_env_with_config_dir(config_dir)
    }

    pub fn from_env_with_config_dir(config_dir: PathBuf) -> Result<Self> {
        let state_backend = match std::env::var(ENV_STATE_BACKEND) {
            Ok(value) => value.parse()?,
            Err(_) => StateBackend::S3,
        };

        let settings = Self {
            terraform_path: env_path(ENV_TERRAFORM_PATH).unwrap_or_else(|| "terraform".into()),
            bosh_path: env_path(ENV_BOSH_PATH).unwrap_or_else(|| "bosh".into()),
            fly_path: env_path(ENV_FLY_PATH),
            aws_path: env_path(ENV_AWS_PATH).unwrap_or_else(|| "aws".into()),
            terraform_dir: env_path(ENV_TERRAFORM_DIR),
            manifest_dir: env_path(ENV_MANIFEST_DIR)
                .unwrap_or_else(|| config_dir.join("manifests")),
            state_backend,
            local_state_dir: env_path(ENV_LOCAL_STATE_DIR)
                .unwrap_or_else(|| config_dir.join("state")),
            config_dir,
        };

        tracing::debug!(?settings, "Resolved tool settings");
        Ok(settings)
    }

    /// Terraform module directory for the given IAAS (`aws`, `gcp`)
    pub fn terraform_module_dir(&self, iaas: &str) -> PathBuf {
        match &self.terraform_dir {
            Some(dir) => dir.clone(),
            None => self.config_dir.join("terraform").join(iaas),
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: &[&str] = &[
        ENV_TERRAFORM_PATH,
        ENV_BOSH_PATH,
        ENV_FLY_PATH,
        ENV_AWS_PATH,
        ENV_TERRAFORM_DIR,
        ENV_MANIFEST_DIR,
        ENV_STATE_BACKEND,
        ENV_LOCAL_STATE_DIR,
    ];

    fn cleared() -> Vec<(&'static str, Option<&'static str>)> {
        ALL_VARS.iter().map(|k| (*k, None)).collect()
    }

    #[test]
    #[serial]
    fn test_get_config_dir_created_under_xdg() {
        let temp_dir = tempfile::tempdir().unwrap();
        temp_env::with_var("XDG_CONFIG_HOME", Some(temp_dir.path()), || {
            let dir = get_config_dir().unwrap();
            assert!(dir.ends_with("towerflow"));
            assert!(dir.exists());
        });
    }

    #[test]
    #[serial]
    fn test_defaults() {
        temp_env::with_vars(cleared(), || {
            let settings = Settings::from_env_with_config_dir("/cfg".into()).unwrap();
            assert_eq!(settings.terraform_path, PathBuf::from("terraform"));
            assert_eq!(settings.bosh_path, PathBuf::from("bosh"));
            assert_eq!(settings.aws_path, PathBuf::from("aws"));
            assert!(settings.fly_path.is_none());
            assert_eq!(settings.state_backend, StateBackend::S3);
            assert_eq!(settings.manifest_dir, PathBuf::from("/cfg/manifests"));
            assert_eq!(settings.local_state_dir, PathBuf::from("/cfg/state"));
            assert_eq!(
                settings.terraform_module_dir("aws"),
                PathBuf::from("/cfg/terraform/aws")
            );
        });
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        let mut vars = cleared();
        vars.push((ENV_BOSH_PATH, Some("/opt/bin/bosh")));
        vars.push((ENV_FLY_PATH, Some("/opt/bin/fly")));
        vars.push((ENV_TERRAFORM_DIR, Some("/srv/tf")));
        vars.push((ENV_STATE_BACKEND, Some("LOCAL")));

        temp_env::with_vars(vars, || {
            let settings = Settings::from_env_with_config_dir("/cfg".into()).unwrap();
            assert_eq!(settings.bosh_path, PathBuf::from("/opt/bin/bosh"));
            assert_eq!(settings.fly_path, Some(PathBuf::from("/opt/bin/fly")));
            assert_eq!(settings.terraform_module_dir("gcp"), PathBuf::from("/srv/tf"));
            assert_eq!(settings.state_backend, StateBackend::Local);
        });
    }

    #[test]
    #[serial]
    fn test_empty_value_falls_back_to_default() {
        let mut vars = cleared();
        vars.push((ENV_TERRAFORM_PATH, Some("  ")));

        temp_env::with_vars(vars, || {
            let settings = Settings::from_env_with_config_dir("/cfg".into()).unwrap();
            assert_eq!(settings.terraform_path, PathBuf::from("terraform"));
        });
    }

    #[test]
    #[serial]
    fn test_invalid_backend() {
        let mut vars = cleared();
        vars.push((ENV_STATE_BACKEND, Some("gcs")));

        temp_env::with_vars(vars, || {
            let result = Settings::from_env_with_config_dir("/cfg".into());
            assert!(matches!(result, Err(ConfigError::InvalidBackend(ref b)) if b == "gcs"));
        });
    }
}

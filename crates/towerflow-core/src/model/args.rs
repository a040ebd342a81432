//! Arguments of a `deploy` invocation
//!
//! Every optional flag is an `Option`: `None` means the operator did not
//! pass it, so the stored value is kept.

use crate::error::{Result, TowerError};
use crate::network;
use towerflow_cloud::Iaas;
use towerflow_cloud::iaas::DB_SIZES;

pub const WORKER_SIZES: &[&str] = &[
    "medium", "large", "xlarge", "2xlarge", "4xlarge", "12xlarge", "24xlarge",
];
pub const WEB_SIZES: &[&str] = &["small", "medium", "large", "xlarge", "2xlarge"];
pub const WORKER_TYPES: &[&str] = &["m4", "m5", "m5a"];

pub const DEFAULT_ALLOW_IPS: &str = "0.0.0.0/0";

/// Client credentials of a third-party auth provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct DeployArgs {
    pub iaas: Option<Iaas>,
    pub allow_ips: String,
    pub domain: Option<String>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub zone: Option<String>,

    pub worker_count: Option<u32>,
    pub worker_size: Option<String>,
    pub worker_type: Option<String>,
    pub web_size: Option<String>,
    pub db_size: Option<String>,
    pub spot: Option<bool>,
    pub no_metrics: Option<bool>,
    pub influx_db_retention: Option<String>,
    pub enable_global_resources: Option<bool>,
    pub enable_pipeline_instances: Option<bool>,
    pub tags: Option<Vec<String>>,

    pub github_client_id: Option<String>,
    pub github_client_secret: Option<String>,
    pub github_host: Option<String>,
    pub github_ca_cert: Option<String>,
    pub main_github_users: Option<String>,
    pub main_github_teams: Option<String>,
    pub main_github_orgs: Option<String>,
    pub microsoft_client_id: Option<String>,
    pub microsoft_client_secret: Option<String>,
    pub microsoft_tenant: Option<String>,
    pub bitbucket_client_id: Option<String>,
    pub bitbucket_client_secret: Option<String>,

    pub network_cidr: Option<String>,
    pub public_cidr: Option<String>,
    pub private_cidr: Option<String>,
    pub rds1_cidr: Option<String>,
    pub rds2_cidr: Option<String>,
}

impl Default for DeployArgs {
    fn default() -> Self {
        Self {
            iaas: Some(Iaas::Aws),
            allow_ips: DEFAULT_ALLOW_IPS.to_string(),
            domain: None,
            tls_cert: None,
            tls_key: None,
            zone: None,
            worker_count: None,
            worker_size: None,
            worker_type: None,
            web_size: None,
            db_size: None,
            spot: None,
            no_metrics: None,
            influx_db_retention: None,
            enable_global_resources: None,
            enable_pipeline_instances: None,
            tags: None,
            github_client_id: None,
            github_client_secret: None,
            github_host: None,
            github_ca_cert: None,
            main_github_users: None,
            main_github_teams: None,
            main_github_orgs: None,
            microsoft_client_id: None,
            microsoft_client_secret: None,
            microsoft_tenant: None,
            bitbucket_client_id: None,
            bitbucket_client_secret: None,
            network_cidr: None,
            public_cidr: None,
            private_cidr: None,
            rds1_cidr: None,
            rds2_cidr: None,
        }
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

fn pair(id: &Option<String>, secret: &Option<String>) -> Option<AuthCredentials> {
    match (id, secret) {
        (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some(AuthCredentials {
            client_id: id.clone(),
            client_secret: secret.clone(),
        }),
        _ => None,
    }
}

impl DeployArgs {
    pub fn github_auth(&self) -> Option<AuthCredentials> {
        pair(&self.github_client_id, &self.github_client_secret)
    }

    pub fn microsoft_auth(&self) -> Option<AuthCredentials> {
        pair(&self.microsoft_client_id, &self.microsoft_client_secret)
    }

    pub fn bitbucket_auth(&self) -> Option<AuthCredentials> {
        pair(&self.bitbucket_client_id, &self.bitbucket_client_secret)
    }

    /// Whether any main-team restriction flag was given
    pub fn main_github_auth_is_set(&self) -> bool {
        is_set(&self.main_github_users)
            || is_set(&self.main_github_teams)
            || is_set(&self.main_github_orgs)
    }

    pub fn cidr_flags_set(&self) -> bool {
        [
            &self.network_cidr,
            &self.public_cidr,
            &self.private_cidr,
            &self.rds1_cidr,
            &self.rds2_cidr,
        ]
        .into_iter()
        .any(is_set)
    }

    /// Check the arguments for contradictions before anything is touched
    pub fn validate(&self) -> Result<()> {
        let iaas = self
            .iaas
            .ok_or_else(|| TowerError::validation("--iaas flag not set"))?;

        self.validate_certs()?;
        self.validate_sizes(iaas)?;

        check_auth_pair("github", &self.github_client_id, &self.github_client_secret)?;
        check_auth_pair(
            "microsoft",
            &self.microsoft_client_id,
            &self.microsoft_client_secret,
        )?;
        check_auth_pair(
            "bitbucket",
            &self.bitbucket_client_id,
            &self.bitbucket_client_secret,
        )?;

        if let Some(tags) = &self.tags {
            for tag in tags {
                let valid = tag
                    .split_once('=')
                    .is_some_and(|(key, _)| !key.is_empty() && !key.contains(char::is_whitespace));
                if !valid {
                    return Err(TowerError::validation(format!(
                        "`{}` is not in the format `key=value`",
                        tag
                    )));
                }
            }
        }

        self.validate_cidrs(iaas)?;

        if self.no_metrics.is_some() && self.influx_db_retention.is_some() {
            return Err(TowerError::validation(
                "no-metrics is invalid when used with influxdb-retention-period",
            ));
        }

        self.validate_main_team()?;
        network::AllowList::parse(&self.allow_ips)?;

        Ok(())
    }

    fn validate_certs(&self) -> Result<()> {
        match (is_set(&self.tls_cert), is_set(&self.tls_key)) {
            (true, false) => Err(TowerError::validation(
                "--tls-cert requires --tls-key to also be provided",
            )),
            (false, true) => Err(TowerError::validation(
                "--tls-key requires --tls-cert to also be provided",
            )),
            (true, true) if !is_set(&self.domain) => Err(TowerError::validation(
                "custom certificates require --domain to be provided",
            )),
            _ => Ok(()),
        }
    }

    fn validate_sizes(&self, iaas: Iaas) -> Result<()> {
        if self.worker_count == Some(0) {
            return Err(TowerError::validation("minimum number of workers is 1"));
        }

        if let Some(size) = &self.worker_size {
            if !WORKER_SIZES.contains(&size.as_str()) {
                return Err(TowerError::validation(format!(
                    "unknown worker size: `{}`. Valid sizes are: [{}]",
                    size,
                    WORKER_SIZES.join(" ")
                )));
            }
        }

        if let Some(size) = &self.web_size {
            if !WEB_SIZES.contains(&size.as_str()) {
                return Err(TowerError::validation(format!(
                    "unknown web node size: `{}`. Valid sizes are: [{}]",
                    size,
                    WEB_SIZES.join(" ")
                )));
            }
        }

        if let Some(size) = &self.db_size {
            if iaas.db_type(size).is_none() {
                return Err(TowerError::validation(format!(
                    "unknown DB size: `{}`. Valid sizes are: [{}]",
                    size,
                    DB_SIZES.join(" ")
                )));
            }
        }

        if let Some(worker_type) = &self.worker_type {
            if iaas != Iaas::Aws {
                return Err(TowerError::validation("worker-type is only defined on AWS"));
            }
            if !WORKER_TYPES.contains(&worker_type.as_str()) {
                return Err(TowerError::validation(format!(
                    "worker-type {} is invalid: must be one of m4, m5, or m5a",
                    worker_type
                )));
            }
        }

        Ok(())
    }

    fn validate_cidrs(&self, iaas: Iaas) -> Result<()> {
        if !self.cidr_flags_set() {
            return Ok(());
        }

        if is_set(&self.public_cidr) != is_set(&self.private_cidr) {
            return Err(TowerError::validation(
                "both --public-subnet-range and --private-subnet-range are required when either is provided",
            ));
        }

        let flags: Vec<(&str, &Option<String>)> = match iaas {
            Iaas::Aws => vec![
                ("--vpc-network-range", &self.network_cidr),
                ("--public-subnet-range", &self.public_cidr),
                ("--private-subnet-range", &self.private_cidr),
                ("--rds-subnet-range1", &self.rds1_cidr),
                ("--rds-subnet-range2", &self.rds2_cidr),
            ],
            Iaas::Gcp => vec![
                ("--public-subnet-range", &self.public_cidr),
                ("--private-subnet-range", &self.private_cidr),
            ],
        };

        for (flag, value) in flags {
            let Some(value) = value.as_deref().filter(|v| !v.is_empty()) else {
                return Err(TowerError::validation(format!(
                    "{} is required on {} when custom network ranges are provided",
                    flag, iaas
                )));
            };
            if network::parse_cidr(value).is_err() {
                return Err(TowerError::validation(format!(
                    "could not parse {} `{}` as a CIDR range",
                    flag, value
                )));
            }
        }

        Ok(())
    }

    fn validate_main_team(&self) -> Result<()> {
        if let Some(users) = self.main_github_users.as_deref().filter(|v| !v.is_empty()) {
            for user in split_list(users) {
                if !is_github_name(user) {
                    return Err(TowerError::validation(format!(
                        "Invalid user \"{}\" provided to --main-team-github-users",
                        user
                    )));
                }
            }
        }

        if let Some(orgs) = self.main_github_orgs.as_deref().filter(|v| !v.is_empty()) {
            for org in split_list(orgs) {
                if !is_github_name(org) {
                    return Err(TowerError::validation(format!(
                        "Invalid org \"{}\" provided to --main-team-github-orgs",
                        org
                    )));
                }
            }
        }

        if let Some(teams) = self.main_github_teams.as_deref().filter(|v| !v.is_empty()) {
            for entry in split_list(teams) {
                let Some((org, team)) = entry.split_once(':') else {
                    return Err(TowerError::validation(format!(
                        "Invalid team \"{}\" does not contain org",
                        entry
                    )));
                };
                if !is_github_name(org) {
                    return Err(TowerError::validation(format!(
                        "Invalid org \"{}\" provided for team \"{}\" in --main-team-github-teams",
                        org, team
                    )));
                }
                if !is_github_team(team) {
                    return Err(TowerError::validation(format!(
                        "Invalid team \"{}\" provided to --main-team-github-teams",
                        entry
                    )));
                }
            }
        }

        Ok(())
    }
}

fn check_auth_pair(provider: &str, id: &Option<String>, secret: &Option<String>) -> Result<()> {
    match (is_set(id), is_set(secret)) {
        (true, false) => Err(TowerError::validation(format!(
            "--{0}-auth-client-id requires --{0}-auth-client-secret to also be provided",
            provider
        ))),
        (false, true) => Err(TowerError::validation(format!(
            "--{0}-auth-client-secret requires --{0}-auth-client-id to also be provided",
            provider
        ))),
        _ => Ok(()),
    }
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim)
}

/// GitHub user and org names: alphanumerics and single inner hyphens
fn is_github_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--")
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_github_team(team: &str) -> bool {
    !team.is_empty()
        && team
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

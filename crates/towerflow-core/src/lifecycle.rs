//! Effective configuration for a deploy
//!
//! Merges the stored record, freshly generated defaults and the operator's
//! arguments. Network ranges and the availability zone are only ever taken
//! from arguments on the first deploy.

use crate::error::{Result, ResultExt, TowerError};
use crate::messages;
use crate::model::{Config, DeployArgs, VmProvisioningType};
use crate::network::{self, AllowList, NetworkLayout};
use crate::secrets::SecretGenerator;
use crate::store::ConfigStore;
use crate::terminal::Terminal;
use towerflow_cloud::{CloudProvider, Iaas};

pub const DEFAULT_PASSWORD_LENGTH: usize = 20;
pub const ENCRYPTION_KEY_LENGTH: usize = 32;
pub const DEFAULT_INFLUX_DB_RETENTION: &str = "28d";

/// The configuration a deploy runs with
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub config: Config,
    /// The public domain differs from the one the certificates were
    /// issued for
    pub domain_updated: bool,
}

pub struct ConfigLifecycle<'a> {
    pub store: &'a dyn ConfigStore,
    pub provider: &'a dyn CloudProvider,
    pub secrets: &'a dyn SecretGenerator,
    pub terminal: &'a Terminal,
}

impl ConfigLifecycle<'_> {
    pub async fn resolve(&self, args: &DeployArgs) -> Result<EffectiveConfig> {
        let prior_exists = self
            .store
            .config_exists()
            .await
            .context("error determining if config already exists")?;

        let defaults = self
            .defaults(self.store.new_config())
            .await
            .context("error generating default config")?;

        if prior_exists {
            let mut config = self
                .store
                .load()
                .await
                .context("error loading existing config")?;
            self.terminal.print(messages::CONFIG_LOADED)?;

            config
                .fill_missing_from(&defaults)
                .context("error layering stored config on top default config")?;

            assert_immutable_fields_not_changing(args, &config)?;

            let (config, domain_updated) = apply_arguments(config, args, self.provider.iaas())
                .context("error merging new options with existing config")?;

            Ok(EffectiveConfig {
                config,
                domain_updated,
            })
        } else {
            let (config, _) = apply_arguments(defaults, args, self.provider.iaas())
                .context("error applying arguments to default config")?;
            let config = apply_immutable_arguments(config, args, self.provider);

            self.store
                .update(&config)
                .await
                .context("error persisting new config after setting values")?;
            tracing::info!("Created config for deployment {}", config.deployment);

            Ok(EffectiveConfig {
                config,
                domain_updated: true,
            })
        }
    }

    /// `base` with every generated and default value filled in
    pub async fn defaults(&self, base: Config) -> Result<Config> {
        let keys = self
            .secrets
            .ssh_keypair()
            .await
            .context("error generating SSH keypair for new config")?;

        let iaas = self.provider.iaas();
        let pw = |len| self.secrets.password(len);
        let layout = NetworkLayout::default_for(iaas);

        let rds_default_database_name = match iaas {
            Iaas::Aws => format!("bosh_{}", self.secrets.eight_random_letters()),
            Iaas::Gcp => format!("bosh-{}", self.secrets.eight_random_letters()),
        };

        Ok(Config {
            availability_zone: String::new(),
            concourse_web_size: "small".to_string(),
            concourse_worker_count: 1,
            concourse_worker_size: "xlarge".to_string(),
            director_hm_user_password: pw(DEFAULT_PASSWORD_LENGTH),
            director_mbus_password: pw(DEFAULT_PASSWORD_LENGTH),
            director_nats_password: pw(DEFAULT_PASSWORD_LENGTH),
            director_password: pw(DEFAULT_PASSWORD_LENGTH),
            director_registry_password: pw(DEFAULT_PASSWORD_LENGTH),
            director_username: "admin".to_string(),
            encryption_key: pw(ENCRYPTION_KEY_LENGTH),
            iaas: Some(iaas),
            private_key: keys.private_key,
            public_key: keys.public_key,
            no_metrics: false,
            rds_instance_class: iaas.db_type("small").unwrap_or_default().to_string(),
            rds_password: pw(DEFAULT_PASSWORD_LENGTH),
            rds_username: format!("admin{}", pw(7)),
            rds_default_database_name,
            vm_provisioning_type: Some(VmProvisioningType::Spot),
            worker_type: "m4".to_string(),
            influx_db_retention: DEFAULT_INFLUX_DB_RETENTION.to_string(),
            network_cidr: layout.network.unwrap_or_default().to_string(),
            public_cidr: layout.public.to_string(),
            private_cidr: layout.private.to_string(),
            rds1_cidr: layout.rds1.unwrap_or_default().to_string(),
            rds2_cidr: layout.rds2.unwrap_or_default().to_string(),
            ..base
        })
    }
}

/// Reject arguments that would change a write-once field of an existing
/// deployment
pub fn assert_immutable_fields_not_changing(args: &DeployArgs, config: &Config) -> Result<()> {
    let ranges = [
        ("--vpc-network-range", &args.network_cidr, &config.network_cidr),
        ("--public-subnet-range", &args.public_cidr, &config.public_cidr),
        ("--private-subnet-range", &args.private_cidr, &config.private_cidr),
        ("--rds-subnet-range1", &args.rds1_cidr, &config.rds1_cidr),
        ("--rds-subnet-range2", &args.rds2_cidr, &config.rds2_cidr),
    ];

    for (flag, requested, stored) in ranges {
        let Some(requested) = requested.as_deref().filter(|v| !v.is_empty()) else {
            continue;
        };
        if !same_range(requested, stored) {
            return Err(TowerError::ImmutableField(format!(
                "custom CIDRs cannot be applied after initial deploy: {} is {} and cannot change to {}",
                flag, stored, requested
            )));
        }
    }

    if let Some(zone) = args.zone.as_deref().filter(|z| !z.is_empty()) {
        if zone != config.availability_zone {
            return Err(TowerError::ImmutableField(format!(
                "Existing deployment uses zone {} and cannot change to zone {}",
                config.availability_zone, zone
            )));
        }
    }

    Ok(())
}

fn same_range(requested: &str, stored: &str) -> bool {
    match (network::parse_cidr(requested), network::parse_cidr(stored)) {
        (Ok(a), Ok(b)) => a == b,
        _ => requested == stored,
    }
}

/// Apply the mutable arguments. Returns whether the domain changed.
pub fn apply_arguments(mut c: Config, args: &DeployArgs, iaas: Iaas) -> Result<(Config, bool)> {
    let allow = AllowList::parse(&args.allow_ips)
        .context("error determining IP addresses to allow access from")?;

    let github = args.github_auth();
    if args.main_github_auth_is_set() && github.is_none() && !c.is_github_auth_set() {
        return Err(TowerError::validation(
            "Main team github auth flags can only be used when github auth is also configured",
        ));
    }

    c.allow_ips = allow.to_string();
    c.allow_ips_unformatted = args.allow_ips.clone();

    if let Some(zone) = args.zone.as_deref().filter(|z| !z.is_empty()) {
        c.availability_zone = zone.to_string();
    }
    if let Some(count) = args.worker_count {
        c.concourse_worker_count = count;
    }
    if let Some(size) = &args.worker_size {
        c.concourse_worker_size = size.clone();
    }
    if let Some(size) = &args.web_size {
        c.concourse_web_size = size.clone();
    }
    if let Some(size) = &args.db_size {
        c.rds_instance_class = iaas
            .db_type(size)
            .ok_or_else(|| TowerError::validation(format!("unknown DB size: `{}`", size)))?
            .to_string();
    }
    if let Some(auth) = args.bitbucket_auth() {
        c.bitbucket_client_id = auth.client_id;
        c.bitbucket_client_secret = auth.client_secret;
    }
    if let Some(auth) = github {
        c.github_client_id = auth.client_id;
        c.github_client_secret = auth.client_secret;
        if let Some(host) = &args.github_host {
            c.github_host = host.clone();
        }
        if let Some(ca_cert) = &args.github_ca_cert {
            c.github_ca_cert = ca_cert.clone();
        }
    }
    if args.main_github_auth_is_set() {
        c.main_github_users = args.main_github_users.clone().unwrap_or_default();
        c.main_github_teams = args.main_github_teams.clone().unwrap_or_default();
        c.main_github_orgs = args.main_github_orgs.clone().unwrap_or_default();
    }
    if let Some(auth) = args.microsoft_auth() {
        c.microsoft_client_id = auth.client_id;
        c.microsoft_client_secret = auth.client_secret;
        c.microsoft_tenant = args.microsoft_tenant.clone().unwrap_or_default();
    }
    if let Some(no_metrics) = args.no_metrics {
        c.no_metrics = no_metrics;
    }
    if let Some(tags) = &args.tags {
        c.tags = tags.clone();
    }
    if let Some(spot) = args.spot {
        c.vm_provisioning_type = Some(VmProvisioningType::from_spot(spot));
    }
    if let Some(worker_type) = &args.worker_type {
        c.worker_type = worker_type.clone();
    }
    if let Some(enabled) = args.enable_global_resources {
        c.enable_global_resources = enabled;
    }
    if let Some(enabled) = args.enable_pipeline_instances {
        c.enable_pipeline_instances = enabled;
    }
    if let Some(retention) = &args.influx_db_retention {
        c.influx_db_retention = retention.clone();
    }

    let mut domain_updated = false;
    match args.domain.as_deref().filter(|d| !d.is_empty()) {
        Some(domain) => {
            domain_updated = c.domain != domain;
            c.domain = domain.to_string();
        }
        // An IP left over from a domain-less deploy is not a real domain
        None if network::is_ipv4(&c.domain) => c.domain.clear(),
        None => {}
    }

    Ok((c, domain_updated))
}

/// Fields that may only be set when the deployment is first created
pub fn apply_immutable_arguments(
    mut c: Config,
    args: &DeployArgs,
    provider: &dyn CloudProvider,
) -> Config {
    let set = |v: &Option<String>| v.as_deref().is_some_and(|v| !v.is_empty());
    let value = |v: &Option<String>| v.clone().unwrap_or_default();

    match provider.iaas() {
        Iaas::Aws if set(&args.network_cidr) && set(&args.public_cidr) && set(&args.private_cidr) => {
            c.network_cidr = value(&args.network_cidr);
            c.public_cidr = value(&args.public_cidr);
            c.private_cidr = value(&args.private_cidr);
            c.rds1_cidr = value(&args.rds1_cidr);
            c.rds2_cidr = value(&args.rds2_cidr);
        }
        Iaas::Gcp if set(&args.public_cidr) && set(&args.private_cidr) => {
            c.public_cidr = value(&args.public_cidr);
            c.private_cidr = value(&args.private_cidr);
        }
        _ => {}
    }

    c.availability_zone = provider.zone(args.zone.as_deref().filter(|z| !z.is_empty()));
    c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConfigStore, FakeProvider, FixedSecrets};

    fn lifecycle<'a>(
        store: &'a FakeConfigStore,
        provider: &'a FakeProvider,
        terminal: &'a Terminal,
    ) -> ConfigLifecycle<'a> {
        ConfigLifecycle {
            store,
            provider,
            secrets: &FixedSecrets,
            terminal,
        }
    }

    #[tokio::test]
    async fn test_first_deploy_defaults() {
        let store = FakeConfigStore::new();
        let provider = FakeProvider::aws();
        let (terminal, _) = Terminal::captured();

        let effective = lifecycle(&store, &provider, &terminal)
            .resolve(&DeployArgs::default())
            .await
            .unwrap();
        let c = &effective.config;

        assert!(effective.domain_updated);
        assert_eq!(c.director_password.len(), 20);
        assert_eq!(c.encryption_key.len(), 32);
        assert!(!c.private_key.is_empty());
        assert!(!c.public_key.is_empty());
        assert_eq!(c.rds_default_database_name, "bosh_abcdefgh");
        assert!(c.rds_username.starts_with("admin"));
        assert_eq!(c.rds_instance_class, "db.t3.small");
        assert_eq!(c.network_cidr, "10.0.0.0/16");
        assert_eq!(c.public_cidr, "10.0.0.0/24");
        assert_eq!(c.availability_zone, "eu-west-1a");
        assert_eq!(c.allow_ips, "\"0.0.0.0/0\"");
        assert!(c.is_spot());

        // persisted before anything else happens
        assert_eq!(store.saved().as_ref(), Some(c));
    }

    #[tokio::test]
    async fn test_gcp_database_name_pattern() {
        let store = FakeConfigStore::new();
        let provider = FakeProvider::gcp();
        let (terminal, _) = Terminal::captured();

        let args = DeployArgs {
            iaas: Some(Iaas::Gcp),
            ..Default::default()
        };
        let c = lifecycle(&store, &provider, &terminal)
            .resolve(&args)
            .await
            .unwrap()
            .config;

        assert_eq!(c.rds_default_database_name, "bosh-abcdefgh");
        assert!(c.network_cidr.is_empty());
        assert!(c.rds1_cidr.is_empty());
    }

    #[tokio::test]
    async fn test_custom_ranges_only_on_first_deploy() {
        let store = FakeConfigStore::new();
        let provider = FakeProvider::aws();
        let (terminal, _) = Terminal::captured();
        let args = DeployArgs {
            network_cidr: Some("192.168.0.0/16".into()),
            public_cidr: Some("192.168.0.0/24".into()),
            private_cidr: Some("192.168.1.0/24".into()),
            rds1_cidr: Some("192.168.4.0/24".into()),
            rds2_cidr: Some("192.168.5.0/24".into()),
            ..Default::default()
        };

        let first = lifecycle(&store, &provider, &terminal)
            .resolve(&args)
            .await
            .unwrap()
            .config;
        assert_eq!(first.public_cidr, "192.168.0.0/24");

        // same ranges again are fine
        lifecycle(&store, &provider, &terminal)
            .resolve(&args)
            .await
            .unwrap();

        let changed = DeployArgs {
            private_cidr: Some("192.168.2.0/24".into()),
            ..args
        };
        let err = lifecycle(&store, &provider, &terminal)
            .resolve(&changed)
            .await
            .unwrap_err();
        assert!(matches!(err, TowerError::ImmutableField(_)));
        assert_eq!(store.saved().unwrap().private_cidr, "192.168.1.0/24");
    }

    #[tokio::test]
    async fn test_existing_config_keeps_stored_values() {
        let store = FakeConfigStore::with_config(Config {
            project: "ci".into(),
            director_password: "stored-password".into(),
            concourse_worker_count: 4,
            availability_zone: "eu-west-1b".into(),
            domain: "52.1.2.3".into(),
            ..Default::default()
        });
        let provider = FakeProvider::aws();
        let (terminal, captured) = Terminal::captured();

        let effective = lifecycle(&store, &provider, &terminal)
            .resolve(&DeployArgs::default())
            .await
            .unwrap();

        let c = effective.config;
        assert!(!effective.domain_updated);
        assert_eq!(c.director_password, "stored-password");
        assert_eq!(c.concourse_worker_count, 4);
        assert_eq!(c.availability_zone, "eu-west-1b");
        // newly introduced fields are populated from defaults
        assert_eq!(c.encryption_key.len(), 32);
        // an IP is never kept as a domain
        assert!(c.domain.is_empty());
        assert!(captured.stdout().contains("USING PREVIOUS DEPLOYMENT CONFIG"));
    }

    #[tokio::test]
    async fn test_zone_cannot_change() {
        let store = FakeConfigStore::with_config(Config {
            availability_zone: "eu-west-1b".into(),
            ..Default::default()
        });
        let provider = FakeProvider::aws();
        let (terminal, _) = Terminal::captured();
        let args = DeployArgs {
            zone: Some("eu-west-1c".into()),
            ..Default::default()
        };

        let err = lifecycle(&store, &provider, &terminal)
            .resolve(&args)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Existing deployment uses zone eu-west-1b and cannot change to zone eu-west-1c"
        );
    }

    #[test]
    fn test_domain_change_detection() {
        let c = Config {
            domain: "ci.example.com".into(),
            ..Default::default()
        };
        let args = DeployArgs {
            domain: Some("ci.example.com".into()),
            ..Default::default()
        };
        let (_, updated) = apply_arguments(c.clone(), &args, Iaas::Aws).unwrap();
        assert!(!updated);

        let args = DeployArgs {
            domain: Some("new.example.com".into()),
            ..Default::default()
        };
        let (c, updated) = apply_arguments(c, &args, Iaas::Aws).unwrap();
        assert!(updated);
        assert_eq!(c.domain, "new.example.com");
    }

    #[test]
    fn test_main_team_requires_github_auth() {
        let args = DeployArgs {
            main_github_users: Some("someone".into()),
            ..Default::default()
        };
        let err = apply_arguments(Config::default(), &args, Iaas::Aws).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Main team github auth flags can only be used when github auth is also configured"
        );

        // github auth stored from an earlier deploy is enough
        let stored = Config {
            github_client_id: "id".into(),
            github_client_secret: "secret".into(),
            ..Default::default()
        };
        let (c, _) = apply_arguments(stored, &args, Iaas::Aws).unwrap();
        assert_eq!(c.main_github_users, "someone");
    }

    #[test]
    fn test_auth_blocks_applied_as_a_unit() {
        let args = DeployArgs {
            microsoft_client_id: Some("ms-id".into()),
            microsoft_client_secret: Some("ms-secret".into()),
            microsoft_tenant: Some("tenant".into()),
            db_size: Some("large".into()),
            spot: Some(false),
            tags: Some(vec!["team=platform".into()]),
            allow_ips: "10.0.0.1,192.168.0.0/16".into(),
            ..Default::default()
        };
        let (c, _) = apply_arguments(Config::default(), &args, Iaas::Aws).unwrap();
        assert_eq!(c.microsoft_client_id, "ms-id");
        assert_eq!(c.microsoft_tenant, "tenant");
        assert_eq!(c.rds_instance_class, "db.m4.large");
        assert_eq!(c.vm_provisioning_type, Some(VmProvisioningType::OnDemand));
        assert_eq!(c.tags, vec!["team=platform"]);
        assert_eq!(c.allow_ips, "\"10.0.0.1/32\", \"192.168.0.0/16\"");
        assert_eq!(c.allow_ips_unformatted, "10.0.0.1,192.168.0.0/16");
        assert!(c.github_client_id.is_empty());
    }
}

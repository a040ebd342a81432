use crate::wiring::{self, PipelineCreds};
use crate::TargetArgs;
use clap::Args;
use colored::Colorize;
use towerflow_config::Settings;
use towerflow_core::store::deployment_name;
use towerflow_core::{DEFAULT_ALLOW_IPS, DeployArgs, ExecutionContext};

#[derive(Args, Debug)]
pub struct DeployCmd {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Domain the web node is reachable on
    #[arg(long, env = "DOMAIN")]
    pub domain: Option<String>,

    /// PEM certificate for the domain (requires --tls-key and --domain)
    #[arg(long, env = "TLS_CERT")]
    pub tls_cert: Option<String>,

    /// PEM key for --tls-cert
    #[arg(long, env = "TLS_KEY")]
    pub tls_key: Option<String>,

    /// Comma separated IPs or CIDR ranges allowed to reach the web node
    #[arg(long, env = "ALLOW_IPS", default_value = DEFAULT_ALLOW_IPS)]
    pub allow_ips: String,

    /// Availability zone; only honoured on the first deploy
    #[arg(long, env = "ZONE")]
    pub zone: Option<String>,

    /// Number of workers
    #[arg(long = "workers", env = "WORKERS")]
    pub worker_count: Option<u32>,

    #[arg(long, env = "WORKER_SIZE")]
    pub worker_size: Option<String>,

    /// Worker instance family on AWS (m4, m5, m5a)
    #[arg(long, env = "WORKER_TYPE")]
    pub worker_type: Option<String>,

    #[arg(long, env = "WEB_SIZE")]
    pub web_size: Option<String>,

    #[arg(long, env = "DB_SIZE")]
    pub db_size: Option<String>,

    /// Run workers on spot instances (`--spot=false` for on-demand)
    #[arg(long, env = "SPOT", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub spot: Option<bool>,

    /// GCP name for --spot
    #[arg(
        long,
        env = "PREEMPTIBLE",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        conflicts_with = "spot"
    )]
    pub preemptible: Option<bool>,

    /// Skip the metrics stack
    #[arg(long, env = "NO_METRICS", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub no_metrics: Option<bool>,

    #[arg(long = "influxdb-retention-period", env = "INFLUXDB_RETENTION_PERIOD")]
    pub influx_db_retention: Option<String>,

    #[arg(long, env = "ENABLE_GLOBAL_RESOURCES", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub enable_global_resources: Option<bool>,

    #[arg(long, env = "ENABLE_PIPELINE_INSTANCES", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub enable_pipeline_instances: Option<bool>,

    /// key=value tag for every VM; repeatable
    #[arg(long = "add-tag")]
    pub tags: Vec<String>,

    #[arg(long = "github-auth-client-id", env = "GITHUB_AUTH_CLIENT_ID")]
    pub github_client_id: Option<String>,

    #[arg(long = "github-auth-client-secret", env = "GITHUB_AUTH_CLIENT_SECRET")]
    pub github_client_secret: Option<String>,

    /// GitHub Enterprise host
    #[arg(long = "github-auth-host", env = "GITHUB_AUTH_HOST")]
    pub github_host: Option<String>,

    #[arg(long = "github-auth-ca-cert", env = "GITHUB_AUTH_CA_CERT")]
    pub github_ca_cert: Option<String>,

    /// Comma separated GitHub users in the main team
    #[arg(long = "main-team-github-users", env = "MAIN_TEAM_GITHUB_USERS")]
    pub main_github_users: Option<String>,

    /// Comma separated org:team pairs in the main team
    #[arg(long = "main-team-github-teams", env = "MAIN_TEAM_GITHUB_TEAMS")]
    pub main_github_teams: Option<String>,

    /// Comma separated GitHub orgs in the main team
    #[arg(long = "main-team-github-orgs", env = "MAIN_TEAM_GITHUB_ORGS")]
    pub main_github_orgs: Option<String>,

    #[arg(long = "microsoft-auth-client-id", env = "MICROSOFT_AUTH_CLIENT_ID")]
    pub microsoft_client_id: Option<String>,

    #[arg(long = "microsoft-auth-client-secret", env = "MICROSOFT_AUTH_CLIENT_SECRET")]
    pub microsoft_client_secret: Option<String>,

    #[arg(long = "microsoft-auth-tenant", env = "MICROSOFT_AUTH_TENANT")]
    pub microsoft_tenant: Option<String>,

    #[arg(long = "bitbucket-auth-client-id", env = "BITBUCKET_AUTH_CLIENT_ID")]
    pub bitbucket_client_id: Option<String>,

    #[arg(long = "bitbucket-auth-client-secret", env = "BITBUCKET_AUTH_CLIENT_SECRET")]
    pub bitbucket_client_secret: Option<String>,

    /// VPC range (AWS); only honoured on the first deploy
    #[arg(long = "vpc-network-range", env = "VPC_NETWORK_RANGE")]
    pub network_cidr: Option<String>,

    #[arg(long = "public-subnet-range", env = "PUBLIC_SUBNET_RANGE")]
    pub public_cidr: Option<String>,

    #[arg(long = "private-subnet-range", env = "PRIVATE_SUBNET_RANGE")]
    pub private_cidr: Option<String>,

    #[arg(long = "rds-subnet-range1", env = "RDS_SUBNET_RANGE1")]
    pub rds1_cidr: Option<String>,

    #[arg(long = "rds-subnet-range2", env = "RDS_SUBNET_RANGE2")]
    pub rds2_cidr: Option<String>,

    /// Set by the self-update pipeline running inside the cluster
    #[arg(long, env = "SELF_UPDATE", hide = true)]
    pub self_update: bool,
}

impl DeployCmd {
    pub fn deploy_args(&self) -> DeployArgs {
        DeployArgs {
            iaas: Some(self.target.iaas),
            allow_ips: self.allow_ips.clone(),
            domain: self.domain.clone(),
            tls_cert: self.tls_cert.clone(),
            tls_key: self.tls_key.clone(),
            zone: self.zone.clone(),
            worker_count: self.worker_count,
            worker_size: self.worker_size.clone(),
            worker_type: self.worker_type.clone(),
            web_size: self.web_size.clone(),
            db_size: self.db_size.clone(),
            spot: self.spot.or(self.preemptible),
            no_metrics: self.no_metrics,
            influx_db_retention: self.influx_db_retention.clone(),
            enable_global_resources: self.enable_global_resources,
            enable_pipeline_instances: self.enable_pipeline_instances,
            tags: (!self.tags.is_empty()).then(|| self.tags.clone()),
            github_client_id: self.github_client_id.clone(),
            github_client_secret: self.github_client_secret.clone(),
            github_host: self.github_host.clone(),
            github_ca_cert: self.github_ca_cert.clone(),
            main_github_users: self.main_github_users.clone(),
            main_github_teams: self.main_github_teams.clone(),
            main_github_orgs: self.main_github_orgs.clone(),
            microsoft_client_id: self.microsoft_client_id.clone(),
            microsoft_client_secret: self.microsoft_client_secret.clone(),
            microsoft_tenant: self.microsoft_tenant.clone(),
            bitbucket_client_id: self.bitbucket_client_id.clone(),
            bitbucket_client_secret: self.bitbucket_client_secret.clone(),
            network_cidr: self.network_cidr.clone(),
            public_cidr: self.public_cidr.clone(),
            private_cidr: self.private_cidr.clone(),
            rds1_cidr: self.rds1_cidr.clone(),
            rds2_cidr: self.rds2_cidr.clone(),
        }
    }
}

pub async fn handle(cmd: DeployCmd) -> anyhow::Result<()> {
    let args = cmd.deploy_args();
    // Bad flags fail before any cloud call
    args.validate()?;

    let deployment = deployment_name(&cmd.target.name);
    if cmd.self_update {
        println!("{}", format!("Self-updating {}", deployment).cyan().bold());
    } else {
        println!("{}", format!("Deploying {}", deployment).cyan().bold());
    }

    let settings = Settings::from_env()?;
    let context = ExecutionContext {
        version: wiring::VERSION.to_string(),
        self_update: cmd.self_update,
    };
    let tower = wiring::orchestrator(&settings, &cmd.target, context, PipelineCreds::Lookup).await?;

    tower.deploy(&args).await?;
    Ok(())
}

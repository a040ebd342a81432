mod commands;
mod ip;
mod wiring;

use clap::{Args, Parser, Subcommand};
use towerflow_cloud::Iaas;

#[derive(Parser)]
#[command(name = "tower")]
#[command(
    about = "Deploy a Concourse CI cluster onto a BOSH director with one command",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags accepted by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Never prompt for confirmation
    #[arg(short = 'n', long, env = "NON_INTERACTIVE", global = true)]
    pub non_interactive: bool,
}

/// Which deployment a command acts on
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Project name; the deployment is called control-tower-<NAME>
    pub name: String,

    /// IAAS the deployment lives on (AWS or GCP)
    #[arg(long, env = "IAAS", default_value = "AWS")]
    pub iaas: Iaas,

    /// Cloud region
    #[arg(long, env = "AWS_REGION", default_value = "eu-west-1")]
    pub region: String,

    /// Groups deployments; defaults to the region
    #[arg(long, env = "NAMESPACE")]
    pub namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy or update a CI cluster
    Deploy(commands::deploy::DeployCmd),
    /// Tear a CI cluster down with everything it created
    Destroy(commands::destroy::DestroyCmd),
    /// Show details of a running CI cluster
    Info(commands::info::InfoCmd),
    /// Show the version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the command's output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match cli.command {
        Commands::Deploy(cmd) => commands::deploy::handle(cmd).await,
        Commands::Destroy(cmd) => commands::destroy::handle(cmd, &cli.global).await,
        Commands::Info(cmd) => commands::info::handle(cmd).await,
        Commands::Version => {
            println!("tower {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

use crate::wiring::{self, PipelineCreds};
use crate::TargetArgs;
use clap::Args;
use towerflow_config::Settings;
use towerflow_core::{ExecutionContext, Info};

#[derive(Args, Debug)]
pub struct InfoCmd {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Output as JSON
    #[arg(long, env = "JSON", conflicts_with_all = ["env", "cert_expiry"])]
    pub json: bool,

    /// Output shell exports for the bosh and credhub CLIs
    #[arg(long, conflicts_with = "cert_expiry")]
    pub env: bool,

    /// Only print the expiry of the director's NATS CA
    #[arg(long = "cert-expiry")]
    pub cert_expiry: bool,
}

impl InfoCmd {
    fn render(&self, info: &Info) -> anyhow::Result<String> {
        if self.json {
            Ok(format!("{}\n", serde_json::to_string_pretty(info)?))
        } else if self.env {
            Ok(info.render_env()?)
        } else if self.cert_expiry {
            Ok(format!("{}\n", info.cert_expiry))
        } else {
            Ok(info.render_text()?)
        }
    }
}

pub async fn handle(cmd: InfoCmd) -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let context = ExecutionContext {
        version: wiring::VERSION.to_string(),
        self_update: false,
    };
    let tower = wiring::orchestrator(&settings, &cmd.target, context, PipelineCreds::Skip).await?;

    let info = tower.info().await?;
    print!("{}", cmd.render(&info)?);
    Ok(())
}

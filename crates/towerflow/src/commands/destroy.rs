use crate::wiring::{self, PipelineCreds};
use crate::{GlobalArgs, TargetArgs};
use clap::Args;
use colored::Colorize;
use std::io::{BufRead, Write};
use towerflow_config::Settings;
use towerflow_core::ExecutionContext;
use towerflow_core::store::deployment_name;

#[derive(Args, Debug)]
pub struct DestroyCmd {
    #[command(flatten)]
    pub target: TargetArgs,
}

/// Ask the operator to type `name` back. Anything else declines.
pub fn confirm(mut input: impl BufRead, mut output: impl Write, name: &str) -> std::io::Result<bool> {
    write!(
        output,
        "{} This will destroy {} and everything in it.\nType the project name to confirm: ",
        "WARNING".red().bold(),
        deployment_name(name)
    )?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim() == name)
}

pub async fn handle(cmd: DestroyCmd, global: &GlobalArgs) -> anyhow::Result<()> {
    if !global.non_interactive {
        let stdin = std::io::stdin();
        if !confirm(stdin.lock(), std::io::stdout(), &cmd.target.name)? {
            println!("Bailing out...");
            return Ok(());
        }
    }

    println!(
        "{}",
        format!("Destroying {}", deployment_name(&cmd.target.name)).red().bold()
    );

    let settings = Settings::from_env()?;
    let context = ExecutionContext {
        version: wiring::VERSION.to_string(),
        self_update: false,
    };
    let tower = wiring::orchestrator(&settings, &cmd.target, context, PipelineCreds::Skip).await?;

    tower.destroy().await?;
    Ok(())
}

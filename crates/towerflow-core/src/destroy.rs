//! Tear a deployment down

use crate::deploy::Orchestrator;
use crate::error::{Result, ResultExt};
use crate::messages;
use crate::model::ConfigView;

impl Orchestrator {
    /// Delete the director's VMs and volumes, destroy the infrastructure
    /// and finally the config bucket with everything in it
    pub async fn destroy(&self) -> Result<()> {
        let config = self
            .c
            .store
            .load()
            .await
            .context("error loading config before destroy")?;
        let view = ConfigView::new(&config);
        let inputs = self.c.input_vars.new_input_vars(&view);

        let outputs = self.c.provisioner.build_output(&inputs).await?;
        let network_id = outputs.network_id(self.c.provider.iaas())?;

        tracing::info!("Deleting VMs in {}", network_id);
        let volumes = self.c.provider.delete_vms_in_vpc(network_id).await?;

        self.c.provisioner.destroy(&inputs).await?;

        if !volumes.is_empty() {
            tracing::info!("Deleting {} orphaned volumes", volumes.len());
            self.c.provider.delete_volumes(&volumes).await?;
        }

        self.c.store.delete_all(&view).await?;
        self.terminal.print(messages::DESTROY_SUCCESSFUL)
    }
}

#[cfg(test)]
mod tests {
    use crate::deploy::{ExecutionContext, Orchestrator};
    use crate::model::DeployArgs;
    use crate::terminal::Terminal;
    use crate::testing::FakeWorld;

    #[tokio::test]
    async fn test_destroy_sequence() {
        let world = FakeWorld::aws();
        let (terminal, captured) = Terminal::captured();
        let tower = Orchestrator::new(world.collaborators(), ExecutionContext::default(), terminal);
        tower.deploy(&DeployArgs::default()).await.unwrap();
        world.log.clear();

        tower.destroy().await.unwrap();

        assert_eq!(
            world.log.calls(),
            vec![
                "load",
                "build_output",
                "delete_vms_in_vpc vpc-112233",
                "destroy",
                "delete_volumes vol-1,vol-2",
                "delete_all control-tower-ci-eu-west-1-config",
            ]
        );
        assert!(world.store.saved().is_none());
        assert!(captured.stdout().ends_with("DESTROY SUCCESSFUL\n"));
    }

    #[tokio::test]
    async fn test_destroy_without_config_fails() {
        let world = FakeWorld::aws();
        let tower = Orchestrator::new(
            world.collaborators(),
            ExecutionContext::default(),
            Terminal::captured().0,
        );

        let err = tower.destroy().await.unwrap_err();

        assert!(err.to_string().starts_with("error loading config before destroy"));
        assert_eq!(world.log.count("destroy"), 0);
    }
}

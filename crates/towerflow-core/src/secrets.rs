//! Generated passwords and keys for new deployments

use crate::error::{Result, TowerError};
use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::process::Stdio;
use tokio::process::Command;

/// An SSH keypair in PEM / authorized_keys form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyPair {
    pub private_key: String,
    pub public_key: String,
}

#[async_trait]
pub trait SecretGenerator: Send + Sync {
    /// Random alphanumeric password of the given length
    fn password(&self, len: usize) -> String;

    /// Eight random lower-case letters, used in database names
    fn eight_random_letters(&self) -> String;

    async fn ssh_keypair(&self) -> Result<SshKeyPair>;
}

/// Secrets from the thread-local RNG and `ssh-keygen`
#[derive(Debug, Clone, Default)]
pub struct RandomSecrets;

#[async_trait]
impl SecretGenerator for RandomSecrets {
    fn password(&self, len: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    fn eight_random_letters(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..8).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
    }

    async fn ssh_keypair(&self) -> Result<SshKeyPair> {
        let dir = tempfile::tempdir()?;
        let key_path = dir.path().join("id_rsa");

        tracing::debug!("Generating SSH keypair in {}", dir.path().display());

        let output = Command::new("ssh-keygen")
            .args(["-t", "rsa", "-b", "4096", "-m", "PEM", "-N", "", "-C", "", "-q", "-f"])
            .arg(&key_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(TowerError::tool(
                "ssh-keygen",
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let private_key = tokio::fs::read_to_string(&key_path).await?;
        let public_key = tokio::fs::read_to_string(key_path.with_extension("pub")).await?;

        Ok(SshKeyPair {
            private_key: private_key.trim().to_string(),
            public_key: public_key.trim().to_string(),
        })
    }
}

//! The self-update pipeline
//!
//! A single job watches for new releases of the `tower` binary and runs
//! `tower deploy` against the deployment in self-update mode.

use crate::error::{PipelineError, Result};
use serde_json::json;
use towerflow_cloud::Iaas;
use towerflow_core::ConfigView;

pub const PIPELINE_NAME: &str = "control-tower-self-update";
pub const JOB_NAME: &str = "self-update";
pub const RELEASE_RESOURCE: &str = "control-tower-release";

const RELEASE_OWNER: &str = "chronista-club";
const RELEASE_REPOSITORY: &str = "towerflow";
const RELEASE_BINARY: &str = "tower-linux-amd64";
const TASK_IMAGE: &str = "engineerbetter/pcf-ops";

const DEPLOYMENT_PREFIX: &str = "control-tower-";

/// Access keys the self-update job deploys with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// `<pipeline>/<job>` as accepted by `fly pause-job`
pub fn job_path() -> String {
    format!("{}/{}", PIPELINE_NAME, JOB_NAME)
}

/// Render the pipeline config for the deployment
pub fn render(config: &ConfigView, aws: Option<&AwsCredentials>) -> Result<String> {
    let iaas = config
        .iaas
        .ok_or_else(|| PipelineError::UnsupportedIaas(String::new()))?;
    if iaas != Iaas::Aws {
        return Err(PipelineError::UnsupportedIaas(iaas.to_string()));
    }
    let aws = aws.ok_or(PipelineError::MissingCredentials)?;

    let deployment = config
        .deployment
        .strip_prefix(DEPLOYMENT_PREFIX)
        .unwrap_or(&config.deployment);

    let script = format!(
        "set -eux\n\ncd {}\nchmod +x {}\n./{} deploy $DEPLOYMENT\n",
        RELEASE_RESOURCE, RELEASE_BINARY, RELEASE_BINARY
    );

    let pipeline = json!({
        "resources": [{
            "name": RELEASE_RESOURCE,
            "type": "github-release",
            "icon": "github",
            "source": {
                "owner": RELEASE_OWNER,
                "repository": RELEASE_REPOSITORY,
                "pre_release": true,
            },
        }],
        "jobs": [{
            "name": JOB_NAME,
            "serial_groups": ["cup"],
            "serial": true,
            "plan": [
                {"get": RELEASE_RESOURCE, "trigger": true},
                {
                    "task": "update",
                    "params": {
                        "AWS_ACCESS_KEY_ID": aws.access_key_id,
                        "AWS_REGION": config.region,
                        "AWS_SECRET_ACCESS_KEY": aws.secret_access_key,
                        "DEPLOYMENT": deployment,
                        "IAAS": iaas.to_string(),
                        "NAMESPACE": config.namespace,
                        "SELF_UPDATE": true,
                    },
                    "config": {
                        "platform": "linux",
                        "image_resource": {
                            "type": "docker-image",
                            "source": {"repository": TASK_IMAGE},
                        },
                        "inputs": [{"name": RELEASE_RESOURCE}],
                        "run": {
                            "path": "bash",
                            "args": ["-c", script],
                        },
                    },
                },
            ],
        }],
    });

    Ok(serde_yaml::to_string(&pipeline)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use towerflow_core::Config;

    fn config() -> ConfigView {
        ConfigView::from(Config {
            iaas: Some(Iaas::Aws),
            deployment: "control-tower-ci".into(),
            namespace: "team-a".into(),
            region: "eu-west-1".into(),
            ..Default::default()
        })
    }

    fn creds() -> AwsCredentials {
        AwsCredentials {
            access_key_id: "AKIA123".into(),
            secret_access_key: "s3cr\"et".into(),
        }
    }

    #[test]
    fn test_render_self_update_job() {
        let rendered = render(&config(), Some(&creds())).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();

        assert_eq!(doc["resources"][0]["name"].as_str(), Some(RELEASE_RESOURCE));
        let job = &doc["jobs"][0];
        assert_eq!(job["name"].as_str(), Some("self-update"));
        let params = &job["plan"][1]["params"];
        assert_eq!(params["DEPLOYMENT"].as_str(), Some("ci"));
        assert_eq!(params["NAMESPACE"].as_str(), Some("team-a"));
        assert_eq!(params["IAAS"].as_str(), Some("AWS"));
        assert_eq!(params["SELF_UPDATE"].as_bool(), Some(true));
        assert_eq!(params["AWS_SECRET_ACCESS_KEY"].as_str(), Some("s3cr\"et"));

        let script = job["plan"][1]["config"]["run"]["args"][1].as_str().unwrap();
        assert!(script.ends_with("./tower-linux-amd64 deploy $DEPLOYMENT\n"));
    }

    #[test]
    fn test_credentials_required() {
        let err = render(&config(), None).unwrap_err();
        assert!(matches!(err, PipelineError::MissingCredentials));
    }

    #[test]
    fn test_gcp_not_supported() {
        let view = ConfigView::from(Config {
            iaas: Some(Iaas::Gcp),
            ..Default::default()
        });
        let err = render(&view, Some(&creds())).unwrap_err();
        assert_eq!(err.to_string(), "self-update pipeline is not supported on GCP");
    }

    #[test]
    fn test_job_path() {
        assert_eq!(job_path(), "control-tower-self-update/self-update");
    }
}

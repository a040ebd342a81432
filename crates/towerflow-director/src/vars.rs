//! Typed variables for the director and CI manifests
//!
//! Each struct serializes to the vars file passed with `--vars-file`, so
//! the set of provided names is exactly the set of fields.

use crate::error::{DirectorError, Result};
use crate::manifest::{Dependencies, ops};
use serde::Serialize;
use std::collections::BTreeMap;
use towerflow_core::network::{self, DIRECTOR_HOST, GATEWAY_HOST, WEB_HOST};
use towerflow_core::{ConfigView, InfraOutputs, outputs};

/// Name of the CI deployment on the director
pub const CONCOURSE_DEPLOYMENT: &str = "concourse";

pub const PROJECT_TAG: &str = "control-tower-project";
pub const COMPONENT_TAG: &str = "control-tower-component";
const COMPONENT: &str = "concourse";

/// `key=value` tags plus the project and component tags
pub fn tags(config: &ConfigView) -> Result<BTreeMap<String, String>> {
    let mut tags = BTreeMap::new();
    for tag in &config.tags {
        let (key, value) = tag
            .split_once('=')
            .ok_or_else(|| DirectorError::InvalidTag(tag.clone()))?;
        tags.insert(key.to_string(), value.to_string());
    }
    tags.insert(PROJECT_TAG.to_string(), config.project.clone());
    tags.insert(COMPONENT_TAG.to_string(), COMPONENT.to_string());
    Ok(tags)
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectorSsl {
    pub certificate: String,
    pub private_key: String,
    pub ca: String,
}

/// Variables for `bosh create-env` on AWS
#[derive(Debug, Clone, Serialize)]
pub struct AwsDirectorVars {
    pub director_name: String,
    pub admin_password: String,
    pub director_ssl: DirectorSsl,
    pub tags: BTreeMap<String, String>,

    pub bosh_url: String,
    pub bosh_version: String,
    pub bosh_sha1: String,
    pub bpm_url: String,
    pub bpm_version: String,
    pub bpm_sha1: String,
    pub cpi_url: String,
    pub cpi_version: String,
    pub cpi_sha1: String,
    pub stemcell_url: String,
    pub stemcell_sha1: String,

    pub internal_cidr: String,
    pub internal_gw: String,
    pub internal_ip: String,
    pub external_ip: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub az: String,
    pub default_key_name: String,
    pub default_security_groups: Vec<String>,
    pub private_key: String,
    pub subnet_id: String,
    pub blobstore_bucket: String,
    pub s3_aws_access_key_id: String,
    pub s3_aws_secret_access_key: String,

    pub db_ca_cert: String,
    pub db_host: String,
    pub db_name: String,
    pub db_password: String,
    pub db_port: String,
    pub db_username: String,
}

impl AwsDirectorVars {
    pub fn build(
        config: &ConfigView,
        out: &InfraOutputs,
        deps: &Dependencies,
        db_ca_cert: &str,
    ) -> towerflow_core::Result<Self> {
        let bosh = deps.get("bosh")?;
        let bpm = deps.get("bpm")?;
        let cpi = deps.get("cpi")?;
        let stemcell = deps.get("stemcell")?;

        Ok(Self {
            director_name: "bosh".to_string(),
            admin_password: config.director_password.clone(),
            director_ssl: DirectorSsl {
                certificate: config.director_cert.clone(),
                private_key: config.director_key.clone(),
                ca: config.director_ca_cert.clone(),
            },
            tags: tags(config)?,

            bosh_url: bosh.url.clone(),
            bosh_version: bosh.version.clone(),
            bosh_sha1: bosh.sha1.clone(),
            bpm_url: bpm.url.clone(),
            bpm_version: bpm.version.clone(),
            bpm_sha1: bpm.sha1.clone(),
            cpi_url: cpi.url.clone(),
            cpi_version: cpi.version.clone(),
            cpi_sha1: cpi.sha1.clone(),
            stemcell_url: stemcell.url.clone(),
            stemcell_sha1: stemcell.sha1.clone(),

            internal_cidr: config.public_cidr.clone(),
            internal_gw: network::host(&config.public_cidr, GATEWAY_HOST)?.to_string(),
            internal_ip: network::host(&config.public_cidr, DIRECTOR_HOST)?.to_string(),
            external_ip: out.get(outputs::DIRECTOR_PUBLIC_IP)?.to_string(),
            access_key_id: out.get(outputs::BOSH_USER_ACCESS_KEY_ID)?.to_string(),
            secret_access_key: out.get(outputs::BOSH_SECRET_ACCESS_KEY)?.to_string(),
            region: config.region.clone(),
            az: config.availability_zone.clone(),
            default_key_name: out.get(outputs::DIRECTOR_KEY_PAIR)?.to_string(),
            default_security_groups: vec![
                out.get(outputs::DIRECTOR_SECURITY_GROUP_ID)?.to_string(),
                out.get(outputs::VMS_SECURITY_GROUP_ID)?.to_string(),
            ],
            private_key: config.private_key.clone(),
            subnet_id: out.get(outputs::PUBLIC_SUBNET_ID)?.to_string(),
            blobstore_bucket: out.get(outputs::BLOBSTORE_BUCKET)?.to_string(),
            s3_aws_access_key_id: out.get(outputs::BLOBSTORE_USER_ACCESS_KEY_ID)?.to_string(),
            s3_aws_secret_access_key: out.get(outputs::BLOBSTORE_SECRET_ACCESS_KEY)?.to_string(),

            db_ca_cert: db_ca_cert.to_string(),
            db_host: out.get(outputs::BOSH_DB_ADDRESS)?.to_string(),
            db_name: config.rds_default_database_name.clone(),
            db_password: config.rds_password.clone(),
            db_port: out.get(outputs::BOSH_DB_PORT)?.to_string(),
            db_username: config.rds_username.clone(),
        })
    }
}

/// Template context for the AWS cloud config
#[derive(Debug, Clone, Serialize)]
pub struct AwsCloudConfigParams {
    pub availability_zone: String,
    pub atc_security_group_id: String,
    pub vms_security_group_id: String,
    pub public_subnet_id: String,
    pub private_subnet_id: String,
    pub spot: bool,
    pub worker_type: String,
    pub public_cidr: String,
    pub public_cidr_gateway: String,
    pub public_cidr_static: String,
    pub public_cidr_reserved: String,
    pub private_cidr: String,
    pub private_cidr_gateway: String,
    pub private_cidr_reserved: String,
}

impl AwsCloudConfigParams {
    pub fn build(config: &ConfigView, out: &InfraOutputs) -> towerflow_core::Result<Self> {
        Ok(Self {
            availability_zone: config.availability_zone.clone(),
            atc_security_group_id: out.get(outputs::ATC_SECURITY_GROUP_ID)?.to_string(),
            vms_security_group_id: out.get(outputs::VMS_SECURITY_GROUP_ID)?.to_string(),
            public_subnet_id: out.get(outputs::PUBLIC_SUBNET_ID)?.to_string(),
            private_subnet_id: out.get(outputs::PRIVATE_SUBNET_ID)?.to_string(),
            spot: config.is_spot(),
            worker_type: config.worker_type.clone(),
            public_cidr: config.public_cidr.clone(),
            public_cidr_gateway: network::host(&config.public_cidr, GATEWAY_HOST)?.to_string(),
            public_cidr_static: network::format_ip_range(&config.public_cidr, ", ", &[6, 7])?,
            public_cidr_reserved: network::format_ip_range(&config.public_cidr, "-", &[1, 5])?,
            private_cidr: config.private_cidr.clone(),
            private_cidr_gateway: network::host(&config.private_cidr, GATEWAY_HOST)?.to_string(),
            private_cidr_reserved: network::format_ip_range(&config.private_cidr, "-", &[1, 5])?,
        })
    }

    pub fn render(&self, template: &str) -> Result<String> {
        let context = tera::Context::from_serialize(self)?;
        Ok(tera::Tera::one_off(template, &context, false)?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExternalTls {
    pub certificate: String,
    pub private_key: String,
}

/// Variables for the CI deployment
#[derive(Debug, Clone, Serialize)]
pub struct ConcourseVars {
    pub deployment_name: String,
    pub domain: String,
    pub project: String,
    pub web_network_name: String,
    pub worker_network_name: String,
    pub postgres_host: String,
    pub postgres_port: String,
    pub postgres_role: String,
    pub postgres_password: String,
    pub postgres_ca_cert: String,
    pub web_vm_type: String,
    pub worker_vm_type: String,
    pub worker_count: u32,
    pub atc_eip: String,
    pub external_tls: ExternalTls,
    pub atc_encryption_key: String,
    pub web_static_ip: String,
    pub enable_global_resources: bool,
    pub enable_pipeline_instances: bool,
    pub tags: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub atc_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub microsoft_client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub microsoft_client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub microsoft_tenant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitbucket_client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitbucket_client_secret: Option<String>,
}

/// Vars plus the optional ops files they need
#[derive(Debug, Clone)]
pub struct ConcoursePlan {
    pub vars: ConcourseVars,
    pub ops_files: Vec<&'static str>,
}

impl ConcoursePlan {
    pub fn build(
        config: &ConfigView,
        out: &InfraOutputs,
        db_ca_cert: &str,
    ) -> towerflow_core::Result<Self> {
        let mut ops_files = Vec::new();
        let non_empty = |s: &str| Some(s.to_string()).filter(|s| !s.is_empty());

        let mut vars = ConcourseVars {
            deployment_name: CONCOURSE_DEPLOYMENT.to_string(),
            domain: config.domain.clone(),
            project: config.project.clone(),
            web_network_name: "public".to_string(),
            worker_network_name: "private".to_string(),
            postgres_host: out.get(outputs::BOSH_DB_ADDRESS)?.to_string(),
            postgres_port: out.get(outputs::BOSH_DB_PORT)?.to_string(),
            postgres_role: config.rds_username.clone(),
            postgres_password: config.rds_password.clone(),
            postgres_ca_cert: db_ca_cert.to_string(),
            web_vm_type: format!("concourse-web-{}", config.concourse_web_size),
            worker_vm_type: format!("concourse-{}", config.concourse_worker_size),
            worker_count: config.concourse_worker_count,
            atc_eip: out.get(outputs::ATC_PUBLIC_IP)?.to_string(),
            external_tls: ExternalTls {
                certificate: config.concourse_cert.clone(),
                private_key: config.concourse_key.clone(),
            },
            atc_encryption_key: config.encryption_key.clone(),
            web_static_ip: network::host(&config.public_cidr, WEB_HOST)?.to_string(),
            enable_global_resources: config.enable_global_resources,
            enable_pipeline_instances: config.enable_pipeline_instances,
            tags: tags(config)?,
            atc_password: non_empty(&config.concourse_password),
            github_client_id: None,
            github_client_secret: None,
            microsoft_client_id: None,
            microsoft_client_secret: None,
            microsoft_tenant: None,
            bitbucket_client_id: None,
            bitbucket_client_secret: None,
        };

        if config.is_bitbucket_auth_set() {
            vars.bitbucket_client_id = Some(config.bitbucket_client_id.clone());
            vars.bitbucket_client_secret = Some(config.bitbucket_client_secret.clone());
            ops_files.push(ops::BITBUCKET_AUTH);
        }
        if config.is_github_auth_set() {
            vars.github_client_id = Some(config.github_client_id.clone());
            vars.github_client_secret = Some(config.github_client_secret.clone());
            ops_files.push(ops::GITHUB_AUTH);
        }
        if config.is_microsoft_auth_set() {
            vars.microsoft_client_id = Some(config.microsoft_client_id.clone());
            vars.microsoft_client_secret = Some(config.microsoft_client_secret.clone());
            vars.microsoft_tenant = Some(config.microsoft_tenant.clone());
            ops_files.push(ops::MICROSOFT_AUTH);
        }
        if config.is_spot() {
            ops_files.push(ops::EPHEMERAL_WORKERS);
        }
        ops_files.push(ops::EXTRA_TAGS);

        Ok(Self { vars, ops_files })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use towerflow_core::{Config, VmProvisioningType};

    fn config() -> Config {
        Config {
            project: "ci".into(),
            region: "eu-west-1".into(),
            availability_zone: "eu-west-1a".into(),
            public_cidr: "10.0.0.0/24".into(),
            private_cidr: "10.0.1.0/24".into(),
            domain: "ci.example.com".into(),
            concourse_web_size: "small".into(),
            concourse_worker_size: "xlarge".into(),
            concourse_worker_count: 2,
            worker_type: "m5".into(),
            tags: vec!["control-tower-version=0.3.0".into(), "team=platform".into()],
            vm_provisioning_type: Some(VmProvisioningType::OnDemand),
            ..Default::default()
        }
    }

    fn infra() -> InfraOutputs {
        [
            (outputs::DIRECTOR_PUBLIC_IP, "52.0.0.6"),
            (outputs::ATC_PUBLIC_IP, "52.0.0.8"),
            (outputs::BOSH_DB_ADDRESS, "db.internal"),
            (outputs::BOSH_DB_PORT, "5432"),
            (outputs::ATC_SECURITY_GROUP_ID, "sg-atc"),
            (outputs::VMS_SECURITY_GROUP_ID, "sg-vms"),
            (outputs::DIRECTOR_SECURITY_GROUP_ID, "sg-director"),
            (outputs::PUBLIC_SUBNET_ID, "subnet-pub"),
            (outputs::PRIVATE_SUBNET_ID, "subnet-priv"),
            (outputs::BOSH_USER_ACCESS_KEY_ID, "AKIA1"),
            (outputs::BOSH_SECRET_ACCESS_KEY, "secret1"),
            (outputs::BLOBSTORE_BUCKET, "blobs"),
            (outputs::BLOBSTORE_USER_ACCESS_KEY_ID, "AKIA2"),
            (outputs::BLOBSTORE_SECRET_ACCESS_KEY, "secret2"),
            (outputs::DIRECTOR_KEY_PAIR, "control-tower-ci"),
        ]
        .into_iter()
        .collect()
    }

    fn deps() -> Dependencies {
        serde_json::from_str(
            r#"{
                "bosh": {"url": "https://b", "version": "270.1", "sha1": "b1"},
                "bpm": {"url": "https://p", "version": "1.1", "sha1": "p1"},
                "cpi": {"url": "https://c", "version": "83", "sha1": "c1"},
                "stemcell": {"url": "https://s", "version": "621", "sha1": "s1"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_tags_include_project_and_component() {
        let view = ConfigView::from(config());
        let tags = tags(&view).unwrap();
        assert_eq!(tags["team"], "platform");
        assert_eq!(tags["control-tower-version"], "0.3.0");
        assert_eq!(tags[PROJECT_TAG], "ci");
        assert_eq!(tags[COMPONENT_TAG], "concourse");
    }

    #[test]
    fn test_malformed_tag() {
        let view = ConfigView::from(Config {
            tags: vec!["broken".into()],
            ..config()
        });
        let err = tags(&view).unwrap_err();
        assert_eq!(err.to_string(), "could not split tag \"broken\"");
    }

    #[test]
    fn test_director_vars_addresses() {
        let view = ConfigView::from(config());
        let vars = AwsDirectorVars::build(&view, &infra(), &deps(), "rds-ca").unwrap();
        assert_eq!(vars.internal_gw, "10.0.0.1");
        assert_eq!(vars.internal_ip, "10.0.0.6");
        assert_eq!(vars.external_ip, "52.0.0.6");
        assert_eq!(vars.default_security_groups, vec!["sg-director", "sg-vms"]);
        assert_eq!(vars.cpi_version, "83");
        assert_eq!(vars.db_port, "5432");

        let yaml = serde_yaml::to_value(&vars).unwrap();
        assert_eq!(yaml["director_ssl"]["ca"].as_str(), Some(""));
        assert_eq!(yaml["tags"]["control-tower-component"].as_str(), Some("concourse"));
    }

    #[test]
    fn test_director_vars_need_outputs() {
        let view = ConfigView::from(config());
        let err = AwsDirectorVars::build(&view, &InfraOutputs::default(), &deps(), "").unwrap_err();
        assert!(err.to_string().contains("missing infrastructure output"));
    }

    #[test]
    fn test_cloud_config_ranges() {
        let view = ConfigView::from(config());
        let params = AwsCloudConfigParams::build(&view, &infra()).unwrap();
        assert_eq!(params.public_cidr_gateway, "10.0.0.1");
        assert_eq!(params.public_cidr_static, "[10.0.0.6, 10.0.0.7]");
        assert_eq!(params.public_cidr_reserved, "[10.0.0.1-10.0.0.5]");
        assert_eq!(params.private_cidr_reserved, "[10.0.1.1-10.0.1.5]");

        let rendered = params
            .render("az: {{ availability_zone }}\nstatic: {{ public_cidr_static }}\n{% if spot %}spot: true{% endif %}")
            .unwrap();
        assert_eq!(rendered, "az: eu-west-1a\nstatic: [10.0.0.6, 10.0.0.7]\n");
    }

    #[test]
    fn test_concourse_plan_defaults() {
        let view = ConfigView::from(config());
        let plan = ConcoursePlan::build(&view, &infra(), "rds-ca").unwrap();
        assert_eq!(plan.ops_files, vec![ops::EXTRA_TAGS]);
        assert_eq!(plan.vars.web_vm_type, "concourse-web-small");
        assert_eq!(plan.vars.worker_vm_type, "concourse-xlarge");
        assert_eq!(plan.vars.web_static_ip, "10.0.0.8");
        assert_eq!(plan.vars.atc_eip, "52.0.0.8");

        let yaml = serde_yaml::to_value(&plan.vars).unwrap();
        assert!(yaml.get("atc_password").is_none());
        assert!(yaml.get("github_client_id").is_none());
        assert_eq!(yaml["worker_count"].as_u64(), Some(2));
    }

    #[test]
    fn test_concourse_plan_optional_features() {
        let view = ConfigView::from(Config {
            concourse_password: "pw".into(),
            github_client_id: "gh-id".into(),
            github_client_secret: "gh-secret".into(),
            microsoft_client_id: "ms-id".into(),
            microsoft_client_secret: "ms-secret".into(),
            microsoft_tenant: "tenant".into(),
            vm_provisioning_type: Some(VmProvisioningType::Spot),
            ..config()
        });
        let plan = ConcoursePlan::build(&view, &infra(), "").unwrap();
        assert_eq!(
            plan.ops_files,
            vec![ops::GITHUB_AUTH, ops::MICROSOFT_AUTH, ops::EPHEMERAL_WORKERS, ops::EXTRA_TAGS]
        );
        assert_eq!(plan.vars.atc_password.as_deref(), Some("pw"));
        assert_eq!(plan.vars.microsoft_tenant.as_deref(), Some("tenant"));
        assert!(plan.vars.bitbucket_client_id.is_none());
    }
}

//! Drives BoshDirector against a stand-in bosh script

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use towerflow_cloud::Iaas;
use towerflow_core::terminal::Captured;
use towerflow_core::{Config, ConfigView, DirectorClient, InfraOutputs, Terminal, outputs};
use towerflow_director::BoshDirector;

const FAKE_BOSH: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
echo "$BOSH_ENVIRONMENT $*" >> "$dir/calls.log"
prev=""
state=""
store=""
last=""
for arg in "$@"; do
  case "$arg" in
    --state=*) state="${arg#--state=}" ;;
    --vars-store=*) store="${arg#--vars-store=}" ;;
  esac
  [ "$prev" = "--vars-store" ] && store="$arg"
  prev="$arg"
  last="$arg"
done
case " $* " in
  *" create-env "*)
    echo '{"current_vm_cid":"i-director"}' > "$state"
    echo "admin_password: generated" >> "$store"
    [ -f "$dir/fail-create-env" ] && { echo "create-env failed" >&2; exit 1; }
    ;;
  *" update-cloud-config "*)
    cp "$last" "$dir/cloud-config.yml"
    ;;
  *" deploy "*)
    echo "atc_password: generated" >> "$store"
    echo "Task 7"
    echo "Task 7 | 10:00:00 | Preparing deployment: Preparing deployment"
    [ -f "$dir/slow-deploy" ] && sleep 30
    ;;
  *" locks "*)
    echo '{"Tables":[{"Rows":[{"type":"deployment","resource":"concourse"}]}]}'
    ;;
  *" instances "*)
    echo '{"Tables":[{"Rows":[{"instance":"web/1","ips":"10.0.0.8","process_state":"running"}]}]}'
    ;;
esac
exit 0
"#;

const DIRECTOR_MANIFEST: &str = "name: bosh
director_name: ((director_name))
internal_ip: ((internal_ip))
certificate: ((director_ssl.certificate))
nats: ((nats_password))
variables:
- name: nats_password
  type: password
";

const CONCOURSE_MANIFEST: &str = "name: ((deployment_name))
web_ip: ((web_static_ip))
dashboard: ((grafana_dashboard))
password: ((atc_password))
variables:
- name: atc_password
  type: password
";

const VERSIONS: &str =
    r#"[{"type": "replace", "path": "/stemcells/alias=xenial/version", "value": "621.125"}]"#;

const DEPENDENCIES: &str = r#"{
    "bosh": {"url": "https://b", "version": "270.1", "sha1": "b1"},
    "bpm": {"url": "https://p", "version": "1.1", "sha1": "p1"},
    "cpi": {"url": "https://c", "version": "83", "sha1": "c1"},
    "stemcell": {"url": "https://s", "version": "621", "sha1": "s1"}
}"#;

struct Fixture {
    dir: tempfile::TempDir,
    director: BoshDirector,
    terminal: Captured,
}

impl Fixture {
    fn new(director_manifest: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bosh");
        std::fs::write(&bin, FAKE_BOSH).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let manifests = dir.path().join("manifests");
        let files: &[(&str, &str)] = &[
            ("director/manifest.yml", director_manifest),
            ("director/external-ip.yml", "- type: replace\n  path: /external_ip?\n  value: ((external_ip))\n"),
            ("director/dependencies.json", DEPENDENCIES),
            ("director/aws/cpi.yml", "- type: replace\n  path: /cpi?\n  value: ((cpi_url))\n"),
            ("director/aws/custom-ops.yml", "[]\n"),
            (
                "director/aws/cloud-config.yml",
                "azs:\n- name: z1\n  az: {{ availability_zone }}\nstatic: {{ public_cidr_static }}\n",
            ),
            ("director/aws/db-ca.pem", "RDS CA"),
            ("concourse/manifest.yml", CONCOURSE_MANIFEST),
            ("concourse/versions-aws.json", VERSIONS),
            ("concourse/shas-aws.json", "[]"),
            ("concourse/grafana_dashboard.yml", "grafana_dashboard: {}\n"),
            ("concourse/ops/extra_tags.yml", "- type: replace\n  path: /tags?\n  value: ((tags))\n"),
        ];
        for (name, contents) in files {
            let path = manifests.join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }

        let (terminal, captured) = Terminal::captured();
        let director = BoshDirector::new(&bin, &manifests).with_terminal(terminal);
        Self {
            dir,
            director,
            terminal: captured,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn calls(&self) -> Vec<String> {
        calls(self.dir.path())
    }
}

fn calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn config() -> ConfigView {
    ConfigView::from(Config {
        iaas: Some(Iaas::Aws),
        project: "ci".into(),
        region: "eu-west-1".into(),
        availability_zone: "eu-west-1a".into(),
        public_cidr: "10.0.0.0/24".into(),
        private_cidr: "10.0.1.0/24".into(),
        domain: "ci.example.com".into(),
        director_password: "director-pw".into(),
        director_ca_cert: "DIRECTOR CA".into(),
        concourse_web_size: "small".into(),
        concourse_worker_size: "xlarge".into(),
        concourse_worker_count: 1,
        ..Default::default()
    })
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

#[tokio::test]
async fn test_deploy_runs_every_step_and_returns_files() {
    let fx = Fixture::new(DIRECTOR_MANIFEST);

    let result = fx
        .director
        .deploy(&config(), &infra(), Vec::new(), Vec::new(), false)
        .await;

    result.outcome.unwrap();
    let calls = fx.calls();
    assert_eq!(calls.len(), 4);
    assert!(calls[0].starts_with(" --non-interactive create-env --state="));
    assert!(calls[1].starts_with("https://52.0.0.6 --non-interactive update-cloud-config "));
    assert!(calls[2].contains(
        "upload-stemcell https://s3.amazonaws.com/bosh-aws-light-stemcells/621.125/"
    ));
    assert!(calls[3].contains("--deployment concourse deploy "));
    assert!(calls[3].contains("extra_tags.yml"));

    assert_eq!(result.state, b"{\"current_vm_cid\":\"i-director\"}\n");
    let creds = String::from_utf8(result.creds).unwrap();
    assert!(creds.contains("admin_password: generated"));
    assert!(creds.contains("atc_password: generated"));

    let cloud_config = std::fs::read_to_string(fx.path("cloud-config.yml")).unwrap();
    assert!(cloud_config.contains("az: eu-west-1a"));
    assert!(cloud_config.contains("static: [10.0.0.6, 10.0.0.7]"));
}

#[tokio::test]
async fn test_existing_creds_are_extended() {
    let fx = Fixture::new(DIRECTOR_MANIFEST);

    let result = fx
        .director
        .deploy(&config(), &infra(), b"{}".to_vec(), b"existing: value\n".to_vec(), false)
        .await;

    result.outcome.unwrap();
    let creds = String::from_utf8(result.creds).unwrap();
    assert!(creds.starts_with("existing: value\n"));
}

#[tokio::test]
async fn test_failed_create_env_still_returns_state() {
    let fx = Fixture::new(DIRECTOR_MANIFEST);
    std::fs::write(fx.path("fail-create-env"), "").unwrap();

    let result = fx
        .director
        .deploy(&config(), &infra(), b"old-state".to_vec(), Vec::new(), false)
        .await;

    let err = result.outcome.unwrap_err();
    assert!(err.to_string().contains("bosh create-env failed"));
    assert_eq!(fx.calls().len(), 1);
    assert_eq!(result.state, b"{\"current_vm_cid\":\"i-director\"}\n");
    assert_eq!(result.creds, b"admin_password: generated\n");
}

#[tokio::test]
async fn test_unbound_variable_stops_before_bosh_runs() {
    let fx = Fixture::new("name: bosh\nkey: ((not_provided))\n");

    let result = fx
        .director
        .deploy(&config(), &infra(), b"old-state".to_vec(), b"old-creds".to_vec(), false)
        .await;

    let err = result.outcome.unwrap_err();
    assert!(err.to_string().ends_with("uses variables that are not provided: not_provided"));
    assert!(fx.calls().is_empty());
    assert_eq!(result.state, b"old-state");
    assert_eq!(result.creds, b"old-creds");
}

#[tokio::test]
async fn test_detached_deploy_returns_once_task_starts() {
    let fx = Fixture::new(DIRECTOR_MANIFEST);
    std::fs::write(fx.path("slow-deploy"), "").unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(15),
        fx.director.deploy(&config(), &infra(), Vec::new(), Vec::new(), true),
    )
    .await
    .expect("detached deploy should not wait for bosh to exit");

    result.outcome.unwrap();
    assert!(String::from_utf8(result.creds).unwrap().contains("atc_password"));

    let printed = fx.terminal.stdout();
    assert!(printed.contains("Task 7 | 10:00:00 | Preparing deployment"));
    assert!(printed.ends_with("Task started, detaching output\n"));
}

#[tokio::test]
async fn test_gcp_is_not_supported() {
    let fx = Fixture::new(DIRECTOR_MANIFEST);
    let config = ConfigView::from(Config {
        iaas: Some(Iaas::Gcp),
        ..Default::default()
    });

    let result = fx
        .director
        .deploy(&config, &infra(), Vec::new(), Vec::new(), false)
        .await;

    assert_eq!(
        result.outcome.unwrap_err().to_string(),
        "bosh: director deploys are not supported on GCP"
    );
    assert!(fx.calls().is_empty());
}

#[tokio::test]
async fn test_instances() {
    let fx = Fixture::new(DIRECTOR_MANIFEST);

    let instances = fx.director.instances(&config(), &infra()).await.unwrap();

    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].name, "web/1");
    assert!(fx.calls()[0].contains("--deployment concourse instances --json"));
}

#[tokio::test]
async fn test_locks_and_recreate() {
    let fx = Fixture::new(DIRECTOR_MANIFEST);

    let locks = fx.director.locks(&config(), &infra()).await.unwrap();
    fx.director.recreate(&config(), &infra()).await.unwrap();

    assert!(String::from_utf8(locks).unwrap().contains("concourse"));
    let calls = fx.calls();
    assert_eq!(calls[0], "https://52.0.0.6 --non-interactive locks --json");
    assert_eq!(calls[1], "https://52.0.0.6 --non-interactive --deployment concourse recreate");
}

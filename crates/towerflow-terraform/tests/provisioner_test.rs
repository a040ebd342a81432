//! Drives TerraformCli against a stand-in terraform script

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use towerflow_core::{AwsInputVars, Provisioner, TerraformInputs, outputs};
use towerflow_terraform::{StateBackend, TerraformCli};

const FAKE_TERRAFORM: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/calls.log"
for arg in "$@"; do
  case "$arg" in
    -var-file=*) cp "${arg#-var-file=}" "$(dirname "$0")/last-vars.json" ;;
  esac
done
case "$2" in
  output) echo '{"director_public_ip":{"sensitive":false,"type":"string","value":"52.0.0.6"},"bosh_db_port":{"value":5432}}' ;;
  apply) [ -f "$(dirname "$0")/fail-apply" ] && { echo "Error: boom" >&2; exit 1; } ;;
esac
exit 0
"#;

fn setup(module: &str) -> (tempfile::TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("terraform");
    std::fs::write(&bin, FAKE_TERRAFORM).unwrap();
    std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

    let module_dir = dir.path().join("module");
    std::fs::create_dir(&module_dir).unwrap();
    std::fs::write(module_dir.join("variables.tf"), module).unwrap();
    (dir, bin, module_dir)
}

fn calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn inputs() -> TerraformInputs {
    TerraformInputs::Aws(AwsInputVars {
        config_bucket: "control-tower-ci-eu-west-1-config".to_string(),
        region: "eu-west-1".to_string(),
        deployment: "control-tower-ci".to_string(),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_apply_inits_then_applies_with_var_file() {
    let (dir, bin, module_dir) = setup("variable \"region\" {}\nvariable \"deployment\" {}\n");
    let cli = TerraformCli::new(&bin, &module_dir, StateBackend::S3);

    cli.apply(&inputs()).await.unwrap();

    let calls = calls(dir.path());
    assert_eq!(calls.len(), 2);
    assert!(calls[0].starts_with(&format!("-chdir={} init -input=false", module_dir.display())));
    assert!(calls[0].contains("-backend-config=bucket=control-tower-ci-eu-west-1-config"));
    assert!(calls[1].contains("apply -auto-approve -input=false -var-file="));

    let vars: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("last-vars.json")).unwrap()).unwrap();
    assert_eq!(vars["deployment"], "control-tower-ci");
    assert_eq!(vars["region"], "eu-west-1");
}

#[tokio::test]
async fn test_missing_variable_stops_before_terraform_runs() {
    let (dir, bin, module_dir) = setup("variable \"region\" {}\nvariable \"not_provided\" {}\n");
    let cli = TerraformCli::new(&bin, &module_dir, StateBackend::S3);

    let err = cli.apply(&inputs()).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "terraform module requires variables that are not provided: not_provided"
    );
    assert!(calls(dir.path()).is_empty());
}

#[tokio::test]
async fn test_build_output_parses_values() {
    let (_dir, bin, module_dir) = setup("");
    let cli = TerraformCli::new(&bin, &module_dir, StateBackend::S3);

    let out = cli.build_output(&inputs()).await.unwrap();

    assert_eq!(out.get(outputs::DIRECTOR_PUBLIC_IP).unwrap(), "52.0.0.6");
    assert_eq!(out.get(outputs::BOSH_DB_PORT).unwrap(), "5432");
}

#[tokio::test]
async fn test_failed_apply_reports_stderr() {
    let (dir, bin, module_dir) = setup("");
    std::fs::write(dir.path().join("fail-apply"), "").unwrap();
    let cli = TerraformCli::new(&bin, &module_dir, StateBackend::S3);

    let err = cli.apply(&inputs()).await.unwrap_err();

    assert!(err.to_string().contains("terraform apply failed: Error: boom"));
}

#[tokio::test]
async fn test_local_backend_creates_state_dir() {
    let (dir, bin, module_dir) = setup("");
    let state = dir.path().join("state");
    let cli = TerraformCli::new(&bin, &module_dir, StateBackend::Local(state.clone()));

    cli.build_output(&inputs()).await.unwrap();

    assert!(state.join("control-tower-ci-eu-west-1-config").is_dir());
}

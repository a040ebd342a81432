//! Manifest directory layout and static checks
//!
//! ```text
//! <manifest dir>/
//!   director/manifest.yml          director manifest for create-env
//!   director/external-ip.yml
//!   director/dependencies.json     bosh, bpm, cpi and stemcell releases
//!   director/<iaas>/cpi.yml
//!   director/<iaas>/custom-ops.yml
//!   director/<iaas>/cloud-config.yml   tera template
//!   director/<iaas>/db-ca.pem
//!   concourse/manifest.yml
//!   concourse/versions-<iaas>.json
//!   concourse/shas-<iaas>.json
//!   concourse/grafana_dashboard.yml
//!   concourse/ops/*.yml
//! ```

use crate::error::{DirectorError, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use towerflow_cloud::Iaas;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\(\s*!?([A-Za-z0-9_\-/.:]+)\s*\)\)").unwrap());

const STEMCELL_VERSION_PATH: &str = "/stemcells/alias=xenial/version";

/// Optional ops files applied to the CI deployment
pub mod ops {
    pub const GITHUB_AUTH: &str = "github-auth.yml";
    pub const MICROSOFT_AUTH: &str = "microsoft-auth.yml";
    pub const BITBUCKET_AUTH: &str = "bitbucket-auth.yml";
    pub const EPHEMERAL_WORKERS: &str = "ephemeral-workers.yml";
    pub const EXTRA_TAGS: &str = "extra_tags.yml";
}

/// A downloadable release or stemcell
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Resource {
    pub url: String,
    pub version: String,
    pub sha1: String,
}

/// Releases the director itself is built from, keyed by name
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Dependencies(BTreeMap<String, Resource>);

impl Dependencies {
    pub fn get(&self, name: &str) -> Result<&Resource> {
        self.0
            .get(name)
            .ok_or_else(|| DirectorError::ReleaseNotFound(name.to_string()))
    }
}

#[derive(Deserialize)]
struct VersionOp {
    path: String,
    #[serde(default)]
    value: serde_json::Value,
}

/// Paths of every template the director client uses
#[derive(Debug, Clone)]
pub struct ManifestSet {
    root: PathBuf,
}

impl ManifestSet {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn director_manifest(&self) -> PathBuf {
        self.root.join("director").join("manifest.yml")
    }

    /// Ops files applied to the director manifest, in order
    pub fn director_ops(&self, iaas: Iaas) -> Vec<PathBuf> {
        let director = self.root.join("director");
        vec![
            director.join(iaas.slug()).join("cpi.yml"),
            director.join("external-ip.yml"),
            director.join(iaas.slug()).join("custom-ops.yml"),
        ]
    }

    pub fn dependencies(&self) -> PathBuf {
        self.root.join("director").join("dependencies.json")
    }

    pub fn cloud_config(&self, iaas: Iaas) -> PathBuf {
        self.root.join("director").join(iaas.slug()).join("cloud-config.yml")
    }

    pub fn db_ca_cert(&self, iaas: Iaas) -> PathBuf {
        self.root.join("director").join(iaas.slug()).join("db-ca.pem")
    }

    pub fn concourse_manifest(&self) -> PathBuf {
        self.root.join("concourse").join("manifest.yml")
    }

    pub fn concourse_versions(&self, iaas: Iaas) -> PathBuf {
        self.root
            .join("concourse")
            .join(format!("versions-{}.json", iaas.slug()))
    }

    pub fn concourse_shas(&self, iaas: Iaas) -> PathBuf {
        self.root
            .join("concourse")
            .join(format!("shas-{}.json", iaas.slug()))
    }

    pub fn grafana_dashboard(&self) -> PathBuf {
        self.root.join("concourse").join("grafana_dashboard.yml")
    }

    pub fn concourse_ops(&self, name: &str) -> PathBuf {
        self.root.join("concourse").join("ops").join(name)
    }

    pub async fn load_dependencies(&self) -> Result<Dependencies> {
        let raw = read(&self.dependencies()).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Light stemcell URL for the CI deployment, from the xenial version
    /// pinned in the versions ops file
    pub async fn stemcell_url(&self, iaas: Iaas) -> Result<String> {
        let path = self.concourse_versions(iaas);
        let raw = read(&path).await?;
        stemcell_url(&raw, iaas).map_err(|e| match e {
            DirectorError::StemcellVersionNotFound(_) => {
                DirectorError::StemcellVersionNotFound(path.display().to_string())
            }
            other => other,
        })
    }
}

/// Read a manifest file, reporting a missing file by path
pub async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DirectorError::ManifestNotFound(path.display().to_string()),
        _ => DirectorError::IoError(e),
    })
}

pub fn stemcell_url(versions: &str, iaas: Iaas) -> Result<String> {
    let ops: Vec<VersionOp> = serde_json::from_str(versions)?;
    let version = ops
        .iter()
        .filter(|op| op.path == STEMCELL_VERSION_PATH)
        .filter_map(|op| op.value.as_str())
        .next_back()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DirectorError::StemcellVersionNotFound("versions.json".to_string()))?;

    Ok(match iaas {
        Iaas::Aws => format!(
            "https://s3.amazonaws.com/bosh-aws-light-stemcells/{0}/light-bosh-stemcell-{0}-aws-xen-hvm-ubuntu-xenial-go_agent.tgz",
            version
        ),
        Iaas::Gcp => format!(
            "https://s3.amazonaws.com/bosh-gce-light-stemcells/{0}/light-bosh-stemcell-{0}-google-kvm-ubuntu-xenial-go_agent.tgz",
            version
        ),
    })
}

/// Top-level names of every `((placeholder))` in `source`
pub fn placeholders(source: &str) -> BTreeSet<String> {
    PLACEHOLDER_RE
        .captures_iter(source)
        .filter_map(|cap| cap.get(1))
        .filter_map(|m| {
            let name = m.as_str().rsplit('/').next()?;
            name.split(['.', ':']).next().map(str::to_string)
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Names the director generates itself: entries of a manifest's
/// `variables:` block, or ops that append to it
pub fn declared_variables(source: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let Ok(doc) = serde_yaml::from_str::<serde_yaml::Value>(source) else {
        return names;
    };

    let name_of = |v: &serde_yaml::Value| v.get("name").and_then(|n| n.as_str()).map(str::to_string);

    if let Some(vars) = doc.get("variables").and_then(|v| v.as_sequence()) {
        names.extend(vars.iter().filter_map(name_of));
    }
    if let Some(ops) = doc.as_sequence() {
        for op in ops {
            let appends = op
                .get("path")
                .and_then(|p| p.as_str())
                .is_some_and(|p| p.starts_with("/variables/"));
            if appends {
                names.extend(op.get("value").and_then(name_of));
            }
        }
    }
    names
}

/// Fail when the combined documents use a variable that is neither
/// provided nor generated by the director
pub fn check_bound(manifest: &str, sources: &[String], provided: &BTreeSet<String>) -> Result<()> {
    let mut used = BTreeSet::new();
    let mut declared = BTreeSet::new();
    for source in sources {
        used.extend(placeholders(source));
        declared.extend(declared_variables(source));
    }

    let missing: Vec<String> = used
        .into_iter()
        .filter(|name| !provided.contains(name) && !declared.contains(name))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DirectorError::UnboundVariables {
            manifest: manifest.to_string(),
            names: missing.join(", "),
        })
    }
}

/// Top-level keys of a serialized vars document
pub fn provided_keys(vars: &serde_yaml::Value) -> BTreeSet<String> {
    vars.as_mapping()
        .map(|m| {
            m.keys()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSIONS: &str = r#"[
        {"type": "replace", "path": "/releases/name=concourse/version", "value": "7.4.0"},
        {"type": "replace", "path": "/stemcells/alias=xenial/version", "value": "621.125"}
    ]"#;

    #[test]
    fn test_stemcell_url_from_versions() {
        let url = stemcell_url(VERSIONS, Iaas::Aws).unwrap();
        assert_eq!(
            url,
            "https://s3.amazonaws.com/bosh-aws-light-stemcells/621.125/light-bosh-stemcell-621.125-aws-xen-hvm-ubuntu-xenial-go_agent.tgz"
        );
    }

    #[test]
    fn test_stemcell_version_missing() {
        let err = stemcell_url(r#"[{"path": "/releases/name=x/version", "value": "1"}]"#, Iaas::Aws)
            .unwrap_err();
        assert_eq!(err.to_string(), "did not find stemcell version in versions.json");
    }

    #[test]
    fn test_placeholders_use_top_level_name() {
        let names = placeholders(
            "cert: ((director_ssl.certificate))\nip: (( internal_ip ))\npw: ((/bosh/admin_password))\n",
        );
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["admin_password", "director_ssl", "internal_ip"]
        );
    }

    #[test]
    fn test_declared_variables_from_manifest_and_ops() {
        let manifest = "variables:\n- name: nats_password\n  type: password\n";
        let ops = "- type: replace\n  path: /variables/-\n  value:\n    name: blobstore_password\n    type: password\n";
        assert!(declared_variables(manifest).contains("nats_password"));
        assert!(declared_variables(ops).contains("blobstore_password"));
    }

    #[test]
    fn test_check_bound_reports_missing() {
        let manifest = "name: ((deployment_name))\npw: ((generated))\nx: ((missing_one))\nvariables:\n- name: generated\n";
        let provided: BTreeSet<String> = ["deployment_name".to_string()].into();

        let err = check_bound("concourse/manifest.yml", &[manifest.to_string()], &provided).unwrap_err();
        assert_eq!(
            err.to_string(),
            "concourse/manifest.yml uses variables that are not provided: missing_one"
        );

        let provided: BTreeSet<String> = ["deployment_name".to_string(), "missing_one".to_string()].into();
        check_bound("concourse/manifest.yml", &[manifest.to_string()], &provided).unwrap();
    }

    #[test]
    fn test_layout() {
        let set = ManifestSet::new("/m");
        assert_eq!(set.cloud_config(Iaas::Aws), PathBuf::from("/m/director/aws/cloud-config.yml"));
        assert_eq!(set.concourse_shas(Iaas::Aws), PathBuf::from("/m/concourse/shas-aws.json"));
        assert_eq!(
            set.concourse_ops(ops::EXTRA_TAGS),
            PathBuf::from("/m/concourse/ops/extra_tags.yml")
        );
    }

    #[tokio::test]
    async fn test_missing_manifest_names_path() {
        let set = ManifestSet::new("/nonexistent");
        let err = set.load_dependencies().await.unwrap_err();
        assert!(matches!(err, DirectorError::ManifestNotFound(ref p) if p.ends_with("dependencies.json")));
    }
}

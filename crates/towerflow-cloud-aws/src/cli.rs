//! aws CLI wrapper
//!
//! Every call runs `aws --region <region> --output json ...` and parses the
//! JSON document the CLI prints.

use crate::error::{AwsError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// aws CLI wrapper
pub struct AwsCli {
    binary: PathBuf,
    region: String,
}

impl AwsCli {
    pub fn new(binary: impl Into<PathBuf>, region: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Run an aws command and return stdout
    pub async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--region").arg(&self.region);
        cmd.arg("--output").arg("json");
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(
            "Running: {} --region {} {}",
            self.binary.display(),
            self.region,
            args.join(" ")
        );

        let output = cmd.output().await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => AwsError::CliNotFound,
            _ => AwsError::IoError(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AwsError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a command and parse its JSON output
    pub async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let output = self.run_command(args).await?;
        if output.trim().is_empty() {
            return Ok(serde_json::from_str("{}")?);
        }
        Ok(serde_json::from_str(&output)?)
    }

    /// Like [`run_command`](Self::run_command), but a 404 from the API
    /// becomes `Ok(false)`
    pub async fn exists(&self, args: &[&str]) -> Result<bool> {
        match self.run_command(args).await {
            Ok(_) => Ok(true),
            Err(AwsError::CommandFailed(stderr)) if is_not_found(&stderr) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// A value from the CLI's own configuration. `configure get` exits
    /// non-zero when the key is not set.
    pub async fn configure_get(&self, key: &str) -> Result<Option<String>> {
        match self.run_command(&["configure", "get", key]).await {
            Ok(value) => Ok(Some(value.trim().to_string()).filter(|v| !v.is_empty())),
            Err(AwsError::CommandFailed(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // --- ec2 ---

    pub async fn describe_security_group(&self, group_id: &str) -> Result<SecurityGroup> {
        let output: DescribeSecurityGroups = self
            .run_json(&["ec2", "describe-security-groups", "--group-ids", group_id])
            .await?;
        output
            .security_groups
            .into_iter()
            .next()
            .ok_or_else(|| AwsError::SecurityGroupNotFound(group_id.to_string()))
    }

    pub async fn describe_instances_in_vpc(&self, vpc_id: &str) -> Result<Vec<Ec2Instance>> {
        let filter = format!("Name=vpc-id,Values={}", vpc_id);
        let output: DescribeInstances = self
            .run_json(&["ec2", "describe-instances", "--filters", &filter])
            .await?;
        Ok(output.instances())
    }

    pub async fn terminate_instances(&self, instance_ids: &[String]) -> Result<()> {
        let mut args = vec!["ec2", "terminate-instances", "--instance-ids"];
        args.extend(instance_ids.iter().map(String::as_str));
        self.run_command(&args).await?;
        Ok(())
    }

    /// Block until every instance reports `terminated`
    pub async fn wait_instances_terminated(&self, instance_ids: &[String]) -> Result<()> {
        let mut args = vec!["ec2", "wait", "instance-terminated", "--instance-ids"];
        args.extend(instance_ids.iter().map(String::as_str));
        self.run_command(&args).await?;
        Ok(())
    }

    /// Ids among `volume_ids` whose status is one of `statuses`
    pub async fn volumes_with_status(
        &self,
        volume_ids: &[String],
        statuses: &[&str],
    ) -> Result<Vec<String>> {
        let status_filter = format!("Name=status,Values={}", statuses.join(","));
        let id_filter = format!("Name=volume-id,Values={}", volume_ids.join(","));
        let output: DescribeVolumes = self
            .run_json(&[
                "ec2",
                "describe-volumes",
                "--filters",
                &status_filter,
                &id_filter,
            ])
            .await?;
        Ok(output.volumes.into_iter().map(|v| v.volume_id).collect())
    }

    pub async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        self.run_command(&["ec2", "delete-volume", "--volume-id", volume_id])
            .await?;
        Ok(())
    }

    // --- route53 ---

    pub async fn list_hosted_zones(&self) -> Result<Vec<Route53Zone>> {
        let output: ListHostedZones = self.run_json(&["route53", "list-hosted-zones"]).await?;
        Ok(output.hosted_zones)
    }

    // --- s3api ---

    pub async fn head_bucket(&self, bucket: &str) -> Result<bool> {
        self.exists(&["s3api", "head-bucket", "--bucket", bucket])
            .await
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let constraint = format!("LocationConstraint={}", self.region);
        let mut args = vec!["s3api", "create-bucket", "--bucket", bucket];
        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            args.push("--create-bucket-configuration");
            args.push(&constraint);
        }
        self.run_command(&args).await?;

        self.run_command(&[
            "s3api",
            "put-bucket-versioning",
            "--bucket",
            bucket,
            "--versioning-configuration",
            "Status=Enabled",
        ])
        .await?;
        Ok(())
    }

    pub async fn head_object(&self, bucket: &str, key: &str) -> Result<bool> {
        self.exists(&["s3api", "head-object", "--bucket", bucket, "--key", key])
            .await
    }

    /// Download an object into `target`
    pub async fn get_object(&self, bucket: &str, key: &str, target: &Path) -> Result<()> {
        let target = target.to_string_lossy();
        match self
            .run_command(&["s3api", "get-object", "--bucket", bucket, "--key", key, &target])
            .await
        {
            Err(AwsError::CommandFailed(stderr)) if is_not_found(&stderr) => Err(
                AwsError::NotFound(format!("s3://{}/{}", bucket, key)),
            ),
            other => other.map(|_| ()),
        }
    }

    /// Upload `source` as an object
    pub async fn put_object(&self, bucket: &str, key: &str, source: &Path) -> Result<()> {
        let source = source.to_string_lossy();
        self.run_command(&[
            "s3api", "put-object", "--bucket", bucket, "--key", key, "--body", &source,
        ])
        .await?;
        Ok(())
    }

    pub async fn list_object_versions(&self, bucket: &str) -> Result<Vec<ObjectVersion>> {
        let output: ListObjectVersions = self
            .run_json(&["s3api", "list-object-versions", "--bucket", bucket])
            .await?;
        Ok(output
            .versions
            .into_iter()
            .chain(output.delete_markers)
            .collect())
    }

    pub async fn delete_object_version(&self, bucket: &str, version: &ObjectVersion) -> Result<()> {
        self.run_command(&[
            "s3api",
            "delete-object",
            "--bucket",
            bucket,
            "--key",
            &version.key,
            "--version-id",
            &version.version_id,
        ])
        .await?;
        Ok(())
    }

    pub async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.run_command(&["s3api", "delete-bucket", "--bucket", bucket])
            .await?;
        Ok(())
    }
}

/// Whether CLI stderr reports a missing bucket or key
pub fn is_not_found(stderr: &str) -> bool {
    stderr.contains("(404)")
        || stderr.contains("Not Found")
        || stderr.contains("NoSuchKey")
        || stderr.contains("NoSuchBucket")
}

// --- JSON documents printed by the CLI ---

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecurityGroups {
    #[serde(default)]
    security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroup {
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub ip_permissions: Vec<IpPermission>,
}

/// One ingress rule of a security group
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpPermission {
    #[serde(default)]
    pub ip_protocol: String,
    pub from_port: Option<i64>,
    pub to_port: Option<i64>,
    #[serde(default)]
    pub ip_ranges: Vec<IpRange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpRange {
    pub cidr_ip: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstances {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

impl DescribeInstances {
    fn instances(self) -> Vec<Ec2Instance> {
        self.reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Ec2Instance>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ec2Instance {
    pub instance_id: String,
    #[serde(default)]
    pub block_device_mappings: Vec<BlockDeviceMapping>,
}

impl Ec2Instance {
    /// EBS volumes attached to the instance
    pub fn volume_ids(&self) -> impl Iterator<Item = &str> {
        self.block_device_mappings
            .iter()
            .filter_map(|m| m.ebs.as_ref())
            .map(|ebs| ebs.volume_id.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockDeviceMapping {
    pub ebs: Option<EbsDevice>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EbsDevice {
    pub volume_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeVolumes {
    #[serde(default)]
    volumes: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Volume {
    volume_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListHostedZones {
    #[serde(default)]
    hosted_zones: Vec<Route53Zone>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Route53Zone {
    /// `/hostedzone/<id>`
    pub id: String,
    pub name: String,
}

impl Route53Zone {
    pub fn short_id(&self) -> &str {
        self.id.trim_start_matches("/hostedzone/")
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListObjectVersions {
    #[serde(default)]
    versions: Vec<ObjectVersion>,
    #[serde(default)]
    delete_markers: Vec<ObjectVersion>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectVersion {
    pub key: String,
    pub version_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_describe_instances() {
        let json = r#"{
            "Reservations": [
                {"Instances": [
                    {"InstanceId": "i-1", "BlockDeviceMappings": [
                        {"DeviceName": "/dev/xvda", "Ebs": {"VolumeId": "vol-1", "Status": "attached"}},
                        {"DeviceName": "/dev/sdb", "Ebs": {"VolumeId": "vol-2"}}
                    ]},
                    {"InstanceId": "i-2"}
                ]},
                {"Instances": [{"InstanceId": "i-3", "BlockDeviceMappings": [{"DeviceName": "/dev/sdc"}]}]}
            ]
        }"#;
        let instances = serde_json::from_str::<DescribeInstances>(json)
            .unwrap()
            .instances();

        let ids: Vec<_> = instances.iter().map(|i| i.instance_id.as_str()).collect();
        assert_eq!(ids, vec!["i-1", "i-2", "i-3"]);
        let volumes: Vec<_> = instances.iter().flat_map(|i| i.volume_ids()).collect();
        assert_eq!(volumes, vec!["vol-1", "vol-2"]);
    }

    #[test]
    fn test_parse_security_group() {
        let json = r#"{"SecurityGroups": [{
            "GroupId": "sg-1",
            "IpPermissions": [
                {"IpProtocol": "tcp", "FromPort": 22, "ToPort": 22, "IpRanges": [{"CidrIp": "1.2.3.4/32"}]},
                {"IpProtocol": "-1", "IpRanges": [], "Ipv6Ranges": []}
            ]
        }]}"#;
        let output: DescribeSecurityGroups = serde_json::from_str(json).unwrap();
        let group = &output.security_groups[0];
        assert_eq!(group.group_id, "sg-1");
        assert_eq!(group.ip_permissions[0].from_port, Some(22));
        assert_eq!(group.ip_permissions[1].ip_protocol, "-1");
        assert!(group.ip_permissions[1].from_port.is_none());
    }

    #[test]
    fn test_hosted_zone_short_id() {
        let output: ListHostedZones = serde_json::from_str(
            r#"{"HostedZones": [{"Id": "/hostedzone/Z123", "Name": "example.com.", "CallerReference": "x"}]}"#,
        )
        .unwrap();
        assert_eq!(output.hosted_zones[0].short_id(), "Z123");
    }

    #[test]
    fn test_object_versions_include_delete_markers() {
        let output: ListObjectVersions = serde_json::from_str(
            r#"{
                "Versions": [{"Key": "config.json", "VersionId": "v2"}],
                "DeleteMarkers": [{"Key": "old.json", "VersionId": "v1"}]
            }"#,
        )
        .unwrap();
        assert_eq!(output.versions.len() + output.delete_markers.len(), 2);
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found(
            "An error occurred (404) when calling the HeadObject operation: Not Found"
        ));
        assert!(is_not_found("An error occurred (NoSuchBucket)"));
        assert!(!is_not_found("An error occurred (403) when calling the HeadBucket operation: Forbidden"));
    }
}

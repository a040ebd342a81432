//! IAAS kinds supported by TowerFlow

use crate::error::CloudError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Infrastructure-as-a-service a deployment lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Iaas {
    #[serde(rename = "AWS")]
    Aws,
    #[serde(rename = "GCP")]
    Gcp,
}

/// Database sizes accepted by `--db-size`
pub const DB_SIZES: &[&str] = &["small", "medium", "large", "xlarge", "2xlarge", "4xlarge"];

impl Iaas {
    /// Maps a t-shirt database size onto the provider's instance class
    pub fn db_type(&self, size: &str) -> Option<&'static str> {
        let class = match (self, size) {
            (Iaas::Aws, "small") => "db.t3.small",
            (Iaas::Aws, "medium") => "db.t3.medium",
            (Iaas::Aws, "large") => "db.m4.large",
            (Iaas::Aws, "xlarge") => "db.m4.xlarge",
            (Iaas::Aws, "2xlarge") => "db.m4.2xlarge",
            (Iaas::Aws, "4xlarge") => "db.m4.4xlarge",
            (Iaas::Gcp, "small") => "db-g1-small",
            (Iaas::Gcp, "medium") => "db-custom-2-4096",
            (Iaas::Gcp, "large") => "db-custom-2-8192",
            (Iaas::Gcp, "xlarge") => "db-custom-4-16384",
            (Iaas::Gcp, "2xlarge") => "db-custom-8-32768",
            (Iaas::Gcp, "4xlarge") => "db-custom-16-65536",
            _ => return None,
        };
        Some(class)
    }

    /// SSH user on the director's gateway
    pub fn gateway_user(&self) -> &'static str {
        match self {
            Iaas::Aws => "vcap",
            Iaas::Gcp => "jumpbox",
        }
    }

    /// Lower-case name used for CLI flags and template directories
    pub fn slug(&self) -> &'static str {
        match self {
            Iaas::Aws => "aws",
            Iaas::Gcp => "gcp",
        }
    }
}

impl fmt::Display for Iaas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Iaas::Aws => write!(f, "AWS"),
            Iaas::Gcp => write!(f, "GCP"),
        }
    }
}

impl FromStr for Iaas {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Ok(Iaas::Aws),
            "gcp" => Ok(Iaas::Gcp),
            other => Err(CloudError::UnsupportedIaas(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_type_table() {
        assert_eq!(Iaas::Aws.db_type("small"), Some("db.t3.small"));
        assert_eq!(Iaas::Aws.db_type("4xlarge"), Some("db.m4.4xlarge"));
        assert_eq!(Iaas::Gcp.db_type("small"), Some("db-g1-small"));
        assert_eq!(Iaas::Aws.db_type("huge"), None);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("AWS".parse::<Iaas>().unwrap(), Iaas::Aws);
        assert_eq!("gcp".parse::<Iaas>().unwrap(), Iaas::Gcp);
        assert!("azure".parse::<Iaas>().is_err());
    }

    #[test]
    fn test_serde_uses_upper_case_names() {
        let json = serde_json::to_string(&Iaas::Gcp).unwrap();
        assert_eq!(json, "\"GCP\"");
        assert_eq!(Iaas::Aws.to_string(), "AWS");
    }
}

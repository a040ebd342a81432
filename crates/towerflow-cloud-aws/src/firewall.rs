//! Director firewall inspection

use crate::cli::IpPermission;
use crate::error::{AwsError, Result};
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Ports the operator needs to reach on the director
pub const DIRECTOR_PORTS: [i64; 3] = [22, 6868, 25555];

/// Whether `ip` may reach the director through the given ingress rules.
///
/// An "all traffic" rule (`-1`) covering the address grants access on its
/// own. Otherwise every port in [`DIRECTOR_PORTS`] must be opened by some
/// rule covering the address, either directly or through a port range.
pub fn ip_has_director_access(ip: &str, permissions: &[IpPermission]) -> Result<bool> {
    let ip: IpAddr = ip
        .trim()
        .parse()
        .map_err(|_| AwsError::InvalidIp(ip.to_string()))?;

    let mut open = [false; DIRECTOR_PORTS.len()];

    for permission in permissions {
        for range in &permission.ip_ranges {
            let cidr: IpNetwork = range
                .cidr_ip
                .parse()
                .map_err(|_| AwsError::InvalidCidr(range.cidr_ip.clone()))?;
            if !cidr.contains(ip) {
                continue;
            }

            if permission.ip_protocol == "-1" {
                return Ok(true);
            }

            let (Some(from), Some(to)) = (permission.from_port, permission.to_port) else {
                continue;
            };
            for (port, flag) in DIRECTOR_PORTS.iter().zip(open.iter_mut()) {
                if (from..=to).contains(port) {
                    *flag = true;
                }
            }
        }
    }

    Ok(open.iter().all(|flag| *flag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::IpRange;

    fn rule(protocol: &str, ports: Option<(i64, i64)>, cidrs: &[&str]) -> IpPermission {
        IpPermission {
            ip_protocol: protocol.to_string(),
            from_port: ports.map(|p| p.0),
            to_port: ports.map(|p| p.1),
            ip_ranges: cidrs
                .iter()
                .map(|c| IpRange {
                    cidr_ip: c.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_all_three_ports_required() {
        let rules = vec![
            rule("tcp", Some((22, 22)), &["1.2.3.4/32"]),
            rule("tcp", Some((6868, 6868)), &["1.2.3.0/24"]),
        ];
        assert!(!ip_has_director_access("1.2.3.4", &rules).unwrap());

        let mut rules = rules;
        rules.push(rule("tcp", Some((25555, 25555)), &["0.0.0.0/0"]));
        assert!(ip_has_director_access("1.2.3.4", &rules).unwrap());
    }

    #[test]
    fn test_port_range_covers_ports() {
        let rules = vec![rule("tcp", Some((0, 65535)), &["10.0.0.0/8"])];
        assert!(ip_has_director_access("10.1.2.3", &rules).unwrap());
        assert!(!ip_has_director_access("11.1.2.3", &rules).unwrap());
    }

    #[test]
    fn test_all_traffic_rule() {
        let rules = vec![rule("-1", None, &["5.6.7.8/32"])];
        assert!(ip_has_director_access("5.6.7.8", &rules).unwrap());
        assert!(!ip_has_director_access("5.6.7.9", &rules).unwrap());
    }

    #[test]
    fn test_rule_for_other_address_does_not_count() {
        let rules = vec![
            rule("tcp", Some((22, 22)), &["9.9.9.9/32"]),
            rule("tcp", Some((6868, 25555)), &["1.2.3.4/32"]),
        ];
        assert!(!ip_has_director_access("1.2.3.4", &rules).unwrap());
    }

    #[test]
    fn test_bad_input() {
        assert!(matches!(
            ip_has_director_access("nope", &[]),
            Err(AwsError::InvalidIp(_))
        ));
        let rules = vec![rule("tcp", Some((22, 22)), &["garbage"])];
        assert!(matches!(
            ip_has_director_access("1.2.3.4", &rules),
            Err(AwsError::InvalidCidr(_))
        ));
    }
}

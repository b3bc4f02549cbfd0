//! Aggregate views derived from the consolidated table.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use tracing::{info, instrument};

use crate::model::{ConsolidatedRecord, UNASSIGNED};

/// Prefix length used to group addresses into subnets.
pub const SUMMARY_PREFIX_LEN: u8 = 24;

/// Distinct-IP counts for one inferred subnet, aligned with
/// [`DeptSubnetSummary::departments`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetCounts {
    pub subnet: String,
    pub counts: Vec<usize>,
    pub total: usize,
}

/// Subnet × department matrix of distinct IP counts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeptSubnetSummary {
    /// Department columns, sorted.
    pub departments: Vec<String>,
    /// One row per subnet, sorted by subnet text.
    pub rows: Vec<SubnetCounts>,
}

impl DeptSubnetSummary {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Count for a `(subnet, department)` cell, zero when absent.
    pub fn count(&self, subnet: &str, department: &str) -> usize {
        let Some(column) = self.departments.iter().position(|d| d == department) else {
            return 0;
        };
        self.rows
            .iter()
            .find(|row| row.subnet == subnet)
            .and_then(|row| row.counts.get(column).copied())
            .unwrap_or(0)
    }
}

/// The `/24` network containing `ip`, or `None` when it is not an address.
pub fn inferred_subnet(ip: &str) -> Option<String> {
    let address = IpAddr::from_str(ip.trim()).ok()?;
    let network = IpNet::new(address, SUMMARY_PREFIX_LEN).ok()?;
    Some(network.trunc().to_string())
}

/// Builds the department × subnet matrix. Rows without an IP or a
/// department, and unassigned rows, are left out.
#[instrument(level = "info", skip_all, fields(rows = records.len()))]
pub fn dept_subnet_summary(records: &[ConsolidatedRecord]) -> DeptSubnetSummary {
    let mut cells: BTreeMap<String, BTreeMap<&str, BTreeSet<&str>>> = BTreeMap::new();
    let mut departments: BTreeSet<&str> = BTreeSet::new();

    for record in records {
        if record.ip_address.is_empty() || record.department.is_empty() {
            continue;
        }
        if record.department == UNASSIGNED {
            continue;
        }
        let Some(subnet) = inferred_subnet(&record.ip_address) else {
            continue;
        };
        departments.insert(&record.department);
        cells
            .entry(subnet)
            .or_default()
            .entry(&record.department)
            .or_default()
            .insert(&record.ip_address);
    }

    if cells.is_empty() {
        info!("no valid subnets could be inferred from device IPs");
        return DeptSubnetSummary::default();
    }

    let rows = cells
        .into_iter()
        .map(|(subnet, by_dept)| {
            let counts: Vec<usize> = departments
                .iter()
                .map(|dept| by_dept.get(dept).map_or(0, BTreeSet::len))
                .collect();
            let total = counts.iter().sum();
            SubnetCounts {
                subnet,
                counts,
                total,
            }
        })
        .collect::<Vec<_>>();

    info!(
        subnets = rows.len(),
        departments = departments.len(),
        "department subnet summary generated"
    );
    DeptSubnetSummary {
        departments: departments.into_iter().map(str::to_string).collect(),
        rows,
    }
}

/// Addresses and hostnames seen for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAssets {
    pub user: String,
    /// Distinct, in order of first appearance.
    pub ips: Vec<String>,
    /// Distinct, in order of first appearance.
    pub hostnames: Vec<String>,
}

impl UserAssets {
    pub fn joined_ips(&self) -> String {
        self.ips.join(", ")
    }

    pub fn joined_hostnames(&self) -> String {
        self.hostnames.join(", ")
    }
}

/// Per-user reverse lookup, sorted by username.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserReverseLookup {
    pub users: Vec<UserAssets>,
}

impl UserReverseLookup {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn get(&self, user: &str) -> Option<&UserAssets> {
        self.users.iter().find(|assets| assets.user == user)
    }
}

/// Groups IPs and hostnames by every individual user named in a row.
#[instrument(level = "info", skip_all, fields(rows = records.len()))]
pub fn user_reverse_lookup(records: &[ConsolidatedRecord]) -> UserReverseLookup {
    let mut groups: BTreeMap<&str, (Vec<&str>, Vec<&str>)> = BTreeMap::new();

    for record in records {
        if record.user.is_empty() {
            continue;
        }
        for user in record.user.split(" || ").map(str::trim) {
            if user.is_empty() {
                continue;
            }
            let (ips, hostnames) = groups.entry(user).or_default();
            push_distinct(ips, &record.ip_address);
            push_distinct(hostnames, &record.hostname);
        }
    }

    if groups.is_empty() {
        info!("no valid user associations found for reverse-lookup");
    }

    UserReverseLookup {
        users: groups
            .into_iter()
            .map(|(user, (ips, hostnames))| UserAssets {
                user: user.to_string(),
                ips: ips.into_iter().map(str::to_string).collect(),
                hostnames: hostnames.into_iter().map(str::to_string).collect(),
            })
            .collect(),
    }
}

/// Blank values count as a distinct entry like any other.
fn push_distinct<'a>(values: &mut Vec<&'a str>, value: &'a str) {
    if !values.contains(&value) {
        values.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(dept: &str, ip: &str, user: &str, hostname: &str) -> ConsolidatedRecord {
        ConsolidatedRecord {
            department: dept.to_string(),
            ip_address: ip.to_string(),
            user: user.to_string(),
            hostname: hostname.to_string(),
            ..ConsolidatedRecord::default()
        }
    }

    #[test]
    fn matrix_counts_distinct_ips_per_subnet_and_department() {
        let records = vec![
            record("Sales", "10.0.1.5", "", ""),
            record("Sales", "10.0.1.5", "", ""),
            record("Sales", "10.0.1.6", "", ""),
            record("Ops", "10.0.1.7", "", ""),
            record("Ops", "10.0.2.1", "", ""),
            record(UNASSIGNED, "10.0.3.1", "", ""),
            record("Invalid IP", "bogus", "", ""),
            record("", "10.0.4.1", "", ""),
        ];
        let summary = dept_subnet_summary(&records);
        assert_eq!(summary.departments, vec!["Ops", "Sales"]);
        assert_eq!(summary.rows.len(), 2);
        assert_eq!(summary.count("10.0.1.0/24", "Sales"), 2);
        assert_eq!(summary.count("10.0.1.0/24", "Ops"), 1);
        assert_eq!(summary.count("10.0.2.0/24", "Sales"), 0);
        let totals: Vec<usize> = summary.rows.iter().map(|r| r.total).collect();
        assert_eq!(totals, vec![3, 1]);
    }

    #[test]
    fn ipv6_addresses_group_into_their_prefix() {
        assert_eq!(inferred_subnet("2001:db8::1").as_deref(), Some("2001:d00::/24"));
        assert_eq!(inferred_subnet("192.168.7.200").as_deref(), Some("192.168.7.0/24"));
        assert_eq!(inferred_subnet("nope"), None);
    }

    #[test]
    fn reverse_lookup_splits_multi_user_rows() {
        let records = vec![
            record("A", "10.0.0.1", "alice || bob", "ws-1"),
            record("A", "10.0.0.2", "alice", "ws-2"),
            record("A", "10.0.0.1", "alice", "ws-1"),
            record("A", "10.0.0.3", "", "ws-3"),
        ];
        let lookup = user_reverse_lookup(&records);
        assert_eq!(lookup.users.len(), 2);

        let alice = lookup.get("alice").expect("alice group");
        assert_eq!(alice.joined_ips(), "10.0.0.1, 10.0.0.2");
        assert_eq!(alice.joined_hostnames(), "ws-1, ws-2");

        let bob = lookup.get("bob").expect("bob group");
        assert_eq!(bob.joined_ips(), "10.0.0.1");
    }

    #[test]
    fn blank_hostnames_are_listed_once() {
        let records = vec![
            record("A", "10.0.0.1", "carol", "ws-1"),
            record("A", "10.0.0.2", "carol", ""),
            record("A", "10.0.0.3", "carol", ""),
            record("A", "10.0.0.4", "dave", ""),
        ];
        let lookup = user_reverse_lookup(&records);
        let carol = lookup.get("carol").expect("carol group");
        assert_eq!(carol.joined_ips(), "10.0.0.1, 10.0.0.2, 10.0.0.3");
        assert_eq!(carol.joined_hostnames(), "ws-1, ");
        assert_eq!(lookup.get("dave").map(UserAssets::joined_hostnames), Some(String::new()));
    }

    #[test]
    fn empty_input_gives_empty_views() {
        assert!(dept_subnet_summary(&[]).is_empty());
        assert!(user_reverse_lookup(&[]).is_empty());
    }
}

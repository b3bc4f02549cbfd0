//! Department resolution: an ordered chain of strategies, the last of which
//! is a longest-prefix subnet lookup.

use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use tracing::trace;

use crate::config::DepartmentMapping;
use crate::model::{CanonicalRow, DirectoryEntry, INVALID_IP, UNASSIGNED};

/// Resolves an IP literal to the department owning the most specific
/// matching range. Ties on prefix length keep the earliest entry.
pub fn department_for_ip(ip: &str, mapping: &DepartmentMapping) -> String {
    if ip.is_empty() {
        return UNASSIGNED.to_string();
    }
    let Ok(address) = IpAddr::from_str(ip) else {
        return INVALID_IP.to_string();
    };

    let mut best: Option<(&str, u8)> = None;
    for (range, dept) in mapping.iter() {
        if dept == UNASSIGNED {
            continue;
        }
        let Some(network) = parse_network(range) else {
            trace!(range, "skipping unparseable department range");
            continue;
        };
        if !network.contains(&address) {
            continue;
        }
        let prefix = network.prefix_len();
        if best.is_none_or(|(_, best_prefix)| prefix > best_prefix) {
            best = Some((dept, prefix));
        }
    }

    best.map(|(dept, _)| dept)
        .unwrap_or(UNASSIGNED)
        .to_string()
}

/// Parses a network in strict form: host bits must be zero. A bare address
/// is accepted as a single-host network.
pub fn parse_network(range: &str) -> Option<IpNet> {
    let range = range.trim();
    if let Ok(network) = IpNet::from_str(range) {
        return (network.trunc() == network).then_some(network);
    }
    IpAddr::from_str(range).ok().map(IpNet::from)
}

/// What a strategy sees of a row.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionInput<'a> {
    pub row: &'a CanonicalRow,
    pub directory: Option<&'a DirectoryEntry>,
}

/// One link of the resolution chain. `None` means "no opinion".
pub trait DepartmentStrategy {
    fn resolve(&self, input: &ResolutionInput<'_>) -> Option<String>;
}

/// Uses the department recorded in the user directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryDepartment;

impl DepartmentStrategy for DirectoryDepartment {
    fn resolve(&self, input: &ResolutionInput<'_>) -> Option<String> {
        input
            .directory
            .map(|entry| entry.department.trim())
            .filter(|dept| !dept.is_empty())
            .map(str::to_string)
    }
}

/// Uses the department the source reported alongside the device.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceDepartment;

impl DepartmentStrategy for SourceDepartment {
    fn resolve(&self, input: &ResolutionInput<'_>) -> Option<String> {
        let dept = input.row.department_from_source.trim();
        (!dept.is_empty()).then(|| dept.to_string())
    }
}

/// Looks the row's IP up in the configured subnet mapping.
#[derive(Debug, Clone, Default)]
pub struct SubnetDepartment {
    mapping: DepartmentMapping,
}

impl SubnetDepartment {
    pub fn new(mapping: DepartmentMapping) -> Self {
        Self { mapping }
    }
}

impl DepartmentStrategy for SubnetDepartment {
    fn resolve(&self, input: &ResolutionInput<'_>) -> Option<String> {
        Some(department_for_ip(&input.row.ip_address, &self.mapping))
    }
}

/// Tries each strategy in order and stops at the first answer.
pub struct DepartmentResolver {
    strategies: Vec<Box<dyn DepartmentStrategy>>,
}

impl DepartmentResolver {
    /// Directory, then source-reported, then subnet lookup.
    pub fn new(mapping: DepartmentMapping) -> Self {
        Self::with_strategies(vec![
            Box::new(DirectoryDepartment),
            Box::new(SourceDepartment),
            Box::new(SubnetDepartment::new(mapping)),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn DepartmentStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn resolve(&self, row: &CanonicalRow, directory: Option<&DirectoryEntry>) -> String {
        let input = ResolutionInput { row, directory };
        self.strategies
            .iter()
            .find_map(|strategy| strategy.resolve(&input))
            .unwrap_or_else(|| UNASSIGNED.to_string())
    }
}

impl std::fmt::Debug for DepartmentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepartmentResolver")
            .field("strategies", &self.strategies.len())
            .finish()
    }
}

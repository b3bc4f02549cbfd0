//! Builds the canonical per-IP table from every device source.

use std::collections::{HashSet, TryReserveError};

use tracing::{error, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::department::DepartmentResolver;
use crate::directory::UserDirectory;
use crate::mail::derive_mail;
use crate::model::{CanonicalRow, ConsolidatedRecord, NO_HEAD, SourceSet};
use crate::normalize::normalize_table;

/// Runs normalisation, enrichment, deduplication and sorting.
#[derive(Debug)]
pub struct Consolidator {
    config: PipelineConfig,
    resolver: DepartmentResolver,
}

impl Consolidator {
    pub fn new(config: PipelineConfig) -> Self {
        let resolver = DepartmentResolver::new(config.department_mapping.clone());
        Self { config, resolver }
    }

    /// Consolidates every device-bearing table in `sources`. User-only
    /// sources only feed the directory index.
    #[instrument(level = "info", skip_all, fields(sources = sources.iter().count()))]
    pub fn consolidate(&self, sources: &SourceSet) -> Vec<ConsolidatedRecord> {
        let mut rows: Vec<CanonicalRow> = Vec::new();
        for table in sources.device_tables() {
            info!(source = %table.name, records = table.len(), "processing device data");
            rows.extend(normalize_table(table));
        }
        if rows.is_empty() {
            info!("no device data to consolidate");
            return Vec::new();
        }

        let directory = UserDirectory::from_sources(sources);
        if let Some(domain) = &self.config.default_email_domain {
            info!(%domain, "deriving missing email addresses");
        }

        let records: Vec<ConsolidatedRecord> = rows
            .iter()
            .map(|row| self.enrich(row, &directory))
            .collect();

        let initial = records.len();
        let mut records = deduplicate(records);
        info!(dropped = initial - records.len(), "dropped duplicate rows");

        sort_records(&mut records);
        info!(rows = records.len(), "consolidated IP-per-row entries");
        records
    }

    /// Enriches one canonical row with department, head, mail and manager.
    pub fn enrich(&self, row: &CanonicalRow, directory: &UserDirectory) -> ConsolidatedRecord {
        let entry = directory.lookup(&row.primary_username);
        let department = self.resolver.resolve(row, entry);
        let department_head = self.department_head(&department);
        let mail = derive_mail(entry, self.config.default_email_domain.as_deref());

        ConsolidatedRecord {
            asset_id: row.asset_id.clone().unwrap_or_default(),
            department,
            department_head,
            ip_address: row.ip_address.clone(),
            hostname: row.hostname.clone().unwrap_or_default(),
            last_seen_device: row.last_seen_device.clone(),
            user: row.user.clone(),
            mail,
            manager_name: entry.map(|e| e.manager.clone()).unwrap_or_default(),
            source: row.source.clone(),
        }
    }

    /// Head of the first `||`-delimited component of `department`.
    pub fn department_head(&self, department: &str) -> String {
        let primary = department.split("||").next().unwrap_or_default().trim();
        self.config
            .department_heads
            .get(primary)
            .cloned()
            .unwrap_or_else(|| NO_HEAD.to_string())
    }
}

/// Removes exact duplicate rows, keeping the first occurrence. When the
/// bookkeeping cannot be allocated, the input is returned unchanged.
pub fn deduplicate(records: Vec<ConsolidatedRecord>) -> Vec<ConsolidatedRecord> {
    deduplicate_with(records, |seen, additional| seen.try_reserve(additional))
}

fn deduplicate_with<F>(
    mut records: Vec<ConsolidatedRecord>,
    reserve: F,
) -> Vec<ConsolidatedRecord>
where
    F: for<'r> FnOnce(
        &mut HashSet<&'r ConsolidatedRecord>,
        usize,
    ) -> Result<(), TryReserveError>,
{
    let keep = match first_occurrences(&records, reserve) {
        Ok(keep) => keep,
        Err(err) => {
            error!(%err, rows = records.len(), "allocation failed while dropping duplicates");
            warn!("proceeding with data that includes duplicates");
            return records;
        }
    };
    let mut keep = keep.into_iter();
    records.retain(|_| keep.next().unwrap_or(true));
    records
}

/// Marks the first occurrence of every distinct row. Rows are tracked by
/// reference; all bookkeeping is reserved up front.
fn first_occurrences<'r, F>(
    records: &'r [ConsolidatedRecord],
    reserve: F,
) -> Result<Vec<bool>, TryReserveError>
where
    F: FnOnce(&mut HashSet<&'r ConsolidatedRecord>, usize) -> Result<(), TryReserveError>,
{
    let mut seen: HashSet<&ConsolidatedRecord> = HashSet::new();
    reserve(&mut seen, records.len())?;
    let mut keep: Vec<bool> = Vec::new();
    keep.try_reserve_exact(records.len())?;
    keep.extend(records.iter().map(|record| seen.insert(record)));
    Ok(keep)
}

/// Stable sort by department, then IP address compared as text.
pub fn sort_records(records: &mut [ConsolidatedRecord]) {
    records.sort_by(|lhs, rhs| {
        lhs.department
            .cmp(&rhs.department)
            .then_with(|| lhs.ip_address.cmp(&rhs.ip_address))
    });
}

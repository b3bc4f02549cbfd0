use std::collections::HashSet;

use serde_json::Value;

use crate::model::{CONSOLIDATED_COLUMNS, ConsolidatedRecord, SourceTable, value_to_text};
use crate::summary::{DeptSubnetSummary, UserReverseLookup};

/// Sheet holding the consolidated per-IP table.
pub const DEVICE_SHEET: &str = "All_Device_Data";
/// Sheet holding the subnet × department matrix.
pub const DEPT_SUMMARY_SHEET: &str = "Dept_Subnet_Counts";
/// Sheet holding the per-user reverse lookup.
pub const REVERSE_LOOKUP_SHEET: &str = "User_Reverse_Lookup";
/// Prefix of the sheets carrying raw source tables.
pub const RAW_SHEET_PREFIX: &str = "RAW_";

const MAX_SHEET_NAME: usize = 31;
const SUBNET_COLUMN: &str = "Inferred_Subnet";
const TOTAL_COLUMN: &str = "Total";

/// A single worksheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn count(value: usize) -> Self {
        Cell::Number(value as f64)
    }
}

/// A table that will be materialised as an Excel sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub sheet_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl SheetTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Represents all tables required to materialise the report workbook.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkbookData {
    pub tables: Vec<SheetTable>,
}

impl WorkbookData {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, sheet_name: &str) -> Option<&SheetTable> {
        self.tables.iter().find(|t| t.sheet_name == sheet_name)
    }
}

/// Lays out the report: consolidated data, both summaries, then one raw
/// sheet per source. Empty tables are omitted.
pub fn build_report<'a>(
    records: &[ConsolidatedRecord],
    dept_summary: &DeptSubnetSummary,
    reverse_lookup: &UserReverseLookup,
    raw_sources: impl IntoIterator<Item = &'a SourceTable>,
) -> WorkbookData {
    let mut sheet_names = SheetNameRegistry::default();
    let mut tables = Vec::new();

    for fixed in [DEVICE_SHEET, DEPT_SUMMARY_SHEET, REVERSE_LOOKUP_SHEET] {
        sheet_names.claim(fixed.to_string());
    }

    if !records.is_empty() {
        tables.push(consolidated_table(records));
    }
    if !dept_summary.is_empty() {
        tables.push(dept_summary_table(dept_summary));
    }
    if !reverse_lookup.is_empty() {
        tables.push(reverse_lookup_table(reverse_lookup));
    }
    for source in raw_sources {
        if source.is_empty() {
            continue;
        }
        let sheet_name = sheet_names.assign(&format!("{RAW_SHEET_PREFIX}{}", source.name));
        tables.push(raw_table(source, sheet_name));
    }

    WorkbookData { tables }
}

pub fn consolidated_table(records: &[ConsolidatedRecord]) -> SheetTable {
    SheetTable {
        sheet_name: DEVICE_SHEET.to_string(),
        columns: CONSOLIDATED_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows: records
            .iter()
            .map(|record| record.cells().into_iter().map(Cell::text).collect())
            .collect(),
    }
}

/// Lays out the subnet × department matrix. A department whose name
/// collides with a fixed column, ignoring case, gets a `.N` suffix.
pub fn dept_summary_table(summary: &DeptSubnetSummary) -> SheetTable {
    let mut used: HashSet<String> = [SUBNET_COLUMN, TOTAL_COLUMN]
        .iter()
        .map(|name| name.to_lowercase())
        .collect();
    let mut columns = Vec::with_capacity(summary.departments.len() + 2);
    columns.push(SUBNET_COLUMN.to_string());
    for department in &summary.departments {
        let mut candidate = department.clone();
        let mut counter = 1;
        while !used.insert(candidate.to_lowercase()) {
            candidate = format!("{department}.{counter}");
            counter += 1;
        }
        columns.push(candidate);
    }
    columns.push(TOTAL_COLUMN.to_string());

    let rows = summary
        .rows
        .iter()
        .map(|row| {
            let mut cells = Vec::with_capacity(columns.len());
            cells.push(Cell::text(row.subnet.clone()));
            cells.extend(row.counts.iter().copied().map(Cell::count));
            cells.push(Cell::count(row.total));
            cells
        })
        .collect();

    SheetTable {
        sheet_name: DEPT_SUMMARY_SHEET.to_string(),
        columns,
        rows,
    }
}

pub fn reverse_lookup_table(lookup: &UserReverseLookup) -> SheetTable {
    SheetTable {
        sheet_name: REVERSE_LOOKUP_SHEET.to_string(),
        columns: vec![
            "User".to_string(),
            "Associated_IPs".to_string(),
            "Associated_Hostnames".to_string(),
        ],
        rows: lookup
            .users
            .iter()
            .map(|assets| {
                vec![
                    Cell::text(assets.user.clone()),
                    Cell::text(assets.joined_ips()),
                    Cell::text(assets.joined_hostnames()),
                ]
            })
            .collect(),
    }
}

/// Writes a source verbatim. Structured cells are kept as compact JSON.
pub fn raw_table(source: &SourceTable, sheet_name: String) -> SheetTable {
    let rows = source
        .records
        .iter()
        .map(|record| {
            source
                .columns
                .iter()
                .map(|column| raw_cell(record.get(column)))
                .collect()
        })
        .collect();

    SheetTable {
        sheet_name,
        columns: source.columns.clone(),
        rows,
    }
}

fn raw_cell(value: Option<&Value>) -> Cell {
    match value {
        Some(Value::Number(number)) => number
            .as_f64()
            .map(Cell::Number)
            .unwrap_or_else(|| Cell::text(number.to_string())),
        Some(structured @ (Value::Array(_) | Value::Object(_))) => {
            Cell::text(structured.to_string())
        }
        other => Cell::text(value_to_text(other).unwrap_or_default()),
    }
}

#[derive(Debug, Default)]
struct SheetNameRegistry {
    used: HashSet<String>,
}

impl SheetNameRegistry {
    fn claim(&mut self, name: String) {
        self.used.insert(name.to_lowercase());
    }

    fn assign(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        if self.used.insert(base.to_lowercase()) {
            return base;
        }

        let mut counter = 1;
        loop {
            let suffix = format!("_{counter}");
            let prefix = truncate_chars(&base, MAX_SHEET_NAME - suffix.len());
            let candidate = format!("{prefix}{suffix}");
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']', '\'', '"'];
    let sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    let sanitized = sanitized.trim();
    if sanitized.is_empty() {
        return "Sheet".to_string();
    }
    truncate_chars(sanitized, MAX_SHEET_NAME)
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use crate::summary::{SubnetCounts, UserAssets};
    use serde_json::json;

    #[test]
    fn raw_sheet_names_are_sanitised_and_unique() {
        let mut registry = SheetNameRegistry::default();
        let long = "RAW_a_really_long_inventory_export_name";
        let first = registry.assign(long);
        let second = registry.assign(long);
        assert_eq!(first, "RAW_a_really_long_inventory_exp");
        assert_eq!(first.chars().count(), 31);
        assert_eq!(second, "RAW_a_really_long_inventory_e_1");
        assert_eq!(registry.assign("RAW_q3/q4?"), "RAW_q3_q4_");
    }

    #[test]
    fn summary_sheet_has_subnet_departments_and_total() {
        let summary = DeptSubnetSummary {
            departments: vec!["Ops".to_string(), "Sales".to_string()],
            rows: vec![SubnetCounts {
                subnet: "10.0.1.0/24".to_string(),
                counts: vec![1, 2],
                total: 3,
            }],
        };
        let table = dept_summary_table(&summary);
        assert_eq!(table.columns, vec!["Inferred_Subnet", "Ops", "Sales", "Total"]);
        assert_eq!(
            table.rows[0],
            vec![
                Cell::text("10.0.1.0/24"),
                Cell::Number(1.0),
                Cell::Number(2.0),
                Cell::Number(3.0)
            ]
        );
    }

    #[test]
    fn department_named_like_a_fixed_column_is_renamed() {
        let summary = DeptSubnetSummary {
            departments: vec![
                "Sales".to_string(),
                "Total".to_string(),
                "inferred_subnet".to_string(),
            ],
            rows: vec![SubnetCounts {
                subnet: "10.0.1.0/24".to_string(),
                counts: vec![1, 1, 1],
                total: 3,
            }],
        };
        let table = dept_summary_table(&summary);
        assert_eq!(
            table.columns,
            vec!["Inferred_Subnet", "Sales", "Total.1", "inferred_subnet.1", "Total"]
        );
        assert_eq!(table.rows[0].last(), Some(&Cell::Number(3.0)));
    }

    #[test]
    fn report_skips_empty_tables_and_keeps_raw_order() {
        let mut record = Record::new();
        record.insert("ips".to_string(), json!(["10.0.0.1"]));
        record.insert("count".to_string(), json!(3));
        let raw = SourceTable::from_records("Axonius_Devices", vec![record]);
        let empty_raw = SourceTable::new("nothing");
        let lookup = UserReverseLookup {
            users: vec![UserAssets {
                user: "alice".to_string(),
                ips: vec!["10.0.0.1".to_string()],
                hostnames: Vec::new(),
            }],
        };

        let workbook = build_report(
            &[],
            &DeptSubnetSummary::default(),
            &lookup,
            [&raw, &empty_raw],
        );
        let names: Vec<&str> = workbook.tables.iter().map(|t| t.sheet_name.as_str()).collect();
        assert_eq!(names, vec![REVERSE_LOOKUP_SHEET, "RAW_Axonius_Devices"]);

        let raw_sheet = workbook.table("RAW_Axonius_Devices").expect("raw sheet");
        assert_eq!(raw_sheet.columns, vec!["count", "ips"]);
        assert_eq!(
            raw_sheet.rows[0],
            vec![Cell::Number(3.0), Cell::text(r#"["10.0.0.1"]"#)]
        );
    }
}

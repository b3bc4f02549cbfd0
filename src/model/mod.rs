use std::collections::BTreeMap;

use serde_json::Value;

/// Name of the directory-service export source.
pub const DIRECTORY_SOURCE: &str = "user_ad_data";
/// Name of the raw inventory-API user source.
pub const INVENTORY_USERS_SOURCE: &str = "Axonius_Users_RAW";
/// Name of the inventory-API device source.
pub const INVENTORY_DEVICES_SOURCE: &str = "Axonius_Devices";

/// Department assigned when no rule claims an address.
pub const UNASSIGNED: &str = "Unassigned";
/// Department assigned when the address literal does not parse.
pub const INVALID_IP: &str = "Invalid IP";
/// Department head used when the department has no configured head.
pub const NO_HEAD: &str = "N/A";
/// Separator used for multi-valued display fields.
pub const MULTI_VALUE_SEPARATOR: &str = " || ";

/// Column names of the consolidated table, in output order.
pub const CONSOLIDATED_COLUMNS: [&str; 10] = [
    "Asset_Unique_ID",
    "Department",
    "Department Head",
    "IP Address",
    "Hostname",
    "Last_Seen_Device",
    "User",
    "Mail",
    "User Manager Name",
    "Source",
];

/// A single source-native record. Keys are column names, values keep whatever
/// shape the source produced (strings, numbers, nested lists).
pub type Record = BTreeMap<String, Value>;

/// A named, source-specific table as handed over by a collector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceTable {
    /// Source name, also used for the raw sheet in the report.
    pub name: String,
    /// Column names in the order the source reported them.
    pub columns: Vec<String>,
    /// One entry per source-native record.
    pub records: Vec<Record>,
}

impl SourceTable {
    /// Creates an empty table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Builds a table from records, deriving the column order from first
    /// appearance across the records.
    pub fn from_records(name: impl Into<String>, records: Vec<Record>) -> Self {
        let mut table = Self::new(name);
        for record in &records {
            for key in record.keys() {
                if !table.columns.contains(key) {
                    table.columns.push(key.clone());
                }
            }
        }
        table.records = records;
        table
    }

    /// Returns `true` when the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Ordered collection of every source table gathered during a run.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    tables: Vec<SourceTable>,
}

impl SourceSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table, replacing any earlier table with the same name.
    /// Empty tables are ignored.
    pub fn insert(&mut self, table: SourceTable) {
        if table.is_empty() {
            return;
        }
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }

    /// Looks a table up by name.
    pub fn get(&self, name: &str) -> Option<&SourceTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Returns `true` when a table with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates all tables in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &SourceTable> {
        self.tables.iter()
    }

    /// Iterates the tables that carry device rows.
    pub fn device_tables(&self) -> impl Iterator<Item = &SourceTable> {
        self.tables.iter().filter(|t| !is_user_only_source(&t.name))
    }

    /// Returns `true` when no table is registered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// User-only sources feed the directory index, never the device rows.
pub fn is_user_only_source(name: &str) -> bool {
    name == DIRECTORY_SOURCE || name == INVENTORY_USERS_SOURCE
}

/// A normalised, exploded device row carrying exactly one IP address.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CanonicalRow {
    pub asset_id: Option<String>,
    pub ip_address: String,
    pub hostname: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS` or empty.
    pub last_seen_device: String,
    /// All raw usernames joined with [`MULTI_VALUE_SEPARATOR`].
    pub user: String,
    /// Domain-stripped first username, the directory join key.
    pub primary_username: String,
    pub source: String,
    pub department_from_source: String,
}

/// A user directory entry keyed by its normalised username.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryEntry {
    pub username: String,
    pub department: String,
    pub manager: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// A canonical row after enrichment. Field order matches
/// [`CONSOLIDATED_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConsolidatedRecord {
    pub asset_id: String,
    pub department: String,
    pub department_head: String,
    pub ip_address: String,
    pub hostname: String,
    pub last_seen_device: String,
    pub user: String,
    pub mail: String,
    pub manager_name: String,
    pub source: String,
}

impl ConsolidatedRecord {
    /// Cell values in [`CONSOLIDATED_COLUMNS`] order.
    pub fn cells(&self) -> [&str; 10] {
        [
            self.asset_id.as_str(),
            self.department.as_str(),
            self.department_head.as_str(),
            self.ip_address.as_str(),
            self.hostname.as_str(),
            self.last_seen_device.as_str(),
            self.user.as_str(),
            self.mail.as_str(),
            self.manager_name.as_str(),
            self.source.as_str(),
        ]
    }
}

/// Renders a loosely-typed cell as display text. Missing values and JSON
/// `null` become `None`; arrays are joined with `", "`.
pub fn value_to_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number_to_text(number)),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| value_to_text(Some(item)))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        other @ Value::Object(_) => Some(other.to_string()),
    }
}

fn number_to_text(number: &serde_json::Number) -> String {
    match number.as_f64() {
        Some(float) if number.is_f64() && float.fract() == 0.0 && float.abs() < 1e15 => {
            format!("{float:.0}")
        }
        _ => number.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_set_skips_empty_tables_and_replaces_by_name() {
        let mut set = SourceSet::new();
        set.insert(SourceTable::new("empty"));
        assert!(set.is_empty());

        let mut first = Record::new();
        first.insert("a".to_string(), json!("1"));
        set.insert(SourceTable::from_records("devices", vec![first.clone()]));
        set.insert(SourceTable::from_records("devices", vec![first.clone(), first]));
        assert_eq!(set.get("devices").map(SourceTable::len), Some(2));
        assert_eq!(set.iter().count(), 1);
    }

    #[test]
    fn device_tables_exclude_user_sources() {
        let mut record = Record::new();
        record.insert("x".to_string(), json!(1));
        let mut set = SourceSet::new();
        set.insert(SourceTable::from_records(DIRECTORY_SOURCE, vec![record.clone()]));
        set.insert(SourceTable::from_records(INVENTORY_USERS_SOURCE, vec![record.clone()]));
        set.insert(SourceTable::from_records("laptops", vec![record]));

        let names: Vec<&str> = set.device_tables().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["laptops"]);
    }

    #[test]
    fn value_to_text_renders_loose_cells() {
        assert_eq!(value_to_text(None), None);
        assert_eq!(value_to_text(Some(&Value::Null)), None);
        assert_eq!(value_to_text(Some(&json!(42))), Some("42".to_string()));
        assert_eq!(value_to_text(Some(&json!(42.0))), Some("42".to_string()));
        assert_eq!(
            value_to_text(Some(&json!(["a", null, "b"]))),
            Some("a, b".to_string())
        );
        assert_eq!(value_to_text(Some(&json!([]))), None);
    }
}

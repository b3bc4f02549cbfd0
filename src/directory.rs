//! User directory index used to enrich device rows.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info};

use crate::model::{
    DIRECTORY_SOURCE, DirectoryEntry, INVENTORY_USERS_SOURCE, MULTI_VALUE_SEPARATOR, Record,
    SourceSet, SourceTable, value_to_text,
};
use crate::normalize::normalize_username;

/// Column names of one user source, by directory attribute.
#[derive(Debug, Clone, Copy)]
pub struct UserColumns {
    pub username: &'static str,
    pub department: &'static str,
    pub manager: &'static str,
    pub email: &'static str,
    pub first_name: &'static str,
    pub last_name: &'static str,
}

/// Columns of the directory-service export.
pub const DIRECTORY_COLUMNS: UserColumns = UserColumns {
    username: "User Display Name",
    department: "User Department",
    manager: "User Manager",
    email: "User Email",
    first_name: "User First Name",
    last_name: "User Last Name",
};

/// Columns of the inventory API user records.
pub const INVENTORY_USER_COLUMNS: UserColumns = UserColumns {
    username: "specific_data.data.username",
    department: "specific_data.data.user_department",
    manager: "specific_data.data.user_manager",
    email: "specific_data.data.mail",
    first_name: "specific_data.data.first_name",
    last_name: "specific_data.data.last_name",
};

/// Lookup from normalised username to directory attributes.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    entries: HashMap<String, DirectoryEntry>,
}

impl UserDirectory {
    /// An index that matches nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the index from the preferred user source in `sources`: the
    /// directory export when present, else inventory users, else nothing.
    /// The two sources are never merged.
    pub fn from_sources(sources: &SourceSet) -> Self {
        if let Some(table) = sources.get(DIRECTORY_SOURCE).filter(|t| !t.is_empty()) {
            info!(records = table.len(), "preparing directory user data for enrichment");
            return Self::from_table(table, &DIRECTORY_COLUMNS);
        }
        if let Some(table) = sources.get(INVENTORY_USERS_SOURCE).filter(|t| !t.is_empty()) {
            info!(
                records = table.len(),
                "directory data not found, preparing inventory user data for enrichment"
            );
            return Self::from_table(table, &INVENTORY_USER_COLUMNS);
        }
        debug!("no user source available, enrichment skipped");
        Self::empty()
    }

    /// Builds the index from one user table. The first record for a username
    /// wins; later duplicates are discarded.
    pub fn from_table(table: &SourceTable, columns: &UserColumns) -> Self {
        let mut entries = HashMap::new();
        for record in &table.records {
            let Some(entry) = entry_from_record(record, columns) else {
                continue;
            };
            entries.entry(entry.username.clone()).or_insert(entry);
        }
        debug!(source = %table.name, users = entries.len(), "user directory built");
        Self { entries }
    }

    /// Exact, case-sensitive lookup by normalised username.
    pub fn lookup(&self, username: &str) -> Option<&DirectoryEntry> {
        if username.is_empty() {
            return None;
        }
        self.entries.get(username)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn entry_from_record(record: &Record, columns: &UserColumns) -> Option<DirectoryEntry> {
    let username = text(record.get(columns.username))?;
    let username = normalize_username(&username);
    if username.is_empty() {
        return None;
    }
    Some(DirectoryEntry {
        username,
        department: joined(record.get(columns.department)),
        manager: joined(record.get(columns.manager)),
        email: text(record.get(columns.email)).unwrap_or_default(),
        first_name: text(record.get(columns.first_name)).unwrap_or_default(),
        last_name: text(record.get(columns.last_name)).unwrap_or_default(),
    })
}

fn text(value: Option<&Value>) -> Option<String> {
    match value {
        // Inventory attributes arrive as lists even when single-valued.
        Some(Value::Array(items)) => items.iter().find_map(|item| text(Some(item))),
        other => value_to_text(other)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()),
    }
}

fn joined(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| text(Some(item)))
            .collect::<Vec<_>>()
            .join(MULTI_VALUE_SEPARATOR),
        other => text(other).unwrap_or_default(),
    }
}

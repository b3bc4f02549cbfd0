//! Maps source-specific columns onto the canonical field set and explodes
//! multi-valued IP fields into one row per address.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::debug;

use crate::model::{CanonicalRow, MULTI_VALUE_SEPARATOR, Record, SourceTable, value_to_text};

/// Canonical field names produced by [`canonical_field`].
pub mod field {
    pub const ASSET_ID: &str = "Asset_Unique_ID";
    pub const HOSTNAME: &str = "Hostname";
    pub const LAST_SEEN: &str = "Last_Seen_Device";
    pub const USER: &str = "User";
    pub const INTERFACES: &str = "network_interfaces_obj";
    pub const RAW_IPS: &str = "_Raw_IPs_List";
    pub const SOURCE_DEPARTMENT: &str = "Source_User_Department";
}

/// Prefix some exports put in front of aggregated column names.
const AGGREGATED_PREFIX: &str = "Aggregated: ";

/// Known source column names and the canonical field they carry. Covers the
/// inventory API's dotted names and the human-readable export headers.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("specific_data.data.unique_id", field::ASSET_ID),
    ("specific_data.data.hostname", field::HOSTNAME),
    ("specific_data.data.last_seen", field::LAST_SEEN),
    (
        "specific_data.data.last_used_users_ad_display_name_association",
        field::USER,
    ),
    ("network_interfaces", field::INTERFACES),
    ("specific_data.data.network_interfaces.ips", field::RAW_IPS),
    (
        "specific_data.data.last_used_users_departments_association",
        field::SOURCE_DEPARTMENT,
    ),
    ("Asset Unique ID", field::ASSET_ID),
    ("Host Name", field::HOSTNAME),
    ("Last Seen", field::LAST_SEEN),
    ("Last Used Users AD Display Name", field::USER),
    ("Network Interfaces: IPs", field::RAW_IPS),
    ("Last Used Users Departments", field::SOURCE_DEPARTMENT),
];

/// Output format of normalised timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Resolves a source column name to its canonical field name. Unknown
/// columns pass through unchanged.
pub fn canonical_field(column: &str) -> &str {
    let stripped = column.replace(AGGREGATED_PREFIX, "");
    let stripped = stripped.trim();
    lookup_alias(stripped)
        .or_else(|| lookup_alias(column))
        .unwrap_or(column)
}

fn lookup_alias(name: &str) -> Option<&'static str> {
    FIELD_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
}

/// Renames every column of a record onto its canonical field name. When two
/// source columns collapse onto the same field, the later column wins.
pub fn rename_record(record: &Record) -> Record {
    record
        .iter()
        .map(|(column, value)| (canonical_field(column).to_string(), value.clone()))
        .collect()
}

/// Extracts the distinct IP strings of a renamed record, in first-seen order.
///
/// Priority: nested interface objects, then a raw IP list, then a delimited
/// string (`||` between groups, `,` within a group).
pub fn extract_ips(record: &Record) -> Vec<String> {
    let mut ips = Vec::new();

    if let Some(Value::Array(interfaces)) = record.get(field::INTERFACES) {
        for interface in interfaces {
            if let Some(Value::Array(addresses)) = interface.get("ips") {
                ips.extend(addresses.iter().filter_map(|ip| value_to_text(Some(ip))));
            }
        }
        return distinct_trimmed(ips);
    }

    match record.get(field::RAW_IPS) {
        Some(Value::Array(addresses)) => {
            ips.extend(addresses.iter().filter_map(|ip| value_to_text(Some(ip))));
        }
        Some(Value::String(joined)) => {
            ips.extend(
                joined
                    .split("||")
                    .flat_map(|group| group.split(','))
                    .map(str::to_string),
            );
        }
        _ => {}
    }
    distinct_trimmed(ips)
}

fn distinct_trimmed(values: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let trimmed = value.trim();
        if !trimmed.is_empty() && !seen.iter().any(|s| s == trimmed) {
            seen.push(trimmed.to_string());
        }
    }
    seen
}

/// Splits a user field into individual raw usernames.
pub fn split_users(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| value_to_text(Some(item)))
            .map(|user| user.trim().to_string())
            .collect(),
        Some(Value::String(joined)) => joined
            .split("||")
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Reduces a domain-qualified username (`DOMAIN\user`) to its trailing part.
pub fn normalize_username(raw: &str) -> String {
    raw.rsplit('\\').next().unwrap_or(raw).trim().to_string()
}

/// Joins a possibly multi-valued department field.
pub fn join_departments(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| value_to_text(Some(item)))
            .map(|dept| dept.trim().to_string())
            .collect::<Vec<_>>()
            .join(MULTI_VALUE_SEPARATOR),
        other => value_to_text(other).unwrap_or_default(),
    }
}

/// Normalises a loosely-typed timestamp to [`TIMESTAMP_FORMAT`], or empty
/// when it cannot be interpreted.
pub fn format_timestamp(value: Option<&Value>) -> String {
    let text = match value {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Array(items)) => match items.first() {
            Some(first) => return format_timestamp(Some(first)),
            None => return String::new(),
        },
        _ => return String::new(),
    };
    parse_timestamp(&text)
        .map(|parsed| parsed.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if text.is_empty() {
        return None;
    }
    // Offsets are dropped, the wall-clock time is kept as written.
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_local());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.naive_local());
    }
    const NAIVE_FORMATS: [&str; 9] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
        "%a, %d %b %Y %H:%M:%S GMT",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"]
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Normalises one source table into canonical rows, one per extracted IP.
/// Records without any IP are dropped.
pub fn normalize_table(table: &SourceTable) -> Vec<CanonicalRow> {
    let mut rows = Vec::new();
    let mut dropped = 0usize;

    for record in &table.records {
        let exploded = normalize_record(record, &table.name);
        if exploded.is_empty() {
            dropped += 1;
        }
        rows.extend(exploded);
    }

    debug!(
        source = %table.name,
        records = table.len(),
        rows = rows.len(),
        dropped,
        "normalised source table"
    );
    rows
}

/// Normalises a single record into its exploded canonical rows.
pub fn normalize_record(record: &Record, source: &str) -> Vec<CanonicalRow> {
    let renamed = rename_record(record);
    let ips = extract_ips(&renamed);
    if ips.is_empty() {
        return Vec::new();
    }

    let users = split_users(renamed.get(field::USER));
    let primary_username = users
        .first()
        .map(|user| normalize_username(user))
        .unwrap_or_default();

    let template = CanonicalRow {
        asset_id: value_to_text(renamed.get(field::ASSET_ID)),
        ip_address: String::new(),
        hostname: value_to_text(renamed.get(field::HOSTNAME)),
        last_seen_device: format_timestamp(renamed.get(field::LAST_SEEN)),
        user: users.join(MULTI_VALUE_SEPARATOR),
        primary_username,
        source: source.to_string(),
        department_from_source: join_departments(renamed.get(field::SOURCE_DEPARTMENT)),
    };

    ips.into_iter()
        .map(|ip| CanonicalRow {
            ip_address: ip,
            ..template.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => Record::new(),
        }
    }

    #[test]
    fn aliases_strip_aggregated_prefix_and_pass_unknown_columns() {
        assert_eq!(canonical_field("Aggregated: Host Name"), field::HOSTNAME);
        assert_eq!(canonical_field("specific_data.data.hostname"), field::HOSTNAME);
        assert_eq!(canonical_field("Serial Number"), "Serial Number");
    }

    #[test]
    fn interfaces_take_priority_over_raw_lists() {
        let rec = record(json!({
            "network_interfaces": [
                {"ips": ["10.0.0.1", "10.0.0.2"]},
                {"mac": "aa:bb"},
                {"ips": ["10.0.0.1"]}
            ],
            "specific_data.data.network_interfaces.ips": ["192.168.0.9"]
        }));
        assert_eq!(extract_ips(&rename_record(&rec)), vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn delimited_ip_strings_are_split_and_trimmed() {
        let rec = record(json!({
            "Aggregated: Network Interfaces: IPs": "10.0.0.1, 10.0.0.2 || 10.0.0.3,, || "
        }));
        assert_eq!(
            extract_ips(&rename_record(&rec)),
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]
        );
    }

    #[test]
    fn records_without_ips_are_dropped() {
        let rec = record(json!({"Host Name": "ws-01"}));
        assert!(normalize_record(&rec, "laptops").is_empty());
    }

    #[test]
    fn record_explodes_into_one_row_per_ip() {
        let rec = record(json!({
            "Asset Unique ID": "A-1",
            "Host Name": "ws-01",
            "Last Seen": "2024-03-05T10:11:12Z",
            "Last Used Users AD Display Name": "CORP\\alice || bob",
            "Network Interfaces: IPs": "10.0.0.1, 10.0.0.2",
            "Last Used Users Departments": ["Sales", "Ops"],
            "Serial": "XYZ"
        }));
        let rows = normalize_record(&rec, "laptops");
        assert_eq!(rows.len(), 2);
        let first = &rows[0];
        assert_eq!(first.ip_address, "10.0.0.1");
        assert_eq!(rows[1].ip_address, "10.0.0.2");
        assert_eq!(first.asset_id.as_deref(), Some("A-1"));
        assert_eq!(first.hostname.as_deref(), Some("ws-01"));
        assert_eq!(first.last_seen_device, "2024-03-05 10:11:12");
        assert_eq!(first.user, "CORP\\alice || bob");
        assert_eq!(first.primary_username, "alice");
        assert_eq!(first.department_from_source, "Sales || Ops");
        assert_eq!(first.source, "laptops");
    }

    #[test]
    fn timestamps_accept_common_shapes() {
        assert_eq!(
            format_timestamp(Some(&json!("Fri, 10 Jan 2025 12:34:56 GMT"))),
            "2025-01-10 12:34:56"
        );
        assert_eq!(
            format_timestamp(Some(&json!("2024-01-02"))),
            "2024-01-02 00:00:00"
        );
        assert_eq!(format_timestamp(Some(&json!("yesterday"))), "");
        assert_eq!(format_timestamp(None), "");
    }

    #[test]
    fn timestamps_keep_wall_clock_and_export_shapes() {
        assert_eq!(
            format_timestamp(Some(&json!("2024-03-05T10:11:12+02:00"))),
            "2024-03-05 10:11:12"
        );
        assert_eq!(
            format_timestamp(Some(&json!("Tue, 05 Mar 2024 10:11:12 -0500"))),
            "2024-03-05 10:11:12"
        );
        assert_eq!(
            format_timestamp(Some(&json!("2024-03-05 10:11"))),
            "2024-03-05 10:11:00"
        );
        assert_eq!(
            format_timestamp(Some(&json!("2024/03/05 10:11:12"))),
            "2024-03-05 10:11:12"
        );
        assert_eq!(
            format_timestamp(Some(&json!("2024/03/05"))),
            "2024-03-05 00:00:00"
        );
    }

    #[test]
    fn usernames_lose_their_domain() {
        assert_eq!(normalize_username("CORP\\jdoe"), "jdoe");
        assert_eq!(normalize_username("jdoe"), "jdoe");
    }
}

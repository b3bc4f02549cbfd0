use std::io::Read;
use std::path::Path;

use serde_json::Value;

use crate::error::Result;
use crate::io::import::unique_headers;
use crate::model::{Record, SourceTable};

/// Reads a CSV file with a header row as a source table.
pub fn read_table(path: &Path, name: &str) -> Result<SourceTable> {
    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;
    read_from(reader, name)
}

/// Reads CSV data from any reader. Blank fields become missing values.
pub fn read_from<R: Read>(mut reader: csv::Reader<R>, name: &str) -> Result<SourceTable> {
    let columns = unique_headers(reader.headers()?.iter().map(|h| h.trim().to_string()));

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = Record::new();
        for (column, field) in columns.iter().zip(row.iter()) {
            if !field.trim().is_empty() {
                record.insert(column.clone(), Value::String(field.to_string()));
            }
        }
        if !record.is_empty() {
            records.push(record);
        }
    }

    Ok(SourceTable {
        name: name.to_string(),
        columns,
        records,
    })
}

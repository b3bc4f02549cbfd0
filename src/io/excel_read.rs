use std::path::Path;

use calamine::{DataType, Reader, open_workbook_auto};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::error::{Result, ToolError};
use crate::io::import::unique_headers;
use crate::model::{Record, SourceTable};
use crate::normalize::TIMESTAMP_FORMAT;

/// Reads the first worksheet of a spreadsheet as a source table. The first
/// row holds the headers; empty cells are left out of the records.
pub fn read_table(path: &Path, name: &str) -> Result<SourceTable> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("'{}' has no sheets", path.display())))??;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(SourceTable::new(name));
    };
    let columns = unique_headers(header_row.iter().map(|cell| cell_to_string(Some(cell))));

    let mut records = Vec::new();
    for row in rows {
        let mut record = Record::new();
        for (column, cell) in columns.iter().zip(row.iter()) {
            if let Some(value) = cell_to_value(cell) {
                record.insert(column.clone(), value);
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

fn cell_to_value(cell: &DataType) -> Option<Value> {
    match cell {
        DataType::Empty => None,
        DataType::String(value) if value.trim().is_empty() => None,
        DataType::String(value) => Some(Value::String(value.clone())),
        DataType::Int(value) => Some(Value::from(*value)),
        DataType::Float(value) => serde_json::Number::from_f64(*value).map(Value::Number),
        DataType::Bool(value) => Some(Value::Bool(*value)),
        DataType::DateTime(serial) => excel_serial_to_datetime(*serial)
            .map(|dt| Value::String(dt.format(TIMESTAMP_FORMAT).to_string())),
        DataType::Error(_) => None,
        other => Some(Value::String(other.to_string())),
    }
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.trim().to_string(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Converts an Excel 1900-system serial date to a timestamp.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add_signed(Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_dates_convert_to_timestamps() {
        let converted = excel_serial_to_datetime(45_000.5).expect("valid serial");
        assert_eq!(converted.format(TIMESTAMP_FORMAT).to_string(), "2023-03-15 12:00:00");
        assert!(excel_serial_to_datetime(f64::NAN).is_none());
    }

    #[test]
    fn blank_cells_are_missing_values() {
        assert_eq!(cell_to_value(&DataType::Empty), None);
        assert_eq!(cell_to_value(&DataType::String("  ".to_string())), None);
        assert_eq!(
            cell_to_value(&DataType::String("10.0.0.1".to_string())),
            Some(Value::String("10.0.0.1".to_string()))
        );
    }
}

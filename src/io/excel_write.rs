use std::path::Path;

use rust_xlsxwriter::{Table, TableColumn, Workbook};

use crate::error::Result;
use crate::flatten::{Cell, WorkbookData};
use crate::io::import::unique_headers;

/// Longest string Excel stores in a single cell.
const MAX_CELL_CHARS: usize = 32_767;

/// Writes the provided workbook data to the given path.
pub fn write_workbook(path: &Path, workbook: &WorkbookData) -> Result<()> {
    let mut workbook_writer = Workbook::new();

    for table in &workbook.tables {
        let worksheet = workbook_writer.add_worksheet();
        worksheet.set_name(&table.sheet_name)?;

        // Table headers must be unique ignoring case.
        let columns = unique_headers(table.columns.iter().cloned());
        for (col_idx, header) in columns.iter().enumerate() {
            worksheet.write_string(0, col_idx as u16, header)?;
        }

        for (row_idx, row) in table.rows.iter().enumerate() {
            let excel_row = (row_idx + 1) as u32;
            for (col_idx, cell) in row.iter().enumerate() {
                match cell {
                    Cell::Text(value) => {
                        worksheet.write_string(excel_row, col_idx as u16, clip(value))?;
                    }
                    Cell::Number(value) => {
                        worksheet.write_number(excel_row, col_idx as u16, *value)?;
                    }
                }
            }
        }

        if columns.is_empty() {
            continue;
        }

        let headers: Vec<TableColumn> = columns
            .iter()
            .map(|name| TableColumn::new().set_header(name))
            .collect();
        let mut excel_table = Table::new();
        excel_table.set_autofilter(true).set_columns(&headers);

        let col_end = (columns.len() as u16).saturating_sub(1);
        let row_end = table.rows.len().max(1) as u32;
        worksheet.add_table(0, 0, row_end, col_end, &excel_table)?;
    }

    workbook_writer.save(path)?;
    Ok(())
}

fn clip(value: &str) -> &str {
    match value.char_indices().nth(MAX_CELL_CHARS) {
        Some((end, _)) => &value[..end],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::SheetTable;
    use calamine::{DataType, Reader, Xlsx, open_workbook};
    use tempfile::tempdir;

    #[test]
    fn writes_tables_with_unique_headers() {
        let dir = tempdir().expect("temporary directory");
        let path = dir.path().join("report.xlsx");
        let workbook = WorkbookData {
            tables: vec![SheetTable {
                sheet_name: "RAW_devices".to_string(),
                columns: vec!["Host".to_string(), "host".to_string()],
                rows: vec![vec![Cell::text("ws-01"), Cell::Number(2.0)]],
            }],
        };
        write_workbook(&path, &workbook).expect("workbook written");

        let mut reader: Xlsx<_> = open_workbook(&path).expect("workbook opened");
        let range = reader
            .worksheet_range("RAW_devices")
            .expect("sheet present")
            .expect("sheet readable");
        assert_eq!(range.get((0, 0)), Some(&DataType::String("Host".to_string())));
        assert_eq!(range.get((0, 1)), Some(&DataType::String("host.1".to_string())));
        assert_eq!(range.get((1, 0)), Some(&DataType::String("ws-01".to_string())));
        assert_eq!(range.get((1, 1)), Some(&DataType::Float(2.0)));
    }

    #[test]
    fn long_text_is_clipped_to_the_cell_limit() {
        let long = "x".repeat(MAX_CELL_CHARS + 10);
        assert_eq!(clip(&long).len(), MAX_CELL_CHARS);
        assert_eq!(clip("short"), "short");
    }
}

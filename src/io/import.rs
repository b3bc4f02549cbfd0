//! Loading of operator-supplied files from the import directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, instrument};

use crate::error::Result;
use crate::io::{csv_read, excel_read};
use crate::model::SourceTable;

/// Kind of importable file, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Csv,
    Spreadsheet,
}

impl ImportKind {
    pub fn detect(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(ImportKind::Csv),
            "xls" | "xlsx" => Some(ImportKind::Spreadsheet),
            _ => None,
        }
    }
}

/// Source name used for an imported file: its lower-cased stem.
pub fn source_name(path: &Path) -> Option<String> {
    Some(path.file_stem()?.to_str()?.to_lowercase())
}

/// Reads one importable file.
pub fn read_file(path: &Path) -> Result<Option<SourceTable>> {
    let (Some(kind), Some(name)) = (ImportKind::detect(path), source_name(path)) else {
        return Ok(None);
    };
    let table = match kind {
        ImportKind::Csv => csv_read::read_table(path, &name)?,
        ImportKind::Spreadsheet => excel_read::read_table(path, &name)?,
    };
    Ok(Some(table))
}

/// Imports every CSV and spreadsheet file in `dir`, in file-name order.
/// Files that fail to load are logged and skipped.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub fn import_directory(dir: &Path) -> Result<Vec<SourceTable>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    if paths.is_empty() {
        info!("no files found in import directory");
        return Ok(Vec::new());
    }

    let mut tables = Vec::new();
    for path in paths {
        match read_file(&path) {
            Ok(Some(table)) => {
                info!(
                    file = %path.display(),
                    source = %table.name,
                    records = table.len(),
                    "imported file"
                );
                tables.push(table);
            }
            Ok(None) => {}
            Err(err) => error!(file = %path.display(), %err, "failed to import file"),
        }
    }
    Ok(tables)
}

/// Makes header names usable as unique column keys: blanks become
/// `Unnamed: <index>`, repeats get `.1`, `.2`, … suffixes. Comparison is
/// case-insensitive, as Excel tables require.
pub fn unique_headers(headers: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut columns = Vec::new();

    for (index, header) in headers.into_iter().enumerate() {
        let base = if header.is_empty() {
            format!("Unnamed: {index}")
        } else {
            header
        };
        let mut candidate = base.clone();
        let mut counter = 1;
        while !used.insert(candidate.to_lowercase()) {
            candidate = format!("{base}.{counter}");
            counter += 1;
        }
        columns.push(candidate);
    }
    columns
}

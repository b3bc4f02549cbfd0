use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur when the
/// tool collects, consolidates, or writes asset data.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the spreadsheet reader implementation.
    #[error("spreadsheet read error: {0}")]
    SpreadsheetRead(#[from] calamine::Error),

    /// Errors bubbled up from the CSV reader.
    #[error("CSV read error: {0}")]
    Csv(#[from] csv::Error),

    /// Transport or status failures talking to the inventory API.
    #[error("inventory API error: {0}")]
    Http(#[from] reqwest::Error),

    /// Raised when an imported sheet has no usable header row.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when the configuration file is absent.
    #[error("configuration file not found: {0}")]
    MissingConfig(PathBuf),

    /// Raised when the configuration file parses but holds unusable values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raised when the directory export helper cannot be started or fails.
    #[error("directory export helper failed: {0}")]
    Helper(String),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

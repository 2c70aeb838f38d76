use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the file-level failures that abort a transfer.
///
/// Row-level problems (short rows, header-like rows, duplicate keys) are not
/// errors; they are reported as [`SkipReason`](crate::model::SkipReason)s.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up while loading or saving the destination workbook.
    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] umya_spreadsheet::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when the workbook container cannot be unpacked.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Raised when a package part contains malformed XML.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Raised when an XML attribute cannot be decoded.
    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    /// A workbook could not be opened or parsed.
    #[error("cannot read workbook '{}': {reason}", .path.display())]
    UnreadableWorkbook { path: PathBuf, reason: String },

    /// The destination workbook specifically could not be opened.
    #[error("failed to open destination file '{}': {reason}", .path.display())]
    DestinationUnreadable { path: PathBuf, reason: String },

    /// The destination is held open by another process.
    #[error("destination file '{}' is locked; close it elsewhere and retry", .0.display())]
    DestinationLocked(PathBuf),

    /// Writing next to the destination is not permitted.
    #[error("permission denied writing '{}'", .0.display())]
    PermissionDenied(PathBuf),

    /// Nothing was selected.
    #[error("no worksheets selected")]
    EmptySelection,

    /// None of the selected sheets is listed in any shape allow-list.
    #[error("none of the selected sheets {selected:?} is in an allowed list: {allowed:?}")]
    NoEligibleSheets {
        selected: Vec<String>,
        allowed: Vec<String>,
    },

    /// A selected sheet is not present in the source workbook.
    #[error("worksheet '{0}' not found in source workbook")]
    MissingSheet(String),

    /// Raised when a sheet does not follow the expected conventions.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when the shape configuration cannot be used.
    #[error("invalid shape configuration: {0}")]
    InvalidConfig(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

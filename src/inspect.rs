use std::path::Path;

use calamine::{Reader, Xlsx, open_workbook};
use tracing::{info, instrument};

use crate::error::{Result, ToolError};

/// Lists the worksheet names of the workbook at `path` in file order.
///
/// The workbook is opened read-only and closed before returning.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn list_worksheets(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(ToolError::UnreadableWorkbook {
            path: path.to_path_buf(),
            reason: "file does not exist".into(),
        });
    }
    let workbook: Xlsx<_> =
        open_workbook(path).map_err(|error: calamine::XlsxError| ToolError::UnreadableWorkbook {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;
    let names = workbook.sheet_names().to_vec();
    info!(?names, "worksheets found");
    Ok(names)
}

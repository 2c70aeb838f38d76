//! Edits the destination workbook in place: every part the transfer does not
//! touch (styles, number formats, column widths, merged cells, other sheets)
//! is carried through unchanged.

use std::io;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;
use umya_spreadsheet::{Spreadsheet, Worksheet};

use crate::error::{Result, ToolError};
use crate::model::CellValue;
use crate::transfer::TargetSheet;

/// Windows sharing-violation codes returned when another process holds the file.
const ERROR_SHARING_VIOLATION: i32 = 32;
const ERROR_LOCK_VIOLATION: i32 = 33;

/// The destination workbook, loaded whole so it can be saved back intact.
pub struct DestinationBook {
    book: Spreadsheet,
}

impl DestinationBook {
    pub fn open(path: &Path) -> Result<Self> {
        let book = umya_spreadsheet::reader::xlsx::read(path)?;
        Ok(Self { book })
    }

    pub fn sheet_count(&self) -> usize {
        self.book.get_sheet_count()
    }

    /// The sheet Excel opens first. An out-of-range active tab falls back to
    /// the first sheet.
    pub fn active_sheet(&mut self) -> Result<ActiveSheet<'_>> {
        let active = *self.book.get_workbook_view().get_active_tab() as usize;
        let sheets = self.book.get_sheet_collection_mut();
        let index = if active < sheets.len() { active } else { 0 };
        let sheet = sheets.get_mut(index).ok_or_else(|| {
            ToolError::InvalidWorkbook("destination workbook has no worksheets".into())
        })?;
        Ok(ActiveSheet { sheet })
    }

    /// Writes the workbook to a temporary file beside `path` and renames it
    /// over `path`, so readers only ever see the old or the new file.
    pub fn save_atomically(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = NamedTempFile::new_in(dir).map_err(|error| match error.kind() {
            io::ErrorKind::PermissionDenied => ToolError::PermissionDenied(dir.to_path_buf()),
            _ => ToolError::Io(error),
        })?;
        umya_spreadsheet::writer::xlsx::write_writer(&self.book, temp.as_file_mut())?;
        temp.as_file().sync_all()?;
        temp.persist(path)
            .map_err(|error| save_error(error.error, path))?;

        debug!(path = %path.display(), "workbook replaced");
        Ok(())
    }
}

/// Mutable view of the destination's active worksheet.
pub struct ActiveSheet<'a> {
    sheet: &'a mut Worksheet,
}

impl ActiveSheet<'_> {
    pub fn name(&self) -> &str {
        self.sheet.get_name()
    }
}

/// umya addresses cells as 1-based `(col, row)`.
fn coordinate(row: usize, col: usize) -> (u32, u32) {
    (col as u32 + 1, row as u32 + 1)
}

impl TargetSheet for ActiveSheet<'_> {
    fn row_count(&self) -> usize {
        self.sheet.get_highest_row() as usize
    }

    fn text(&self, row: usize, col: usize) -> String {
        self.sheet
            .get_cell(coordinate(row, col))
            .map(|cell| cell.get_value().trim().to_string())
            .unwrap_or_default()
    }

    fn is_occupied(&self, row: usize, col: usize) -> bool {
        self.sheet
            .get_cell(coordinate(row, col))
            .is_some_and(|cell| cell.is_formula() || !cell.get_value().is_empty())
    }

    fn write(&mut self, row: usize, col: usize, value: CellValue) {
        if value == CellValue::Empty {
            return;
        }
        let cell = self.sheet.get_cell_mut(coordinate(row, col));
        match value {
            CellValue::Empty => {}
            CellValue::Text(text) => {
                cell.set_value_string(text);
            }
            CellValue::Number(number) => {
                cell.set_value_number(number);
            }
            CellValue::Bool(flag) => {
                cell.set_value_bool(flag);
            }
        }
    }
}

fn save_error(error: io::Error, path: &Path) -> ToolError {
    let locked = matches!(
        error.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy
    ) || (cfg!(windows)
        && matches!(
            error.raw_os_error(),
            Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)
        ));
    if locked {
        ToolError::DestinationLocked(path.to_path_buf())
    } else {
        ToolError::Io(error)
    }
}

//! Appends validated, de-duplicated rows from source worksheets into the
//! destination's active sheet.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::config::ShapeConfig;
use crate::error::{Result, ToolError};
use crate::io::destination::DestinationBook;
use crate::io::excel_read::ExcelReader;
use crate::model::{Cell, CellValue, SheetGrid, SkipReason, TransferEvent, TransferResult};
use crate::shape::{ColumnShape, RoleCells, dest};

/// Everything a transfer needs; no state is taken from elsewhere.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    pub source: &'a Path,
    pub destination: &'a Path,
    /// Selected worksheet names, processed in this order.
    pub sheets: &'a [String],
    pub config: &'a ShapeConfig,
}

/// Runs a full transfer and persists the destination.
///
/// The destination file is only replaced after every sheet has been
/// processed; any earlier failure leaves it untouched on disk.
#[instrument(
    level = "info",
    skip_all,
    fields(
        source = %request.source.display(),
        destination = %request.destination.display(),
    )
)]
pub fn transfer(request: &TransferRequest<'_>) -> Result<TransferResult> {
    if request.sheets.is_empty() {
        return Err(ToolError::EmptySelection);
    }
    info!(selected = ?request.sheets, "starting copy operation");

    let eligible: Vec<&String> = request
        .sheets
        .iter()
        .filter(|sheet| request.config.resolve(sheet).is_some())
        .collect();
    if eligible.is_empty() {
        return Err(ToolError::NoEligibleSheets {
            selected: request.sheets.to_vec(),
            allowed: request.config.allowed_names(),
        });
    }

    let mut source =
        ExcelReader::open(request.source).map_err(|error| ToolError::UnreadableWorkbook {
            path: request.source.to_path_buf(),
            reason: error.to_string(),
        })?;
    if let Some(missing) = eligible.iter().find(|sheet| !source.has_sheet(sheet)) {
        return Err(ToolError::MissingSheet(missing.to_string()));
    }

    let mut destination = DestinationBook::open(request.destination).map_err(|error| {
        ToolError::DestinationUnreadable {
            path: request.destination.to_path_buf(),
            reason: error.to_string(),
        }
    })?;
    info!(
        destination = %request.destination.display(),
        sheets = destination.sheet_count(),
        "opened existing destination file"
    );

    let mut target = destination.active_sheet()?;
    debug!(sheet = target.name(), "appending to active sheet");

    let mut result = TransferResult::default();
    let mut appender = Appender::new(&mut target);
    info!(
        existing = appender.existing_keys().len(),
        first_free_row = appender.cursor() + 1,
        "checking for duplicates against existing keys"
    );

    for sheet_name in request.sheets {
        let Some(shape) = request.config.resolve(sheet_name) else {
            warn!(sheet = %sheet_name, "sheet is not in any allow-list, ignoring");
            result.events.push(TransferEvent::SheetIgnored {
                sheet: sheet_name.clone(),
            });
            continue;
        };
        let grid = source.read_sheet(sheet_name, shape.layout().captures_hyperlink)?;
        appender.append_sheet(shape, &grid, &mut result);
    }
    drop(source);
    drop(target);

    if result.copied == 0 {
        info!(%result, "nothing to append, destination left unchanged");
        return Ok(result);
    }

    destination.save_atomically(request.destination)?;
    info!(%result, "copy finished");
    Ok(result)
}

/// Zero-based view of the sheet rows are appended to.
pub trait TargetSheet {
    /// Number of rows in use, counting from the first.
    fn row_count(&self) -> usize;
    /// Trimmed text of a cell; empty when the cell is absent.
    fn text(&self, row: usize, col: usize) -> String;
    /// Whether the cell holds a value or a formula.
    fn is_occupied(&self, row: usize, col: usize) -> bool;
    fn write(&mut self, row: usize, col: usize, value: CellValue);
}

impl TargetSheet for SheetGrid {
    fn row_count(&self) -> usize {
        self.height()
    }

    fn text(&self, row: usize, col: usize) -> String {
        self.value(row, col).trimmed_text()
    }

    fn is_occupied(&self, row: usize, col: usize) -> bool {
        *self.value(row, col) != CellValue::Empty
    }

    fn write(&mut self, row: usize, col: usize, value: CellValue) {
        if value != CellValue::Empty {
            self.set(row, col, Cell::new(value));
        }
    }
}

/// Appends rows to a destination sheet while tracking the keys it holds.
///
/// The cursor only moves forward and never lands on a row whose primary key
/// cell is occupied.
pub struct Appender<'a, S: TargetSheet + ?Sized> {
    sheet: &'a mut S,
    keys: HashSet<String>,
    cursor: usize,
}

impl<'a, S: TargetSheet + ?Sized> Appender<'a, S> {
    /// Seeds the key set from both key columns and places the cursor on the
    /// first data row with an empty primary key cell.
    pub fn new(sheet: &'a mut S) -> Self {
        let mut keys = HashSet::new();
        for row in 1..sheet.row_count() {
            for col in [dest::KEY_PRIMARY, dest::KEY_SECONDARY] {
                let key = sheet.text(row, col);
                if !key.is_empty() {
                    keys.insert(key);
                }
            }
        }

        let mut cursor = 1;
        while sheet.is_occupied(cursor, dest::KEY_PRIMARY) {
            cursor += 1;
        }

        Self {
            sheet,
            keys,
            cursor,
        }
    }

    pub fn existing_keys(&self) -> &HashSet<String> {
        &self.keys
    }

    /// Zero-based row the next insert will use, before skipping occupied rows.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Processes every data row of `source` under `shape`.
    pub fn append_sheet(
        &mut self,
        shape: ColumnShape,
        source: &SheetGrid,
        result: &mut TransferResult,
    ) {
        info!(
            sheet = %source.name,
            %shape,
            rows = source.height().saturating_sub(1),
            "processing sheet"
        );
        result.events.push(TransferEvent::SheetStarted {
            sheet: source.name.clone(),
            shape,
        });

        for row in 1..source.height() {
            let source_row = row + 1;
            let skip = |reason: SkipReason, key: Option<String>, result: &mut TransferResult| {
                result.record_skip(reason);
                result.events.push(TransferEvent::Skipped {
                    sheet: source.name.clone(),
                    shape,
                    source_row,
                    reason,
                    key,
                });
            };

            let Some(cells) = shape.extract(source, row) else {
                debug!(%shape, source_row, "skipping row because it has insufficient columns");
                skip(SkipReason::InsufficientColumns, None, result);
                continue;
            };
            if !cells.is_valid() {
                debug!(%shape, source_row, "skipping row due to validation failure");
                skip(SkipReason::ValidationFailed, None, result);
                continue;
            }
            let key = cells.key_text();
            if self.keys.contains(&key) {
                info!(%shape, %key, source_row, "skipping duplicate key");
                skip(SkipReason::DuplicateKey, Some(key), result);
                continue;
            }

            let destination_row = self.write_row(&key, &cells) + 1;
            info!(%shape, %key, source_row, destination_row, "inserted row");
            result.copied += 1;
            result.events.push(TransferEvent::Inserted {
                sheet: source.name.clone(),
                shape,
                key,
                source_row,
                destination_row,
            });
        }
    }

    /// Writes one mapped row and returns its zero-based index.
    fn write_row(&mut self, key: &str, cells: &RoleCells) -> usize {
        while self.sheet.is_occupied(self.cursor, dest::KEY_PRIMARY) {
            self.cursor += 1;
        }
        let row = self.cursor;

        self.sheet.write(row, dest::KEY_PRIMARY, key.into());
        self.sheet.write(row, dest::KEY_SECONDARY, key.into());
        self.sheet
            .write(row, dest::DESCRIPTION, cells.merged_description().into());
        self.sheet.write(row, dest::EXTRA, cells.extra.clone());
        if let Some(link) = &cells.hyperlink {
            self.sheet.write(row, dest::LINK, link.as_str().into());
        }

        self.cursor += 1;
        self.keys.insert(key.to_string());
        row
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shape::ColumnShape;

/// Value stored in a single worksheet cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CellValue {
    /// No value.
    #[default]
    Empty,
    /// Plain text.
    Text(String),
    /// Any numeric value, including dates stored as serial numbers.
    Number(f64),
    /// Boolean literal.
    Bool(bool),
}

impl CellValue {
    /// Returns the value as text with surrounding whitespace removed. Empty
    /// cells become the empty string.
    pub fn trimmed_text(&self) -> String {
        self.to_string().trim().to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(value) => f.write_str(value),
            CellValue::Number(value) => write!(f, "{value}"),
            CellValue::Bool(value) => write!(f, "{}", if *value { "TRUE" } else { "FALSE" }),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// A cell together with the metadata the transfer preserves.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cell {
    pub value: CellValue,
    /// Hyperlink target attached to the cell.
    pub hyperlink: Option<String>,
}

impl Cell {
    pub fn new(value: impl Into<CellValue>) -> Self {
        Self {
            value: value.into(),
            hyperlink: None,
        }
    }
}

/// Dense, zero-based grid of cells anchored at A1.
///
/// `width` is the sheet's used width; every row is padded to it, which is
/// what a row's physical extent means for shape extraction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SheetGrid {
    pub name: String,
    pub width: usize,
    pub rows: Vec<Vec<Cell>>,
}

impl SheetGrid {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            width: 0,
            rows: Vec::new(),
        }
    }

    /// Builds a grid from plain values, padding rows to the widest one.
    pub fn from_values(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let mut grid = Self::new(name);
        for (row_idx, row) in rows.into_iter().enumerate() {
            for (col_idx, value) in row.into_iter().enumerate() {
                if value != CellValue::Empty {
                    grid.set(row_idx, col_idx, Cell::new(value));
                }
            }
        }
        grid
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|cells| cells.get(col))
    }

    pub fn value(&self, row: usize, col: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.get(row, col).map(|cell| &cell.value).unwrap_or(&EMPTY)
    }

    /// Stores a cell, growing the grid as needed.
    pub fn set(&mut self, row: usize, col: usize, cell: Cell) {
        if col >= self.width {
            self.width = col + 1;
            for cells in &mut self.rows {
                cells.resize_with(self.width, Cell::default);
            }
        }
        while self.rows.len() <= row {
            self.rows.push(vec![Cell::default(); self.width]);
        }
        self.rows[row][col] = cell;
    }
}

/// Why a source row was not appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The row does not reach every column the shape reads.
    InsufficientColumns,
    /// A role cell is blank or the row looks like a header/footer.
    ValidationFailed,
    /// The key already exists in the destination.
    DuplicateKey,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InsufficientColumns => write!(f, "insufficient columns"),
            SkipReason::ValidationFailed => write!(f, "validation failure"),
            SkipReason::DuplicateKey => write!(f, "duplicate key"),
        }
    }
}

/// One auditable step of a transfer. Row numbers are 1-based as Excel shows
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransferEvent {
    SheetStarted {
        sheet: String,
        shape: ColumnShape,
    },
    /// Selected sheet that matched no allow-list.
    SheetIgnored {
        sheet: String,
    },
    Inserted {
        sheet: String,
        shape: ColumnShape,
        key: String,
        source_row: usize,
        destination_row: usize,
    },
    Skipped {
        sheet: String,
        shape: ColumnShape,
        source_row: usize,
        reason: SkipReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
}

/// Outcome of a transfer run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransferResult {
    pub copied: usize,
    pub duplicates: usize,
    /// Validation failures plus rows with insufficient columns.
    pub invalid: usize,
    /// Subset of `invalid` caused by short rows.
    pub insufficient: usize,
    pub events: Vec<TransferEvent>,
}

impl TransferResult {
    pub(crate) fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::DuplicateKey => self.duplicates += 1,
            SkipReason::ValidationFailed => self.invalid += 1,
            SkipReason::InsufficientColumns => {
                self.invalid += 1;
                self.insufficient += 1;
            }
        }
    }
}

impl fmt::Display for TransferResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows copied, {} duplicates skipped, {} invalid rows skipped",
            self.copied, self.duplicates, self.invalid
        )
    }
}

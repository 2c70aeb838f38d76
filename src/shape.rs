//! The fixed set of column shapes and the per-row rules they share.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::model::{CellValue, SheetGrid};

/// Phrases that mark a row as a repeated header or a footer.
pub const HEADER_PHRASES: [&str; 3] = ["part no", "family - short description", "pvpr (no iva)"];

/// Separator placed between prefix and description in the destination.
pub const DESCRIPTION_SEPARATOR: &str = " - ";

/// Zero-based destination columns shared by every shape.
pub mod dest {
    pub const KEY_PRIMARY: usize = 2; // C
    pub const KEY_SECONDARY: usize = 3; // D
    pub const DESCRIPTION: usize = 4; // E
    pub const EXTRA: usize = 7; // H
    pub const LINK: usize = 9; // J
}

/// Column mapping used to read a source worksheet. Variants are listed in
/// the priority order used when a sheet appears in several allow-lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnShape {
    Cdeh,
    Cdfi,
    Cdeg,
    Cder,
    Cefh,
}

/// Zero-based source columns for the four roles of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeLayout {
    pub prefix: usize,
    pub key: usize,
    pub description: usize,
    pub extra: usize,
    /// Rows narrower than this are skipped before any cell is read.
    pub min_width: usize,
    /// Whether the key cell's hyperlink is copied to the link column.
    pub captures_hyperlink: bool,
}

impl ShapeLayout {
    /// Width a row needs so that every role column exists.
    pub fn required_width(&self) -> usize {
        let widest = self
            .prefix
            .max(self.key)
            .max(self.description)
            .max(self.extra);
        (widest + 1).max(self.min_width)
    }
}

impl ColumnShape {
    pub const ALL: [ColumnShape; 5] = [
        ColumnShape::Cdeh,
        ColumnShape::Cdfi,
        ColumnShape::Cdeg,
        ColumnShape::Cder,
        ColumnShape::Cefh,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ColumnShape::Cdeh => "CDEH",
            ColumnShape::Cdfi => "CDFI",
            ColumnShape::Cdeg => "CDEG",
            ColumnShape::Cder => "CDER",
            ColumnShape::Cefh => "CEFH",
        }
    }

    pub fn layout(self) -> ShapeLayout {
        const C: usize = 2;
        const D: usize = 3;
        const E: usize = 4;
        const F: usize = 5;
        const G: usize = 6;
        const H: usize = 7;
        const I: usize = 8;
        // Last column of a 17-column price sheet.
        const R: usize = 16;

        let (prefix, key, description, extra) = match self {
            ColumnShape::Cdeh => (C, D, E, H),
            ColumnShape::Cdfi => (C, D, F, I),
            ColumnShape::Cdeg => (C, D, E, G),
            ColumnShape::Cder => (C, D, E, R),
            ColumnShape::Cefh => (C, E, F, H),
        };
        ShapeLayout {
            prefix,
            key,
            description,
            extra,
            min_width: if self == ColumnShape::Cder { 17 } else { 0 },
            captures_hyperlink: self != ColumnShape::Cefh,
        }
    }

    /// Reads the role cells of one source row.
    ///
    /// Returns `None` when the row does not physically reach every column the
    /// shape needs.
    pub fn extract(self, sheet: &SheetGrid, row: usize) -> Option<RoleCells> {
        let layout = self.layout();
        if sheet.width < layout.required_width() {
            return None;
        }
        let key_cell = sheet.get(row, layout.key);
        let hyperlink = if layout.captures_hyperlink {
            key_cell.and_then(|cell| cell.hyperlink.clone())
        } else {
            None
        };
        Some(RoleCells {
            prefix: sheet.value(row, layout.prefix).clone(),
            key: sheet.value(row, layout.key).clone(),
            description: sheet.value(row, layout.description).clone(),
            extra: sheet.value(row, layout.extra).clone(),
            hyperlink,
        })
    }
}

impl fmt::Display for ColumnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColumnShape {
    type Err = ToolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ColumnShape::ALL
            .into_iter()
            .find(|shape| shape.name().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ToolError::InvalidConfig(format!("unknown shape '{value}'")))
    }
}

/// The four role values read from a source row.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleCells {
    pub prefix: CellValue,
    pub key: CellValue,
    pub description: CellValue,
    pub extra: CellValue,
    pub hyperlink: Option<String>,
}

impl RoleCells {
    /// A row is valid when every role is non-blank and the joined text does
    /// not contain a header phrase.
    pub fn is_valid(&self) -> bool {
        let values = [
            self.prefix.trimmed_text(),
            self.key.trimmed_text(),
            self.description.trimmed_text(),
            self.extra.trimmed_text(),
        ];
        if values.iter().any(String::is_empty) {
            return false;
        }
        let joined = values.join(" ").to_lowercase();
        !HEADER_PHRASES.iter().any(|phrase| joined.contains(phrase))
    }

    pub fn key_text(&self) -> String {
        self.key.trimmed_text()
    }

    /// `prefix - description` as written to the destination.
    pub fn merged_description(&self) -> String {
        format!(
            "{}{DESCRIPTION_SEPARATOR}{}",
            self.prefix.trimmed_text(),
            self.description.trimmed_text()
        )
    }
}

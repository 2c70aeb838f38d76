use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{DataType, Range, Reader, Xlsx, open_workbook};
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::io::package::{HyperlinkRange, Package};
use crate::model::{Cell, CellValue, SheetGrid};

/// A workbook opened for reading, together with its package parts so that
/// hyperlinks can be recovered.
pub struct ExcelReader {
    workbook: Xlsx<BufReader<File>>,
    package: Package<BufReader<File>>,
}

impl ExcelReader {
    pub fn open(path: &Path) -> Result<Self> {
        let workbook: Xlsx<_> = open_workbook(path)?;
        let package = Package::open(path)?;
        Ok(Self {
            workbook,
            package,
        })
    }

    /// Worksheet names in file order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names().to_vec()
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheet_names().iter().any(|sheet| sheet == name)
    }

    /// Reads a sheet's cell values and, when asked, its hyperlinks.
    ///
    /// Hyperlinks only attach to cells inside the used range; they never
    /// widen the grid.
    pub fn read_sheet(&mut self, name: &str, with_hyperlinks: bool) -> Result<SheetGrid> {
        let values = read_required_sheet(&mut self.workbook, name)?;
        let mut grid = SheetGrid::new(name);
        fill_values(&mut grid, &values);
        if with_hyperlinks {
            let links = self.package.sheet_hyperlinks(name)?;
            debug!(sheet = name, count = links.len(), "read hyperlinks");
            attach_hyperlinks(&mut grid, &links);
        }
        Ok(grid)
    }
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ToolError::MissingSheet(name.to_string()))?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

/// Copies a calamine range into the grid at its absolute position. The grid
/// is sized to the range's end even when trailing cells are empty.
fn fill_values(grid: &mut SheetGrid, range: &Range<DataType>) {
    let (Some((start_row, start_col)), Some((end_row, end_col))) = (range.start(), range.end())
    else {
        return;
    };
    let (end_row, end_col) = (end_row as usize, end_col as usize);
    if grid.get(end_row, end_col).is_none() {
        grid.set(end_row, end_col, Cell::default());
    }
    for (row, col, value) in range.cells() {
        let value = cell_value(value);
        if value == CellValue::Empty {
            continue;
        }
        grid.set(
            start_row as usize + row,
            start_col as usize + col,
            Cell::new(value),
        );
    }
}

fn attach_hyperlinks(grid: &mut SheetGrid, links: &[HyperlinkRange]) {
    for link in links {
        let Some((rows, cols)) = link.clamped(grid.height(), grid.width) else {
            continue;
        };
        for row in rows {
            for col in cols.clone() {
                if let Some(cell) = grid.rows.get_mut(row).and_then(|cells| cells.get_mut(col)) {
                    cell.hyperlink = Some(link.target.clone());
                }
            }
        }
    }
}

fn cell_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::String(value) => CellValue::Text(value.clone()),
        DataType::Float(value) => CellValue::Number(*value),
        DataType::Int(value) => CellValue::Number(*value as f64),
        DataType::Bool(value) => CellValue::Bool(*value),
        DataType::DateTime(value) => CellValue::Number(*value),
        DataType::Empty => CellValue::Empty,
        other => CellValue::Text(other.to_string()),
    }
}

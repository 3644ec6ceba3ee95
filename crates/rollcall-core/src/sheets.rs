//! Spreadsheet loading.
//!
//! Both input sheets are reduced to rows of strings before any
//! reconciliation happens. Excel-family files go through calamine, `.csv`
//! files through the csv crate.

use std::path::Path;

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use tracing::debug;

/// A row of cells rendered as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    /// 1-based row number as shown by spreadsheet software
    pub number: usize,
    pub cells: Vec<String>,
}

impl SheetRow {
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }
}

/// Load every row of a sheet, header included.
///
/// `sheet` selects a worksheet by name; `None` takes the first one. It is
/// ignored for CSV files.
pub fn load_rows(path: &Path, sheet: Option<&str>) -> Result<Vec<SheetRow>> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    let rows = if is_csv {
        load_csv(path)?
    } else {
        load_workbook(path, sheet)?
    };
    debug!(path = %path.display(), rows = rows.len(), "Sheet loaded");
    Ok(rows)
}

/// Drop the header row and blank rows.
pub fn data_rows(rows: Vec<SheetRow>) -> impl Iterator<Item = SheetRow> {
    rows.into_iter().skip(1).filter(|r| !r.is_blank())
}

fn load_workbook(path: &Path, sheet: Option<&str>) -> Result<Vec<SheetRow>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| anyhow::anyhow!("Failed to open workbook {}: {}", path.display(), e))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Workbook {} contains no sheets", path.display()))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| anyhow::anyhow!("Failed to read sheet '{}' from {}: {}", sheet_name, path.display(), e))?;

    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);

    Ok(range
        .rows()
        .enumerate()
        .map(|(i, cells)| SheetRow {
            number: first_row + i + 1,
            cells: cells.iter().map(cell_text).collect(),
        })
        .collect())
}

fn load_csv(path: &Path) -> Result<Vec<SheetRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read line {} of {}", i + 1, path.display()))?;
        rows.push(SheetRow {
            number: i + 1,
            cells: record.iter().map(str::to_string).collect(),
        });
    }
    Ok(rows)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // IDs typed into Excel come back as floats
        Data::Float(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        other => other.to_string(),
    }
}

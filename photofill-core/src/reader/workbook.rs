//! Workbook data structures

use std::collections::BTreeMap;

use crate::fill::FillColor;

/// Represents a complete workbook held in memory
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    /// Raw bytes of the source package, replayed on save
    pub source: Vec<u8>,
    /// Worksheets in workbook order (chartsheets are not listed)
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// Get a sheet by name
    pub fn get_sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Get all sheet names
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Whether any sheet carries pending edits
    pub fn is_modified(&self) -> bool {
        self.sheets.iter().any(|s| !s.edits.is_empty())
    }
}

/// Pending change to a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellEdit {
    /// Remove the value and the background fill
    Clear,
    /// Write a count with a solid background
    Count(u64, FillColor),
}

/// Represents a worksheet
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    /// Cells keyed by 0-based (row, col), ordered row-major
    pub cells: BTreeMap<(u32, u32), Cell>,
    /// Internal path to the sheet XML file in the ZIP archive
    pub sheet_path: Option<String>,
    /// Edits to replay when the workbook is saved
    pub edits: BTreeMap<(u32, u32), CellEdit>,
}

impl Sheet {
    pub fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Get a cell at the given position
    pub fn get_cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Value at the given position, `Empty` when the cell does not exist
    pub fn value(&self, row: u32, col: u32) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.get_cell(row, col).map(|c| &c.value).unwrap_or(&EMPTY)
    }

    /// Set a cell value directly, without recording an edit
    pub fn set_value(&mut self, row: u32, col: u32, value: CellValue) {
        self.cells
            .entry((row, col))
            .or_insert_with(|| Cell::new(row, col, CellValue::Empty))
            .value = value;
    }

    /// Cells of a row, left to right
    pub fn cells_in_row(&self, row: u32) -> impl Iterator<Item = &Cell> {
        self.cells
            .range((row, 0)..=(row, u32::MAX))
            .map(|(_, cell)| cell)
    }

    /// Apply an edit to the in-memory cell and queue it for saving.
    ///
    /// Clearing a cell that does not exist is a no-op.
    pub fn apply_edit(&mut self, row: u32, col: u32, edit: CellEdit) {
        match edit {
            CellEdit::Clear => {
                let Some(cell) = self.cells.get_mut(&(row, col)) else {
                    return;
                };
                cell.value = CellValue::Empty;
                cell.fill = None;
            }
            CellEdit::Count(count, color) => {
                let cell = self
                    .cells
                    .entry((row, col))
                    .or_insert_with(|| Cell::new(row, col, CellValue::Empty));
                cell.value = CellValue::Number(count as f64);
                cell.fill = Some(color.argb().to_string());
            }
        }
        self.edits.insert((row, col), edit);
    }
}

/// Represents a single cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
    /// Index into `cellXfs`, when the cell has an `s` attribute
    pub style: Option<u32>,
    /// ARGB foreground of the solid fill behind the cell, if any
    pub fill: Option<String>,
}

impl Cell {
    pub fn new(row: u32, col: u32, value: CellValue) -> Self {
        Self {
            row,
            col,
            value,
            style: None,
            fill: None,
        }
    }
}

/// Cell value types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    /// ISO 8601 date stored with `t="d"`
    Date(String),
    Error(String),
    /// Formula source; the cached result is not kept
    Formula(String),
}

impl CellValue {
    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Text content, only for text cells
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

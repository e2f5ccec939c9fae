//! XLSX workbook reader using custom XML parsers

use anyhow::{Context, Result};

use std::fs;
use std::io::Cursor;
use std::path::Path;
use zip::ZipArchive;

pub mod parser_utils;
pub mod workbook;
pub mod xlsx_parser;

use crate::error::FillError;
use self::xlsx_parser::XlsxReader;
pub use workbook::{Cell, CellEdit, CellValue, Sheet, Workbook};

/// Whether the path names a workbook format the reader understands
pub fn is_supported_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("xlsx") || s.eq_ignore_ascii_case("xlsm"))
        .unwrap_or(false)
}

impl Workbook {
    /// Open a workbook from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_workbook(path)
    }
}

/// Read a workbook from a file path, keeping the raw package for saving
pub fn read_workbook<P: AsRef<Path>>(path: P) -> Result<Workbook> {
    let path_ref = path.as_ref();

    if !is_supported_workbook(path_ref) {
        return Err(FillError::UnsupportedFormat(path_ref.to_path_buf()).into());
    }

    let source = fs::read(path_ref)
        .with_context(|| format!("Failed to open file: {}", path_ref.display()))?;
    let sheets = {
        let mut archive =
            ZipArchive::new(Cursor::new(source.as_slice())).context("Failed to open zip archive")?;
        let mut reader = XlsxReader::new(&mut archive)?;
        reader.read_sheets()?
    };

    log::debug!(
        "read {} worksheet(s) from {}",
        sheets.len(),
        path_ref.display()
    );

    Ok(Workbook { source, sheets })
}

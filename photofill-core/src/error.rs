//! Fatal errors raised before any record is processed

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FillError {
    #[error("report file not found (path: {})", .0.display())]
    ReportNotFound(PathBuf),

    #[error("workbook not found (path: {})", .0.display())]
    WorkbookNotFound(PathBuf),

    #[error("unsupported workbook format: {} (expected .xlsx or .xlsm)", .0.display())]
    UnsupportedFormat(PathBuf),
}

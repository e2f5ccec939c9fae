//! photofill-core: fills inspection photo counts from a text report into an XLSX workbook
//!
//! Report lines are parsed into entries, matched against location labels in
//! column A and question headers in row 1 of the worksheet for each entry's
//! category, then written with a red/yellow/green background by count.

pub mod category;
pub mod error;
pub mod fill;
pub mod location;
pub mod pipeline;
pub mod reader;
pub mod report;
pub mod resolver;
pub mod sheet_index;
pub mod writer;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use category::Category;
pub use error::FillError;
pub use fill::FillColor;
pub use location::{LocationKey, Side};
pub use pipeline::{RunSummary, Skip, SkipReason, fill_entries};
pub use reader::Workbook;
pub use report::Entry;

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct FillOutcome {
    pub summary: RunSummary,
    /// Absolute path of the saved workbook
    pub output: PathBuf,
}

/// Parse `report`, fill `input` and save the result to `output`.
///
/// Both input files are checked before anything is parsed or written.
pub fn fill_report(report: &Path, input: &Path, output: &Path) -> Result<FillOutcome> {
    if !report.is_file() {
        return Err(FillError::ReportNotFound(report.to_path_buf()).into());
    }
    if !input.is_file() {
        return Err(FillError::WorkbookNotFound(input.to_path_buf()).into());
    }

    let entries = report::read_report(report)?;
    log::info!("{} report entries parsed from {}", entries.len(), report.display());

    let mut workbook = Workbook::open(input)?;
    let summary = fill_entries(&mut workbook, &entries);

    workbook
        .save(output)
        .with_context(|| format!("Failed to save workbook to {}", output.display()))?;
    let output = output
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", output.display()))?;

    Ok(FillOutcome { summary, output })
}

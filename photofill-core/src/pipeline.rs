//! Orchestration: report entries in, cell writes and skip reasons out

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::category::Category;
use crate::fill::write_count;
use crate::reader::Workbook;
use crate::report::Entry;
use crate::resolver::resolve_sheet;
use crate::sheet_index::{SheetIndex, clear_stale_rows};

/// Why an entry was not written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    SheetNotFound { category: Category },
    LocationNotFound,
    QuestionNotFound,
}

impl SkipReason {
    /// Machine-readable tag, same as the serialized `kind`
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::SheetNotFound { .. } => "sheet_not_found",
            SkipReason::LocationNotFound => "location_not_found",
            SkipReason::QuestionNotFound => "question_not_found",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SheetNotFound { category } => {
                write!(f, "sheet for kind '{}' not found", category)
            }
            SkipReason::LocationNotFound => f.write_str("location not found in column A"),
            SkipReason::QuestionNotFound => f.write_str("question number not found in header"),
        }
    }
}

/// An entry that was left out, with the reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Skip {
    pub entry: Entry,
    pub reason: SkipReason,
}

/// Outcome of one pass over the report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub written: usize,
    pub skipped: Vec<Skip>,
}

/// Applies report entries to a workbook, caching sheet lookups for the run
pub struct Filler<'a> {
    workbook: &'a mut Workbook,
    /// Category to resolved sheet position (`None` once resolution failed)
    sheets: HashMap<Category, Option<usize>>,
    /// Sheet position to its indices; present only after stale rows were cleared
    indices: HashMap<usize, SheetIndex>,
}

impl<'a> Filler<'a> {
    pub fn new(workbook: &'a mut Workbook) -> Self {
        Self {
            workbook,
            sheets: HashMap::new(),
            indices: HashMap::new(),
        }
    }

    /// Process every entry in order
    pub fn run(mut self, entries: &[Entry]) -> RunSummary {
        let mut summary = RunSummary::default();
        for entry in entries {
            match self.apply(entry) {
                Ok(()) => summary.written += 1,
                Err(reason) => {
                    log::debug!(
                        "skipping {} {} Q{}: {}",
                        entry.category,
                        entry.location(),
                        entry.qnum,
                        reason
                    );
                    summary.skipped.push(Skip {
                        entry: *entry,
                        reason,
                    });
                }
            }
        }
        summary
    }

    /// Write one entry, or report why it cannot be written
    pub fn apply(&mut self, entry: &Entry) -> Result<(), SkipReason> {
        let sheet_idx = self
            .sheet_for(entry.category)
            .ok_or(SkipReason::SheetNotFound {
                category: entry.category,
            })?;
        let index = self.prepare(sheet_idx);

        let row = index
            .row_for(&entry.location())
            .ok_or(SkipReason::LocationNotFound)?;
        let col = index
            .column_for(entry.qnum)
            .ok_or(SkipReason::QuestionNotFound)?;

        write_count(&mut self.workbook.sheets[sheet_idx], row, col, entry.count);
        Ok(())
    }

    fn sheet_for(&mut self, category: Category) -> Option<usize> {
        let workbook = &*self.workbook;
        *self.sheets.entry(category).or_insert_with(|| {
            let found = resolve_sheet(workbook, category);
            match found {
                Some(idx) => log::info!(
                    "kind {} -> sheet '{}'",
                    category,
                    workbook.sheets[idx].name
                ),
                None => log::warn!("no sheet matches kind {}", category),
            }
            found
        })
    }

    /// Build indices and clear stale rows for a sheet, once
    fn prepare(&mut self, sheet_idx: usize) -> &SheetIndex {
        let sheet = &mut self.workbook.sheets[sheet_idx];
        self.indices.entry(sheet_idx).or_insert_with(|| {
            let index = SheetIndex::build(sheet);
            let cleared = clear_stale_rows(sheet, &index);
            log::info!(
                "sheet '{}': {} question column(s), {} location row(s), {} stale cell(s) cleared",
                sheet.name,
                index.questions.len(),
                index.rows.len(),
                cleared
            );
            index
        })
    }
}

/// Apply all entries to the workbook
pub fn fill_entries(workbook: &mut Workbook, entries: &[Entry]) -> RunSummary {
    Filler::new(workbook).run(entries)
}

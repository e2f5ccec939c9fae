//! Saving: replays the source package with pending cell edits applied

pub mod styles;
pub mod xlsx_writer;

use anyhow::Result;
use std::path::Path;

use crate::reader::Workbook;
pub use xlsx_writer::{patch_sheet_xml, save_workbook};

impl Workbook {
    /// Write the workbook, edits included, to `path` (may be the source path)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_workbook(self, path.as_ref())
    }
}

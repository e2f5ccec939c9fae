//! Worksheet lookup by category alias

use crate::category::Category;
use crate::reader::Workbook;

/// Index of the first worksheet whose title contains one of the category's aliases
pub fn resolve_sheet(workbook: &Workbook, category: Category) -> Option<usize> {
    workbook
        .sheets
        .iter()
        .position(|sheet| category.matches_sheet_name(&sheet.name))
}

//! Per-sheet lookup indices and stale-row cleanup

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use crate::location::{LocationKey, parse_location};
use crate::reader::{CellEdit, Sheet};

/// 0-based row holding the question headers
pub const HEADER_ROW: u32 = 0;
/// 0-based column holding the location labels
pub const LABEL_COLUMN: u32 = 0;

/// Question and location lookups for one worksheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetIndex {
    /// Question number to 0-based column
    pub questions: HashMap<u64, u32>,
    /// Location to 0-based row
    pub rows: HashMap<LocationKey, u32>,
}

impl SheetIndex {
    pub fn build(sheet: &Sheet) -> Self {
        Self {
            questions: build_question_columns(sheet),
            rows: build_location_rows(sheet),
        }
    }

    pub fn row_for(&self, key: &LocationKey) -> Option<u32> {
        self.rows.get(key).copied()
    }

    pub fn column_for(&self, qnum: u64) -> Option<u32> {
        self.questions.get(&qnum).copied()
    }
}

fn question_regex() -> &'static Regex {
    static QUESTION: OnceLock<Regex> = OnceLock::new();
    // No word boundary: "4All clean" is question 4, "40thQuestion" is 40
    QUESTION.get_or_init(|| Regex::new(r"^\s*([0-9]+)").expect("question header pattern is valid"))
}

/// Leading question number of a header label
pub fn parse_question_header(text: &str) -> Option<u64> {
    question_regex()
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Map question numbers to columns, scanning the header row left to right.
///
/// A later header with the same number replaces the earlier one.
pub fn build_question_columns(sheet: &Sheet) -> HashMap<u64, u32> {
    let mut questions = HashMap::new();
    for cell in sheet.cells_in_row(HEADER_ROW) {
        if let Some(qnum) = cell.value.as_text().and_then(parse_question_header) {
            questions.insert(qnum, cell.col);
        }
    }
    questions
}

/// Map locations to rows, scanning column A top to bottom below the header.
///
/// The first row with a given location wins.
pub fn build_location_rows(sheet: &Sheet) -> HashMap<LocationKey, u32> {
    let mut rows = HashMap::new();
    for (&(row, col), cell) in &sheet.cells {
        if row <= HEADER_ROW || col != LABEL_COLUMN {
            continue;
        }
        if let Some(key) = parse_location(&cell.value) {
            rows.entry(key).or_insert(row);
        }
    }
    rows
}

/// Clear question cells in every data row whose label is not a location.
///
/// Returns the number of cells cleared. Rows with a valid label are untouched.
pub fn clear_stale_rows(sheet: &mut Sheet, index: &SheetIndex) -> usize {
    let columns: BTreeSet<u32> = index.questions.values().copied().collect();
    if columns.is_empty() {
        return 0;
    }

    let targets: Vec<(u32, u32)> = sheet
        .cells
        .keys()
        .copied()
        .filter(|&(row, col)| row > HEADER_ROW && columns.contains(&col))
        .filter(|&(row, _)| parse_location(sheet.value(row, LABEL_COLUMN)).is_none())
        .collect();

    for &(row, col) in &targets {
        sheet.apply_edit(row, col, CellEdit::Clear);
    }
    targets.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Side;
    use crate::reader::CellValue;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn sample_sheet() -> Sheet {
        let mut sheet = Sheet::new("Brickwork".to_string());
        sheet.set_value(0, 0, text("Location"));
        sheet.set_value(0, 1, text("1 Mortar"));
        sheet.set_value(0, 2, text("2Ties"));
        sheet.set_value(0, 3, text("  4 All Clean"));
        sheet.set_value(0, 4, text("Notes"));
        sheet.set_value(0, 5, CellValue::Number(5.0));
        sheet.set_value(1, 0, text("Block A"));
        sheet.set_value(2, 0, text("Block A 3-Level 3 / East Elevation"));
        sheet.set_value(3, 0, text("Block A Level 3 / East Elevation"));
        sheet.set_value(4, 0, text("Block A L1 / West Elevation"));
        sheet
    }

    #[test]
    fn test_question_header_prefix() {
        assert_eq!(parse_question_header("4 All Clean"), Some(4));
        assert_eq!(parse_question_header("4All Clean"), Some(4));
        assert_eq!(parse_question_header("40thQuestion"), Some(40));
        assert_eq!(parse_question_header("5000000000 big"), Some(5_000_000_000));
        assert_eq!(parse_question_header("  007 padded"), Some(7));
        assert_eq!(parse_question_header("Q4"), None);
        assert_eq!(parse_question_header(""), None);
    }

    #[test]
    fn test_question_columns() {
        let questions = build_question_columns(&sample_sheet());
        assert_eq!(questions.len(), 3);
        assert_eq!(questions.get(&1), Some(&1));
        assert_eq!(questions.get(&2), Some(&2));
        assert_eq!(questions.get(&4), Some(&3));
        // Numeric header cells are not labels
        assert_eq!(questions.get(&5), None);
    }

    #[test]
    fn test_duplicate_question_last_wins() {
        let mut sheet = sample_sheet();
        sheet.set_value(0, 7, text("4 repeated"));
        let questions = build_question_columns(&sheet);
        assert_eq!(questions.get(&4), Some(&7));
    }

    #[test]
    fn test_duplicate_location_first_wins() {
        let rows = build_location_rows(&sample_sheet());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.get(&LocationKey::new('A', 3, Side::East)), Some(&2));
        assert_eq!(rows.get(&LocationKey::new('A', 1, Side::West)), Some(&4));
    }

    #[test]
    fn test_header_row_is_not_a_location() {
        let mut sheet = Sheet::new("S".to_string());
        sheet.set_value(0, 0, text("Block A L1 / West Elevation"));
        assert!(build_location_rows(&sheet).is_empty());
    }

    #[test]
    fn test_clear_stale_rows() {
        let mut sheet = sample_sheet();
        // stale values in a non-location row
        sheet.set_value(1, 1, CellValue::Number(9.0));
        sheet.set_value(1, 3, CellValue::Number(30.0));
        sheet.set_value(1, 4, text("keep: not a question column"));
        // orphan row with no label at all
        sheet.set_value(6, 2, CellValue::Number(1.0));
        // location row keeps its values
        sheet.set_value(2, 3, CellValue::Number(12.0));

        let index = SheetIndex::build(&sheet);
        let cleared = clear_stale_rows(&mut sheet, &index);

        assert_eq!(cleared, 3);
        assert!(sheet.value(1, 1).is_empty());
        assert!(sheet.value(1, 3).is_empty());
        assert!(sheet.value(6, 2).is_empty());
        assert_eq!(sheet.value(1, 4), &text("keep: not a question column"));
        assert_eq!(sheet.value(2, 3), &CellValue::Number(12.0));
        assert_eq!(sheet.value(0, 3), &text("  4 All Clean"));
        assert_eq!(sheet.edits.len(), 3);
        assert!(sheet.edits.values().all(|e| *e == CellEdit::Clear));
    }

    #[test]
    fn test_clear_skips_overwritten_duplicate_header_column() {
        let mut sheet = Sheet::new("S".to_string());
        sheet.set_value(0, 1, text("4 first"));
        sheet.set_value(0, 2, text("4 second"));
        sheet.set_value(1, 1, CellValue::Number(1.0));
        sheet.set_value(1, 2, CellValue::Number(2.0));

        let index = SheetIndex::build(&sheet);
        assert_eq!(clear_stale_rows(&mut sheet, &index), 1);
        assert_eq!(sheet.value(1, 1), &CellValue::Number(1.0));
        assert!(sheet.value(1, 2).is_empty());
    }
}

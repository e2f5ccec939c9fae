//! Count-to-color mapping and the cell writer

use serde::Serialize;
use std::fmt;

use crate::reader::{CellEdit, Sheet};

/// Upper bound (inclusive) of the red band
pub const RED_MAX: u64 = 6;
/// Upper bound (inclusive) of the yellow band
pub const YELLOW_MAX: u64 = 20;

/// Solid background written behind every count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FillColor {
    Red,
    Yellow,
    Green,
}

impl FillColor {
    /// Pick the band for a photo count
    pub fn for_count(count: u64) -> Self {
        if count <= RED_MAX {
            FillColor::Red
        } else if count <= YELLOW_MAX {
            FillColor::Yellow
        } else {
            FillColor::Green
        }
    }

    /// ARGB hex as stored in `styles.xml`
    pub fn argb(self) -> &'static str {
        match self {
            FillColor::Red => "FFFF0000",
            FillColor::Yellow => "FFFFFF00",
            FillColor::Green => "FF00B050",
        }
    }

    pub fn from_argb(argb: &str) -> Option<Self> {
        [FillColor::Red, FillColor::Yellow, FillColor::Green]
            .into_iter()
            .find(|c| c.argb().eq_ignore_ascii_case(argb))
    }
}

impl fmt::Display for FillColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FillColor::Red => "red",
            FillColor::Yellow => "yellow",
            FillColor::Green => "green",
        };
        f.write_str(name)
    }
}

/// Write `count` into the cell and replace its fill with the matching band.
pub fn write_count(sheet: &mut Sheet, row: u32, col: u32, count: u64) -> FillColor {
    let color = FillColor::for_count(count);
    sheet.apply_edit(row, col, CellEdit::Count(count, color));
    color
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::CellValue;

    #[test]
    fn test_band_boundaries() {
        assert_eq!(FillColor::for_count(0), FillColor::Red);
        assert_eq!(FillColor::for_count(3), FillColor::Red);
        assert_eq!(FillColor::for_count(6), FillColor::Red);
        assert_eq!(FillColor::for_count(7), FillColor::Yellow);
        assert_eq!(FillColor::for_count(20), FillColor::Yellow);
        assert_eq!(FillColor::for_count(21), FillColor::Green);
        assert_eq!(FillColor::for_count(u64::MAX), FillColor::Green);
    }

    #[test]
    fn test_bands_are_monotonic() {
        let mut previous = FillColor::for_count(0);
        for n in 1..100 {
            let current = FillColor::for_count(n);
            assert!(current >= previous, "band went backwards at {}", n);
            previous = current;
        }
    }

    #[test]
    fn test_argb_lookup() {
        assert_eq!(FillColor::from_argb("ffffff00"), Some(FillColor::Yellow));
        assert_eq!(FillColor::from_argb("FF00B050"), Some(FillColor::Green));
        assert_eq!(FillColor::from_argb("FF123456"), None);
    }

    #[test]
    fn test_write_count_replaces_fill() {
        let mut sheet = Sheet::new("Brickwork".to_string());
        sheet.set_value(4, 3, CellValue::Text("old".to_string()));
        if let Some(cell) = sheet.cells.get_mut(&(4, 3)) {
            cell.fill = Some("FF0000FF".to_string());
        }

        let color = write_count(&mut sheet, 4, 3, 12);

        assert_eq!(color, FillColor::Yellow);
        let cell = sheet.get_cell(4, 3).unwrap();
        assert_eq!(cell.value, CellValue::Number(12.0));
        assert_eq!(cell.fill.as_deref(), Some("FFFFFF00"));
        assert_eq!(
            sheet.edits.get(&(4, 3)),
            Some(&CellEdit::Count(12, FillColor::Yellow))
        );
    }
}

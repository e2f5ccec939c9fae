//! Inspection categories and their worksheet aliases

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Inspection type a report line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    /// Brickwork
    #[serde(rename = "BW")]
    Bw,
    /// Side raise
    #[serde(rename = "SR")]
    Sr,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Bw, Category::Sr];

    /// Tag used in reports
    pub fn code(self) -> &'static str {
        match self {
            Category::Bw => "BW",
            Category::Sr => "SR",
        }
    }

    /// Lowercase substrings that identify this category's worksheet
    pub fn sheet_aliases(self) -> &'static [&'static str] {
        match self {
            Category::Bw => &["brickwork"],
            Category::Sr => &["sideraise", "siderise", "side raise", "side-raise", "side rise"],
        }
    }

    /// Whether a worksheet title names this category (case-insensitive)
    pub fn matches_sheet_name(self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.sheet_aliases().iter().any(|alias| title.contains(alias))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

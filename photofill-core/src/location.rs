//! Location keys and the strict column-A label grammar
//!
//! A label is accepted only when it names a block, a level and a side
//! elevation, e.g. `Block A 3-Level 3 / East Elevation`. Labels without the
//! trailing `/ <Side> Elevation` never match.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::reader::CellValue;

/// Building elevation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Side {
    East,
    West,
    North,
    South,
}

impl Side {
    pub fn name(self) -> &'static str {
        match self {
            Side::East => "East",
            Side::West => "West",
            Side::North => "North",
            Side::South => "South",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Side::East, Side::West, Side::North, Side::South]
            .into_iter()
            .find(|side| side.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown side '{}'", s))
    }
}

/// (block, level, side) join key between report entries and sheet rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LocationKey {
    pub block: char,
    /// 0 is ground level
    pub level: u8,
    pub side: Side,
}

impl LocationKey {
    pub fn new(block: char, level: u8, side: Side) -> Self {
        Self { block, level, side }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block {} L{} {}", self.block, self.level, self.side)
    }
}

// Level clauses are alternatives of one group, so at each position the first
// listed form wins: ground level, "<n>-Level <m>", "Level <m>", "L<m>".
fn label_regex() -> &'static Regex {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    LABEL.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)Block\s+(?P<block>(?-i:[A-Za-z]))\b.*?",
            r"(?:",
            r"(?P<ground>\b0{0,2}\s*-\s*Ground\s+Level\b)",
            r"|(?:\b[0-9]{1,2}\s*-\s*Level\s+(?P<dashed>[0-9]{1,2})\b)",
            r"|(?:\bLevel\s+(?P<level>[0-9]{1,2})\b)",
            r"|(?:\bL(?P<short>[0-9]{1,2})\b)",
            r")",
            r".*/\s*(?P<side>East|West|North|South)\s+Elevation\b",
        ))
        .expect("location label pattern is valid")
    })
}

/// Parse a column-A label into a location key
pub fn parse_location_text(text: &str) -> Option<LocationKey> {
    let caps = label_regex().captures(text)?;

    let block = caps.name("block")?.as_str().chars().next()?.to_ascii_uppercase();
    let level = if caps.name("ground").is_some() {
        0
    } else {
        ["dashed", "level", "short"]
            .iter()
            .find_map(|group| caps.name(group))?
            .as_str()
            .parse()
            .ok()?
    };
    let side = caps.name("side")?.as_str().parse().ok()?;

    Some(LocationKey::new(block, level, side))
}

/// Parse a cell value as a location label; anything but text never matches
pub fn parse_location(value: &CellValue) -> Option<LocationKey> {
    // Formula cells count as non-text, even when the formula builds a label string

    value.as_text().and_then(parse_location_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(block: char, level: u8, side: Side) -> Option<LocationKey> {
        Some(LocationKey::new(block, level, side))
    }

    #[test]
    fn test_dashed_level_uses_number_after_level() {
        assert_eq!(
            parse_location_text("Block A 3-Level 3 / East Elevation"),
            key('A', 3, Side::East)
        );
        assert_eq!(
            parse_location_text("Block C 02 - Level 7 / North Elevation"),
            key('C', 7, Side::North)
        );
    }

    #[test]
    fn test_ground_level_variants() {
        for label in [
            "Block B 0-Ground Level / West Elevation",
            "Block B 00 - Ground Level / West Elevation",
            "Block B - Ground Level / West Elevation",
            "block b 0 - ground level / west elevation",
        ] {
            assert_eq!(parse_location_text(label), key('B', 0, Side::West), "{}", label);
        }
    }

    #[test]
    fn test_plain_and_short_level() {
        assert_eq!(
            parse_location_text("Block D Level 12 / South Elevation"),
            key('D', 12, Side::South)
        );
        assert_eq!(
            parse_location_text("Block D L4 / South Elevation"),
            key('D', 4, Side::South)
        );
        assert_eq!(
            parse_location_text("Ref: Block e, L04, facade / EAST   Elevation"),
            key('E', 4, Side::East)
        );
    }

    #[test]
    fn test_earliest_clause_wins() {
        // "L2" appears before "Level 5", so it is found first
        assert_eq!(
            parse_location_text("Block A L2 Level 5 / East Elevation"),
            key('A', 2, Side::East)
        );
        // At the same position the dashed form beats the bare number
        assert_eq!(
            parse_location_text("Block A 1-Level 2 / East Elevation"),
            key('A', 2, Side::East)
        );
    }

    #[test]
    fn test_last_side_elevation_is_used() {
        assert_eq!(
            parse_location_text("Block A Level 1 / East Elevation / West Elevation"),
            key('A', 1, Side::West)
        );
    }

    #[test]
    fn test_requires_side_elevation_suffix() {
        assert_eq!(parse_location_text("Block A 3-Level 3"), None);
        assert_eq!(parse_location_text("Block A 3-Level 3 / East"), None);
        assert_eq!(parse_location_text("Block A 3-Level 3 East Elevation"), None);
        assert_eq!(parse_location_text("Block A / East Elevation"), None);
        assert_eq!(parse_location_text("Block AB Level 3 / East Elevation"), None);
        assert_eq!(parse_location_text("Block A Level 123 / East Elevation"), None);
        assert_eq!(parse_location_text(""), None);
    }

    #[test]
    fn test_non_text_never_matches() {
        assert_eq!(parse_location(&CellValue::Empty), None);
        assert_eq!(parse_location(&CellValue::Number(3.0)), None);
        assert_eq!(parse_location(&CellValue::Boolean(true)), None);
        assert_eq!(
            parse_location(&CellValue::Formula(
                "\"Block A L1 / East Elevation\"".to_string()
            )),
            None
        );
        assert_eq!(
            parse_location(&CellValue::Text(
                "Block A L1 / East Elevation".to_string()
            )),
            key('A', 1, Side::East)
        );
    }

    #[test]
    fn test_side_from_str() {
        assert_eq!("EAST".parse::<Side>(), Ok(Side::East));
        assert_eq!("south".parse::<Side>(), Ok(Side::South));
        assert!("up".parse::<Side>().is_err());
    }
}

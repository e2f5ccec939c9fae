//! Report parser
//!
//! Each report line that carries a photo count looks like
//! `12 pictures - Block A L3 East BW <free text> / 4`. Lines that do not fit
//! are ignored.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::category::Category;
use crate::location::{LocationKey, Side};

/// One photo count taken from the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub block: char,
    pub level: u8,
    pub side: Side,
    #[serde(rename = "question")]
    pub qnum: u64,
    pub count: u64,
    pub category: Category,
}

impl Entry {
    pub fn location(&self) -> LocationKey {
        LocationKey::new(self.block, self.level, self.side)
    }
}

fn line_regex() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)(?P<count>[0-9]+)\s+pictures\s*-?\s*",
            r"Block\s+(?P<block>(?-i:[A-Za-z]))\s+",
            r"L(?P<level>[0-9]{1,2})\s+",
            r"(?P<side>North|South|East|West)\s+",
            r"(?P<category>BW|SR)\b",
            r".*?/\s*(?P<qnum>[0-9]+)\b",
        ))
        .expect("report line pattern is valid")
    })
}

/// Parse a single report line; only the first match on the line is used
pub fn parse_line(line: &str) -> Option<Entry> {
    let caps = line_regex().captures(line)?;

    Some(Entry {
        block: caps.name("block")?.as_str().chars().next()?.to_ascii_uppercase(),
        level: caps.name("level")?.as_str().parse().ok()?,
        side: caps.name("side")?.as_str().parse().ok()?,
        qnum: caps.name("qnum")?.as_str().parse().ok()?,
        count: caps.name("count")?.as_str().parse().ok()?,
        category: caps.name("category")?.as_str().parse().ok()?,
    })
}

/// Parse report text into entries, in line order.
///
/// `\n`, `\r\n` and a lone `\r` all end a line.
pub fn parse_report(text: &str) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut ignored = 0usize;
    for line in text.split(['\r', '\n']).filter(|l| !l.is_empty()) {
        match parse_line(line) {
            Some(entry) => entries.push(entry),
            None => ignored += 1,
        }
    }
    log::debug!(
        "parsed {} report entries, {} line(s) did not match",
        entries.len(),
        ignored
    );
    entries
}

/// Read and parse a UTF-8 report file
pub fn read_report<P: AsRef<Path>>(path: P) -> Result<Vec<Entry>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    Ok(parse_report(&text))
}

//! XML parsing for the parts of an XLSX package the filler needs

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Read, Seek};
use zip::ZipArchive;

use super::parser_utils::{attr_value, parse_cell_ref, read_text_node, resolve_xl_target};
use super::{Cell, CellValue, Sheet};

const WORKSHEET_REL_SUFFIX: &str = "/worksheet";

/// Relationship from `xl/_rels/workbook.xml.rels`
#[derive(Debug, Clone)]
pub struct Relationship {
    pub target: String,
    pub rel_type: String,
}

pub struct XlsxReader<'a, R: Read + Seek> {
    archive: &'a mut ZipArchive<R>,
    shared_strings: Vec<String>,
    /// Solid fill ARGB per `cellXfs` index
    fills: Vec<Option<String>>,
}

impl<'a, R: Read + Seek> XlsxReader<'a, R> {
    pub fn new(archive: &'a mut ZipArchive<R>) -> Result<Self> {
        let shared_strings =
            extract_shared_strings(archive).context("Failed to read shared strings")?;
        let fills = parse_fill_styles(archive).context("Failed to read styles")?;
        Ok(Self {
            archive,
            shared_strings,
            fills,
        })
    }

    /// Read every worksheet, in workbook order
    pub fn read_sheets(&mut self) -> Result<Vec<Sheet>> {
        let rels = read_workbook_relationships(self.archive)?;
        let entries = read_sheet_entries(self.archive)?;

        let mut sheets = Vec::new();
        for (name, rid) in entries {
            let Some(rel) = rels.get(&rid) else {
                log::warn!("sheet '{}' has no relationship '{}', ignoring it", name, rid);
                continue;
            };
            if !rel.rel_type.ends_with(WORKSHEET_REL_SUFFIX) {
                log::debug!("'{}' is not a worksheet ({}), ignoring it", name, rel.rel_type);
                continue;
            }

            let path = resolve_xl_target(&rel.target);
            let mut sheet = Sheet::new(name);
            sheet.cells = self
                .parse_sheet_xml(&path)
                .with_context(|| format!("Failed to parse {}", path))?;
            sheet.sheet_path = Some(path);
            sheets.push(sheet);
        }

        Ok(sheets)
    }

    fn parse_sheet_xml(&mut self, path: &str) -> Result<BTreeMap<(u32, u32), Cell>> {
        let mut cells = BTreeMap::new();

        let sheet_xml = self.archive.by_name(path)?;
        let mut reader = Reader::from_reader(BufReader::new(sheet_xml));

        let mut buf = Vec::new();
        let mut next_row = 0u32;
        let mut current_row = 0u32;
        let mut next_col = 0u32;

        loop {
            let event = reader.read_event_into(&mut buf)?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => match e.name().as_ref() {
                    b"row" => {
                        current_row = match attr_value(e, b"r")? {
                            Some(r) => r
                                .parse::<u32>()
                                .with_context(|| format!("Invalid row number '{}'", r))?
                                .saturating_sub(1),
                            None => next_row,
                        };
                        next_row = current_row + 1;
                        next_col = 0;
                    }
                    b"c" => {
                        let (row, col) = match attr_value(e, b"r")? {
                            Some(r) => parse_cell_ref(&r)
                                .with_context(|| format!("Invalid cell reference '{}'", r))?,
                            None => (current_row, next_col),
                        };
                        next_col = col + 1;

                        let style = match attr_value(e, b"s")? {
                            Some(s) => Some(
                                s.parse::<u32>()
                                    .with_context(|| format!("Invalid style index '{}'", s))?,
                            ),
                            None => None,
                        };
                        let cell_type = attr_value(e, b"t")?.unwrap_or_default();

                        let value = if matches!(event, Event::Start(_)) {
                            parse_cell_contents(&mut reader, &cell_type, &self.shared_strings)?
                        } else {
                            CellValue::Empty
                        };

                        let fill = self
                            .fills
                            .get(style.unwrap_or(0) as usize)
                            .cloned()
                            .flatten();

                        cells.insert(
                            (row, col),
                            Cell {
                                row,
                                col,
                                value,
                                style,
                                fill,
                            },
                        );
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(cells)
    }
}

fn parse_cell_contents<R: BufRead>(
    reader: &mut Reader<R>,
    cell_type: &str,
    shared_strings: &[String],
) -> Result<CellValue> {
    let mut raw = None;
    let mut inline = None;
    let mut formula = None;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(ref e) => match e.name().as_ref() {
                b"v" => raw = Some(read_text_node(reader)?),
                b"f" => formula = Some(read_text_node(reader)?),
                b"is" => inline = Some(read_rich_text(reader, b"is")?),
                _ => {}
            },
            Event::Empty(ref e) if e.name().as_ref() == b"f" => {
                // Shared formula follower: the text lives on the anchor cell
                formula.get_or_insert_with(String::new);
            }
            Event::End(ref e) if e.name().as_ref() == b"c" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    // Kept apart from Text so formulas are never read as labels or headers
    if let Some(f) = formula {
        return Ok(CellValue::Formula(f));
    }

    let value = match (cell_type, raw) {
        ("inlineStr", _) => inline.map(CellValue::Text).unwrap_or_default(),
        (_, None) => CellValue::Empty,
        ("s", Some(v)) => {
            let idx = v
                .trim()
                .parse::<usize>()
                .with_context(|| format!("Invalid shared string index '{}'", v))?;
            CellValue::Text(shared_strings.get(idx).cloned().unwrap_or_default())
        }
        ("str", Some(v)) => CellValue::Text(v),
        ("b", Some(v)) => CellValue::Boolean(v.trim() == "1"),
        ("e", Some(v)) => CellValue::Error(v),
        ("d", Some(v)) => CellValue::Date(v),
        (_, Some(v)) => match v.trim().parse::<f64>() {
            Ok(n) => CellValue::Number(n),
            Err(_) => CellValue::Text(v),
        },
    };
    Ok(value)
}

/// Concatenate the `<t>` runs of a rich text element, skipping phonetic runs
fn read_rich_text<R: BufRead>(reader: &mut Reader<R>, end: &[u8]) -> Result<String> {
    let mut text = String::new();
    let mut in_phonetic = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"rPh" => in_phonetic = true,
                b"t" if !in_phonetic => text.push_str(&read_text_node(reader)?),
                _ => {}
            },
            Event::End(ref e) if e.name().as_ref() == b"rPh" => in_phonetic = false,
            Event::End(ref e) if e.name().as_ref() == end => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

pub fn extract_shared_strings(archive: &mut ZipArchive<impl Read + Seek>) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    let ss_xml = match archive.by_name("xl/sharedStrings.xml") {
        Ok(file) => file,
        Err(_) => return Ok(strings),
    };

    let mut reader = Reader::from_reader(BufReader::new(ss_xml));
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"si" => {
                strings.push(read_rich_text(&mut reader, b"si")?);
            }
            Event::Empty(e) if e.name().as_ref() == b"si" => strings.push(String::new()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Map each `cellXfs` entry to the ARGB of its solid fill, if it has one
pub fn parse_fill_styles(archive: &mut ZipArchive<impl Read + Seek>) -> Result<Vec<Option<String>>> {
    let styles_xml = match archive.by_name("xl/styles.xml") {
        Ok(file) => file,
        Err(_) => return Ok(Vec::new()),
    };

    let mut reader = Reader::from_reader(BufReader::new(styles_xml));
    let mut buf = Vec::new();

    let mut fills: Vec<Option<String>> = Vec::new();
    let mut xf_fill_ids: Vec<usize> = Vec::new();
    let mut in_fills = false;
    let mut in_cell_xfs = false;
    let mut solid = false;
    let mut fg_rgb: Option<String> = None;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"fills" => in_fills = !is_empty,
                    b"cellXfs" => in_cell_xfs = !is_empty,
                    b"fill" if in_fills => {
                        solid = false;
                        fg_rgb = None;
                        if is_empty {
                            fills.push(None);
                        }
                    }
                    b"patternFill" if in_fills => {
                        solid = attr_value(e, b"patternType")?.as_deref() == Some("solid");
                    }
                    b"fgColor" if in_fills => fg_rgb = attr_value(e, b"rgb")?,
                    b"xf" if in_cell_xfs => {
                        let fill_id = attr_value(e, b"fillId")?
                            .and_then(|v| v.parse::<usize>().ok())
                            .unwrap_or(0);
                        xf_fill_ids.push(fill_id);
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"fills" => in_fills = false,
                b"cellXfs" => in_cell_xfs = false,
                b"fill" if in_fills => {
                    fills.push(if solid { fg_rgb.take() } else { None });
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(xf_fill_ids
        .into_iter()
        .map(|id| fills.get(id).cloned().flatten())
        .collect())
}

/// Relationship id to target/type, from `xl/_rels/workbook.xml.rels`
pub fn read_workbook_relationships(
    archive: &mut ZipArchive<impl Read + Seek>,
) -> Result<HashMap<String, Relationship>> {
    let rels_xml = archive
        .by_name("xl/_rels/workbook.xml.rels")
        .context("Failed to find xl/_rels/workbook.xml.rels")?;
    let mut reader = Reader::from_reader(BufReader::new(rels_xml));

    let mut rels = HashMap::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Relationship" => {
                let id = attr_value(&e, b"Id")?.unwrap_or_default();
                let target = attr_value(&e, b"Target")?.unwrap_or_default();
                let rel_type = attr_value(&e, b"Type")?.unwrap_or_default();
                rels.insert(id, Relationship { target, rel_type });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// (sheet name, relationship id) pairs in workbook order
fn read_sheet_entries(archive: &mut ZipArchive<impl Read + Seek>) -> Result<Vec<(String, String)>> {
    let workbook_xml = archive
        .by_name("xl/workbook.xml")
        .context("Failed to find xl/workbook.xml")?;
    let mut reader = Reader::from_reader(BufReader::new(workbook_xml));

    let mut entries = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"sheet" => {
                let name = attr_value(&e, b"name")?.unwrap_or_default();
                let rid = attr_value(&e, b"r:id")?.unwrap_or_default();
                entries.push((name, rid));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(entries)
}

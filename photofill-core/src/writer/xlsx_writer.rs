//! XLSX writer: replays the source package with the queued cell edits applied

use anyhow::{Context, Result};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use super::styles::{EMPTY_STYLESHEET, StylePatch};
use crate::reader::parser_utils::{attr_value, cell_ref, parse_cell_ref};
use crate::reader::{CellEdit, Workbook};

const STYLES_PATH: &str = "xl/styles.xml";
const CALC_CHAIN_PATH: &str = "xl/calcChain.xml";
const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";
const WORKBOOK_RELS_PATH: &str = "xl/_rels/workbook.xml.rels";
const CALC_CHAIN_REL_SUFFIX: &str = "/calcChain";
const STYLES_REL_SUFFIX: &str = "/styles";
const STYLES_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
const STYLES_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";

/// Save the workbook with all pending edits to `output_path`
pub fn save_workbook(workbook: &Workbook, output_path: &Path) -> Result<()> {
    let mut archive = ZipArchive::new(Cursor::new(workbook.source.as_slice()))
        .context("Failed to open source zip archive")?;

    // Patched parts, keyed by their path inside the package
    let mut replaced: HashMap<String, String> = HashMap::new();
    let mut dropped: HashSet<String> = HashSet::new();
    let mut added: Vec<(String, String)> = Vec::new();

    if workbook.is_modified() {
        let has_styles = archive.by_name(STYLES_PATH).is_ok();
        let styles_xml = if has_styles {
            read_file_from_zip(&mut archive, STYLES_PATH)?
        } else {
            log::debug!("{} is missing, starting from an empty stylesheet", STYLES_PATH);
            EMPTY_STYLESHEET.to_string()
        };
        let mut styles = StylePatch::parse(styles_xml).context("Failed to parse styles.xml")?;

        for sheet in workbook.sheets.iter().filter(|s| !s.edits.is_empty()) {
            let Some(path) = sheet.sheet_path.as_deref() else {
                continue;
            };
            let xml = read_file_from_zip(&mut archive, path)?;
            let patched = patch_sheet_xml(&xml, &sheet.edits, &mut styles)
                .with_context(|| format!("Failed to patch sheet '{}'", sheet.name))?;
            log::debug!("patched {} cell(s) in {}", sheet.edits.len(), path);
            replaced.insert(path.to_string(), patched);
        }

        if styles.is_modified() {
            if has_styles {
                replaced.insert(STYLES_PATH.to_string(), styles.render()?);
            } else {
                // New part: register it in the content types and the workbook rels
                let part_name = format!("/{}", STYLES_PATH);
                let content_types = part_text(&mut archive, &replaced, CONTENT_TYPES_PATH)?;
                let content_types = remove_content_type_override(&content_types, &part_name)?;
                replaced.insert(
                    CONTENT_TYPES_PATH.to_string(),
                    add_content_type_override(&content_types, &part_name, STYLES_CONTENT_TYPE)?,
                );
                let rels = part_text(&mut archive, &replaced, WORKBOOK_RELS_PATH)?;
                let rels = remove_relationships_by_type(&rels, STYLES_REL_SUFFIX)?;
                replaced.insert(
                    WORKBOOK_RELS_PATH.to_string(),
                    add_relationship(&rels, STYLES_REL_TYPE, "styles.xml")?,
                );
                added.push((STYLES_PATH.to_string(), styles.render()?));
            }
        }

        if archive.by_name(CALC_CHAIN_PATH).is_ok() {
            let content_types = part_text(&mut archive, &replaced, CONTENT_TYPES_PATH)?;
            replaced.insert(
                CONTENT_TYPES_PATH.to_string(),
                remove_content_type_override(&content_types, &format!("/{}", CALC_CHAIN_PATH))?,
            );
            let rels = part_text(&mut archive, &replaced, WORKBOOK_RELS_PATH)?;
            replaced.insert(
                WORKBOOK_RELS_PATH.to_string(),
                remove_relationships_by_type(&rels, CALC_CHAIN_REL_SUFFIX)?,
            );
            dropped.insert(CALC_CHAIN_PATH.to_string());
        }
    }

    let output_file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let mut zip_writer = ZipWriter::new(output_file);

    for i in 0..archive.len() {
        let name = archive.by_index_raw(i)?.name().to_string();
        if dropped.contains(&name) {
            continue;
        }

        if let Some(content) = replaced.get(&name) {
            let compression = archive.by_index_raw(i)?.compression();
            let options = SimpleFileOptions::default().compression_method(compression);
            zip_writer.start_file(name.as_str(), options)?;
            zip_writer.write_all(content.as_bytes())?;
        } else {
            // Copy file as is
            zip_writer.raw_copy_file(archive.by_index_raw(i)?)?;
        }
    }

    for (name, content) in &added {
        zip_writer.start_file(name.as_str(), SimpleFileOptions::default())?;
        zip_writer.write_all(content.as_bytes())?;
    }

    zip_writer.finish()?;
    Ok(())
}

fn read_file_from_zip<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    filename: &str,
) -> Result<String> {
    let mut file = archive
        .by_name(filename)
        .with_context(|| format!("Failed to find {}", filename))?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

/// Current text of a package part, taking earlier patches into account
fn part_text<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    replaced: &HashMap<String, String>,
    filename: &str,
) -> Result<String> {
    match replaced.get(filename) {
        Some(content) => Ok(content.clone()),
        None => read_file_from_zip(archive, filename),
    }
}

/// Rewrite a worksheet, replacing or inserting the edited cells.
///
/// Cells keep their position in row/column order. `Clear` on a cell that is
/// not in the XML does nothing; `Count` creates the cell (and its row).
pub fn patch_sheet_xml(
    xml: &str,
    edits: &BTreeMap<(u32, u32), CellEdit>,
    styles: &mut StylePatch,
) -> Result<String> {
    let mut pending: BTreeMap<u32, BTreeMap<u32, CellEdit>> = BTreeMap::new();
    for (&(row, col), &edit) in edits {
        pending.entry(row).or_default().insert(col, edit);
    }

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut in_sheet_data = false;
    let mut row_edits: BTreeMap<u32, CellEdit> = BTreeMap::new();
    let mut current_row = 0u32;
    let mut next_row = 0u32;
    let mut next_col = 0u32;
    let mut skipping_cell = false;

    loop {
        let event = reader.read_event()?;

        if skipping_cell {
            if matches!(&event, Event::End(e) if e.name().as_ref() == b"c") {
                skipping_cell = false;
            }
            continue;
        }

        match &event {
            Event::Start(e) | Event::Empty(e) => {
                let self_closing = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"sheetData" if self_closing => {
                        writer.write_event(Event::Start(e.clone()))?;
                        write_new_rows(&mut writer, std::mem::take(&mut pending), styles)?;
                        writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
                        continue;
                    }
                    b"sheetData" => in_sheet_data = true,
                    b"row" if in_sheet_data => {
                        current_row = match attr_value(e, b"r")? {
                            Some(r) => r
                                .parse::<u32>()
                                .with_context(|| format!("Invalid row number '{}'", r))?
                                .saturating_sub(1),
                            None => next_row,
                        };
                        next_row = current_row + 1;
                        next_col = 0;

                        // Rows that only exist as edits and come before this one
                        let later = pending.split_off(&current_row);
                        let earlier = std::mem::replace(&mut pending, later);
                        write_new_rows(&mut writer, earlier, styles)?;
                        row_edits = pending.remove(&current_row).unwrap_or_default();

                        if row_edits.is_empty() {
                            writer.write_event(event.clone())?;
                        } else {
                            let start = without_attribute(e, b"spans")?;
                            writer.write_event(Event::Start(start))?;
                            if self_closing {
                                write_inserted_cells(
                                    &mut writer,
                                    current_row,
                                    &mut row_edits,
                                    None,
                                    styles,
                                )?;
                                writer.write_event(Event::End(BytesEnd::new("row")))?;
                            }
                        }
                        continue;
                    }
                    b"c" if in_sheet_data => {
                        let col = match attr_value(e, b"r")? {
                            Some(r) => {
                                parse_cell_ref(&r)
                                    .with_context(|| format!("Invalid cell reference '{}'", r))?
                                    .1
                            }
                            None => next_col,
                        };
                        next_col = col + 1;

                        write_inserted_cells(
                            &mut writer,
                            current_row,
                            &mut row_edits,
                            Some(col),
                            styles,
                        )?;

                        if let Some(edit) = row_edits.remove(&col) {
                            let base = match attr_value(e, b"s")? {
                                Some(s) => Some(
                                    s.parse::<u32>()
                                        .with_context(|| format!("Invalid style index '{}'", s))?,
                                ),
                                None => None,
                            };
                            write_cell(&mut writer, current_row, col, edit, base, styles)?;
                            skipping_cell = !self_closing;
                            continue;
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"sheetData" => {
                    in_sheet_data = false;
                    write_new_rows(&mut writer, std::mem::take(&mut pending), styles)?;
                }
                b"row" if in_sheet_data => {
                    write_inserted_cells(&mut writer, current_row, &mut row_edits, None, styles)?;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }

        writer.write_event(event)?;
    }

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

/// Write whole rows for edits whose row is not in the XML
fn write_new_rows(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    rows: BTreeMap<u32, BTreeMap<u32, CellEdit>>,
    styles: &mut StylePatch,
) -> Result<()> {
    for (row, mut cells) in rows {
        if !cells.values().any(|e| matches!(e, CellEdit::Count(..))) {
            continue;
        }
        let mut start = BytesStart::new("row");
        start.push_attribute(("r", (row + 1).to_string().as_str()));
        writer.write_event(Event::Start(start))?;
        write_inserted_cells(writer, row, &mut cells, None, styles)?;
        writer.write_event(Event::End(BytesEnd::new("row")))?;
    }
    Ok(())
}

/// Write pending cells of the current row that sit left of `before` (all when `None`)
fn write_inserted_cells(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    row: u32,
    row_edits: &mut BTreeMap<u32, CellEdit>,
    before: Option<u32>,
    styles: &mut StylePatch,
) -> Result<()> {
    let remaining = match before {
        Some(col) => row_edits.split_off(&col),
        None => BTreeMap::new(),
    };
    let due = std::mem::replace(row_edits, remaining);
    for (col, edit) in due {
        // Nothing to clear in a cell that does not exist
        if edit == CellEdit::Clear {
            continue;
        }
        write_cell(writer, row, col, edit, None, styles)?;
    }
    Ok(())
}

fn write_cell(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    row: u32,
    col: u32,
    edit: CellEdit,
    base_style: Option<u32>,
    styles: &mut StylePatch,
) -> Result<()> {
    let mut start = BytesStart::new("c");
    start.push_attribute(("r", cell_ref(row, col).as_str()));

    match edit {
        CellEdit::Clear => {
            if let Some(s) = styles.style_for(base_style, None)? {
                start.push_attribute(("s", s.to_string().as_str()));
            }
            writer.write_event(Event::Empty(start))?;
        }
        CellEdit::Count(count, color) => {
            if let Some(s) = styles.style_for(base_style, Some(color))? {
                start.push_attribute(("s", s.to_string().as_str()));
            }
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Start(BytesStart::new("v")))?;
            writer.write_event(Event::Text(BytesText::new(&count.to_string())))?;
            writer.write_event(Event::End(BytesEnd::new("v")))?;
            writer.write_event(Event::End(BytesEnd::new("c")))?;
        }
    }
    Ok(())
}

fn without_attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<BytesStart<'static>> {
    let name = String::from_utf8(e.name().as_ref().to_vec())?;
    let mut out = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != key {
            out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    Ok(out)
}

/// Drop the `<Override>` for a part from `[Content_Types].xml`
fn remove_content_type_override(xml: &str, part_name: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) if e.name().as_ref() == b"Override" => {
                if attr_value(&e, b"PartName")?.as_deref() != Some(part_name) {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(e) => writer.write_event(e)?,
            Err(e) => return Err(anyhow::anyhow!("Error parsing XML: {}", e)),
        }
        buf.clear();
    }

    let result = writer.into_inner().into_inner();
    Ok(String::from_utf8(result)?)
}

/// Drop relationships whose `Type` ends with `type_suffix`
fn remove_relationships_by_type(xml: &str, type_suffix: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) if e.name().as_ref() == b"Relationship" => {
                let rel_type = attr_value(&e, b"Type")?.unwrap_or_default();
                if !rel_type.ends_with(type_suffix) {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(e) => writer.write_event(e)?,
            Err(e) => return Err(anyhow::anyhow!("Error parsing XML: {}", e)),
        }
        buf.clear();
    }

    let result = writer.into_inner().into_inner();
    Ok(String::from_utf8(result)?)
}

/// Append an `<Override>` for a part to `[Content_Types].xml`
fn add_content_type_override(xml: &str, part_name: &str, content_type: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut entry = BytesStart::new("Override");
    entry.push_attribute(("PartName", part_name));
    entry.push_attribute(("ContentType", content_type));

    let mut depth = 0usize;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if depth == 0 && e.name().as_ref() == b"Types" => {
                writer.write_event(Event::Start(e))?;
                writer.write_event(Event::Empty(entry.clone()))?;
                writer.write_event(Event::End(BytesEnd::new("Types")))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && e.name().as_ref() == b"Types" {
                    writer.write_event(Event::Empty(entry.clone()))?;
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
    }

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

/// Append a relationship with the first unused `rIdN` id
fn add_relationship(xml: &str, rel_type: &str, target: &str) -> Result<String> {
    let mut ids = HashSet::new();
    {
        let mut reader = Reader::from_str(xml);
        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Relationship" => {
                    if let Some(id) = attr_value(&e, b"Id")? {
                        ids.insert(id);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
    }
    let id = (1..)
        .map(|n: u32| format!("rId{}", n))
        .find(|id| !ids.contains(id))
        .context("no free relationship id")?;

    let mut entry = BytesStart::new("Relationship");
    entry.push_attribute(("Id", id.as_str()));
    entry.push_attribute(("Type", rel_type));
    entry.push_attribute(("Target", target));

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut depth = 0usize;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if depth == 0 && e.name().as_ref() == b"Relationships" => {
                writer.write_event(Event::Start(e))?;
                writer.write_event(Event::Empty(entry.clone()))?;
                writer.write_event(Event::End(BytesEnd::new("Relationships")))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && e.name().as_ref() == b"Relationships" {
                    writer.write_event(Event::Empty(entry.clone()))?;
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
    }

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

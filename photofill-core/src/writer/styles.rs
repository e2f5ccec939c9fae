//! `xl/styles.xml` patching: solid fills plus cell formats derived from existing ones

use anyhow::{Context, Result, bail};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};

use crate::fill::FillColor;

/// Fill id 0 is the mandatory "none" pattern
const NO_FILL_ID: u32 = 0;

/// Stylesheet used when the package has no `xl/styles.xml`
pub const EMPTY_STYLESHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"/>"#;

/// Top-level `styleSheet` children in schema order
const SECTION_ORDER: [&str; 11] = [
    "numFmts",
    "fonts",
    "fills",
    "borders",
    "cellStyleXfs",
    "cellXfs",
    "cellStyles",
    "dxfs",
    "tableStyles",
    "colors",
    "extLst",
];

/// Sections a patched stylesheet needs, with the content inserted when absent
const REQUIRED_SECTIONS: [(&str, &str); 5] = [
    (
        "fonts",
        r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>"#,
    ),
    (
        "fills",
        r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
    ),
    (
        "borders",
        r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
    ),
    (
        "cellStyleXfs",
        r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    ),
    (
        "cellXfs",
        r#"<cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs>"#,
    ),
];

/// Parsed view of `styles.xml` plus the formats added during this run
#[derive(Debug)]
pub struct StylePatch {
    xml: String,
    fill_count: u32,
    /// Each `cellXfs/xf` as owned events (a single `Empty`, or `Start` .. `End`)
    cell_xfs: Vec<Vec<Event<'static>>>,
    new_fills: Vec<FillColor>,
    new_xfs: Vec<Vec<Event<'static>>>,
    derived: HashMap<(u32, Option<FillColor>), u32>,
}

impl StylePatch {
    /// Parse `styles.xml`, adding any required section it lacks
    pub fn parse(xml: String) -> Result<Self> {
        let xml = ensure_sections(xml)?;
        let mut fill_count = 0u32;
        let mut cell_xfs = Vec::new();
        let mut saw_fills = false;
        let mut saw_cell_xfs = false;

        {
            let mut reader = Reader::from_str(&xml);
            let mut in_fills = false;
            let mut in_cell_xfs = false;
            let mut current_xf: Option<Vec<Event<'static>>> = None;

            loop {
                let event = reader.read_event()?;
                match &event {
                    Event::Start(e) | Event::Empty(e) => {
                        let is_start = matches!(event, Event::Start(_));
                        match e.name().as_ref() {
                            b"fills" => {
                                saw_fills = true;
                                in_fills = is_start;
                            }
                            b"cellXfs" => {
                                saw_cell_xfs = true;
                                in_cell_xfs = is_start;
                            }
                            b"fill" if in_fills => fill_count += 1,
                            b"xf" if in_cell_xfs && current_xf.is_none() => {
                                if is_start {
                                    current_xf = Some(vec![event.clone().into_owned()]);
                                } else {
                                    cell_xfs.push(vec![event.clone().into_owned()]);
                                }
                                continue;
                            }
                            _ => {}
                        }
                    }
                    Event::End(e) => match e.name().as_ref() {
                        b"fills" => in_fills = false,
                        b"cellXfs" => in_cell_xfs = false,
                        b"xf" if current_xf.is_some() => {
                            if let Some(mut xf) = current_xf.take() {
                                xf.push(event.clone().into_owned());
                                cell_xfs.push(xf);
                            }
                            continue;
                        }
                        _ => {}
                    },
                    Event::Eof => break,
                    _ => {}
                }
                if let Some(xf) = current_xf.as_mut() {
                    xf.push(event.into_owned());
                }
            }
        }

        if !saw_fills || !saw_cell_xfs {
            bail!("styles.xml has no <fills> or <cellXfs> section");
        }

        Ok(Self {
            xml,
            fill_count,
            cell_xfs,
            new_fills: Vec::new(),
            new_xfs: Vec::new(),
            derived: HashMap::new(),
        })
    }

    /// Whether the run added anything
    pub fn is_modified(&self) -> bool {
        !self.new_fills.is_empty() || !self.new_xfs.is_empty()
    }

    /// Style index for a cell that had `base` and should now show `fill`
    /// (`None` removes the fill). Returns `None` when the cell needs no `s`.
    pub fn style_for(&mut self, base: Option<u32>, fill: Option<FillColor>) -> Result<Option<u32>> {
        let base_idx = base.unwrap_or(0);
        if let Some(&idx) = self.derived.get(&(base_idx, fill)) {
            return Ok(Some(idx));
        }

        let base_xf = match self.cell_xfs.get(base_idx as usize) {
            Some(xf) => xf.clone(),
            None if base.is_none() => vec![Event::Empty(default_xf())],
            None => bail!("cell style {} is not defined in styles.xml", base_idx),
        };

        let fill_id = match fill {
            Some(color) => self.fill_id(color),
            None => {
                if xf_fill_id(&base_xf)? == NO_FILL_ID {
                    return Ok(base);
                }
                NO_FILL_ID
            }
        };

        let mut xf = base_xf;
        if let Some(first) = xf.first_mut() {
            *first = with_fill(first, fill_id)?;
        }
        let idx = u32::try_from(self.cell_xfs.len() + self.new_xfs.len())
            .context("too many cell formats")?;
        self.new_xfs.push(xf);
        self.derived.insert((base_idx, fill), idx);
        Ok(Some(idx))
    }

    fn fill_id(&mut self, color: FillColor) -> u32 {
        let pos = match self.new_fills.iter().position(|c| *c == color) {
            Some(pos) => pos,
            None => {
                self.new_fills.push(color);
                self.new_fills.len() - 1
            }
        };
        self.fill_count + pos as u32
    }

    /// Render the patched `styles.xml`
    pub fn render(&self) -> Result<String> {
        let mut reader = Reader::from_str(&self.xml);
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        let fills_total = self.fill_count + self.new_fills.len() as u32;
        let xfs_total = self.cell_xfs.len() + self.new_xfs.len();

        loop {
            match reader.read_event()? {
                Event::Start(e) if e.name().as_ref() == b"fills" => {
                    writer.write_event(Event::Start(with_count(&e, fills_total)?))?;
                }
                Event::Empty(e) if e.name().as_ref() == b"fills" => {
                    writer.write_event(Event::Start(with_count(&e, fills_total)?))?;
                    self.write_new_fills(&mut writer)?;
                    writer.write_event(Event::End(BytesEnd::new("fills")))?;
                }
                Event::End(e) if e.name().as_ref() == b"fills" => {
                    self.write_new_fills(&mut writer)?;
                    writer.write_event(Event::End(e))?;
                }
                Event::Start(e) if e.name().as_ref() == b"cellXfs" => {
                    writer.write_event(Event::Start(with_count(&e, xfs_total as u32)?))?;
                }
                Event::Empty(e) if e.name().as_ref() == b"cellXfs" => {
                    writer.write_event(Event::Start(with_count(&e, xfs_total as u32)?))?;
                    self.write_new_xfs(&mut writer)?;
                    writer.write_event(Event::End(BytesEnd::new("cellXfs")))?;
                }
                Event::End(e) if e.name().as_ref() == b"cellXfs" => {
                    self.write_new_xfs(&mut writer)?;
                    writer.write_event(Event::End(e))?;
                }
                Event::Eof => break,
                e => writer.write_event(e)?,
            }
        }

        Ok(String::from_utf8(writer.into_inner().into_inner())?)
    }

    fn write_new_fills(&self, writer: &mut Writer<Cursor<Vec<u8>>>) -> Result<()> {
        for color in &self.new_fills {
            let mut pattern = BytesStart::new("patternFill");
            pattern.push_attribute(("patternType", "solid"));
            let mut fg = BytesStart::new("fgColor");
            fg.push_attribute(("rgb", color.argb()));
            let mut bg = BytesStart::new("bgColor");
            bg.push_attribute(("indexed", "64"));

            writer.write_event(Event::Start(BytesStart::new("fill")))?;
            writer.write_event(Event::Start(pattern))?;
            writer.write_event(Event::Empty(fg))?;
            writer.write_event(Event::Empty(bg))?;
            writer.write_event(Event::End(BytesEnd::new("patternFill")))?;
            writer.write_event(Event::End(BytesEnd::new("fill")))?;
        }
        Ok(())
    }

    fn write_new_xfs(&self, writer: &mut Writer<Cursor<Vec<u8>>>) -> Result<()> {
        for xf in &self.new_xfs {
            for event in xf {
                writer.write_event(event.clone())?;
            }
        }
        Ok(())
    }
}

fn section_rank(name: &[u8]) -> Option<usize> {
    SECTION_ORDER.iter().position(|s| s.as_bytes() == name)
}

/// Local names of the `styleSheet` children present in the document
fn present_sections(xml: &str) -> Result<HashSet<String>> {
    let mut reader = Reader::from_str(xml);
    let mut present = HashSet::new();
    let mut depth = 0usize;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 1 {
                    present.insert(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                }
                depth += 1;
            }
            Event::Empty(e) if depth == 1 => {
                present.insert(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(present)
}

/// Insert default `fonts`/`fills`/`borders`/`cellStyleXfs`/`cellXfs`
/// sections that are missing, each at its schema position
fn ensure_sections(xml: String) -> Result<String> {
    let present = present_sections(&xml)?;
    let mut missing: Vec<(usize, &str)> = REQUIRED_SECTIONS
        .iter()
        .filter(|(name, _)| !present.contains(*name))
        .filter_map(|(name, content)| Some((section_rank(name.as_bytes())?, *content)))
        .collect();
    if missing.is_empty() {
        return Ok(xml);
    }

    let mut reader = Reader::from_str(&xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Empty(e) if depth == 0 && e.local_name().as_ref() == b"styleSheet" => {
                saw_root = true;
                let name = String::from_utf8(e.name().as_ref().to_vec())?;
                writer.write_event(Event::Start(e.clone()))?;
                write_sections(&mut writer, &mut missing, None)?;
                writer.write_event(Event::End(BytesEnd::new(name)))?;
                continue;
            }
            Event::Start(e) if depth == 0 => {
                saw_root = e.local_name().as_ref() == b"styleSheet";
            }
            Event::Start(e) | Event::Empty(e) if depth == 1 && saw_root => {
                if let Some(rank) = section_rank(e.local_name().as_ref()) {
                    write_sections(&mut writer, &mut missing, Some(rank))?;
                }
            }
            Event::End(_) if depth == 1 && saw_root => {
                write_sections(&mut writer, &mut missing, None)?;
            }
            _ => {}
        }
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
        writer.write_event(event)?;
    }

    if !saw_root {
        bail!("styles.xml has no <styleSheet> root");
    }
    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

/// Write the pending sections ranked before `before` (all when `None`)
fn write_sections(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    missing: &mut Vec<(usize, &str)>,
    before: Option<usize>,
) -> Result<()> {
    let due = missing
        .iter()
        .take_while(|(rank, _)| before.is_none_or(|b| *rank < b))
        .count();
    for (_, content) in missing.drain(..due) {
        writer.get_mut().write_all(content.as_bytes())?;
    }
    Ok(())
}

fn default_xf() -> BytesStart<'static> {
    let mut xf = BytesStart::new("xf");
    for (key, value) in [
        ("numFmtId", "0"),
        ("fontId", "0"),
        ("fillId", "0"),
        ("borderId", "0"),
        ("xfId", "0"),
    ] {
        xf.push_attribute((key, value));
    }
    xf
}

fn xf_fill_id(xf: &[Event<'_>]) -> Result<u32> {
    let Some(Event::Start(e) | Event::Empty(e)) = xf.first() else {
        return Ok(NO_FILL_ID);
    };
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"fillId" {
            return Ok(attr.unescape_value()?.parse().unwrap_or(NO_FILL_ID));
        }
    }
    Ok(NO_FILL_ID)
}

/// Copy of the element without the `skip` attributes, with `extra` appended
fn rewrite_attributes(
    e: &BytesStart<'_>,
    skip: &[&[u8]],
    extra: &[(&str, String)],
) -> Result<BytesStart<'static>> {
    let name = String::from_utf8(e.name().as_ref().to_vec())?;
    let mut out = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if skip.contains(&attr.key.as_ref()) {
            continue;
        }
        out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    for (key, value) in extra {
        out.push_attribute((*key, value.as_str()));
    }
    Ok(out)
}

fn with_count(e: &BytesStart<'_>, count: u32) -> Result<BytesStart<'static>> {
    rewrite_attributes(e, &[b"count"], &[("count", count.to_string())])
}

fn with_fill(event: &Event<'static>, fill_id: u32) -> Result<Event<'static>> {
    let extra = [
        ("fillId", fill_id.to_string()),
        ("applyFill", "1".to_string()),
    ];
    Ok(match event {
        Event::Start(e) => Event::Start(rewrite_attributes(e, &[b"fillId", b"applyFill"], &extra)?),
        Event::Empty(e) => Event::Empty(rewrite_attributes(e, &[b"fillId", b"applyFill"], &extra)?),
        other => other.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border/></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="3" fontId="0" fillId="1" borderId="0" xfId="0" applyFill="1"><alignment horizontal="center"/></xf></cellXfs></styleSheet>"#;

    #[test]
    fn test_parse_counts() {
        let patch = StylePatch::parse(STYLES.to_string()).unwrap();
        assert_eq!(patch.fill_count, 2);
        assert_eq!(patch.cell_xfs.len(), 2);
        assert_eq!(patch.cell_xfs[1].len(), 3);
        assert!(!patch.is_modified());
    }

    #[test]
    fn test_derived_styles_are_shared() {
        let mut patch = StylePatch::parse(STYLES.to_string()).unwrap();
        let a = patch.style_for(None, Some(FillColor::Red)).unwrap();
        let b = patch.style_for(Some(0), Some(FillColor::Red)).unwrap();
        let c = patch.style_for(None, Some(FillColor::Red)).unwrap();
        assert_eq!(a, Some(2));
        assert_eq!(b, a);
        assert_eq!(c, a);
        assert_eq!(patch.new_xfs.len(), 1);
        assert_eq!(patch.new_fills, vec![FillColor::Red]);
    }

    #[test]
    fn test_clearing_unfilled_style_keeps_it() {
        let mut patch = StylePatch::parse(STYLES.to_string()).unwrap();
        assert_eq!(patch.style_for(None, None).unwrap(), None);
        assert_eq!(patch.style_for(Some(0), None).unwrap(), Some(0));
        assert!(!patch.is_modified());

        // Style 1 has a pattern fill, so clearing derives a no-fill copy
        assert_eq!(patch.style_for(Some(1), None).unwrap(), Some(2));
    }

    #[test]
    fn test_render_appends_fills_and_formats() {
        let mut patch = StylePatch::parse(STYLES.to_string()).unwrap();
        patch.style_for(Some(1), Some(FillColor::Green)).unwrap();
        patch.style_for(None, Some(FillColor::Yellow)).unwrap();
        let xml = patch.render().unwrap();

        assert!(xml.contains(r#"<fills count="4">"#), "{}", xml);
        assert!(xml.contains(r#"<cellXfs count="4">"#), "{}", xml);
        assert!(xml.contains(
            r#"<fill><patternFill patternType="solid"><fgColor rgb="FF00B050"/><bgColor indexed="64"/></patternFill></fill>"#
        ));
        assert!(xml.contains(r#"<fgColor rgb="FFFFFF00"/>"#));
        // derived from style 1: number format and alignment survive, fill replaced
        assert!(xml.contains(
            r#"<xf numFmtId="3" fontId="0" borderId="0" xfId="0" fillId="2" applyFill="1"><alignment horizontal="center"/></xf>"#
        ), "{}", xml);
        assert!(xml.contains(
            r#"<xf numFmtId="0" fontId="0" borderId="0" xfId="0" fillId="3" applyFill="1"/>"#
        ), "{}", xml);
        // cellStyleXfs untouched
        assert!(xml.contains(
            r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#
        ));
    }

    #[test]
    fn test_unknown_style_is_an_error() {
        let mut patch = StylePatch::parse(STYLES.to_string()).unwrap();
        assert!(patch.style_for(Some(42), Some(FillColor::Red)).is_err());
    }

    #[test]
    fn test_missing_sections_are_inserted_in_order() {
        let xml = r#"<styleSheet><numFmts count="0"/><fonts count="1"><font/></fonts><cellStyles count="0"/><dxfs count="0"/></styleSheet>"#;
        let mut patch = StylePatch::parse(xml.to_string()).unwrap();
        assert_eq!(patch.fill_count, 2);
        assert_eq!(patch.cell_xfs.len(), 1);

        assert_eq!(patch.style_for(None, Some(FillColor::Red)).unwrap(), Some(1));
        let out = patch.render().unwrap();
        let pos = |needle: &str| out.find(needle).unwrap_or_else(|| panic!("{} in {}", needle, out));
        assert!(pos("<numFmts") < pos("<fonts"));
        assert!(pos("<fonts") < pos("<fills"));
        assert!(pos("<fills") < pos("<borders"));
        assert!(pos("<borders") < pos("<cellStyleXfs"));
        assert!(pos("<cellStyleXfs") < pos("<cellXfs"));
        assert!(pos("<cellXfs") < pos("<cellStyles"));
        assert!(out.contains(r#"<fills count="3">"#), "{}", out);
        assert!(out.contains(r#"<cellXfs count="2">"#), "{}", out);
        // the existing fonts section is kept, not duplicated
        assert_eq!(out.matches("<fonts").count(), 1);
        assert!(out.contains(r#"<fonts count="1"><font/></fonts>"#));
    }

    #[test]
    fn test_empty_stylesheet_gets_defaults() {
        let mut patch = StylePatch::parse(EMPTY_STYLESHEET.to_string()).unwrap();
        assert_eq!(patch.fill_count, 2);
        assert_eq!(patch.style_for(None, None).unwrap(), None);
        assert_eq!(patch.style_for(None, Some(FillColor::Green)).unwrap(), Some(1));
        let out = patch.render().unwrap();
        assert!(out.contains(r#"<fgColor rgb="FF00B050"/>"#), "{}", out);
        assert!(out.ends_with("</styleSheet>"), "{}", out);
    }

    #[test]
    fn test_non_stylesheet_rejected() {
        assert!(StylePatch::parse("<other/>".to_string()).is_err());
    }
}

//! Reads the OOXML package parts calamine does not expose: which part holds
//! each sheet, and the hyperlinks declared on it.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::ops::RangeInclusive;
use std::path::Path;

use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{Result, ToolError};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const REL_TYPE_HYPERLINK: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
/// Namespaces `r:id` may be bound to (transitional and strict).
const RELATIONSHIP_NAMESPACES: [&[u8]; 2] = [
    b"http://schemas.openxmlformats.org/officeDocument/2006/relationships",
    b"http://purl.oclc.org/ooxml/officeDocument/relationships",
];

/// One `<hyperlink>` element: a zero-based cell range and its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperlinkRange {
    pub rows: RangeInclusive<usize>,
    pub cols: RangeInclusive<usize>,
    pub target: String,
}

impl HyperlinkRange {
    /// The part of this range that falls inside a `height` x `width` grid,
    /// or `None` when it lies entirely outside.
    pub fn clamped(
        &self,
        height: usize,
        width: usize,
    ) -> Option<(RangeInclusive<usize>, RangeInclusive<usize>)> {
        if height == 0 || width == 0 {
            return None;
        }
        let rows = *self.rows.start()..=(*self.rows.end()).min(height - 1);
        let cols = *self.cols.start()..=(*self.cols.end()).min(width - 1);
        (!rows.is_empty() && !cols.is_empty()).then_some((rows, cols))
    }
}

/// Sheet name → worksheet part, in workbook order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageIndex {
    pub sheets: Vec<SheetPart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetPart {
    pub name: String,
    pub part: String,
}

impl PackageIndex {
    pub fn part_for(&self, sheet: &str) -> Option<&str> {
        self.sheets
            .iter()
            .find(|entry| entry.name == sheet)
            .map(|entry| entry.part.as_str())
    }
}

/// An opened `.xlsx` container.
pub struct Package<R> {
    archive: ZipArchive<R>,
    index: PackageIndex,
}

impl Package<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> Package<R> {
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let workbook_xml = read_part(&mut archive, WORKBOOK_PART)?.ok_or_else(|| {
            ToolError::InvalidWorkbook(format!("package has no {WORKBOOK_PART}"))
        })?;
        let rels = match read_part(&mut archive, WORKBOOK_RELS_PART)? {
            Some(xml) => parse_relationships(&xml)?,
            None => BTreeMap::new(),
        };

        let mut sheets = Vec::new();
        for (name, rel_id) in parse_workbook(&workbook_xml)? {
            let rel = rels.get(&rel_id).ok_or_else(|| {
                ToolError::InvalidWorkbook(format!(
                    "sheet '{name}' references missing relationship {rel_id}"
                ))
            })?;
            sheets.push(SheetPart {
                name,
                part: resolve_target(WORKBOOK_PART, &rel.target),
            });
        }

        Ok(Self {
            archive,
            index: PackageIndex { sheets },
        })
    }

    /// Hyperlinks declared on `sheet`, in document order. A sheet without
    /// hyperlinks yields an empty list.
    pub fn sheet_hyperlinks(&mut self, sheet: &str) -> Result<Vec<HyperlinkRange>> {
        let part = self
            .index
            .part_for(sheet)
            .ok_or_else(|| ToolError::MissingSheet(sheet.to_string()))?
            .to_string();
        let Some(sheet_xml) = read_part(&mut self.archive, &part)? else {
            return Err(ToolError::InvalidWorkbook(format!("missing part {part}")));
        };
        let rels = match read_part(&mut self.archive, &rels_part_for(&part))? {
            Some(xml) => parse_relationships(&xml)?,
            None => BTreeMap::new(),
        };
        parse_sheet_hyperlinks(&sheet_xml, &rels)
    }
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            Ok(Some(contents))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Relationship {
    ty: String,
    target: String,
}

fn parse_relationships(xml: &str) -> Result<BTreeMap<String, Relationship>> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut rels = BTreeMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut attrs = attributes(&e)?;
                let Some(id) = attrs.remove("Id") else {
                    continue;
                };
                rels.insert(
                    id,
                    Relationship {
                        ty: attrs.remove("Type").unwrap_or_default(),
                        target: attrs.remove("Target").unwrap_or_default(),
                    },
                );
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

/// Returns `(sheet name, relationship id)` pairs in workbook order.
fn parse_workbook(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"sheet" => {
                let mut attrs = attributes(&e)?;
                let name = attrs
                    .remove("name")
                    .ok_or_else(|| ToolError::InvalidWorkbook("sheet without a name".into()))?;
                let rel_id = relationship_id(&reader, &e)?.ok_or_else(|| {
                    ToolError::InvalidWorkbook(format!("sheet '{name}' has no relationship id"))
                })?;
                sheets.push((name, rel_id));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

fn parse_sheet_hyperlinks(
    sheet_xml: &str,
    rels: &BTreeMap<String, Relationship>,
) -> Result<Vec<HyperlinkRange>> {
    let mut reader = NsReader::from_str(sheet_xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut links = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"hyperlink" => {
                let attrs = attributes(&e)?;
                let Some(reference) = attrs.get("ref") else {
                    continue;
                };
                let target = match (relationship_id(&reader, &e)?, attrs.get("location")) {
                    (Some(rel_id), _) => match rels.get(&rel_id) {
                        Some(rel) if rel.ty == REL_TYPE_HYPERLINK => rel.target.clone(),
                        _ => {
                            return Err(ToolError::InvalidWorkbook(format!(
                                "hyperlink {reference} references unknown relationship {rel_id}"
                            )));
                        }
                    },
                    (None, Some(location)) => location.clone(),
                    (None, None) => continue,
                };
                let ((first_row, first_col), (last_row, last_col)) = parse_range(reference)?;
                links.push(HyperlinkRange {
                    rows: first_row.min(last_row)..=first_row.max(last_row),
                    cols: first_col.min(last_col)..=first_col.max(last_col),
                    target,
                });
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(links)
}

/// The relationship id of an element, whatever prefix the document binds the
/// relationships namespace to.
fn relationship_id<R>(reader: &NsReader<R>, e: &BytesStart<'_>) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        let (namespace, local) = reader.resolve_attribute(attr.key);
        let bound = match namespace {
            ResolveResult::Bound(Namespace(ns)) => {
                RELATIONSHIP_NAMESPACES.iter().any(|known| *known == ns)
            }
            _ => false,
        };
        if bound && local.as_ref() == b"id" {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn attributes(e: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        out.insert(key, attr.unescape_value()?.into_owned());
    }
    Ok(out)
}

/// Resolves a relationship target against the part that owns it.
fn resolve_target(owner: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = owner.split('/').collect();
    segments.pop();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

type CellIndex = (usize, usize);

fn parse_range(reference: &str) -> Result<(CellIndex, CellIndex)> {
    let trimmed = reference.trim();
    match trimmed.split_once(':') {
        Some((start, end)) => Ok((parse_cell(start)?, parse_cell(end)?)),
        None => {
            let cell = parse_cell(trimmed)?;
            Ok((cell, cell))
        }
    }
}

/// Parses an A1 reference into a zero-based `(row, col)`.
pub(crate) fn parse_cell(reference: &str) -> Result<CellIndex> {
    let invalid = || ToolError::InvalidWorkbook(format!("invalid cell reference '{reference}'"));
    let cleaned: String = reference.chars().filter(|c| *c != '$').collect();
    let split = cleaned
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (letters, digits) = cleaned.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }
    let col = letters.bytes().try_fold(0usize, |acc, c| {
        acc.checked_mul(26)?
            .checked_add(usize::from(c.to_ascii_uppercase() - b'A') + 1)
    });
    let col = col.ok_or_else(invalid)?;
    let row: usize = digits.parse().map_err(|_| invalid())?;
    if row == 0 {
        return Err(invalid());
    }
    Ok((row - 1, col - 1))
}

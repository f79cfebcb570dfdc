//! DOCX reader: `word/document.xml` → [`Block`]s.
//!
//! The body is streamed with quick-xml and folded into paragraphs, list
//! items, headings and tables. Image references (`a:blip r:embed`, legacy
//! VML `v:imagedata r:id`) are resolved through the document's relationships
//! to the media part, whose bytes are read in full and tagged with the part's
//! declared content type.
//!
//! Only the text structure is kept. Run formatting, fields and tracked
//! deletions are dropped. `mc:Fallback` branches are skipped so content that
//! Word stores twice (DrawingML plus a VML fallback) is read once.

use super::ooxml::{attr_value, local_name, OoxmlPackage, Relationships};
use super::{Block, FormatAdapter, HostContent};
use crate::config::ConversionConfig;
use crate::error::Doc2MdError;
use crate::output::DocumentKind;
use crate::pipeline::materialize::RawImage;
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

const DOCUMENT_PART: &str = "word/document.xml";
const STYLES_PART: &str = "word/styles.xml";
const NUMBERING_PART: &str = "word/numbering.xml";

pub struct DocxAdapter;

#[async_trait]
impl FormatAdapter for DocxAdapter {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Docx
    }

    async fn extract(
        &self,
        path: &Path,
        _config: &ConversionConfig,
    ) -> Result<HostContent, Doc2MdError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_docx(&path))
            .await
            .map_err(|e| Doc2MdError::Internal(format!("DOCX task panicked: {}", e)))?
            .map(HostContent::Flow)
    }
}

/// Read a DOCX package into blocks, images included.
pub fn read_docx(path: &Path) -> Result<Vec<Block>, Doc2MdError> {
    let mut package = OoxmlPackage::open(path)?;

    let styles = match package.try_read_part(STYLES_PART)? {
        Some(xml) => StyleMap::parse(&xml).map_err(|e| package.corrupt(format!("{STYLES_PART}: {e}")))?,
        None => StyleMap::default(),
    };
    let numbering = match package.try_read_part(NUMBERING_PART)? {
        Some(xml) => {
            Numbering::parse(&xml).map_err(|e| package.corrupt(format!("{NUMBERING_PART}: {e}")))?
        }
        None => Numbering::default(),
    };

    let xml = package.read_part(DOCUMENT_PART)?;
    let items = parse_document(&xml, &styles, &numbering)
        .map_err(|e| package.corrupt(format!("{DOCUMENT_PART}: {e}")))?;
    let rels = package.relationships(DOCUMENT_PART)?;

    let blocks = resolve_images(&mut package, &rels, items)?;
    info!(
        "DOCX parsed: {} blocks, {} images",
        blocks.len(),
        blocks.iter().filter(|b| matches!(b, Block::Image(_))).count()
    );
    Ok(blocks)
}

/// A parsed body item before image references are resolved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DocxItem {
    Block(Block),
    /// Relationship id of an embedded image.
    ImageRef(String),
}

pub(crate) fn resolve_images(
    package: &mut OoxmlPackage,
    rels: &Relationships,
    items: Vec<DocxItem>,
) -> Result<Vec<Block>, Doc2MdError> {
    let mut blocks = Vec::with_capacity(items.len());
    for item in items {
        match item {
            DocxItem::Block(b) => blocks.push(b),
            DocxItem::ImageRef(rid) => {
                let Some(rel) = rels.get(&rid) else {
                    warn!("Image reference {} has no relationship, skipping", rid);
                    continue;
                };
                if rel.external {
                    debug!("Skipping linked image {}", rel.target);
                    continue;
                }
                let Some(bytes) = package.try_read_part(&rel.target)? else {
                    warn!("Image part {} is missing, skipping", rel.target);
                    continue;
                };
                let content_type = package.content_type(&rel.target).to_string();
                debug!("Image {} → {} ({} bytes, {})", rid, rel.target, bytes.len(), content_type);
                blocks.push(Block::Image(RawImage::new(bytes, content_type)));
            }
        }
    }
    Ok(blocks)
}

// ── Styles ───────────────────────────────────────────────────────────────

/// Paragraph style id → style name, from `word/styles.xml`.
#[derive(Debug, Clone, Default)]
pub(crate) struct StyleMap {
    names: HashMap<String, String>,
}

impl StyleMap {
    fn parse(xml: &[u8]) -> Result<Self, quick_xml::Error> {
        let mut names = HashMap::new();
        let mut reader = XmlReader::from_reader(xml);
        reader.trim_text(true);
        let mut buf = Vec::new();
        let mut current: Option<String> = None;
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) if local_name(e.name().as_ref()) == b"style" => {
                    current = attr_value(&reader, e, b"styleId");
                }
                Event::Start(ref e) | Event::Empty(ref e)
                    if local_name(e.name().as_ref()) == b"name" =>
                {
                    if let (Some(id), Some(name)) = (current.as_ref(), attr_value(&reader, e, b"val")) {
                        names.insert(id.clone(), name);
                    }
                }
                Event::End(ref e) if local_name(e.name().as_ref()) == b"style" => current = None,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(Self { names })
    }

    /// Heading level of a paragraph style, judged by its id and its name.
    pub(crate) fn heading_level(&self, style_id: &str) -> Option<u8> {
        heading_level_of(style_id)
            .or_else(|| self.names.get(style_id).and_then(|n| heading_level_of(n)))
    }
}

/// `Title` → 1, `Subtitle` → 2, `Heading3` / `heading 3` → 3.
fn heading_level_of(style: &str) -> Option<u8> {
    let lowered: String = style
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    match lowered.as_str() {
        "title" => return Some(1),
        "subtitle" => return Some(2),
        _ => {}
    }
    let digits = lowered.strip_prefix("heading")?;
    match digits.parse::<u8>() {
        Ok(level @ 1..=6) => Some(level),
        _ => None,
    }
}

// ── Numbering ────────────────────────────────────────────────────────────

/// Which list levels are ordered, from `word/numbering.xml`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Numbering {
    /// (abstractNumId, ilvl) → numFmt
    formats: HashMap<(String, usize), String>,
    /// numId → abstractNumId
    instances: HashMap<String, String>,
}

impl Numbering {
    fn parse(xml: &[u8]) -> Result<Self, quick_xml::Error> {
        let mut numbering = Numbering::default();
        let mut reader = XmlReader::from_reader(xml);
        reader.trim_text(true);
        let mut buf = Vec::new();

        let mut abstract_id: Option<String> = None;
        let mut level: Option<usize> = None;
        let mut num_id: Option<String> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let name = e.name();
                    match local_name(name.as_ref()) {
                        b"abstractNum" => abstract_id = attr_value(&reader, e, b"abstractNumId"),
                        b"lvl" => level = attr_value(&reader, e, b"ilvl").and_then(|v| v.parse().ok()),
                        b"numFmt" => {
                            if let (Some(a), Some(l), Some(fmt)) =
                                (abstract_id.as_ref(), level, attr_value(&reader, e, b"val"))
                            {
                                numbering.formats.insert((a.clone(), l), fmt);
                            }
                        }
                        b"num" => num_id = attr_value(&reader, e, b"numId"),
                        b"abstractNumId" => {
                            if let (Some(n), Some(a)) = (num_id.as_ref(), attr_value(&reader, e, b"val")) {
                                numbering.instances.insert(n.clone(), a);
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(ref e) => {
                    let name = e.name();
                    match local_name(name.as_ref()) {
                        b"abstractNum" => abstract_id = None,
                        b"lvl" => level = None,
                        b"num" => num_id = None,
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(numbering)
    }

    /// Unknown numbering renders as a bullet list.
    pub(crate) fn is_ordered(&self, num_id: &str, ilvl: usize) -> bool {
        self.instances
            .get(num_id)
            .and_then(|a| self.formats.get(&(a.clone(), ilvl)))
            .is_some_and(|fmt| fmt != "bullet" && fmt != "none")
    }
}

// ── Body ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Paragraph {
    text: String,
    style: Option<String>,
    num_id: Option<String>,
    ilvl: usize,
}

impl Paragraph {
    /// Take the text gathered so far as a block, keeping the paragraph's
    /// properties for whatever follows.
    fn take_block(&mut self, styles: &StyleMap, numbering: &Numbering) -> Option<Block> {
        let text = normalize_text(&std::mem::take(&mut self.text));
        if text.is_empty() {
            return None;
        }
        if let Some(level) = self.style.as_deref().and_then(|s| styles.heading_level(s)) {
            return Some(Block::Heading { level, text });
        }
        if let Some(num_id) = self.num_id.as_deref().filter(|id| *id != "0") {
            return Some(Block::ListItem {
                ordered: numbering.is_ordered(num_id, self.ilvl),
                depth: self.ilvl,
                text,
            });
        }
        Some(Block::Paragraph(text))
    }
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
    images: Vec<String>,
}

/// Fold `word/document.xml` into body items.
///
/// Images inside table cells are emitted right after their table, in order.
pub(crate) fn parse_document(
    xml: &[u8],
    styles: &StyleMap,
    numbering: &Numbering,
) -> Result<Vec<DocxItem>, quick_xml::Error> {
    let mut reader = XmlReader::from_reader(xml);
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut items = Vec::new();

    let mut para: Option<Paragraph> = None;
    let mut para_depth = 0usize;
    let mut table: Option<Table> = None;
    let mut table_depth = 0usize;
    let mut fallback_depth = 0usize;
    let mut in_text = false;
    let mut in_ppr = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        let (is_start, e) = match &event {
            Event::Start(e) => (true, Some(e)),
            Event::Empty(e) => (false, Some(e)),
            _ => (false, None),
        };

        if let Some(e) = e {
            let name = e.name();
            let local = local_name(name.as_ref());
            if local == b"Fallback" {
                if is_start {
                    fallback_depth += 1;
                }
            } else if fallback_depth == 0 {
                match local {
                    b"p" if is_start => {
                        para_depth += 1;
                        if para_depth == 1 {
                            para = Some(Paragraph::default());
                        } else if let Some(p) = para.as_mut() {
                            p.text.push('\n');
                        }
                    }
                    b"pPr" if is_start => in_ppr = true,
                    b"pStyle" if para_depth == 1 && in_ppr => {
                        if let Some(p) = para.as_mut() {
                            p.style = attr_value(&reader, e, b"val");
                        }
                    }
                    b"numId" if para_depth == 1 && in_ppr => {
                        if let Some(p) = para.as_mut() {
                            p.num_id = attr_value(&reader, e, b"val");
                        }
                    }
                    b"ilvl" if para_depth == 1 && in_ppr => {
                        if let Some(p) = para.as_mut() {
                            p.ilvl = attr_value(&reader, e, b"val")
                                .and_then(|v| v.parse().ok())
                                .unwrap_or(0);
                        }
                    }
                    b"t" if is_start => in_text = true,
                    b"tab" if !in_ppr => push_text(&mut para, "\t"),
                    b"br" | b"cr" if !in_ppr => {
                        let page_break = attr_value(&reader, e, b"type").is_some_and(|t| t == "page");
                        if !page_break {
                            push_text(&mut para, "\n");
                        }
                    }
                    b"blip" | b"imagedata" => {
                        let key: &[u8] = if local == b"blip" { b"embed" } else { b"id" };
                        if let Some(rid) = attr_value(&reader, e, key) {
                            if let Some(t) = table.as_mut() {
                                t.images.push(rid);
                            } else {
                                if let Some(b) = para.as_mut().and_then(|p| p.take_block(styles, numbering)) {
                                    items.push(DocxItem::Block(b));
                                }
                                items.push(DocxItem::ImageRef(rid));
                            }
                        }
                    }
                    b"tbl" if is_start => {
                        table_depth += 1;
                        if table_depth == 1 {
                            table = Some(Table::default());
                        }
                    }
                    b"tr" if is_start && table_depth == 1 => {
                        if let Some(t) = table.as_mut() {
                            t.row.clear();
                        }
                    }
                    b"tc" if is_start && table_depth == 1 => {
                        if let Some(t) = table.as_mut() {
                            t.cell.clear();
                        }
                    }
                    _ => {}
                }
            }
        }

        match &event {
            Event::Text(t) if in_text && fallback_depth == 0 => {
                if let Ok(text) = t.unescape() {
                    push_text(&mut para, &text);
                }
            }
            Event::End(e) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                if local == b"Fallback" {
                    fallback_depth = fallback_depth.saturating_sub(1);
                } else if fallback_depth == 0 {
                    match local {
                        b"t" => in_text = false,
                        b"pPr" => in_ppr = false,
                        b"p" => {
                            para_depth = para_depth.saturating_sub(1);
                            if para_depth == 0 {
                                if let Some(mut p) = para.take() {
                                    if let Some(t) = table.as_mut() {
                                        let text = normalize_text(&p.text).replace('\n', " ");
                                        if !text.is_empty() {
                                            if !t.cell.is_empty() {
                                                t.cell.push(' ');
                                            }
                                            t.cell.push_str(&text);
                                        }
                                    } else if let Some(b) = p.take_block(styles, numbering) {
                                        items.push(DocxItem::Block(b));
                                    }
                                }
                            }
                        }
                        b"tc" if table_depth == 1 => {
                            if let Some(t) = table.as_mut() {
                                let cell = std::mem::take(&mut t.cell);
                                t.row.push(cell);
                            }
                        }
                        b"tr" if table_depth == 1 => {
                            if let Some(t) = table.as_mut() {
                                let row = std::mem::take(&mut t.row);
                                t.rows.push(row);
                            }
                        }
                        b"tbl" => {
                            table_depth = table_depth.saturating_sub(1);
                            if table_depth == 0 {
                                if let Some(t) = table.take() {
                                    if t.rows.iter().any(|r| r.iter().any(|c| !c.is_empty())) {
                                        items.push(DocxItem::Block(Block::Table(t.rows)));
                                    }
                                    items.extend(t.images.into_iter().map(DocxItem::ImageRef));
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

fn push_text(para: &mut Option<Paragraph>, text: &str) {
    if let Some(p) = para.as_mut() {
        p.text.push_str(text);
    }
}

/// Trim every line and drop blank ones.
fn normalize_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

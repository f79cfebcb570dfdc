//! PPTX reader: slides → [`Block`]s.
//!
//! Slides are read in deck order, the `p:sldIdLst` of `ppt/presentation.xml`
//! resolved through its relationships. PowerPoint does not rename slide
//! parts when slides move, so the `N` of `slideN.xml` is only used when a
//! package has no slide list. Each slide contributes a [`Block::SlideMarker`], then its shapes in document order:
//! title placeholders become `#` headings, other text bodies paragraphs,
//! pictures images and `a:tbl` graphic frames tables. Speaker notes follow
//! as a [`Block::Notes`].

use super::docx::{resolve_images, DocxItem};
use super::ooxml::{attr_value, local_name, OoxmlPackage, Relationships};
use super::{Block, FormatAdapter, HostContent};
use crate::config::ConversionConfig;
use crate::error::Doc2MdError;
use crate::output::DocumentKind;
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;
use std::path::Path;
use tracing::{debug, info, warn};

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const SLIDE_PREFIX: &str = "ppt/slides/slide";

/// Placeholder types that never carry notes text.
const NOTES_CHROME: &[&str] = &["sldNum", "sldImg", "dt", "ftr", "hdr"];

pub struct PptxAdapter;

#[async_trait]
impl FormatAdapter for PptxAdapter {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Pptx
    }

    async fn extract(
        &self,
        path: &Path,
        _config: &ConversionConfig,
    ) -> Result<HostContent, Doc2MdError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_pptx(&path))
            .await
            .map_err(|e| Doc2MdError::Internal(format!("PPTX task panicked: {}", e)))?
            .map(HostContent::Flow)
    }
}

/// Read a PPTX package into blocks, images included.
pub fn read_pptx(path: &Path) -> Result<Vec<Block>, Doc2MdError> {
    let mut package = OoxmlPackage::open(path)?;
    let slides = slide_order(&mut package)?;
    info!("PPTX has {} slides", slides.len());

    let mut blocks = Vec::new();
    for (idx, part) in slides.iter().enumerate() {
        let xml = package.read_part(part)?;
        let shapes = parse_slide(&xml).map_err(|e| package.corrupt(format!("{part}: {e}")))?;
        let rels = package.relationships(part)?;

        let mut items = vec![DocxItem::Block(Block::SlideMarker(idx + 1))];
        for shape in shapes {
            items.push(match shape {
                SlideItem::Text { placeholder, text } if is_title(placeholder.as_deref()) => {
                    DocxItem::Block(Block::Heading {
                        level: 1,
                        text: text.replace('\n', " "),
                    })
                }
                SlideItem::Text { text, .. } => DocxItem::Block(Block::Paragraph(text)),
                SlideItem::Table(rows) => DocxItem::Block(Block::Table(rows)),
                SlideItem::Image(rid) => DocxItem::ImageRef(rid),
            });
        }
        // Relationship ids are scoped to their slide.
        blocks.extend(resolve_images(&mut package, &rels, items)?);

        let notes_part = rels
            .values()
            .find(|r| !r.external && r.rel_type.ends_with("/notesSlide"))
            .map(|r| r.target.clone());
        if let Some(notes_part) = notes_part {
            if let Some(xml) = package.try_read_part(&notes_part)? {
                let notes = parse_slide(&xml)
                    .map_err(|e| package.corrupt(format!("{notes_part}: {e}")))?;
                let text = notes_text(&notes);
                if !text.is_empty() {
                    debug!("Slide {} has {} bytes of notes", idx + 1, text.len());
                    blocks.push(Block::Notes(text));
                }
            }
        }
    }

    Ok(blocks)
}

/// Slide parts in deck order.
fn slide_order(package: &mut OoxmlPackage) -> Result<Vec<String>, Doc2MdError> {
    let names = package.part_names();
    let ids = match package.try_read_part(PRESENTATION_PART)? {
        Some(xml) => slide_ids(&xml)
            .map_err(|e| package.corrupt(format!("{PRESENTATION_PART}: {e}")))?,
        None => Vec::new(),
    };
    if ids.is_empty() {
        debug!("No slide list, ordering slides by part name");
        return Ok(slide_parts(&names));
    }
    let rels = package.relationships(PRESENTATION_PART)?;
    Ok(deck_order(&ids, &rels, &names))
}

/// Relationship ids of `p:sldIdLst`, in list order.
fn slide_ids(xml: &[u8]) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = XmlReader::from_reader(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut ids = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e)
                if local_name(e.name().as_ref()) == b"sldId" =>
            {
                if let Some(rid) = relationship_id(&reader, e) {
                    ids.push(rid);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(ids)
}

/// The prefixed `r:id` of an element, not the numeric `id` beside it.
fn relationship_id<R>(reader: &XmlReader<R>, element: &BytesStart) -> Option<String> {
    element
        .attributes()
        .with_checks(false)
        .flatten()
        .find(|attr| {
            let key = attr.key.as_ref();
            key != b"id" && local_name(key) == b"id"
        })
        .and_then(|attr| attr.decode_and_unescape_value(reader).ok())
        .map(|value| value.into_owned())
}

/// Slide parts named by `ids`, skipping entries without a slide in the package.
fn deck_order(ids: &[String], rels: &Relationships, names: &[String]) -> Vec<String> {
    ids.iter()
        .filter_map(|rid| match rels.get(rid) {
            Some(rel) if !rel.external && names.contains(&rel.target) => Some(rel.target.clone()),
            _ => {
                warn!("Slide list entry {} has no slide part, skipped", rid);
                None
            }
        })
        .collect()
}

/// Slide part names ordered by slide number.
fn slide_parts(names: &[String]) -> Vec<String> {
    let mut slides: Vec<(usize, String)> = names
        .iter()
        .filter_map(|name| {
            let n = name.strip_prefix(SLIDE_PREFIX)?.strip_suffix(".xml")?;
            Some((n.parse::<usize>().ok()?, name.clone()))
        })
        .collect();
    slides.sort_by_key(|(n, _)| *n);
    slides.into_iter().map(|(_, name)| name).collect()
}

fn is_title(placeholder: Option<&str>) -> bool {
    matches!(placeholder, Some("title") | Some("ctrTitle"))
}

fn notes_text(items: &[SlideItem]) -> String {
    items
        .iter()
        .filter_map(|item| match item {
            SlideItem::Text { placeholder, text }
                if !placeholder
                    .as_deref()
                    .is_some_and(|p| NOTES_CHROME.contains(&p)) =>
            {
                Some(text.as_str())
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One shape of a slide, in document order.
#[derive(Debug, Clone, PartialEq)]
enum SlideItem {
    /// A text body; `placeholder` is the `p:ph` type when the shape has one.
    Text {
        placeholder: Option<String>,
        text: String,
    },
    Table(Vec<Vec<String>>),
    /// Relationship id of a picture.
    Image(String),
}

#[derive(Debug, Default)]
struct Shape {
    placeholder: Option<String>,
    paragraphs: Vec<String>,
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: Vec<String>,
}

fn parse_slide(xml: &[u8]) -> Result<Vec<SlideItem>, quick_xml::Error> {
    let mut reader = XmlReader::from_reader(xml);
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut items = Vec::new();

    let mut shape: Option<Shape> = None;
    let mut table: Option<Table> = None;
    let mut paragraph: Option<String> = None;
    let mut pic_depth = 0usize;
    let mut in_text = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Start(e) | Event::Empty(e) => {
                let is_start = matches!(event, Event::Start(_));
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"sp" if is_start => shape = Some(Shape::default()),
                    b"ph" => {
                        if let Some(s) = shape.as_mut() {
                            // A `p:ph` without a type is a body placeholder.
                            s.placeholder =
                                Some(attr_value(&reader, e, b"type").unwrap_or_else(|| "body".into()));
                        }
                    }
                    b"pic" if is_start => pic_depth += 1,
                    b"blip" if pic_depth > 0 => {
                        if let Some(rid) = attr_value(&reader, e, b"embed") {
                            items.push(SlideItem::Image(rid));
                        }
                    }
                    b"tbl" if is_start => table = Some(Table::default()),
                    b"p" if is_start => paragraph = Some(String::new()),
                    b"t" if is_start => in_text = true,
                    b"br" => {
                        if let Some(p) = paragraph.as_mut() {
                            p.push('\n');
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(t) if in_text => {
                if let (Some(p), Ok(text)) = (paragraph.as_mut(), t.unescape()) {
                    p.push_str(&text);
                }
            }
            Event::End(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"t" => in_text = false,
                    b"p" => {
                        if let Some(text) = paragraph.take() {
                            let text = text.trim().to_string();
                            if !text.is_empty() {
                                if let Some(t) = table.as_mut() {
                                    t.cell.push(text);
                                } else if let Some(s) = shape.as_mut() {
                                    s.paragraphs.push(text);
                                }
                            }
                        }
                    }
                    b"sp" => {
                        if let Some(s) = shape.take() {
                            if !s.paragraphs.is_empty() {
                                items.push(SlideItem::Text {
                                    placeholder: s.placeholder,
                                    text: s.paragraphs.join("\n"),
                                });
                            }
                        }
                    }
                    b"pic" => pic_depth = pic_depth.saturating_sub(1),
                    b"tc" => {
                        if let Some(t) = table.as_mut() {
                            let cell = std::mem::take(&mut t.cell).join(" ");
                            t.row.push(cell);
                        }
                    }
                    b"tr" => {
                        if let Some(t) = table.as_mut() {
                            let row = std::mem::take(&mut t.row);
                            t.rows.push(row);
                        }
                    }
                    b"tbl" => {
                        if let Some(t) = table.take() {
                            if !t.rows.is_empty() {
                                items.push(SlideItem::Table(t.rows));
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

//! Markdown assembly.
//!
//! Two shapes of content reach this stage:
//!
//! * **Pages** (PDF): each page is a bag of positioned items, text blocks
//!   and caption placeholders. [`PageAssembler`] orders each page by
//!   `(top, left)` and appends the pages in the order they are pushed. Pages
//!   are never re-sorted against each other, so a page-2 item at `top = 5`
//!   still follows every page-1 item.
//! * **Flow** (DOCX, PPTX): blocks are already in reading order;
//!   [`render_flow`] turns them into Markdown, splicing in one caption per
//!   image block.
//!
//! This is a heuristic reading order, not layout analysis: multi-column
//! pages interleave their columns line by line.

use crate::config::PageSeparator;
use crate::formats::Block;

/// Axis-aligned rectangle in page coordinates with the origin at the top-left
/// corner, so `top < bottom` for any non-degenerate box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub top: f32,
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
}

impl BoundingBox {
    pub fn new(top: f32, left: f32, bottom: f32, right: f32) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Text,
    Image,
}

/// One piece of page content with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedItem {
    pub kind: ItemKind,
    /// Text block, or an image's `[caption]()` placeholder.
    pub content: String,
    pub bbox: BoundingBox,
}

impl PositionedItem {
    pub fn text(content: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            kind: ItemKind::Text,
            content: content.into(),
            bbox,
        }
    }

    /// Wrap a caption as its placeholder.
    pub fn image(caption: &str, bbox: BoundingBox) -> Self {
        Self {
            kind: ItemKind::Image,
            content: placeholder(caption),
            bbox,
        }
    }
}

/// `[caption]()`, the inline form every image is replaced by.
pub fn placeholder(caption: &str) -> String {
    format!("[{}]()", caption)
}

/// Stable sort by top edge, then left edge. Ties keep extraction order.
pub fn sort_reading_order(items: &mut [PositionedItem]) {
    items.sort_by(|a, b| {
        a.bbox
            .top
            .total_cmp(&b.bbox.top)
            .then_with(|| a.bbox.left.total_cmp(&b.bbox.left))
    });
}

/// Accumulates pages into one Markdown buffer.
#[derive(Debug, Default)]
pub struct PageAssembler {
    buffer: String,
    separator: PageSeparator,
    non_empty_pages: usize,
}

impl PageAssembler {
    pub fn new(separator: PageSeparator) -> Self {
        Self {
            buffer: String::new(),
            separator,
            non_empty_pages: 0,
        }
    }

    /// Order `items` and append them, each followed by a newline.
    ///
    /// Returns the number of items appended. A page with no items leaves the
    /// buffer untouched, separator included.
    pub fn push_page(&mut self, page_num: usize, mut items: Vec<PositionedItem>) -> usize {
        if items.is_empty() {
            return 0;
        }
        if self.non_empty_pages > 0 {
            self.buffer.push_str(&self.separator.render(page_num));
        }
        sort_reading_order(&mut items);
        for item in &items {
            self.buffer.push_str(&item.content);
            self.buffer.push('\n');
        }
        self.non_empty_pages += 1;
        items.len()
    }

    pub fn finish(self) -> String {
        self.buffer
    }
}

/// Render flow blocks to Markdown.
///
/// `captions[i]` replaces the i-th [`Block::Image`]; blocks are separated by
/// a blank line, consecutive list items by a single newline.
pub fn render_flow(blocks: &[Block], captions: &[String]) -> String {
    let mut out = String::new();
    let mut captions = captions.iter();
    let mut prev_list = false;

    for block in blocks {
        let rendered = match block {
            Block::Heading { level, text } => {
                format!("{} {}", "#".repeat((*level).clamp(1, 6) as usize), text)
            }
            Block::Paragraph(text) => text.clone(),
            Block::ListItem {
                ordered,
                depth,
                text,
            } => {
                let marker = if *ordered { "1." } else { "-" };
                format!("{}{} {}", "   ".repeat(*depth), marker, text)
            }
            Block::Table(rows) => render_table(rows),
            Block::Image(_) => placeholder(captions.next().map(String::as_str).unwrap_or("")),
            Block::SlideMarker(n) => format!("<!-- Slide number: {} -->", n),
            Block::Notes(text) => format!("### Notes:\n{}", text),
        };
        if rendered.is_empty() {
            continue;
        }

        let is_list = matches!(block, Block::ListItem { .. });
        if !out.is_empty() {
            out.push_str(if is_list && prev_list { "\n" } else { "\n\n" });
        }
        out.push_str(&rendered);
        prev_list = is_list;
    }

    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// GFM pipe table; the first row is the header. Short rows are padded.
fn render_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }
    let line = |row: &[String]| {
        let cells: Vec<String> = (0..width)
            .map(|i| escape_cell(row.get(i).map(String::as_str).unwrap_or("")))
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(line(&rows[0]));
    lines.push(format!("|{}", " --- |".repeat(width)));
    lines.extend(rows[1..].iter().map(|r| line(r)));
    lines.join("\n")
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace('\n', " ")
}

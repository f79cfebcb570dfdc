//! Format adapters: one reader per host format.
//!
//! An adapter turns a document on disk into [`HostContent`] and nothing more.
//! It never materializes or captions images; it hands them back as
//! [`RawImage`]s at the position they occur, and the engine decides what to
//! do with them. The adapter is chosen once per conversion by
//! [`adapter_for`], from the [`DocumentKind`] the input detector settled on.
//!
//! ```text
//! DOCX ─┐
//!       ├─▶ HostContent::Flow(blocks)   ─▶ captions spliced in place
//! PPTX ─┘
//! PDF  ───▶ HostContent::Paged(pages)  ─▶ PageAssembler
//! ```
//!
//! Standalone images have no adapter: converting one *is* captioning it,
//! see [`image`].

pub mod docx;
pub mod image;
pub mod ooxml;
pub mod pdf;
pub mod pptx;

use crate::config::ConversionConfig;
use crate::error::Doc2MdError;
use crate::output::DocumentKind;
use crate::pipeline::assemble::BoundingBox;
use crate::pipeline::materialize::RawImage;
use async_trait::async_trait;
use std::path::Path;

/// One unit of flowing document content, in reading order.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// `level` is 1..=6.
    Heading { level: u8, text: String },
    Paragraph(String),
    /// `depth` is the nesting level, 0 for a top-level item.
    ListItem {
        ordered: bool,
        depth: usize,
        text: String,
    },
    /// Rows of cells; the first row is rendered as the header.
    Table(Vec<Vec<String>>),
    /// An embedded image, replaced by its caption placeholder on output.
    Image(RawImage),
    /// Start of a presentation slide (1-indexed).
    SlideMarker(usize),
    /// Speaker notes of the preceding slide.
    Notes(String),
}

/// A text block of a PDF page with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub text: String,
    pub bbox: BoundingBox,
}

/// An image object of a PDF page with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    pub raw: RawImage,
    pub bbox: BoundingBox,
}

/// Everything extracted from one PDF page, in extraction order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageContent {
    /// 1-indexed page number.
    pub page_num: usize,
    pub text_blocks: Vec<TextBlock>,
    pub images: Vec<PageImage>,
}

/// What an adapter extracted from a document.
#[derive(Debug, Clone, PartialEq)]
pub enum HostContent {
    /// Flowing content (DOCX, PPTX).
    Flow(Vec<Block>),
    /// Page-positioned content (PDF). `total_pages` counts the whole
    /// document, `pages` only the selected ones, in ascending order.
    Paged {
        total_pages: usize,
        pages: Vec<PageContent>,
    },
}

impl HostContent {
    /// Number of embedded images, in extraction order.
    pub fn image_count(&self) -> usize {
        match self {
            HostContent::Flow(blocks) => blocks
                .iter()
                .filter(|b| matches!(b, Block::Image(_)))
                .count(),
            HostContent::Paged { pages, .. } => pages.iter().map(|p| p.images.len()).sum(),
        }
    }

    /// Pages (PDF) or slides (PPTX); 0 for unpaginated flow.
    pub fn page_count(&self) -> usize {
        match self {
            HostContent::Flow(blocks) => blocks
                .iter()
                .filter(|b| matches!(b, Block::SlideMarker(_)))
                .count(),
            HostContent::Paged { total_pages, .. } => *total_pages,
        }
    }
}

/// Reads one host format.
#[async_trait]
pub trait FormatAdapter: Send + Sync {
    fn kind(&self) -> DocumentKind;

    /// Parse `path` into blocks or pages. Images are returned, not captioned.
    async fn extract(
        &self,
        path: &Path,
        config: &ConversionConfig,
    ) -> Result<HostContent, Doc2MdError>;
}

/// The adapter for `kind`, or `None` for standalone images.
pub fn adapter_for(kind: DocumentKind) -> Option<Box<dyn FormatAdapter>> {
    match kind {
        DocumentKind::Docx => Some(Box::new(docx::DocxAdapter)),
        DocumentKind::Pptx => Some(Box::new(pptx::PptxAdapter)),
        DocumentKind::Pdf => Some(Box::new(pdf::PdfAdapter)),
        DocumentKind::Image => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapters_match_their_kind() {
        for kind in [DocumentKind::Docx, DocumentKind::Pptx, DocumentKind::Pdf] {
            assert_eq!(adapter_for(kind).map(|a| a.kind()), Some(kind));
        }
        assert!(adapter_for(DocumentKind::Image).is_none());
    }

    #[test]
    fn counts_images_and_slides() {
        let flow = HostContent::Flow(vec![
            Block::SlideMarker(1),
            Block::Image(RawImage::new(vec![1], "png")),
            Block::SlideMarker(2),
            Block::Paragraph("x".into()),
            Block::Image(RawImage::new(vec![2], "png")),
        ]);
        assert_eq!(flow.image_count(), 2);
        assert_eq!(flow.page_count(), 2);
    }
}

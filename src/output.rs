//! Output types returned by the conversion entry points.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host format of a converted input, decided once per conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Docx,
    Pptx,
    Pdf,
    /// A standalone raster image; converting it yields its caption.
    Image,
}

impl DocumentKind {
    /// Whether the format is reconstructed page by page.
    pub fn is_paginated(self) -> bool {
        matches!(self, DocumentKind::Pdf)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentKind::Docx => "docx",
            DocumentKind::Pptx => "pptx",
            DocumentKind::Pdf => "pdf",
            DocumentKind::Image => "image",
        };
        f.write_str(s)
    }
}

/// The result of converting one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// The assembled Markdown; every embedded image appears as `[caption]()`.
    pub markdown: String,
    /// Detected host format.
    pub kind: DocumentKind,
    /// Counters and timings.
    pub stats: ConversionStats,
}

/// Statistics for one conversion. Nested image conversions are not counted
/// separately; they show up as `images_captioned` / `caption_failures`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages (PDF) or slides (PPTX) in the document; 0 for DOCX and images.
    pub total_pages: usize,
    /// Pages actually assembled after page selection.
    pub processed_pages: usize,
    /// Embedded images found by the format adapter.
    pub images_found: usize,
    /// Images whose nested conversion succeeded.
    pub images_captioned: usize,
    /// Images replaced by the placeholder caption.
    pub caption_failures: usize,
    /// Wall-clock time of the whole conversion.
    pub total_duration_ms: u64,
    /// Time spent inside nested image conversions.
    pub caption_duration_ms: u64,
}

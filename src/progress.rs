//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the engine works through a document. Only the top-level
//! conversion reports; the nested conversions that caption images are silent
//! and surface as `on_image_*` events of their parent.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doc2md::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     captioned: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_image_captioned(&self, index: usize, caption_len: usize) {
//!         self.captioned.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("image {} captioned ({} bytes)", index, caption_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     captioned: AtomicUsize::new(0),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::DocumentKind;
use std::sync::Arc;

/// Called by the conversion engine as it processes a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. With `caption_concurrency > 1` the `on_image_*`
/// events of one page may arrive from several tasks at once.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after the format is detected and the document is parsed.
    ///
    /// # Arguments
    /// * `kind`: detected host format
    /// * `total_pages`: pages (PDF) or slides (PPTX) to process; 0 for DOCX
    fn on_conversion_start(&self, kind: DocumentKind, total_pages: usize) {
        let _ = (kind, total_pages);
    }

    /// Called before the images of a PDF page are captioned.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `total_pages`: total pages in the document
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a PDF page has been assembled.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `total_pages`: total pages
    /// * `items`: positioned items (text blocks and captions) emitted
    fn on_page_complete(&self, page_num: usize, total_pages: usize, items: usize) {
        let _ = (page_num, total_pages, items);
    }

    /// Called before an embedded image is materialized.
    ///
    /// `index` counts images in extraction order across the whole document,
    /// starting at 1.
    fn on_image_start(&self, index: usize) {
        let _ = index;
    }

    /// Called when an image's nested conversion produced a caption.
    fn on_image_captioned(&self, index: usize, caption_len: usize) {
        let _ = (index, caption_len);
    }

    /// Called when an image could not be captioned, whether or not the
    /// failure policy lets the conversion continue.
    fn on_image_error(&self, index: usize, error: &str) {
        let _ = (index, error);
    }

    /// Called once after the Markdown has been assembled.
    ///
    /// # Arguments
    /// * `images_captioned`: images that received a real caption
    /// * `caption_failures`: images replaced by the placeholder
    fn on_conversion_complete(&self, images_captioned: usize, caption_failures: usize) {
        let _ = (images_captioned, caption_failures);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

//! PDF reader: positioned text blocks and image objects per page, via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and must not be driven from async worker threads. All pdfium work
//! for one document runs inside a single `spawn_blocking` closure and only
//! owned data ([`PageContent`]) leaves it.
//!
//! ## Coordinates
//!
//! pdfium reports rectangles in PDF user space, origin bottom-left. Every box
//! is flipped against the page height here, so downstream code only ever sees
//! a top-left origin where a smaller `top` is higher on the page.
//!
//! Images drawn inside form XObjects are first mapped from form space to page
//! space through the enclosing form matrices.

use super::{FormatAdapter, HostContent, PageContent, PageImage, TextBlock};
use crate::config::{ConversionConfig, PageSelection};
use crate::error::Doc2MdError;
use crate::output::DocumentKind;
use crate::pipeline::assemble::BoundingBox;
use crate::pipeline::encode::png_bytes;
use crate::pipeline::materialize::RawImage;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

pub struct PdfAdapter;

#[async_trait]
impl FormatAdapter for PdfAdapter {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Pdf
    }

    async fn extract(
        &self,
        path: &Path,
        config: &ConversionConfig,
    ) -> Result<HostContent, Doc2MdError> {
        let path = path.to_path_buf();
        let password = config.password.clone();
        let selection = config.pages.clone();

        tokio::task::spawn_blocking(move || read_pdf(&path, password.as_deref(), &selection))
            .await
            .map_err(|e| Doc2MdError::Internal(format!("PDF task panicked: {}", e)))?
    }
}

/// Bind the pdfium shared library.
///
/// Tried in order: the file named by `PDFIUM_LIB_PATH`, the platform library
/// in the working directory, the system library.
pub fn bind_pdfium() -> Result<Pdfium, Doc2MdError> {
    let from_env = std::env::var("PDFIUM_LIB_PATH")
        .ok()
        .filter(|p| !p.is_empty())
        .and_then(|p| match Pdfium::bind_to_library(&p) {
            Ok(bindings) => Some(bindings),
            Err(e) => {
                debug!("PDFIUM_LIB_PATH '{}' could not be bound: {:?}", p, e);
                None
            }
        });

    let bindings = match from_env {
        Some(bindings) => bindings,
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| Doc2MdError::MissingDependency {
                dependency: "pdfium".to_string(),
                detail: format!("{:?}", e),
                hint: "Set PDFIUM_LIB_PATH to the pdfium shared library, place it in the \
                       working directory, or install it system-wide."
                    .to_string(),
            })?,
    };

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of PDF extraction.
fn read_pdf(
    pdf_path: &Path,
    password: Option<&str>,
    selection: &PageSelection,
) -> Result<HostContent, Doc2MdError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                Doc2MdError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                Doc2MdError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            Doc2MdError::CorruptDocument {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let indices = selection.to_indices(total_pages);
    if indices.is_empty() && total_pages > 0 {
        return Err(Doc2MdError::PageOutOfRange {
            page: 0,
            total: total_pages,
        });
    }

    let mut contents = Vec::with_capacity(indices.len());
    for idx in indices {
        let page_num = idx + 1;
        let page = pages
            .get(idx as u16)
            .map_err(|e| Doc2MdError::CorruptDocument {
                path: pdf_path.to_path_buf(),
                detail: format!("page {}: {:?}", page_num, e),
            })?;
        let content = extract_page(&page, page_num).map_err(|e| match e {
            PageError::Bounds { image, detail } => Doc2MdError::BoundingBoxUnresolved {
                page: page_num,
                image,
                detail,
            },
            PageError::Other(detail) => Doc2MdError::CorruptDocument {
                path: pdf_path.to_path_buf(),
                detail: format!("page {}: {}", page_num, detail),
            },
        })?;
        debug!(
            "Page {}: {} text blocks, {} images",
            page_num,
            content.text_blocks.len(),
            content.images.len()
        );
        contents.push(content);
    }

    Ok(HostContent::Paged {
        total_pages,
        pages: contents,
    })
}

enum PageError {
    /// 1-indexed image number on the page.
    Bounds { image: usize, detail: String },
    Other(String),
}

fn extract_page(page: &PdfPage, page_num: usize) -> Result<PageContent, PageError> {
    let height = page.height().value;

    let text = page
        .text()
        .map_err(|e| PageError::Other(format!("text layer: {:?}", e)))?;
    let segments: Vec<TextBlock> = text
        .segments()
        .iter()
        .map(|segment| {
            let b = segment.bounds();
            TextBlock {
                text: segment.text(),
                bbox: flip(height, b.top().value, b.left().value, b.bottom().value, b.right().value),
            }
        })
        .collect();
    let text_blocks = merge_segments(segments);

    let mut images = Vec::new();
    let mut forms = Vec::new();
    for object in page.objects().iter() {
        collect_images(&object, &mut forms, height, &mut images)?;
    }

    Ok(PageContent {
        page_num,
        text_blocks,
        images,
    })
}

/// Append `object` to `images` when it is an image, or every image drawn
/// inside it when it is a form XObject.
///
/// `forms` holds the matrices of the enclosing forms, innermost last. pdfium
/// reports the bounds of a form's children in the form's own space.
fn collect_images(
    object: &PdfPageObject,
    forms: &mut Vec<PdfMatrix>,
    page_height: f32,
    images: &mut Vec<PageImage>,
) -> Result<(), PageError> {
    if let Some(form) = object.as_x_object_form_object() {
        let matrix = form.matrix().map_err(|e| PageError::Bounds {
            image: images.len() + 1,
            detail: format!("form matrix: {:?}", e),
        })?;
        debug!("Form XObject with {} objects", form.len());
        forms.push(matrix);
        for index in form.as_range() {
            let child = form
                .get(index)
                .map_err(|e| PageError::Other(format!("form object {}: {:?}", index, e)))?;
            collect_images(&child, forms, page_height, images)?;
        }
        forms.pop();
        return Ok(());
    }

    let Some(image_object) = object.as_image_object() else {
        return Ok(());
    };
    let image = images.len() + 1;

    let b = object.bounds().map_err(|e| PageError::Bounds {
        image,
        detail: format!("{:?}", e),
    })?;
    let b = to_page_space(b, forms);
    let bbox = flip(page_height, b.top().value, b.left().value, b.bottom().value, b.right().value);
    if !(bbox.top.is_finite() && bbox.left.is_finite()) {
        return Err(PageError::Bounds {
            image,
            detail: format!("non-finite bounds {:?}", bbox),
        });
    }

    let pixels = image_object
        .get_raw_image()
        .map_err(|e| PageError::Other(format!("image {}: {:?}", image, e)))?;
    let bytes = png_bytes(&pixels)
        .map_err(|e| PageError::Other(format!("image {}: PNG encoding failed: {}", image, e)))?;

    images.push(PageImage {
        raw: RawImage::new(bytes, "png"),
        bbox,
    });
    Ok(())
}

/// Map form-space bounds through the enclosing form matrices, innermost first.
fn to_page_space(bounds: PdfQuadPoints, forms: &[PdfMatrix]) -> PdfQuadPoints {
    forms
        .iter()
        .rev()
        .fold(bounds, |quad, matrix| quad.transform(*matrix))
}

/// Convert a bottom-left-origin rectangle to a top-left-origin box.
fn flip(page_height: f32, top: f32, left: f32, bottom: f32, right: f32) -> BoundingBox {
    BoundingBox::new(page_height - top, left, page_height - bottom, right)
}

/// Merge text segments into blocks.
///
/// Segments arrive in content-stream order. A segment joins the current
/// block when it sits on the block's last line (vertical overlap of at least
/// half the shorter height, joined with a space) or starts the next line
/// (gap under 0.6 line heights and horizontal overlap with the block, joined
/// with a newline). Anything else starts a new block.
pub fn merge_segments(segments: Vec<TextBlock>) -> Vec<TextBlock> {
    let mut blocks: Vec<TextBlock> = Vec::new();
    let mut last_line = BoundingBox::default();

    for seg in segments {
        let text = seg.text.trim();
        if text.is_empty() {
            continue;
        }
        let b = seg.bbox;

        if let Some(cur) = blocks.last_mut() {
            let overlap = b.bottom.min(last_line.bottom) - b.top.max(last_line.top);
            let same_line = overlap >= 0.5 * box_height(&b).min(box_height(&last_line));

            let gap = b.top - last_line.bottom;
            let next_line = b.top >= last_line.top
                && gap <= 0.6 * box_height(&last_line).max(1.0)
                && b.left < cur.bbox.right
                && b.right > cur.bbox.left;

            if same_line {
                cur.text.push(' ');
                cur.text.push_str(text);
                last_line = union(&last_line, &b);
                cur.bbox = union(&cur.bbox, &b);
                continue;
            }
            if next_line {
                cur.text.push('\n');
                cur.text.push_str(text);
                last_line = b;
                cur.bbox = union(&cur.bbox, &b);
                continue;
            }
        }

        blocks.push(TextBlock {
            text: text.to_string(),
            bbox: b,
        });
        last_line = b;
    }

    blocks
}

fn box_height(b: &BoundingBox) -> f32 {
    (b.bottom - b.top).max(0.0)
}

fn union(a: &BoundingBox, b: &BoundingBox) -> BoundingBox {
    BoundingBox::new(
        a.top.min(b.top),
        a.left.min(b.left),
        a.bottom.max(b.bottom),
        a.right.max(b.right),
    )
}

//! End-to-end PDF tests for edgequake-doc2md.
//!
//! These tests need the pdfium shared library, so they are gated behind the
//! `E2E_ENABLED` environment variable and do not run in CI unless explicitly
//! requested. The PDFs are generated in the test, and captions come from a
//! scripted captioner, so no API key is needed.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test e2e -- --nocapture

use async_trait::async_trait;
use edgequake_doc2md::{
    convert, inspect, ConversionConfig, Doc2MdError, DocumentKind, ImageCaptioner,
    PageSelection, PageSeparator,
};
use edgequake_llm::ImageData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    };
}

/// Page height of every generated PDF, in points.
const PAGE_HEIGHT: u32 = 200;

/// One drawing operation on a generated page.
enum Draw {
    /// Text whose baseline sits `from_top` points below the top edge.
    Text { from_top: u32, text: &'static str },
    /// A 2×2 RGB image, 40 points square, whose top edge sits `from_top`
    /// points below the top edge of the page.
    Image { from_top: u32 },
    /// The same image, drawn by a form XObject placed `from_top` points
    /// below the top edge.
    FormImage { from_top: u32 },
}

/// Build a PDF with one page per entry of `pages`, with a correct xref table.
fn build_pdf(pages: &[Vec<Draw>]) -> Vec<u8> {
    let mut objects: Vec<String> = Vec::new();
    // 1: catalog, 2: pages, 3: font, 4: image, 5: form; pages follow.
    let first_page = 6;
    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", first_page + 2 * i))
        .collect();

    objects.push("<< /Type /Catalog /Pages 2 0 R >>".into());
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".into());
    let pixels = "\u{ff}\0\0\0\u{ff}\0\0\0\u{ff}\u{ff}\u{ff}\0";
    objects.push(format!(
        "<< /Type /XObject /Subtype /Image /Width 2 /Height 2 /ColorSpace /DeviceRGB \
         /BitsPerComponent 8 /Length 12 >>\nstream\n{pixels}\nendstream"
    ));
    let form = "q 40 0 0 40 0 0 cm /Im1 Do Q\n";
    objects.push(format!(
        "<< /Type /XObject /Subtype /Form /BBox [0 0 40 40] \
         /Resources << /XObject << /Im1 4 0 R >> >> /Length {} >>\nstream\n{form}endstream",
        form.len()
    ));

    for (i, draws) in pages.iter().enumerate() {
        let content: String = draws
            .iter()
            .map(|d| match d {
                Draw::Text { from_top, text } => format!(
                    "BT /F1 12 Tf 20 {} Td ({}) Tj ET\n",
                    PAGE_HEIGHT - from_top,
                    text
                ),
                Draw::Image { from_top } => format!(
                    "q 40 0 0 40 100 {} cm /Im1 Do Q\n",
                    PAGE_HEIGHT - from_top - 40
                ),
                Draw::FormImage { from_top } => format!(
                    "q 1 0 0 1 100 {} cm /Fm1 Do Q\n",
                    PAGE_HEIGHT - from_top - 40
                ),
            })
            .collect();
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 300 {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 3 0 R >> /XObject << /Im1 4 0 R /Fm1 5 0 R >> >> \
             /Contents {} 0 R >>",
            first_page + 2 * i + 1
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ));
    }

    // Latin-1 so the raw pixel bytes come out as single bytes.
    let mut out: Vec<u8> = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        let obj = format!("{} 0 obj\n{}\nendobj\n", i + 1, body);
        out.extend(obj.chars().map(|c| c as u8));
    }
    let xref_at = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for off in offsets {
        xref.push_str(&format!("{off:010} 00000 n \n"));
    }
    xref.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    ));
    out.extend_from_slice(xref.as_bytes());
    out
}

fn write_pdf(dir: &TempDir, pages: &[Vec<Draw>]) -> PathBuf {
    let path = dir.path().join("generated.pdf");
    std::fs::write(&path, build_pdf(pages)).unwrap();
    path
}

struct Fixed;

#[async_trait]
impl ImageCaptioner for Fixed {
    async fn caption(&self, image: ImageData, _prompt: &str) -> Result<String, Doc2MdError> {
        assert_eq!(image.mime_type, "image/png");
        Ok("a striped square".into())
    }
}

fn config(output_dir: &Path) -> ConversionConfig {
    ConversionConfig::builder()
        .output_dir(output_dir)
        .captioner(Arc::new(Fixed))
        .build()
        .unwrap()
}

fn position(md: &str, needle: &str) -> usize {
    md.find(needle)
        .unwrap_or_else(|| panic!("{needle:?} missing from:\n{md}"))
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pages_never_reorder() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let path = write_pdf(
        &dir,
        &[
            vec![Draw::Text {
                from_top: 10,
                text: "page one text",
            }],
            vec![Draw::Text {
                from_top: 5,
                text: "page two text",
            }],
        ],
    );

    let out = convert(path.to_string_lossy(), &config(temp.path()))
        .await
        .expect("convert() should succeed");

    assert_eq!(out.kind, DocumentKind::Pdf);
    assert_eq!(out.stats.total_pages, 2);
    assert!(position(&out.markdown, "page one text") < position(&out.markdown, "page two text"));
}

#[tokio::test]
async fn test_items_sorted_top_to_bottom() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    // Drawn bottom-up; read top-down.
    let path = write_pdf(
        &dir,
        &[vec![
            Draw::Text {
                from_top: 180,
                text: "footer",
            },
            Draw::Image { from_top: 60 },
            Draw::Text {
                from_top: 20,
                text: "header",
            },
        ]],
    );

    let out = convert(path.to_string_lossy(), &config(temp.path()))
        .await
        .expect("convert() should succeed");

    let md = &out.markdown;
    println!("{md}");
    assert!(position(md, "header") < position(md, "[a striped square]()"));
    assert!(position(md, "[a striped square]()") < position(md, "footer"));
    assert!(md.lines().any(|l| l == "[a striped square]()"));
    assert_eq!(out.stats.images_captioned, 1);

    let leftovers = std::fs::read_dir(temp.path()).unwrap().count();
    assert_eq!(leftovers, 0, "temporary image left behind");
}

#[tokio::test]
async fn test_image_inside_form_is_captioned_in_place() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let path = write_pdf(
        &dir,
        &[vec![
            Draw::Text {
                from_top: 20,
                text: "above",
            },
            Draw::Text {
                from_top: 150,
                text: "below",
            },
            Draw::FormImage { from_top: 60 },
        ]],
    );

    let out = convert(path.to_string_lossy(), &config(temp.path()))
        .await
        .expect("convert() should succeed");

    let md = &out.markdown;
    assert_eq!(out.stats.images_found, 1);
    assert!(position(md, "above") < position(md, "[a striped square]()"));
    assert!(position(md, "[a striped square]()") < position(md, "below"));
}

#[tokio::test]
async fn test_page_selection_and_separator() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let page = |text| {
        vec![Draw::Text {
            from_top: 30,
            text,
        }]
    };
    let path = write_pdf(&dir, &[page("alpha"), page("beta"), page("gamma")]);

    let mut config = config(temp.path());
    config.pages = PageSelection::Set(vec![1, 3]);
    config.page_separator = PageSeparator::Comment;

    let out = convert(path.to_string_lossy(), &config).await.unwrap();
    assert!(!out.markdown.contains("beta"));
    assert!(out.markdown.contains("alpha\n<!-- page 3 -->\ngamma"));
    assert_eq!(out.stats.processed_pages, 2);
}

#[tokio::test]
async fn test_out_of_range_selection() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let path = write_pdf(
        &dir,
        &[vec![Draw::Text {
            from_top: 30,
            text: "only",
        }]],
    );

    let mut config = config(temp.path());
    config.pages = PageSelection::Single(9);

    let err = convert(path.to_string_lossy(), &config).await.unwrap_err();
    assert!(matches!(err, Doc2MdError::PageOutOfRange { total: 1, .. }));
}

#[tokio::test]
async fn test_inspect_pdf() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let path = write_pdf(&dir, &[vec![]]);

    let kind = inspect(path.to_string_lossy()).await.unwrap();
    assert_eq!(kind, DocumentKind::Pdf);
}

#[tokio::test]
async fn test_inspect_nonexistent() {
    e2e_skip_unless_enabled!();
    let result = inspect("/definitely/not/a/real/file.pdf").await;
    assert!(matches!(result, Err(Doc2MdError::FileNotFound { .. })));
}

//! Integration tests for DOCX, PPTX and standalone-image conversion.
//!
//! Fixtures are built in memory with `zip::ZipWriter`, and captions come
//! from scripted captioners, so these tests need neither pdfium nor an API
//! key. PDF coverage lives in `tests/e2e.rs`.

use async_trait::async_trait;
use edgequake_doc2md::{
    convert, convert_from_bytes, CaptionFailurePolicy, ConversionConfig,
    ConversionProgressCallback, Doc2MdError, DocumentKind, ImageCaptioner,
};
use edgequake_llm::ImageData;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

// ── Fixtures ─────────────────────────────────────────────────────────────────

const IMAGE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const NOTES_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/notesSlide";
const SLIDE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
const PML_NS: &str = r#"xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="png" ContentType="image/png"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
</Types>"#;

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn png() -> Vec<u8> {
    let img = image::DynamicImage::new_rgb8(4, 4);
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn rels(entries: &[(&str, &str, &str)]) -> String {
    let body: String = entries
        .iter()
        .map(|(id, ty, target)| {
            format!(r#"<Relationship Id="{id}" Type="{ty}" Target="{target}"/>"#)
        })
        .collect();
    format!(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{body}</Relationships>"#
    )
}

/// A DOCX whose body is one paragraph of `text` followed by one image, the
/// bytes of which are stored under `media_name`.
fn docx(text: &str, media_name: &str, media: &[u8]) -> Vec<u8> {
    let document = format!(
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><w:body>
<w:p><w:r><w:t>{text}</w:t></w:r></w:p>
<w:p><w:r><w:drawing><a:graphic><a:graphicData><a:blip r:embed="rId1"/></a:graphicData></a:graphic></w:drawing></w:r></w:p>
</w:body></w:document>"#
    );
    let target = format!("media/{media_name}");
    let media_part = format!("word/media/{media_name}");
    let document_rels = rels(&[("rId1", IMAGE_REL, target.as_str())]);
    zip_bytes(&[
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("word/document.xml", document.as_bytes()),
        ("word/_rels/document.xml.rels", document_rels.as_bytes()),
        (media_part.as_str(), media),
    ])
}

fn pptx() -> Vec<u8> {
    let shape = |ph: &str, text: &str| {
        format!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="s"/><p:cNvSpPr/><p:nvPr>{ph}</p:nvPr></p:nvSpPr><p:txBody><a:bodyPr/><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp>"#
        )
    };
    let slide = |shapes: String| {
        format!(r#"<p:sld {PML_NS}><p:cSld><p:spTree>{shapes}</p:spTree></p:cSld></p:sld>"#)
    };

    let slide1 = slide(format!(
        r#"{}{}<p:pic><p:nvPicPr><p:cNvPr id="4" name="Picture"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId2"/></p:blipFill></p:pic>"#,
        shape(r#"<p:ph type="title"/>"#, "Plan"),
        shape(r#"<p:ph idx="1"/>"#, "Ship it"),
    ));
    let slide2 = slide(shape("", "Thanks"));
    let notes = format!(
        r#"<p:notes {PML_NS}><p:cSld><p:spTree>{}{}</p:spTree></p:cSld></p:notes>"#,
        shape(r#"<p:ph type="body" idx="1"/>"#, "Remember the demo"),
        shape(r#"<p:ph type="sldNum" idx="5"/>"#, "1"),
    );
    let slide1_rels = rels(&[
        ("rId2", IMAGE_REL, "../media/image1.png"),
        ("rId3", NOTES_REL, "../notesSlides/notesSlide1.xml"),
    ]);
    let presentation = format!("<p:presentation {PML_NS}/>");
    let image = png();

    zip_bytes(&[
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("ppt/presentation.xml", presentation.as_bytes()),
        // No slide list and stored out of order; slides are read by number.
        ("ppt/slides/slide2.xml", slide2.as_bytes()),
        ("ppt/slides/slide1.xml", slide1.as_bytes()),
        ("ppt/slides/_rels/slide1.xml.rels", slide1_rels.as_bytes()),
        ("ppt/notesSlides/notesSlide1.xml", notes.as_bytes()),
        ("ppt/media/image1.png", image.as_slice()),
    ])
}

/// A two-slide deck whose slide list puts `slide2.xml` first, as PowerPoint
/// leaves it after the second slide is dragged to the front.
fn reordered_pptx() -> Vec<u8> {
    let slide = |text: &str| {
        format!(
            r#"<p:sld {PML_NS}><p:cSld><p:spTree><p:sp><p:nvSpPr><p:nvPr/></p:nvSpPr><p:txBody><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#
        )
    };
    let presentation = format!(
        r#"<p:presentation {PML_NS}><p:sldIdLst><p:sldId id="257" r:id="rId3"/><p:sldId id="256" r:id="rId2"/></p:sldIdLst></p:presentation>"#
    );
    let presentation_rels = rels(&[
        ("rId2", SLIDE_REL, "slides/slide1.xml"),
        ("rId3", SLIDE_REL, "slides/slide2.xml"),
    ]);
    let slide1 = slide("Written first");
    let slide2 = slide("Shown first");

    zip_bytes(&[
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("ppt/presentation.xml", presentation.as_bytes()),
        ("ppt/_rels/presentation.xml.rels", presentation_rels.as_bytes()),
        ("ppt/slides/slide1.xml", slide1.as_bytes()),
        ("ppt/slides/slide2.xml", slide2.as_bytes()),
    ])
}

fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path.to_string_lossy().into_owned()
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

// ── Captioners ───────────────────────────────────────────────────────────────

/// Returns a fixed caption and records what it was shown.
struct Recording {
    caption: String,
    output_dir: PathBuf,
    mime_types: Mutex<Vec<String>>,
    files_seen: Mutex<Vec<String>>,
}

impl Recording {
    fn new(caption: &str, output_dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            caption: caption.to_string(),
            output_dir: output_dir.to_path_buf(),
            mime_types: Mutex::new(Vec::new()),
            files_seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ImageCaptioner for Recording {
    async fn caption(&self, image: ImageData, _prompt: &str) -> Result<String, Doc2MdError> {
        self.mime_types.lock().unwrap().push(image.mime_type.clone());
        let names = std::fs::read_dir(&self.output_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned());
        self.files_seen.lock().unwrap().extend(names);
        Ok(self.caption.clone())
    }
}

struct Failing;

#[async_trait]
impl ImageCaptioner for Failing {
    async fn caption(&self, _image: ImageData, _prompt: &str) -> Result<String, Doc2MdError> {
        Err(Doc2MdError::LlmApiError {
            message: "model overloaded".into(),
        })
    }
}

fn config(output_dir: &Path, captioner: Arc<dyn ImageCaptioner>) -> ConversionConfig {
    ConversionConfig::builder()
        .output_dir(output_dir)
        .captioner(captioner)
        .build()
        .unwrap()
}

// ── DOCX ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn docx_text_then_caption_line() {
    let docs = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let input = write(&docs, "hello.docx", &docx("Hello", "image1.png", &png()));
    let captioner = Recording::new("a black square", temp.path());

    let out = convert(&input, &config(temp.path(), captioner.clone()))
        .await
        .unwrap();

    assert_eq!(out.kind, DocumentKind::Docx);
    assert_eq!(out.markdown, "Hello\n\n[a black square]()\n");
    assert_eq!(out.stats.images_found, 1);
    assert_eq!(out.stats.images_captioned, 1);

    let seen = captioner.files_seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].ends_with(".png"), "got {seen:?}");
    assert!(is_empty_dir(temp.path()), "temporary image left behind");
}

#[tokio::test]
async fn octet_stream_image_is_bin_and_still_captioned() {
    let docs = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    // No content type is declared for `.dat`.
    let input = write(&docs, "opaque.docx", &docx("Figure:", "image1.dat", &png()));
    let captioner = Recording::new("chart", temp.path());

    let out = convert(&input, &config(temp.path(), captioner.clone()))
        .await
        .unwrap();

    assert!(out.markdown.contains("[chart]()"));
    let seen = captioner.files_seen.lock().unwrap();
    assert!(seen[0].ends_with(".bin"), "got {seen:?}");
    assert_eq!(*captioner.mime_types.lock().unwrap(), vec!["image/png"]);
    assert!(is_empty_dir(temp.path()));
}

#[tokio::test]
async fn without_captioner_images_become_empty_placeholders() {
    let docs = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let input = write(&docs, "plain.docx", &docx("Hello", "image1.png", &png()));
    let config = ConversionConfig::builder()
        .output_dir(temp.path())
        .build()
        .unwrap();

    let out = convert(&input, &config).await.unwrap();
    assert_eq!(out.markdown, "Hello\n\n[]()\n");
}

#[tokio::test]
async fn embedded_document_is_converted_recursively() {
    let docs = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let inner = docx("Inner", "image1.png", &png());
    let input = write(&docs, "outer.docx", &docx("Outer", "inner.bin", &inner));
    let mut config = config(temp.path(), Recording::new("a cat", temp.path()));
    config.max_depth = 2;

    let out = convert(&input, &config).await.unwrap();
    assert_eq!(out.markdown, "Outer\n\n[Inner \\[a cat\\]()]()\n");
    assert!(is_empty_dir(temp.path()));
}

#[tokio::test]
async fn nesting_beyond_max_depth_fails() {
    let docs = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let inner = docx("Inner", "image1.png", &png());
    let input = write(&docs, "outer.docx", &docx("Outer", "inner.bin", &inner));
    let mut config = config(temp.path(), Recording::new("a cat", temp.path()));
    config.max_depth = 1;

    let err = convert(&input, &config).await.unwrap_err();
    assert!(matches!(err, Doc2MdError::CaptionFailed { .. }), "got {err}");
    assert!(matches!(
        err.root_cause(),
        Doc2MdError::RecursionLimit { depth: 2, max: 1 }
    ));
    assert!(is_empty_dir(temp.path()), "files must be removed on failure");
}

#[tokio::test]
async fn caption_failure_aborts_by_default() {
    let docs = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let input = write(&docs, "a.docx", &docx("Hello", "image1.png", &png()));

    let err = convert(&input, &config(temp.path(), Arc::new(Failing)))
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), Doc2MdError::LlmApiError { .. }));
    assert!(is_empty_dir(temp.path()));
}

#[tokio::test]
async fn placeholder_policy_substitutes_and_counts() {
    let docs = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let input = write(&docs, "a.docx", &docx("Hello", "image1.png", &png()));
    let mut config = config(temp.path(), Arc::new(Failing));
    config.caption_failure = CaptionFailurePolicy::Placeholder("image unavailable".into());

    let out = convert(&input, &config).await.unwrap();
    assert_eq!(out.markdown, "Hello\n\n[image unavailable]()\n");
    assert_eq!(out.stats.caption_failures, 1);
    assert_eq!(out.stats.images_captioned, 0);
}

#[tokio::test]
async fn bytes_are_detected_without_extension() {
    let temp = TempDir::new().unwrap();
    let bytes = docx("From memory", "image1.png", &png());

    let out = convert_from_bytes(&bytes, &config(temp.path(), Recording::new("x", temp.path())))
        .await
        .unwrap();
    assert_eq!(out.kind, DocumentKind::Docx);
    assert!(out.markdown.starts_with("From memory\n"));
}

// ── PPTX ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pptx_slides_titles_pictures_and_notes() {
    let docs = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let input = write(&docs, "deck.pptx", &pptx());

    let out = convert(&input, &config(temp.path(), Recording::new("a diagram", temp.path())))
        .await
        .unwrap();

    assert_eq!(out.kind, DocumentKind::Pptx);
    assert_eq!(out.stats.total_pages, 2);
    assert_eq!(
        out.markdown,
        "<!-- Slide number: 1 -->\n\n# Plan\n\nShip it\n\n[a diagram]()\n\n\
         ### Notes:\nRemember the demo\n\n<!-- Slide number: 2 -->\n\nThanks\n"
    );
    assert!(is_empty_dir(temp.path()));
}

#[tokio::test]
async fn pptx_follows_the_slide_list() {
    let docs = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let input = write(&docs, "moved.pptx", &reordered_pptx());

    let out = convert(&input, &config(temp.path(), Recording::new("unused", temp.path())))
        .await
        .unwrap();

    assert_eq!(
        out.markdown,
        "<!-- Slide number: 1 -->\n\nShown first\n\n<!-- Slide number: 2 -->\n\nWritten first\n"
    );
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Counting {
    starts: AtomicUsize,
    images: AtomicUsize,
    completes: AtomicUsize,
}

impl ConversionProgressCallback for Counting {
    fn on_conversion_start(&self, _kind: DocumentKind, _total_pages: usize) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }
    fn on_image_start(&self, _index: usize) {
        self.images.fetch_add(1, Ordering::SeqCst);
    }
    fn on_conversion_complete(&self, _captioned: usize, _failures: usize) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn nested_conversions_do_not_report_progress() {
    let docs = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let inner = docx("Inner", "image1.png", &png());
    let input = write(&docs, "outer.docx", &docx("Outer", "inner.bin", &inner));
    let counting = Arc::new(Counting::default());
    let mut config = config(temp.path(), Recording::new("a cat", temp.path()));
    config.max_depth = 2;
    config.progress_callback = Some(counting.clone() as Arc<dyn ConversionProgressCallback>);

    convert(&input, &config).await.unwrap();
    assert_eq!(counting.starts.load(Ordering::SeqCst), 1);
    assert_eq!(counting.images.load(Ordering::SeqCst), 1);
    assert_eq!(counting.completes.load(Ordering::SeqCst), 1);
}

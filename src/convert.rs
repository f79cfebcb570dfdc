//! Conversion entry points and the recursive engine behind them.
//!
//! ## Why one engine for documents and images?
//!
//! An image extracted from a document is captioned by converting it, exactly
//! like a top-level input: detect the format, pick the reader, produce
//! Markdown. A standalone image converts to its caption; an "image" that is
//! really an embedded DOCX converts to that document's Markdown. Every level
//! shares one [`ConversionConfig`] and carries its depth explicitly, and
//! [`ConversionConfig::max_depth`] bounds the nesting.

use crate::config::ConversionConfig;
use crate::error::Doc2MdError;
use crate::formats::{self, Block, HostContent, PageContent};
use crate::output::{ConversionOutput, ConversionStats, DocumentKind};
use crate::pipeline::assemble::{render_flow, PageAssembler, PositionedItem};
use crate::pipeline::caption::{caption_images, CaptionBatch};
use crate::pipeline::{input, llm};
use crate::progress::ProgressCallback;
use crate::prompts::caption_prompt;
use futures::future::BoxFuture;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Convert a document file or URL to Markdown.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input`: Local file path or HTTP/HTTPS URL to a DOCX, PPTX, PDF or image
/// * `config`: Conversion configuration
///
/// # Errors
/// Any failure aborts the whole conversion; there is no partial output. An
/// image whose caption fails only aborts under
/// [`crate::CaptionFailurePolicy::Abort`], the default.
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2MdError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;

    // Resolved once here; nested conversions reuse the same client.
    let mut config = config.clone();
    config.captioner = llm::resolve_captioner(&config)?;
    if config.captioner.is_none() {
        info!("No captioning client configured, images get empty captions");
    }

    let prompt = config.caption_prompt.clone();
    convert_nested(resolved.path(), &config, prompt.as_deref(), 0).await
}

/// Convert the file at `path` as nesting level `depth`.
///
/// Depth 0 is the caller's document. Each extracted image is converted at
/// its parent's depth + 1; anything deeper than `config.max_depth` fails with
/// [`Doc2MdError::RecursionLimit`]. Only depth 0 reports progress.
pub fn convert_nested<'a>(
    path: &'a Path,
    config: &'a ConversionConfig,
    prompt: Option<&'a str>,
    depth: usize,
) -> BoxFuture<'a, Result<ConversionOutput, Doc2MdError>> {
    Box::pin(async move {
        if depth > config.max_depth {
            return Err(Doc2MdError::RecursionLimit {
                depth,
                max: config.max_depth,
            });
        }

        let start = Instant::now();
        let kind = input::detect_kind(path)?;
        let progress = config.progress_callback.as_ref().filter(|_| depth == 0);
        debug!("Depth {}: {} is {}", depth, path.display(), kind);

        let mut stats = ConversionStats::default();
        let markdown = match formats::adapter_for(kind) {
            None => {
                if let Some(cb) = progress {
                    cb.on_conversion_start(kind, 0);
                }
                let caption = formats::image::caption_image_file(
                    path,
                    config.captioner.as_ref(),
                    caption_prompt(prompt),
                )
                .await?;
                stats.images_found = 1;
                stats.images_captioned = 1;
                stats.caption_duration_ms = start.elapsed().as_millis() as u64;
                caption
            }
            Some(adapter) => {
                let content = adapter.extract(path, config).await?;
                stats.images_found = content.image_count();
                stats.total_pages = content.page_count();

                match content {
                    HostContent::Flow(blocks) => {
                        if let Some(cb) = progress {
                            cb.on_conversion_start(kind, stats.total_pages);
                        }
                        let images = blocks.iter().filter_map(|b| match b {
                            Block::Image(raw) => Some(raw),
                            _ => None,
                        });
                        let batch = caption_images(images, 0, config, prompt, depth).await?;
                        stats.processed_pages = stats.total_pages;
                        absorb(&mut stats, &batch);
                        render_flow(&blocks, &batch.captions)
                    }
                    HostContent::Paged { total_pages, pages } => {
                        if let Some(cb) = progress {
                            cb.on_conversion_start(kind, pages.len());
                        }
                        assemble_pages(pages, total_pages, config, prompt, depth, progress, &mut stats)
                            .await?
                    }
                }
            }
        };

        stats.total_duration_ms = start.elapsed().as_millis() as u64;
        if depth == 0 {
            info!(
                "Conversion complete: {} images ({} captioned, {} failed), {}ms total",
                stats.images_found,
                stats.images_captioned,
                stats.caption_failures,
                stats.total_duration_ms
            );
        }
        if let Some(cb) = progress {
            cb.on_conversion_complete(stats.images_captioned, stats.caption_failures);
        }

        Ok(ConversionOutput {
            markdown,
            kind,
            stats,
        })
    })
}

/// Caption each page's images, then order and append the page's items.
async fn assemble_pages(
    pages: Vec<PageContent>,
    total_pages: usize,
    config: &ConversionConfig,
    prompt: Option<&str>,
    depth: usize,
    progress: Option<&ProgressCallback>,
    stats: &mut ConversionStats,
) -> Result<String, Doc2MdError> {
    let mut assembler = PageAssembler::new(config.page_separator.clone());
    let mut images_done = 0;

    for page in pages {
        let page_num = page.page_num;
        if let Some(cb) = progress {
            cb.on_page_start(page_num, total_pages);
        }

        let batch = caption_images(
            page.images.iter().map(|img| &img.raw),
            images_done,
            config,
            prompt,
            depth,
        )
        .await?;
        images_done += page.images.len();
        absorb(stats, &batch);

        let mut items: Vec<PositionedItem> = page
            .text_blocks
            .into_iter()
            .map(|block| PositionedItem::text(block.text, block.bbox))
            .collect();
        items.extend(
            page.images
                .iter()
                .zip(&batch.captions)
                .map(|(img, caption)| PositionedItem::image(caption, img.bbox)),
        );

        let emitted = assembler.push_page(page_num, items);
        stats.processed_pages += 1;
        debug!("Page {}: {} items", page_num, emitted);
        if let Some(cb) = progress {
            cb.on_page_complete(page_num, total_pages, emitted);
        }
    }

    Ok(assembler.finish())
}

fn absorb(stats: &mut ConversionStats, batch: &CaptionBatch) {
    stats.images_captioned += batch.captioned;
    stats.caption_failures += batch.failures;
    stats.caption_duration_ms += batch.duration_ms;
}

/// Convert a document and write the Markdown directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Doc2MdError> {
    let output = convert(input_str, config).await?;
    let path = output_path.as_ref();
    let write_err = |source| Doc2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, &output.markdown)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    Ok(output.stats)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Doc2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// Convert document bytes held in memory.
///
/// The bytes go to a managed [`tempfile`] that is removed on return; the
/// format is detected from their leading bytes.
///
/// # Example
/// ```rust,no_run
/// use edgequake_doc2md::{convert_from_bytes, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("report.docx")?;
/// let config = ConversionConfig::default();
/// let output = convert_from_bytes(&bytes, &config).await?;
/// println!("{}", output.markdown);
/// # Ok(())
/// # }
/// ```
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2MdError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| Doc2MdError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| Doc2MdError::Internal(format!("tempfile write: {e}")))?;
    tmp.flush()
        .map_err(|e| Doc2MdError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    // `tmp` is dropped (and the file deleted) when `convert` returns
    convert(&path, config).await
}

/// Host format of a local file or URL, without converting it.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentKind, Doc2MdError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    input::detect_kind(resolved.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptionFailurePolicy;
    use crate::formats::{PageImage, TextBlock};
    use crate::pipeline::assemble::BoundingBox;
    use crate::pipeline::encode::png_bytes;
    use crate::pipeline::llm::ImageCaptioner;
    use crate::pipeline::materialize::RawImage;
    use crate::progress::ConversionProgressCallback;
    use async_trait::async_trait;
    use edgequake_llm::ImageData;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Captions images "figure 1", "figure 2", … in call order; the call
    /// numbered `fail_on` errors instead.
    struct Numbered {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    impl Numbered {
        fn new(fail_on: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_on,
            })
        }
    }

    #[async_trait]
    impl ImageCaptioner for Numbered {
        async fn caption(&self, _image: ImageData, _prompt: &str) -> Result<String, Doc2MdError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(n) {
                return Err(Doc2MdError::LlmApiError {
                    message: "overloaded".into(),
                });
            }
            Ok(format!("figure {n}"))
        }
    }

    #[derive(Default)]
    struct ImageStarts(Mutex<Vec<usize>>);

    impl ConversionProgressCallback for ImageStarts {
        fn on_image_start(&self, index: usize) {
            self.0.lock().unwrap().push(index);
        }
    }

    fn text(text: &str, top: f32) -> TextBlock {
        TextBlock {
            text: text.into(),
            bbox: BoundingBox::new(top, 10.0, top + 8.0, 200.0),
        }
    }

    fn picture(top: f32, left: f32) -> PageImage {
        let img = image::DynamicImage::new_rgb8(2, 2);
        PageImage {
            raw: RawImage::new(png_bytes(&img).unwrap(), "png"),
            bbox: BoundingBox::new(top, left, top + 40.0, left + 40.0),
        }
    }

    fn page_config(dir: &Path, captioner: Arc<Numbered>) -> ConversionConfig {
        ConversionConfig::builder()
            .output_dir(dir)
            .captioner(captioner)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn pages_pair_captions_with_their_images() {
        let dir = tempfile::tempdir().unwrap();
        let starts = Arc::new(ImageStarts::default());
        let progress: ProgressCallback = starts.clone();
        let mut config = page_config(dir.path(), Numbered::new(None));
        config.progress_callback = Some(progress.clone());
        let pages = vec![
            PageContent {
                page_num: 1,
                text_blocks: vec![text("bottom", 50.0), text("top", 10.0)],
                images: vec![picture(30.0, 10.0)],
            },
            PageContent {
                page_num: 2,
                text_blocks: vec![text("after", 60.0)],
                // Extracted right one first; emitted left one first.
                images: vec![picture(5.0, 150.0), picture(5.0, 0.0)],
            },
        ];
        let mut stats = ConversionStats::default();

        let md = assemble_pages(pages, 2, &config, None, 0, Some(&progress), &mut stats)
            .await
            .unwrap();

        assert_eq!(
            md,
            "top\n[figure 1]()\nbottom\n[figure 3]()\n[figure 2]()\nafter\n"
        );
        assert_eq!(stats.images_captioned, 3);
        assert_eq!(stats.caption_failures, 0);
        assert_eq!(stats.processed_pages, 2);
        assert_eq!(*starts.0.lock().unwrap(), vec![1, 2, 3]);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn page_placeholders_are_counted_as_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = page_config(dir.path(), Numbered::new(Some(2)));
        config.caption_failure = CaptionFailurePolicy::Placeholder("unavailable".into());
        let pages = vec![PageContent {
            page_num: 1,
            text_blocks: vec![text("body", 10.0)],
            images: vec![picture(20.0, 0.0), picture(80.0, 0.0)],
        }];
        let mut stats = ConversionStats::default();

        let md = assemble_pages(pages, 1, &config, None, 0, None, &mut stats)
            .await
            .unwrap();

        assert_eq!(md, "body\n[figure 1]()\n[unavailable]()\n");
        assert_eq!(stats.images_captioned, 1);
        assert_eq!(stats.caption_failures, 1);
    }

    #[tokio::test]
    async fn depth_beyond_limit_is_refused_before_reading() {
        let config = ConversionConfig::builder().max_depth(2).build().unwrap();
        let err = convert_nested(Path::new("does-not-exist.png"), &config, None, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, Doc2MdError::RecursionLimit { depth: 3, max: 2 }));
    }

    #[tokio::test]
    async fn standalone_image_without_captioner_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        let img = image::DynamicImage::new_rgb8(1, 1);
        std::fs::write(&path, crate::pipeline::encode::png_bytes(&img).unwrap()).unwrap();

        let out = convert(path.to_string_lossy(), &ConversionConfig::default())
            .await
            .unwrap();
        assert_eq!(out.kind, DocumentKind::Image);
        assert_eq!(out.markdown, "");
    }

    #[tokio::test]
    async fn missing_input_is_not_found() {
        let err = convert("/no/such/file.docx", &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Doc2MdError::FileNotFound { .. }));
    }
}

//! Captioning by recursion: an extracted image is converted like any other
//! document, and that conversion's Markdown becomes its caption.
//!
//! The image file only exists while its nested conversion runs. Whatever the
//! outcome, it is removed before [`caption`] returns.

use crate::config::{CaptionFailurePolicy, ConversionConfig};
use crate::convert::convert_nested;
use crate::error::Doc2MdError;
use crate::pipeline::materialize::{ImageMaterializer, MaterializedImage, RawImage};
use crate::pipeline::postprocess::clean_caption;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::time::Instant;
use tracing::{debug, warn};

/// Description of one image, ready to go between `[` and `]()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    pub text: String,
}

/// Run the nested conversion of `image` at `depth + 1` and clean its output.
///
/// The file is released on every path. Failures come back as
/// [`Doc2MdError::CaptionFailed`].
pub async fn caption(
    image: MaterializedImage,
    config: &ConversionConfig,
    prompt: Option<&str>,
    depth: usize,
) -> Result<Caption, Doc2MdError> {
    let path = image.path().to_path_buf();
    let result = convert_nested(&path, config, prompt, depth + 1).await;

    if let Err(e) = image.release() {
        warn!("Failed to remove {}: {}", path.display(), e);
    }

    match result {
        Ok(output) => Ok(Caption {
            text: clean_caption(&output.markdown),
        }),
        Err(e) => Err(Doc2MdError::CaptionFailed {
            path,
            source: Box::new(e),
        }),
    }
}

/// Captions for a run of images, in the order they were given.
#[derive(Debug, Clone, Default)]
pub struct CaptionBatch {
    pub captions: Vec<String>,
    /// Images whose nested conversion succeeded.
    pub captioned: usize,
    /// Images that got the placeholder text instead.
    pub failures: usize,
    pub duration_ms: u64,
}

enum Outcome {
    Captioned(String),
    Substituted(String),
}

/// Materialize and caption `images`, up to `caption_concurrency` at a time.
///
/// `first_index` is the number of images of the document already handled, so
/// progress indices run across the whole document. Progress is reported only
/// at depth 0.
pub async fn caption_images<'a>(
    images: impl IntoIterator<Item = &'a RawImage>,
    first_index: usize,
    config: &ConversionConfig,
    prompt: Option<&str>,
    depth: usize,
) -> Result<CaptionBatch, Doc2MdError> {
    let start = Instant::now();
    let materializer = ImageMaterializer::new(&config.output_dir);

    let tasks: Vec<_> = images
        .into_iter()
        .enumerate()
        .map(|(i, raw)| caption_one(&materializer, raw, first_index + i + 1, config, prompt, depth))
        .collect();

    let outcomes: Vec<Outcome> = stream::iter(tasks)
        .buffered(config.caption_concurrency.max(1))
        .try_collect()
        .await?;

    let mut batch = CaptionBatch {
        duration_ms: start.elapsed().as_millis() as u64,
        ..Default::default()
    };
    for outcome in outcomes {
        match outcome {
            Outcome::Captioned(text) => {
                batch.captioned += 1;
                batch.captions.push(text);
            }
            Outcome::Substituted(text) => {
                batch.failures += 1;
                batch.captions.push(text);
            }
        }
    }
    Ok(batch)
}

async fn caption_one(
    materializer: &ImageMaterializer,
    raw: &RawImage,
    index: usize,
    config: &ConversionConfig,
    prompt: Option<&str>,
    depth: usize,
) -> Result<Outcome, Doc2MdError> {
    let progress = config.progress_callback.as_ref().filter(|_| depth == 0);
    if let Some(cb) = progress {
        cb.on_image_start(index);
    }

    let result = match materializer.materialize(raw) {
        Ok(image) => {
            debug!("Image {} → {}", index, image.path().display());
            caption(image, config, prompt, depth).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(Caption { text }) => {
            if let Some(cb) = progress {
                cb.on_image_captioned(index, text.len());
            }
            Ok(Outcome::Captioned(text))
        }
        Err(e) => {
            if let Some(cb) = progress {
                cb.on_image_error(index, &e.to_string());
            }
            match (&config.caption_failure, &e) {
                (CaptionFailurePolicy::Placeholder(text), Doc2MdError::CaptionFailed { .. }) => {
                    warn!("Image {}: {}; using placeholder", index, e);
                    Ok(Outcome::Substituted(clean_caption(text)))
                }
                _ => Err(e),
            }
        }
    }
}

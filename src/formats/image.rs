//! Standalone images: converting one means captioning it.

use crate::error::Doc2MdError;
use crate::pipeline::encode::{encode_image, mime_for_extension, sniff_image_mime};
use crate::pipeline::llm::ImageCaptioner;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Caption the image at `path`.
///
/// The MIME type comes from the leading bytes, or from the extension when
/// they are not recognised. Without a captioner the caption is empty.
pub async fn caption_image_file(
    path: &Path,
    captioner: Option<&Arc<dyn ImageCaptioner>>,
    prompt: &str,
) -> Result<String, Doc2MdError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Doc2MdError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => Doc2MdError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Doc2MdError::CorruptDocument {
            path: path.to_path_buf(),
            detail: e.to_string(),
        },
    })?;

    let mime = image_mime(path, &bytes).ok_or_else(|| Doc2MdError::UnsupportedFormat {
        path: path.to_path_buf(),
        detail: "content is not a recognised image".to_string(),
    })?;

    let Some(captioner) = captioner else {
        debug!("No captioner configured, empty caption for {}", path.display());
        return Ok(String::new());
    };

    captioner.caption(encode_image(&bytes, mime), prompt).await
}

/// The leading bytes win; the extension only covers formats the sniffer
/// does not know.
fn image_mime(path: &Path, bytes: &[u8]) -> Option<&'static str> {
    sniff_image_mime(bytes).or_else(|| {
        path.extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .and_then(|ext| mime_for_extension(&ext))
    })
}

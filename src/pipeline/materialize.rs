//! Image materialization: persist extracted image bytes to a scoped temp file.
//!
//! The nested conversion that captions an image works on a file path, the
//! same way a top-level conversion does. Each extracted image is therefore
//! written to a uniquely named file under the configured output directory and
//! handed out as a [`MaterializedImage`], which removes the file when it is
//! released or dropped.
//!
//! ## Naming
//!
//! The first candidate is a random 128-bit token in hex plus the extension.
//! If that name is taken, the `image_1.ext`, `image_2.ext`, … series is tried.
//! Every candidate is claimed with an exclusive create, so an existing file is
//! never overwritten and two materializers racing for the same name cannot
//! both win. The loser moves on to the next candidate.

use crate::error::Doc2MdError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Upper bound on the `image_N` fallback series.
pub const MAX_FALLBACK_ATTEMPTS: usize = 10_000;

/// Image bytes as produced by a format adapter.
#[derive(Clone, PartialEq, Eq)]
pub struct RawImage {
    pub bytes: Vec<u8>,
    /// Content type (DOCX/PPTX) or file extension (PDF) reported by the host.
    pub type_hint: String,
}

impl RawImage {
    pub fn new(bytes: Vec<u8>, type_hint: impl Into<String>) -> Self {
        Self {
            bytes,
            type_hint: type_hint.into(),
        }
    }
}

impl std::fmt::Debug for RawImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawImage")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("type_hint", &self.type_hint)
            .finish()
    }
}

/// An image file on disk whose lifetime is bound to this value.
#[derive(Debug)]
pub struct MaterializedImage {
    path: PathBuf,
    extension: &'static str,
    released: bool,
}

impl MaterializedImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extension including the leading dot, e.g. `".png"`.
    pub fn extension(&self) -> &'static str {
        self.extension
    }

    /// Remove the file now. A file that is already gone counts as removed.
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        remove_if_present(&self.path)
    }
}

impl Drop for MaterializedImage {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = remove_if_present(&self.path) {
                warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Map a content-type or extension hint to a file extension.
///
/// Case-insensitive substring match: `png` → `.png`, `jpeg`/`jpg` → `.jpg`,
/// anything else → `.bin`.
pub fn extension_for(type_hint: &str) -> &'static str {
    let hint = type_hint.to_ascii_lowercase();
    if hint.contains("png") {
        ".png"
    } else if hint.contains("jpeg") || hint.contains("jpg") {
        ".jpg"
    } else {
        ".bin"
    }
}

/// A fresh 32-character lowercase hex token.
pub fn random_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Writes [`RawImage`]s into one output directory.
#[derive(Debug, Clone)]
pub struct ImageMaterializer {
    output_dir: PathBuf,
    token: fn() -> String,
}

impl ImageMaterializer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            token: random_token,
        }
    }

    /// Replace the random token source. Intended for tests that need a
    /// predictable first candidate.
    pub fn with_token_source(mut self, token: fn() -> String) -> Self {
        self.token = token;
        self
    }

    /// Write `raw` to a newly claimed file and return its scoped handle.
    pub fn materialize(&self, raw: &RawImage) -> Result<MaterializedImage, Doc2MdError> {
        let write_err = |source| Doc2MdError::ImageWriteFailed {
            dir: self.output_dir.clone(),
            source,
        };

        fs::create_dir_all(&self.output_dir).map_err(write_err)?;

        let extension = extension_for(&raw.type_hint);
        if extension == ".bin" {
            debug!("Unknown image type hint {:?}, using .bin", raw.type_hint);
        }

        let (path, mut file) = self.claim(extension).map_err(write_err)?.ok_or_else(|| {
            Doc2MdError::NamingCollision {
                dir: self.output_dir.clone(),
                attempts: MAX_FALLBACK_ATTEMPTS + 1,
            }
        })?;

        // From here on the guard owns the file, so a failed write cleans up.
        let image = MaterializedImage {
            path,
            extension,
            released: false,
        };
        file.write_all(&raw.bytes).map_err(write_err)?;
        file.flush().map_err(write_err)?;

        debug!(
            "Materialized {} bytes → {}",
            raw.bytes.len(),
            image.path.display()
        );
        Ok(image)
    }

    /// Claim the first free candidate name. `Ok(None)` means every candidate
    /// was taken.
    fn claim(&self, extension: &str) -> io::Result<Option<(PathBuf, File)>> {
        let first = self.output_dir.join(format!("{}{}", (self.token)(), extension));
        if let Some(file) = create_exclusive(&first)? {
            return Ok(Some((first, file)));
        }

        debug!("{} already exists, trying fallback names", first.display());
        for i in 1..=MAX_FALLBACK_ATTEMPTS {
            let candidate = self.output_dir.join(format!("image_{}{}", i, extension));
            if let Some(file) = create_exclusive(&candidate)? {
                return Ok(Some((candidate, file)));
            }
        }
        Ok(None)
    }
}

fn create_exclusive(path: &Path) -> io::Result<Option<File>> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e),
    }
}

/// Materialize `bytes` under `output_dir` with a random name.
pub fn materialize(
    bytes: &[u8],
    type_hint: &str,
    output_dir: &Path,
) -> Result<MaterializedImage, Doc2MdError> {
    ImageMaterializer::new(output_dir).materialize(&RawImage::new(bytes.to_vec(), type_hint))
}

//! Error types for the edgequake-doc2md library.
//!
//! Every public entry point returns [`Doc2MdError`]. A conversion either
//! produces the whole Markdown document or fails; there is no partial
//! output. The one failure a caller can choose to tolerate is a single image
//! that could not be captioned, and that choice is made up front through
//! [`crate::config::CaptionFailurePolicy`] rather than by inspecting errors
//! after the fact.
//!
//! Two conditions are recovered locally and never surface here:
//!
//! * an image type hint that names no known format (materialized as `.bin`);
//! * a temporary file name that is already taken (the fallback naming series
//!   claims another one). Only exhausting that series is an error.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-doc2md library.
#[derive(Debug, Error)]
pub enum Doc2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// Neither the extension nor the leading bytes identify a supported format.
    #[error("Unsupported document format for '{path}': {detail}")]
    UnsupportedFormat { path: PathBuf, detail: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// The container or its XML/PDF structure cannot be parsed.
    #[error("Document '{path}' is corrupt: {detail}")]
    CorruptDocument { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// An embedded PDF image has no resolvable position on its page.
    #[error("Cannot resolve the bounding box of image {image} on page {page}: {detail}")]
    BoundingBoxUnresolved {
        page: usize,
        image: usize,
        detail: String,
    },

    // ── Image pipeline errors ─────────────────────────────────────────────
    /// Creating the output directory or writing an extracted image failed.
    #[error("Failed to write extracted image under '{dir}': {source}")]
    ImageWriteFailed {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every candidate name for a temporary image file was already taken.
    #[error("No free temporary image name in '{dir}' after {attempts} attempts")]
    NamingCollision { dir: PathBuf, attempts: usize },

    /// The nested conversion of an extracted image failed.
    ///
    /// The temporary image file has already been removed when this is returned.
    #[error("Captioning '{path}' failed: {source}")]
    CaptionFailed {
        path: PathBuf,
        #[source]
        source: Box<Doc2MdError>,
    },

    /// Nested conversions went deeper than `max_depth`.
    #[error("Nested conversion depth {depth} exceeds the limit of {max}")]
    RecursionLimit { depth: usize, max: usize },

    // ── Dependency / LLM errors ───────────────────────────────────────────
    /// A native library required for this format could not be loaded.
    #[error("Missing dependency '{dependency}': {detail}\n{hint}")]
    MissingDependency {
        dependency: String,
        detail: String,
        hint: String,
    },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Doc2MdError {
    /// The innermost error behind any chain of nested caption failures.
    pub fn root_cause(&self) -> &Doc2MdError {
        match self {
            Doc2MdError::CaptionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

//! # edgequake-doc2md
//!
//! Convert DOCX, PPTX and PDF documents to Markdown, replacing every embedded
//! image with a caption written by a Vision Language Model (VLM).
//!
//! ## Why this crate?
//!
//! Text extractors drop figures on the floor, and a Markdown file full of
//! `![](image1.png)` links is useless to a search index or an LLM prompt.
//! This crate keeps the document's text and turns each image into an inline
//! `[caption]()` placeholder, so the Markdown stands on its own.
//!
//! ## Pipeline Overview
//!
//! ```text
//! DOCX / PPTX / PDF / image
//!  │
//!  ├─ 1. Input       resolve local file or download from URL, detect format
//!  ├─ 2. Extract     blocks (DOCX, PPTX) or positioned page items (PDF)
//!  ├─ 3. Materialize each image → uniquely named file in static/temp
//!  ├─ 4. Caption     convert that file recursively, then delete it
//!  ├─ 5. Polish      one-line, bracket-safe captions
//!  └─ 6. Assemble    flow order, or per-page (top, left) order for PDF
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2md::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .provider_name("openai")
//!         .model("gpt-4.1-nano")
//!         .build()?;
//!     let output = convert("report.docx", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("{} images captioned", output.stats.images_captioned);
//!     Ok(())
//! }
//! ```
//!
//! Without a captioning client every image becomes `[]()`.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-doc2md = { version = "0.1", default-features = false }
//! ```
//!
//! ## PDF support
//!
//! PDF reading binds the pdfium shared library at runtime: `PDFIUM_LIB_PATH`,
//! then the working directory, then the system library. DOCX, PPTX and image
//! inputs never touch pdfium.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod formats;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CaptionFailurePolicy, ConversionConfig, ConversionConfigBuilder, PageSelection, PageSeparator,
};
pub use convert::{convert, convert_from_bytes, convert_sync, convert_to_file, inspect};
pub use error::Doc2MdError;
pub use output::{ConversionOutput, ConversionStats, DocumentKind};
pub use pipeline::llm::{ImageCaptioner, VisionCaptioner};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::DEFAULT_CAPTION_PROMPT;

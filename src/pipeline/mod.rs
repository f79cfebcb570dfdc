//! Pipeline stages shared by every host format.
//!
//! Each submodule implements one step. The format readers in
//! [`crate::formats`] sit between `input` and `materialize`.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ adapter ──▶ materialize ──▶ caption ──▶ assemble
//! (path/URL) (formats)   (temp file)    (nested     (Markdown)
//!                                       convert)
//! ```
//!
//! 1. [`input`] resolves the path or URL and detects the host format
//! 2. [`materialize`] writes each extracted image to a uniquely named file
//! 3. [`caption`] converts that file recursively, then removes it
//! 4. [`llm`] and [`encode`] are the leaf of the recursion, one image per VLM call
//! 5. [`postprocess`] reduces a caption to one well-formed line
//! 6. [`assemble`] splices captions into flow content, or orders PDF
//!    page items by position

pub mod assemble;
pub mod caption;
pub mod encode;
pub mod input;
pub mod llm;
pub mod materialize;
pub mod postprocess;

//! Post-processing: deterministic cleanup of VLM-generated captions.
//!
//! A caption ends up inside a `[caption]()` placeholder on a line of its own,
//! so whatever the model returns must be reduced to one line of plain text.
//! Even well-prompted VLMs occasionally wrap their answer in ` ```markdown `
//! fences, emit CRLF line endings or sprinkle zero-width characters; each of
//! those is fixed by one small rule here rather than by more prompt text.
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised so the fence regex
//! sees the raw answer, and brackets are escaped last so earlier rules never
//! have to reason about backslashes.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all caption rules, in order:
///
/// 1. Strip outer markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 4. Join lines with single spaces and collapse runs of whitespace
/// 5. Escape square brackets so the placeholder stays well-formed
pub fn clean_caption(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = flatten_whitespace(&s);
    escape_brackets(&s)
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md|text)?\r?\n(.*)\r?\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: One line, single spaces ─────────────────────────────────────────

fn flatten_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Rule 5: Escape brackets ─────────────────────────────────────────────────

fn escape_brackets(input: &str) -> String {
    input.replace('[', "\\[").replace(']', "\\]")
}

// ── Tests ────────────────────────────────────────────────────────────────────

//! Input resolution and format detection.
//!
//! A conversion starts from a local path or an HTTP(S) URL. URLs are
//! downloaded into a `TempDir` that lives as long as the [`ResolvedInput`],
//! so the file is cleaned up on every exit path. The format is then decided
//! once, from the extension when it names a known format and from the
//! leading bytes otherwise. Extracted images materialized with a `.bin`
//! extension depend on the second path.

use crate::error::Doc2MdError;
use crate::output::DocumentKind;
use crate::pipeline::encode::{mime_for_extension, sniff_image_mime};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};
use zip::ZipArchive;

/// The resolved input: either a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the document was downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the document regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Doc2MdError> {
    if input.trim().is_empty() {
        return Err(Doc2MdError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input)).map(ResolvedInput::Local)
    }
}

/// Validate that a local file exists and is readable.
pub fn resolve_local(path: &Path) -> Result<PathBuf, Doc2MdError> {
    let path = path.to_path_buf();

    if !path.is_file() {
        return Err(Doc2MdError::FileNotFound { path });
    }

    match File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Doc2MdError::PermissionDenied { path });
        }
        Err(_) => return Err(Doc2MdError::FileNotFound { path }),
    }

    debug!("Resolved local document: {}", path.display());
    Ok(path)
}

/// Decide the host format of `path`.
pub fn detect_kind(path: &Path) -> Result<DocumentKind, Doc2MdError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => return Ok(DocumentKind::Pdf),
        "docx" => return Ok(DocumentKind::Docx),
        "pptx" => return Ok(DocumentKind::Pptx),
        e if mime_for_extension(e).is_some() => return Ok(DocumentKind::Image),
        _ => {}
    }

    let mut head = [0u8; 16];
    let n = read_head(path, &mut head)?;
    let head = &head[..n];

    if head.starts_with(b"%PDF") {
        return Ok(DocumentKind::Pdf);
    }
    if head.starts_with(b"PK\x03\x04") {
        if let Some(kind) = detect_ooxml(path)? {
            return Ok(kind);
        }
    }
    if sniff_image_mime(head).is_some() {
        return Ok(DocumentKind::Image);
    }

    Err(Doc2MdError::UnsupportedFormat {
        path: path.to_path_buf(),
        detail: format!("unrecognised leading bytes {:02x?}", head),
    })
}

fn read_head(path: &Path, buf: &mut [u8]) -> Result<usize, Doc2MdError> {
    let mut f = File::open(path).map_err(|_| Doc2MdError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let mut filled = 0;
    while filled < buf.len() {
        match f.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) => {
                return Err(Doc2MdError::CorruptDocument {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                })
            }
        }
    }
    Ok(filled)
}

/// Tell DOCX from PPTX by their main part. Other ZIP files are `None`.
fn detect_ooxml(path: &Path) -> Result<Option<DocumentKind>, Doc2MdError> {
    let file = File::open(path).map_err(|_| Doc2MdError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let Ok(archive) = ZipArchive::new(file) else {
        return Ok(None);
    };
    let mut names = archive.file_names();
    let kind = names.find_map(|name| match name {
        "word/document.xml" => Some(DocumentKind::Docx),
        "ppt/presentation.xml" => Some(DocumentKind::Pptx),
        _ => None,
    });
    Ok(kind)
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Doc2MdError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Doc2MdError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Doc2MdError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Doc2MdError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(Doc2MdError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = extract_filename(url);

    let temp_dir = TempDir::new().map_err(|e| Doc2MdError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Doc2MdError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| Doc2MdError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Take the last URL path segment when it looks like a file name.
///
/// Without an extension the detector falls back to the leading bytes, so a
/// generic name loses nothing.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.bin".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[&str]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for name in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(b"<x/>").unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.docx"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_extract_filename() {
        assert_eq!(extract_filename("https://example.com/a/report.docx"), "report.docx");
        assert_eq!(extract_filename("https://example.com/a/download"), "downloaded.bin");
    }

    #[test]
    fn detect_by_extension() {
        let dir = TempDir::new().unwrap();
        for (name, kind) in [
            ("a.PDF", DocumentKind::Pdf),
            ("a.docx", DocumentKind::Docx),
            ("a.pptx", DocumentKind::Pptx),
            ("a.jpg", DocumentKind::Image),
            ("a.png", DocumentKind::Image),
        ] {
            let p = dir.path().join(name);
            std::fs::write(&p, b"irrelevant").unwrap();
            assert_eq!(detect_kind(&p).unwrap(), kind, "{name}");
        }
    }

    #[test]
    fn detect_bin_by_magic() {
        let dir = TempDir::new().unwrap();

        let pdf = dir.path().join("x.bin");
        std::fs::write(&pdf, b"%PDF-1.7\n...").unwrap();
        assert_eq!(detect_kind(&pdf).unwrap(), DocumentKind::Pdf);

        let docx = dir.path().join("d.bin");
        write_zip(&docx, &["[Content_Types].xml", "word/document.xml"]);
        assert_eq!(detect_kind(&docx).unwrap(), DocumentKind::Docx);

        let pptx = dir.path().join("p.bin");
        write_zip(&pptx, &["ppt/presentation.xml"]);
        assert_eq!(detect_kind(&pptx).unwrap(), DocumentKind::Pptx);

        let jpeg = dir.path().join("j.bin");
        std::fs::write(&jpeg, [0xFF, 0xD8, 0xFF, 0xE0, 0, 16, b'J', b'F', b'I', b'F']).unwrap();
        assert_eq!(detect_kind(&jpeg).unwrap(), DocumentKind::Image);
    }

    #[test]
    fn unknown_bytes_are_unsupported() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("mystery.bin");
        std::fs::write(&p, b"just some text").unwrap();
        assert!(matches!(
            detect_kind(&p),
            Err(Doc2MdError::UnsupportedFormat { .. })
        ));

        let zip = dir.path().join("other.bin");
        write_zip(&zip, &["readme.txt"]);
        assert!(matches!(
            detect_kind(&zip),
            Err(Doc2MdError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        assert!(matches!(
            resolve_local(Path::new("/definitely/not/here.docx")),
            Err(Doc2MdError::FileNotFound { .. })
        ));
    }
}

//! Shared Office Open XML plumbing for the DOCX and PPTX readers.
//!
//! Both formats are ZIP packages of XML parts. A part refers to images and
//! other parts through relationship ids (`r:embed="rId5"`) that resolve via
//! the sibling `_rels/<part>.rels` file, and every part's media type is
//! declared in `[Content_Types].xml`.

use crate::error::Doc2MdError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

/// Content type reported for parts `[Content_Types].xml` says nothing about.
pub const UNKNOWN_CONTENT_TYPE: &str = "application/octet-stream";

/// One resolved relationship of a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Absolute part name inside the package, without a leading `/`.
    pub target: String,
    /// Relationship type URI, e.g. `…/relationships/image`.
    pub rel_type: String,
    /// `TargetMode="External"`: the target is a URL, not a part.
    pub external: bool,
}

/// Relationships of one part, keyed by id.
pub type Relationships = HashMap<String, Relationship>;

/// Media types declared by `[Content_Types].xml`.
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    defaults: HashMap<String, String>,
    overrides: HashMap<String, String>,
}

impl ContentTypes {
    /// Override for the part, then Default by extension, else
    /// [`UNKNOWN_CONTENT_TYPE`].
    pub fn content_type(&self, part: &str) -> &str {
        let key = part.trim_start_matches('/').to_ascii_lowercase();
        if let Some(ct) = self.overrides.get(&key) {
            return ct;
        }
        let ext = key.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
        self.defaults
            .get(ext)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_CONTENT_TYPE)
    }

    fn parse(xml: &[u8]) -> Result<Self, quick_xml::Error> {
        let mut types = ContentTypes::default();
        let mut reader = XmlReader::from_reader(xml);
        reader.trim_text(true);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) | Event::Empty(ref e) => match local_name(e.name().as_ref()) {
                    b"Default" => {
                        if let (Some(ext), Some(ct)) = (
                            attr_value(&reader, e, b"Extension"),
                            attr_value(&reader, e, b"ContentType"),
                        ) {
                            types.defaults.insert(ext.to_ascii_lowercase(), ct);
                        }
                    }
                    b"Override" => {
                        if let (Some(part), Some(ct)) = (
                            attr_value(&reader, e, b"PartName"),
                            attr_value(&reader, e, b"ContentType"),
                        ) {
                            let key = part.trim_start_matches('/').to_ascii_lowercase();
                            types.overrides.insert(key, ct);
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(types)
    }
}

/// An opened DOCX/PPTX package.
pub struct OoxmlPackage {
    path: PathBuf,
    archive: ZipArchive<File>,
    content_types: ContentTypes,
}

impl OoxmlPackage {
    pub fn open(path: &Path) -> Result<Self, Doc2MdError> {
        let file = File::open(path).map_err(|_| Doc2MdError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        let archive = ZipArchive::new(file).map_err(|e| Doc2MdError::CorruptDocument {
            path: path.to_path_buf(),
            detail: format!("not a ZIP package: {e}"),
        })?;

        let mut package = Self {
            path: path.to_path_buf(),
            archive,
            content_types: ContentTypes::default(),
        };
        if let Some(xml) = package.try_read_part("[Content_Types].xml")? {
            package.content_types = ContentTypes::parse(&xml)
                .map_err(|e| package.corrupt(format!("[Content_Types].xml: {e}")))?;
        }
        Ok(package)
    }

    pub fn content_type(&self, part: &str) -> &str {
        self.content_types.content_type(part)
    }

    /// Names of all entries in the package.
    pub fn part_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Read a part that must exist.
    pub fn read_part(&mut self, name: &str) -> Result<Vec<u8>, Doc2MdError> {
        self.try_read_part(name)?
            .ok_or_else(|| self.corrupt(format!("missing part '{name}'")))
    }

    /// Read a part, `Ok(None)` when the package has no such entry.
    pub fn try_read_part(&mut self, name: &str) -> Result<Option<Vec<u8>>, Doc2MdError> {
        let name = name.trim_start_matches('/');
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => {
                return Err(Doc2MdError::CorruptDocument {
                    path: self.path.clone(),
                    detail: format!("part '{name}': {e}"),
                })
            }
        };
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| Doc2MdError::CorruptDocument {
                path: self.path.clone(),
                detail: format!("part '{name}': {e}"),
            })?;
        Ok(Some(bytes))
    }

    /// Relationships of `part`. A part without a `.rels` file has none.
    pub fn relationships(&mut self, part: &str) -> Result<Relationships, Doc2MdError> {
        let rels_name = rels_part_name(part);
        let Some(xml) = self.try_read_part(&rels_name)? else {
            debug!("No relationships for {}", part);
            return Ok(Relationships::new());
        };
        parse_relationships(part, &xml).map_err(|e| self.corrupt(format!("{rels_name}: {e}")))
    }

    pub fn corrupt(&self, detail: impl Into<String>) -> Doc2MdError {
        Doc2MdError::CorruptDocument {
            path: self.path.clone(),
            detail: detail.into(),
        }
    }
}

/// `word/document.xml` → `word/_rels/document.xml.rels`.
pub fn rels_part_name(part: &str) -> String {
    let part = part.trim_start_matches('/');
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that declares it.
///
/// Targets are relative to the source part's directory (`media/a.png`,
/// `../media/a.png`) unless they start with `/`.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let source_part = source_part.trim_start_matches('/');
    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

fn parse_relationships(source_part: &str, xml: &[u8]) -> Result<Relationships, quick_xml::Error> {
    let mut rels = Relationships::new();
    let mut reader = XmlReader::from_reader(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e)
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                let id = attr_value(&reader, e, b"Id");
                let target = attr_value(&reader, e, b"Target");
                if let (Some(id), Some(target)) = (id, target) {
                    let external = attr_value(&reader, e, b"TargetMode")
                        .is_some_and(|m| m.eq_ignore_ascii_case("External"));
                    let target = if external {
                        target
                    } else {
                        resolve_target(source_part, &target)
                    };
                    rels.insert(
                        id,
                        Relationship {
                            target,
                            rel_type: attr_value(&reader, e, b"Type").unwrap_or_default(),
                            external,
                        },
                    );
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// Strip the namespace prefix of a tag or attribute name.
pub fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Value of the attribute whose local name is `key`, whatever its prefix.
pub fn attr_value<R>(reader: &XmlReader<R>, element: &BytesStart, key: &[u8]) -> Option<String> {
    for attr in element.attributes().with_checks(false) {
        let attr = attr.ok()?;
        if local_name(attr.key.as_ref()) == key {
            if let Ok(value) = attr.decode_and_unescape_value(reader) {
                return Some(value.into_owned());
            }
        }
    }
    None
}

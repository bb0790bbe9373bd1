//! Read-only access to the entries of an EPUB zip container.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use percent_encoding::percent_decode_str;
use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipError;

use folio_shared::{FolioError, Result};

use crate::xml::strip_bom;

/// An opened EPUB archive.
pub struct EpubArchive<R: Read + Seek> {
    zip: ZipArchive<R>,
}

impl EpubArchive<File> {
    /// Open an EPUB file from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| FolioError::io(path, e))?;
        Self::from_reader(file)
    }
}

impl<R: Read + Seek> EpubArchive<R> {
    /// Open an EPUB from any [`Read`] + [`Seek`] source.
    pub fn from_reader(reader: R) -> Result<Self> {
        let zip = ZipArchive::new(reader)
            .map_err(|e| FolioError::structure(format!("not a readable zip archive: {e}")))?;
        debug!(entries = zip.len(), "opened archive");
        Ok(Self { zip })
    }

    /// Whether an entry exists (exact or percent-decoded path).
    pub fn contains(&self, path: &str) -> bool {
        self.zip.index_for_name(path).is_some()
            || decoded(path).is_some_and(|p| self.zip.index_for_name(&p).is_some())
    }

    /// Read an entry's raw bytes.
    ///
    /// Tries the exact path first, then the percent-decoded path (handles
    /// malformed EPUBs that encode hrefs but not entry names).
    pub fn read_bytes(&mut self, path: &str) -> Result<Vec<u8>> {
        match read_entry(&mut self.zip, path) {
            Err(ZipError::FileNotFound) => {}
            other => return other.map_err(|e| entry_error(path, e)),
        }

        let decoded = decoded(path)
            .ok_or_else(|| FolioError::structure(format!("archive entry not found: {path}")))?;
        read_entry(&mut self.zip, &decoded).map_err(|e| entry_error(path, e))
    }

    /// Read an entry as text, BOM stripped, invalid UTF-8 replaced.
    pub fn read_string(&mut self, path: &str) -> Result<String> {
        let bytes = self.read_bytes(path)?;
        Ok(String::from_utf8_lossy(strip_bom(&bytes)).into_owned())
    }
}

fn read_entry<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    path: &str,
) -> std::result::Result<Vec<u8>, ZipError> {
    let mut file = zip.by_name(path)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

fn entry_error(path: &str, e: ZipError) -> FolioError {
    match e {
        ZipError::FileNotFound => FolioError::structure(format!("archive entry not found: {path}")),
        other => FolioError::structure(format!("cannot read archive entry {path}: {other}")),
    }
}

/// Percent-decoded form of `path`, if it differs.
fn decoded(path: &str) -> Option<String> {
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    (decoded != path).then(|| decoded.into_owned())
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Resolve `href` against the directory `base_dir`, collapsing `.` and `..`.
///
/// The fragment, if any, is kept.
pub fn resolve_path(base_dir: &str, href: &str) -> String {
    let (path, fragment) = match href.split_once('#') {
        Some((p, f)) => (p, Some(f)),
        None => (href, None),
    };

    let mut segments: Vec<&str> = if path.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|s| !s.is_empty()).collect()
    };

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut resolved = segments.join("/");
    if let Some(fragment) = fragment {
        resolved.push('#');
        resolved.push_str(fragment);
    }
    resolved
}

/// Directory part of an archive path (`""` for top-level entries).
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Document-level lookup key for an href: fragment stripped, percent-decoded,
/// leading `./` removed, lowercased.
pub fn normalize_href(href: &str) -> String {
    let path = href.split('#').next().unwrap_or(href).trim();
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    let mut key: &str = &decoded;
    while let Some(rest) = key.strip_prefix("./") {
        key = rest;
    }
    key.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::EpubBuilder;
    use std::io::Cursor;

    #[test]
    fn resolve_path_joins_and_collapses() {
        assert_eq!(resolve_path("OEBPS", "ch1.xhtml"), "OEBPS/ch1.xhtml");
        assert_eq!(resolve_path("", "ch1.xhtml"), "ch1.xhtml");
        assert_eq!(resolve_path("OEBPS/text", "../ch1.xhtml#s1"), "OEBPS/ch1.xhtml#s1");
        assert_eq!(resolve_path("OEBPS", "./text/./ch2.xhtml"), "OEBPS/text/ch2.xhtml");
    }

    #[test]
    fn parent_dir_of_paths() {
        assert_eq!(parent_dir("OEBPS/content.opf"), "OEBPS");
        assert_eq!(parent_dir("content.opf"), "");
    }

    #[test]
    fn normalize_href_keys() {
        assert_eq!(normalize_href("./Text/Chapter%201.xhtml#p3"), "text/chapter 1.xhtml");
        assert_eq!(normalize_href("CH1.XHTML"), "ch1.xhtml");
    }

    #[test]
    fn reads_entries_with_percent_decoded_fallback() {
        let bytes = EpubBuilder::new()
            .raw_entry("OEBPS/Chapter 1.xhtml", "<html/>")
            .build_raw();
        let mut archive = EpubArchive::from_reader(Cursor::new(bytes)).expect("open");

        assert!(archive.contains("OEBPS/Chapter%201.xhtml"));
        let text = archive.read_string("OEBPS/Chapter%201.xhtml").expect("read");
        assert_eq!(text, "<html/>");
    }

    #[test]
    fn missing_entry_is_structure_error() {
        let bytes = EpubBuilder::new().build_raw();
        let mut archive = EpubArchive::from_reader(Cursor::new(bytes)).expect("open");
        let err = archive.read_bytes("nope.xhtml").unwrap_err();
        assert!(err.to_string().contains("archive entry not found"));
    }

    #[test]
    fn garbage_is_structure_error() {
        let err = EpubArchive::from_reader(Cursor::new(b"not a zip".to_vec()))
            .err()
            .expect("must fail");
        assert!(err.to_string().starts_with("cannot extract structure"));
    }
}

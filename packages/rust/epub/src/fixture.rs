//! In-memory EPUB builder for tests.
//!
//! Enabled for this crate's tests and, through the `fixtures` feature, for
//! dependent crates' tests.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Builds a minimal EPUB 3 archive under `OEBPS/`.
#[derive(Debug, Clone, Default)]
pub struct EpubBuilder {
    title: Option<String>,
    authors: Vec<String>,
    chapters: Vec<(String, String)>,
    nav: Option<Vec<(String, String)>>,
    ncx: Option<Vec<(String, String)>>,
    raw: Vec<(String, String)>,
}

impl EpubBuilder {
    /// Start an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `dc:title`.
    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Add a `dc:creator`.
    pub fn author(mut self, author: &str) -> Self {
        self.authors.push(author.to_string());
        self
    }

    /// Add a content document (in reading order) with the given `<body>` markup.
    pub fn chapter(mut self, href: &str, body: &str) -> Self {
        self.chapters.push((href.to_string(), body.to_string()));
        self
    }

    /// Add an EPUB 3 navigation document listing `(href, label)` pairs.
    pub fn nav(mut self, entries: &[(&str, &str)]) -> Self {
        self.nav = Some(owned(entries));
        self
    }

    /// Add an NCX map listing `(href, label)` pairs.
    pub fn ncx(mut self, entries: &[(&str, &str)]) -> Self {
        self.ncx = Some(owned(entries));
        self
    }

    /// Add an arbitrary archive entry.
    pub fn raw_entry(mut self, path: &str, content: &str) -> Self {
        self.raw.push((path.to_string(), content.to_string()));
        self
    }

    /// Write only the raw entries (no container or package document).
    pub fn build_raw(self) -> Vec<u8> {
        let mut entries = vec![("mimetype".to_string(), "application/epub+zip".to_string())];
        entries.extend(self.raw);
        write_zip(&entries)
    }

    /// Write the complete book.
    pub fn build(self) -> Vec<u8> {
        let mut entries = vec![
            ("mimetype".to_string(), "application/epub+zip".to_string()),
            (
                "META-INF/container.xml".to_string(),
                r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#
                    .to_string(),
            ),
            ("OEBPS/content.opf".to_string(), self.package_document()),
        ];

        for (href, body) in &self.chapters {
            entries.push((format!("OEBPS/{href}"), xhtml_document(body)));
        }
        if let Some(nav) = &self.nav {
            entries.push(("OEBPS/nav.xhtml".to_string(), nav_document(nav)));
        }
        if let Some(ncx) = &self.ncx {
            entries.push(("OEBPS/toc.ncx".to_string(), ncx_document(ncx)));
        }
        entries.extend(self.raw);

        write_zip(&entries)
    }

    fn package_document(&self) -> String {
        let mut metadata = String::new();
        if let Some(title) = &self.title {
            metadata.push_str(&format!("<dc:title>{}</dc:title>\n", escape(title)));
        }
        for author in &self.authors {
            metadata.push_str(&format!("<dc:creator>{}</dc:creator>\n", escape(author)));
        }

        let mut manifest = String::new();
        let mut spine = String::new();
        for (i, (href, _)) in self.chapters.iter().enumerate() {
            manifest.push_str(&format!(
                "<item id=\"c{i}\" href=\"{href}\" media-type=\"application/xhtml+xml\"/>\n"
            ));
            spine.push_str(&format!("<itemref idref=\"c{i}\"/>\n"));
        }
        if self.nav.is_some() {
            manifest.push_str(
                "<item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
            );
        }
        let toc_attr = if self.ncx.is_some() {
            manifest.push_str(
                "<item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
            );
            " toc=\"ncx\""
        } else {
            ""
        };

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
<metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
{metadata}</metadata>
<manifest>
{manifest}</manifest>
<spine{toc_attr}>
{spine}</spine>
</package>"#
        )
    }
}

fn owned(entries: &[(&str, &str)]) -> Vec<(String, String)> {
    entries
        .iter()
        .map(|(href, label)| (href.to_string(), label.to_string()))
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn xhtml_document(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Document</title></head>
<body>
{body}
</body>
</html>"#
    )
}

fn nav_document(entries: &[(String, String)]) -> String {
    let items: String = entries
        .iter()
        .map(|(href, label)| format!("<li><a href=\"{href}\">{}</a></li>\n", escape(label)))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Navigation</title></head>
<body>
<nav epub:type="toc"><ol>
{items}</ol></nav>
</body>
</html>"#
    )
}

fn ncx_document(entries: &[(String, String)]) -> String {
    let points: String = entries
        .iter()
        .enumerate()
        .map(|(i, (href, label))| {
            format!(
                "<navPoint id=\"n{i}\" playOrder=\"{}\"><navLabel><text>{}</text></navLabel><content src=\"{href}\"/></navPoint>\n",
                i + 1,
                escape(label)
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
<navMap>
{points}</navMap>
</ncx>"#
    )
}

fn write_zip(entries: &[(String, String)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (path, content) in entries {
        zip.start_file(path.as_str(), stored)
            .expect("start zip entry");
        zip.write_all(content.as_bytes()).expect("write zip entry");
    }

    zip.finish().expect("finish zip").into_inner()
}

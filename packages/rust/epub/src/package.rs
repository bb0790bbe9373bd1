//! Container descriptor and package manifest (OPF) parsing.

use std::collections::HashMap;
use std::io::{Read, Seek};

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, instrument};

use folio_shared::{BookMetadata, FolioError, ManifestItem, Result};

use crate::archive::{EpubArchive, normalize_href, parent_dir, resolve_path};
use crate::xml::{attr, collapse_whitespace, decode_entities, local_name, resolve_entity, strip_bom};

/// Fixed location of the bootstrap descriptor.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// A parsed package document.
#[derive(Debug, Clone)]
pub struct Package {
    /// Archive path of the package document.
    pub opf_path: String,
    /// Bibliographic metadata.
    pub metadata: BookMetadata,
    /// Manifest items in document order.
    pub manifest: Vec<ManifestItem>,
    /// Reading order as manifest ids.
    pub reading_order: Vec<String>,
    /// Manifest id declared by the reading order's `toc` attribute.
    pub toc_id: Option<String>,
}

impl Package {
    /// Read `META-INF/container.xml`, then parse the package document it points at.
    #[instrument(skip_all)]
    pub fn load<R: Read + Seek>(archive: &mut EpubArchive<R>) -> Result<Self> {
        if !archive.contains(CONTAINER_PATH) {
            return Err(FolioError::structure(format!("{CONTAINER_PATH} is missing")));
        }
        let container = archive.read_bytes(CONTAINER_PATH)?;
        let opf_path = parse_container(&container)?;

        let opf = archive.read_string(&opf_path).map_err(|e| {
            FolioError::structure(format!("package document {opf_path} unreadable: {e}"))
        })?;
        parse_package(&opf, &opf_path)
    }

    /// Directory of the package document; manifest hrefs are relative to it.
    pub fn base_dir(&self) -> &str {
        parent_dir(&self.opf_path)
    }

    /// Archive path of a manifest href.
    pub fn archive_path(&self, href: &str) -> String {
        resolve_path(self.base_dir(), href)
    }

    /// Look up a manifest item by id.
    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// Hrefs of the reading order, restricted to markup documents.
    ///
    /// Falls back to every markup item in manifest order when the package
    /// declares no reading order.
    pub fn reading_order_hrefs(&self) -> Vec<String> {
        let by_id: HashMap<&str, &ManifestItem> = self
            .manifest
            .iter()
            .map(|item| (item.id.as_str(), item))
            .collect();

        let hrefs: Vec<String> = self
            .reading_order
            .iter()
            .filter_map(|id| by_id.get(id.as_str()))
            .filter(|item| item.is_markup())
            .map(|item| item.href.clone())
            .collect();

        if !hrefs.is_empty() {
            return hrefs;
        }

        debug!("no usable reading order, falling back to manifest order");
        self.manifest
            .iter()
            .filter(|item| item.is_markup())
            .map(|item| item.href.clone())
            .collect()
    }

    /// The modern navigation document, by declared property or file name.
    pub fn navigation_document(&self) -> Option<&ManifestItem> {
        self.manifest
            .iter()
            .find(|item| item.is_navigation_document)
            .or_else(|| {
                self.manifest.iter().find(|item| {
                    let file = item.href.rsplit('/').next().unwrap_or(&item.href);
                    item.is_markup() && normalize_href(file).contains("nav")
                })
            })
    }

    /// The legacy NCX map, by the reading order's `toc` id or by media type.
    pub fn legacy_map(&self) -> Option<&ManifestItem> {
        self.toc_id
            .as_deref()
            .and_then(|id| self.item(id))
            .or_else(|| {
                self.manifest
                    .iter()
                    .find(|item| item.media_type == NCX_MEDIA_TYPE)
            })
    }
}

/// Parse `META-INF/container.xml` to find the package document path.
pub fn parse_container(bytes: &[u8]) -> Result<String> {
    let content = String::from_utf8_lossy(strip_bom(bytes));
    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if local_name(e.name().as_ref()) == b"rootfile" =>
            {
                if let Some(path) = attr(&e, b"full-path").filter(|p| !p.trim().is_empty()) {
                    return Ok(resolve_path("", path.trim()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FolioError::structure(format!(
                    "malformed {CONTAINER_PATH}: {e}"
                )));
            }
            _ => {}
        }
    }

    Err(FolioError::structure(format!(
        "no rootfile found in {CONTAINER_PATH}"
    )))
}

/// Metadata elements captured as text.
const METADATA_FIELDS: &[&[u8]] = &[
    b"title",
    b"creator",
    b"language",
    b"publisher",
    b"subject",
    b"identifier",
    b"description",
];

/// Parse an OPF package document located at `opf_path`.
#[instrument(skip(content))]
pub fn parse_package(content: &str, opf_path: &str) -> Result<Package> {
    // Untrimmed: entity references split text events, and the spaces around
    // them belong to the value.
    let mut reader = Reader::from_str(content);

    let mut metadata = BookMetadata::default();
    let mut manifest: Vec<ManifestItem> = Vec::new();
    let mut reading_order: Vec<String> = Vec::new();
    let mut toc_id: Option<String> = None;
    let mut saw_package = false;

    let mut in_metadata = false;
    // (field, nesting depth inside the field element, collected text)
    let mut capture: Option<(Vec<u8>, usize, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                if let Some((_, depth, _)) = capture.as_mut() {
                    *depth += 1;
                    continue;
                }

                match local {
                    b"package" => saw_package = true,
                    b"metadata" => in_metadata = true,
                    b"spine" => toc_id = attr(&e, b"toc"),
                    b"item" => push_item(&mut manifest, &e),
                    b"itemref" => push_itemref(&mut reading_order, &e),
                    field if in_metadata && METADATA_FIELDS.contains(&field) => {
                        capture = Some((field.to_vec(), 0, String::new()));
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"item" => push_item(&mut manifest, &e),
                    b"itemref" => push_itemref(&mut reading_order, &e),
                    b"spine" => toc_id = attr(&e, b"toc"),
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some((_, _, text)) = capture.as_mut() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some((_, _, text)) = capture.as_mut() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    match resolve_entity(&entity) {
                        Some(resolved) => text.push_str(&resolved),
                        None => text.push_str(&format!("&{entity};")),
                    }
                }
            }
            Ok(Event::End(e)) => {
                if let Some((field, depth, text)) = capture.as_mut() {
                    if *depth > 0 {
                        *depth -= 1;
                    } else {
                        let field = std::mem::take(field);
                        let text = std::mem::take(text);
                        capture = None;
                        apply_field(&mut metadata, &field, &text);
                    }
                    continue;
                }
                if local_name(e.name().as_ref()) == b"metadata" {
                    in_metadata = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FolioError::structure(format!(
                    "invalid package document {opf_path}: {e}"
                )));
            }
            _ => {}
        }
    }

    if !saw_package {
        return Err(FolioError::structure(format!(
            "{opf_path} is not a package document"
        )));
    }

    debug!(
        items = manifest.len(),
        reading_order = reading_order.len(),
        title = metadata.title.as_deref().unwrap_or(""),
        "package parsed"
    );

    Ok(Package {
        opf_path: opf_path.to_string(),
        metadata,
        manifest,
        reading_order,
        toc_id,
    })
}

fn push_item(manifest: &mut Vec<ManifestItem>, e: &quick_xml::events::BytesStart<'_>) {
    let Some(id) = attr(e, b"id").filter(|id| !id.is_empty()) else {
        return;
    };
    if manifest.iter().any(|item| item.id == id) {
        debug!(%id, "duplicate manifest id ignored");
        return;
    }

    let is_navigation_document = attr(e, b"properties")
        .is_some_and(|props| props.split_ascii_whitespace().any(|p| p == "nav"));

    manifest.push(ManifestItem {
        id,
        href: attr(e, b"href").unwrap_or_default(),
        media_type: attr(e, b"media-type").unwrap_or_default().to_lowercase(),
        is_navigation_document,
    });
}

fn push_itemref(reading_order: &mut Vec<String>, e: &quick_xml::events::BytesStart<'_>) {
    if let Some(idref) = attr(e, b"idref").filter(|id| !id.is_empty()) {
        reading_order.push(idref);
    }
}

/// Store one captured metadata value. Empty values are dropped; single-valued
/// fields keep their first occurrence.
fn apply_field(metadata: &mut BookMetadata, field: &[u8], raw: &str) {
    let value = collapse_whitespace(&decode_entities(raw));
    if value.is_empty() {
        return;
    }

    let first = |slot: &mut Option<String>| {
        if slot.is_none() {
            *slot = Some(value.clone());
        }
    };

    match field {
        b"title" => first(&mut metadata.title),
        b"language" => first(&mut metadata.language),
        b"publisher" => first(&mut metadata.publisher),
        b"identifier" => first(&mut metadata.identifier),
        b"description" => first(&mut metadata.description),
        b"creator" => metadata.authors.push(value),
        b"subject" => metadata.tags.push(value),
        _ => {}
    }
}

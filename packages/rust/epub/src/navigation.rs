//! Navigation sources: the EPUB 3 navigation document and the legacy NCX map.
//!
//! Sources are tried in priority order; the first one that yields entries wins.
//! When none does, no table of contents constrains the chapter order.

use std::collections::VecDeque;
use std::io::{Read, Seek};
use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::events::Event;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument, warn};

use folio_shared::{FolioError, ManifestItem, Result, TocEntry};

use crate::archive::{EpubArchive, parent_dir, resolve_path};
use crate::package::Package;
use crate::xml::{attr, collapse_whitespace, local_name, resolve_entity};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A provider of table-of-contents entries.
pub trait NavigationSource {
    /// Human-readable source name for tracing.
    fn name(&self) -> &str;

    /// Find the manifest item this source reads, if the package has one.
    fn locate<'a>(&self, package: &'a Package) -> Option<&'a ManifestItem>;

    /// Parse the located document. `base_dir` is the document's directory
    /// relative to the package document; returned targets are relative to
    /// the package document too.
    fn parse(&self, content: &str, base_dir: &str) -> Result<Vec<TocEntry>>;
}

/// Entries produced by the winning navigation source.
#[derive(Debug, Clone, Default)]
pub struct ResolvedToc {
    /// Name of the source that produced `entries`, if any did.
    pub source: Option<String>,
    /// TOC entries in source order.
    pub entries: Vec<TocEntry>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds navigation sources in priority order.
pub struct NavigationRegistry {
    sources: Vec<Box<dyn NavigationSource>>,
}

impl NavigationRegistry {
    /// Create a registry with the built-in sources (modern document first, NCX second).
    pub fn new() -> Self {
        Self {
            sources: vec![Box::new(NavDocumentSource), Box::new(LegacyNcxSource)],
        }
    }

    /// Create a registry from explicit sources.
    pub fn with_sources(sources: Vec<Box<dyn NavigationSource>>) -> Self {
        Self { sources }
    }

    /// Return the entries of the first source that yields any.
    ///
    /// Unreadable or malformed navigation documents are skipped, never fatal.
    #[instrument(skip_all)]
    pub fn resolve<R: Read + Seek>(
        &self,
        archive: &mut EpubArchive<R>,
        package: &Package,
    ) -> ResolvedToc {
        for source in &self.sources {
            let Some(item) = source.locate(package) else {
                debug!(source = source.name(), "navigation source not present");
                continue;
            };

            let path = package.archive_path(&item.href);
            let content = match archive.read_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(source = source.name(), %path, error = %e, "navigation document unreadable");
                    continue;
                }
            };

            match source.parse(&content, parent_dir(&item.href)) {
                Ok(entries) if !entries.is_empty() => {
                    debug!(source = source.name(), entries = entries.len(), "using navigation source");
                    return ResolvedToc {
                        source: Some(source.name().to_string()),
                        entries,
                    };
                }
                Ok(_) => debug!(source = source.name(), "navigation source is empty"),
                Err(e) => {
                    warn!(source = source.name(), %path, error = %e, "navigation source malformed");
                }
            }
        }

        ResolvedToc::default()
    }
}

impl Default for NavigationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an entry from a raw target, skipping external and empty ones.
fn entry(base_dir: &str, href: &str, label: &str) -> Option<TocEntry> {
    let href = href.trim();
    let label = collapse_whitespace(label);
    if href.is_empty() || href.starts_with('#') || href.contains("://") || label.is_empty() {
        return None;
    }
    Some(TocEntry {
        target_href: resolve_path(base_dir, href),
        label,
    })
}

// ---------------------------------------------------------------------------
// EPUB 3 navigation document
// ---------------------------------------------------------------------------

static NAV: LazyLock<Selector> = LazyLock::new(|| Selector::parse("nav").expect("valid selector"));
static LIST: LazyLock<Selector> = LazyLock::new(|| Selector::parse("ol").expect("valid selector"));
static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Reads the `<nav epub:type="toc">` list of the EPUB 3 navigation document.
pub struct NavDocumentSource;

impl NavigationSource for NavDocumentSource {
    fn name(&self) -> &str {
        "nav-document"
    }

    fn locate<'a>(&self, package: &'a Package) -> Option<&'a ManifestItem> {
        package.navigation_document()
    }

    fn parse(&self, content: &str, base_dir: &str) -> Result<Vec<TocEntry>> {
        let doc = Html::parse_document(content);

        let Some(toc_nav) = doc.select(&NAV).find(is_toc_nav) else {
            return Ok(Vec::new());
        };
        let Some(list) = toc_nav.select(&LIST).next() else {
            return Ok(Vec::new());
        };

        let entries = list
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "li")
            .filter_map(|li| {
                let anchor = own_anchor(li).or_else(|| li.select(&ANCHOR).next())?;
                let href = anchor.value().attr("href")?;
                entry(base_dir, href, &anchor.text().collect::<String>())
            })
            .collect();

        Ok(entries)
    }
}

/// Whether a `<nav>` is typed as a table of contents (`epub:type` or ARIA role).
fn is_toc_nav(nav: &ElementRef<'_>) -> bool {
    nav.value().attrs().any(|(name, value)| {
        let typed = name == "epub:type" || name.ends_with(":type") || name == "type" || name == "role";
        typed
            && value
                .split_ascii_whitespace()
                .any(|v| v == "toc" || v == "doc-toc")
    })
}

/// The first anchor of a list item that is not inside a nested list.
///
/// Items with only nested anchors (`<li><span>Part</span><ol>..`) fall back
/// to their first descendant anchor at the call site.
fn own_anchor<'a>(li: ElementRef<'a>) -> Option<ElementRef<'a>> {
    li.select(&ANCHOR).find(|anchor| {
        !anchor
            .ancestors()
            .take_while(|node| node.id() != li.id())
            .any(|node| {
                node.value()
                    .as_element()
                    .is_some_and(|el| el.name() == "ol" || el.name() == "ul")
            })
    })
}

// ---------------------------------------------------------------------------
// Legacy NCX map
// ---------------------------------------------------------------------------

/// Reads the `navMap` tree of an NCX document.
pub struct LegacyNcxSource;

/// One `navPoint` (or the `navMap` root) in arena form.
#[derive(Default)]
struct NavNode {
    label: String,
    src: Option<String>,
    children: Vec<usize>,
}

impl NavigationSource for LegacyNcxSource {
    fn name(&self) -> &str {
        "ncx"
    }

    fn locate<'a>(&self, package: &'a Package) -> Option<&'a ManifestItem> {
        package.legacy_map()
    }

    fn parse(&self, content: &str, base_dir: &str) -> Result<Vec<TocEntry>> {
        let nodes = parse_nav_map(content)?;
        let Some(root) = nodes.first() else {
            return Ok(Vec::new());
        };

        // Breadth-first over an explicit queue; nesting depth never touches the stack.
        let mut entries = Vec::new();
        let mut queue: VecDeque<usize> = root.children.iter().copied().collect();
        while let Some(index) = queue.pop_front() {
            let node = &nodes[index];
            if let Some(src) = &node.src
                && let Some(toc_entry) = entry(base_dir, src, &node.label)
            {
                entries.push(toc_entry);
            }
            queue.extend(node.children.iter().copied());
        }

        Ok(entries)
    }
}

/// Parse the `navMap` into an arena whose index 0 is the root.
fn parse_nav_map(content: &str) -> Result<Vec<NavNode>> {
    let mut reader = Reader::from_str(content);

    let mut nodes: Vec<NavNode> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut in_label = false;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"navMap" if nodes.is_empty() => {
                        nodes.push(NavNode::default());
                        stack.push(0);
                    }
                    b"navPoint" if !stack.is_empty() => {
                        let index = nodes.len();
                        nodes.push(NavNode::default());
                        if let Some(&parent) = stack.last() {
                            nodes[parent].children.push(index);
                        }
                        stack.push(index);
                    }
                    b"navLabel" => in_label = true,
                    b"text" => in_text = in_label,
                    b"content" => set_src(&mut nodes, &stack, attr(&e, b"src")),
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == b"content" {
                    set_src(&mut nodes, &stack, attr(&e, b"src"));
                }
            }
            Ok(Event::Text(e)) => {
                if in_text && let Some(&top) = stack.last() {
                    nodes[top].label.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text && let Some(&top) = stack.last() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        nodes[top].label.push_str(&resolved);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"text" => in_text = false,
                    b"navLabel" => in_label = false,
                    b"navPoint" if stack.len() > 1 => {
                        stack.pop();
                    }
                    b"navMap" if !stack.is_empty() => break,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FolioError::structure(format!("malformed NCX: {e}"))),
            _ => {}
        }
    }

    Ok(nodes)
}

/// Record the first `src` seen for the innermost open navPoint.
fn set_src(nodes: &mut [NavNode], stack: &[usize], src: Option<String>) {
    if let (Some(&top), Some(src)) = (stack.last(), src)
        && top != 0
        && nodes[top].src.is_none()
    {
        nodes[top].src = Some(src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::EpubBuilder;
    use std::io::Cursor;

    const NAV_DOC: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<body>
  <nav epub:type="landmarks"><ol><li><a href="cover.xhtml">Cover</a></li></ol></nav>
  <nav epub:type="toc" id="toc">
    <h1>Contents</h1>
    <ol>
      <li><a href="text/ch1.xhtml">  Chapter
          One </a></li>
      <li><span>Part II</span>
        <ol><li><a href="text/ch2.xhtml#s1">Nested</a></li></ol>
      </li>
      <li><a href="../outside/ch3.xhtml#frag"><em>Three</em> &amp; More</a>
        <ol><li><a href="text/ch4.xhtml">Four</a></li></ol>
      </li>
      <li><a href="https://example.com/">External</a></li>
      <li><a href="#local">Anchor only</a></li>
    </ol>
  </nav>
</body>
</html>"##;

    const NCX: &str = r#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <docTitle><text>Book Title</text></docTitle>
  <navMap>
    <navPoint id="p1" playOrder="1">
      <navLabel><text>Part I</text></navLabel>
      <content src="part1.xhtml"/>
      <navPoint id="c1" playOrder="2">
        <navLabel><text>Chapter 1 &amp; Prologue</text></navLabel>
        <content src="ch1.xhtml#start"/>
      </navPoint>
    </navPoint>
    <navPoint id="p2" playOrder="3">
      <navLabel><text>   </text></navLabel>
      <content src="part2.xhtml"/>
    </navPoint>
    <navPoint id="p3" playOrder="4">
      <navLabel><text>Epilogue</text></navLabel>
      <content src="epilogue.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

    #[test]
    fn nav_document_walks_top_level_items() {
        let entries = NavDocumentSource.parse(NAV_DOC, "").unwrap();
        let pairs: Vec<(&str, &str)> = entries
            .iter()
            .map(|e| (e.target_href.as_str(), e.label.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("text/ch1.xhtml", "Chapter One"),
                ("outside/ch3.xhtml#frag", "Three & More"),
            ]
        );
    }

    #[test]
    fn nav_document_resolves_against_its_directory() {
        let entries = NavDocumentSource.parse(NAV_DOC, "nav").unwrap();
        assert_eq!(entries[0].target_href, "nav/text/ch1.xhtml");
        assert_eq!(entries[1].target_href, "outside/ch3.xhtml#frag");
    }

    #[test]
    fn nav_item_without_own_anchor_uses_first_nested() {
        let html = r#"<html><body><nav epub:type="toc"><ol>
            <li><span>Part One</span><ol><li><a href="p1.xhtml">The Start</a></li><li><a href="p2.xhtml">Later</a></li></ol></li>
            <li><a href="p3.xhtml">Part Two</a></li>
        </ol></nav></body></html>"#;
        let entries = NavDocumentSource.parse(html, "").unwrap();
        let pairs: Vec<(&str, &str)> = entries
            .iter()
            .map(|e| (e.target_href.as_str(), e.label.as_str()))
            .collect();
        assert_eq!(pairs, vec![("p1.xhtml", "The Start"), ("p3.xhtml", "Part Two")]);
    }

    #[test]
    fn nav_document_without_toc_nav_is_empty() {
        let html = r#"<html><body><nav><ol><li><a href="a.xhtml">A</a></li></ol></nav></body></html>"#;
        assert!(NavDocumentSource.parse(html, "").unwrap().is_empty());
    }

    #[test]
    fn ncx_is_breadth_first() {
        let entries = LegacyNcxSource.parse(NCX, "").unwrap();
        let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Part I", "Epilogue", "Chapter 1 & Prologue"]);
        assert_eq!(entries[2].target_href, "ch1.xhtml#start");
    }

    #[test]
    fn ncx_deep_nesting_does_not_recurse() {
        let depth = 5_000;
        let mut ncx = String::from("<ncx><navMap>");
        for i in 0..depth {
            ncx.push_str(&format!(
                "<navPoint><navLabel><text>L{i}</text></navLabel><content src=\"c{i}.xhtml\"/>"
            ));
        }
        ncx.push_str(&"</navPoint>".repeat(depth));
        ncx.push_str("</navMap></ncx>");

        let entries = LegacyNcxSource.parse(&ncx, "").unwrap();
        assert_eq!(entries.len(), depth);
        assert_eq!(entries[depth - 1].label, format!("L{}", depth - 1));
    }

    #[test]
    fn malformed_ncx_is_an_error() {
        let err = LegacyNcxSource
            .parse("<ncx><navMap><navPoint></navMap>", "")
            .unwrap_err();
        assert!(err.to_string().contains("malformed NCX"));
    }

    #[test]
    fn registry_prefers_nav_document() {
        let bytes = EpubBuilder::new()
            .chapter("ch1.xhtml", "<h1>One</h1><p>Text</p>")
            .nav(&[("ch1.xhtml", "Nav Label")])
            .ncx(&[("ch1.xhtml", "NCX Label")])
            .build();
        let mut archive = EpubArchive::from_reader(Cursor::new(bytes)).unwrap();
        let package = Package::load(&mut archive).unwrap();

        let toc = NavigationRegistry::new().resolve(&mut archive, &package);
        assert_eq!(toc.source.as_deref(), Some("nav-document"));
        assert_eq!(toc.entries[0].label, "Nav Label");
    }

    #[test]
    fn registry_falls_back_to_ncx() {
        let bytes = EpubBuilder::new()
            .chapter("ch1.xhtml", "<h1>One</h1><p>Text</p>")
            .ncx(&[("ch1.xhtml", "NCX Label")])
            .build();
        let mut archive = EpubArchive::from_reader(Cursor::new(bytes)).unwrap();
        let package = Package::load(&mut archive).unwrap();

        let toc = NavigationRegistry::new().resolve(&mut archive, &package);
        assert_eq!(toc.source.as_deref(), Some("ncx"));
        assert_eq!(toc.entries.len(), 1);
    }

    #[test]
    fn registry_without_sources_is_empty() {
        let bytes = EpubBuilder::new()
            .chapter("ch1.xhtml", "<p>Text</p>")
            .build();
        let mut archive = EpubArchive::from_reader(Cursor::new(bytes)).unwrap();
        let package = Package::load(&mut archive).unwrap();

        let toc = NavigationRegistry::new().resolve(&mut archive, &package);
        assert!(toc.source.is_none());
        assert!(toc.entries.is_empty());
    }
}

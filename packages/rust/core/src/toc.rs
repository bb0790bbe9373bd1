//! Chapter planning: which reading-order documents become chapters, and
//! which title each one gets.
//!
//! Combines the package reading order with the entries of the winning
//! navigation source into a [`ChapterPlan`].

use std::collections::HashMap;

use tracing::{debug, instrument, warn};

use folio_epub::{Package, ResolvedToc, normalize_href};
use folio_markdown::{extract_title_from_markdown, normalize_title};

/// A reading-order document selected for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDocument {
    /// Manifest href, relative to the package document.
    pub href: String,
    /// Full path of the entry inside the archive.
    pub archive_path: String,
}

/// The ordered documents to render plus the TOC title lookup.
#[derive(Debug, Clone, Default)]
pub struct ChapterPlan {
    /// Documents in reading order.
    pub documents: Vec<PlannedDocument>,
    /// Whether TOC entries narrowed the reading order.
    pub toc_constrained: bool,
    titles: HashMap<String, String>,
}

impl ChapterPlan {
    /// The TOC label recorded for a document, if any.
    pub fn toc_label(&self, href: &str) -> Option<&str> {
        self.titles.get(&normalize_href(href)).map(String::as_str)
    }

    /// Resolve a chapter title by priority: TOC label, first top-level
    /// heading, then `Chapter <position>` when no TOC constrained the plan.
    ///
    /// Each candidate goes through [`normalize_title`]; a rejected candidate
    /// falls through to the next source. `None` means the document is dropped.
    pub fn resolve_title(&self, href: &str, markdown: &str, position: usize) -> Option<String> {
        self.toc_label(href)
            .and_then(normalize_title)
            .or_else(|| extract_title_from_markdown(markdown).and_then(|h| normalize_title(&h)))
            .or_else(|| (!self.toc_constrained).then(|| format!("Chapter {position}")))
    }
}

/// Build the chapter plan for a package.
///
/// 1. Keys every TOC entry by its document (fragment stripped, lowercased);
///    the first label per document wins
/// 2. Keeps only reading-order documents the TOC mentions, in reading order
/// 3. Ignores the TOC as a filter when that would leave nothing
#[instrument(skip_all, fields(toc_entries = toc.entries.len()))]
pub fn plan_chapters(package: &Package, toc: &ResolvedToc) -> ChapterPlan {
    let mut titles: HashMap<String, String> = HashMap::new();
    for entry in &toc.entries {
        titles
            .entry(normalize_href(&entry.target_href))
            .or_insert_with(|| entry.label.clone());
    }

    let reading_order = package.reading_order_hrefs();
    let total = reading_order.len();

    let (hrefs, toc_constrained) = if titles.is_empty() {
        (reading_order, false)
    } else {
        let filtered: Vec<String> = reading_order
            .iter()
            .filter(|href| titles.contains_key(&normalize_href(href)))
            .cloned()
            .collect();

        if filtered.is_empty() {
            warn!(
                source = toc.source.as_deref().unwrap_or("unknown"),
                "TOC matches no reading-order document, ignoring it as a filter"
            );
            (reading_order, false)
        } else {
            (filtered, true)
        }
    };

    debug!(
        selected = hrefs.len(),
        reading_order = total,
        toc_constrained,
        "chapter plan built"
    );

    ChapterPlan {
        documents: hrefs
            .into_iter()
            .map(|href| PlannedDocument {
                archive_path: package.archive_path(&href),
                href,
            })
            .collect(),
        toc_constrained,
        titles,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

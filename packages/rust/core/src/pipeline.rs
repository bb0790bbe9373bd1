//! End-to-end extraction pipeline: archive → package → navigation → plan →
//! render → titles → boilerplate → split → boilerplate → reindex.

use std::io::{Read, Seek};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use folio_epub::{EpubArchive, NavigationRegistry, Package};
use folio_markdown::{HtmdRenderer, MarkdownRenderer, render_document};
use folio_shared::{Chapter, ExtractOptions, ExtractedBook, FolioError, Result};

use crate::{boilerplate, split, toc};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each content document is rendered.
    fn document_rendered(&self, path: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, book: &ExtractedBook);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_rendered(&self, _path: &str, _current: usize, _total: usize) {}
    fn done(&self, _book: &ExtractedBook) {}
}

/// Per-run counts of documents and chapters that did not make it through.
#[derive(Debug, Default)]
struct DropSummary {
    unreadable: usize,
    render_failed: usize,
    empty: usize,
    empty_with_images: usize,
    untitled: usize,
    boilerplate_before_split: usize,
    boilerplate_after_split: usize,
}

/// Runs the pipeline with a navigation registry and a Markdown renderer.
pub struct Extractor {
    registry: NavigationRegistry,
    renderer: Box<dyn MarkdownRenderer>,
}

impl Extractor {
    /// Built-in navigation sources and the `htmd` renderer.
    pub fn new() -> Self {
        Self {
            registry: NavigationRegistry::new(),
            renderer: Box::new(HtmdRenderer::new()),
        }
    }

    /// Replace the Markdown renderer.
    pub fn with_renderer(mut self, renderer: Box<dyn MarkdownRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replace the navigation registry.
    pub fn with_registry(mut self, registry: NavigationRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Extract chapters from an opened archive.
    ///
    /// 1. Load the package manifest (fatal on failure)
    /// 2. Resolve navigation and plan the chapter documents
    /// 3. Render each document, resolving its title
    /// 4. Filter boilerplate, split oversized chapters, filter again
    /// 5. Reindex survivors from 1
    #[instrument(skip_all)]
    pub fn extract<R: Read + Seek>(
        &self,
        archive: &mut EpubArchive<R>,
        options: &ExtractOptions,
        progress: &dyn ProgressReporter,
    ) -> Result<ExtractedBook> {
        let start = Instant::now();
        options.validate()?;

        // --- Phase 1: Package ---
        progress.phase("Reading package");
        let package = Package::load(archive)?;
        info!(
            title = package.metadata.title.as_deref().unwrap_or("untitled"),
            items = package.manifest.len(),
            "package loaded"
        );

        // --- Phase 2: Navigation + plan ---
        progress.phase("Resolving table of contents");
        let resolved = self.registry.resolve(archive, &package);
        let plan = toc::plan_chapters(&package, &resolved);

        // --- Phase 3: Render ---
        progress.phase("Rendering chapters");
        let mut drops = DropSummary::default();
        let mut chapters: Vec<Chapter> = Vec::new();
        let total = plan.documents.len();

        for (i, document) in plan.documents.iter().enumerate() {
            let position = i + 1;
            let path = document.archive_path.as_str();

            let markup = match archive.read_string(path) {
                Ok(markup) => markup,
                Err(e) => {
                    warn!(%path, error = %e, "content document unreadable, skipping");
                    drops.unreadable += 1;
                    continue;
                }
            };

            let rendered = match render_document(&markup, self.renderer.as_ref(), options) {
                Ok(rendered) => rendered,
                Err(e) => {
                    warn!(%path, error = %e, "conversion failed, skipping document");
                    drops.render_failed += 1;
                    continue;
                }
            };
            progress.document_rendered(path, position, total);

            if rendered.is_empty() {
                debug!(%path, had_images = rendered.had_images, "document empty after cleanup");
                drops.empty += 1;
                if rendered.had_images {
                    drops.empty_with_images += 1;
                }
                continue;
            }

            let Some(title) = plan.resolve_title(&document.href, &rendered.markdown, position)
            else {
                debug!(%path, "no usable title, dropping document");
                drops.untitled += 1;
                continue;
            };

            chapters.push(Chapter::new(position, title, path, rendered.markdown));
        }

        // --- Phase 4: Boilerplate, split, boilerplate ---
        if options.filter_boilerplate {
            progress.phase("Filtering boilerplate");
            let before = chapters.len();
            chapters = boilerplate::filter_chapters(chapters, "before split");
            drops.boilerplate_before_split = before - chapters.len();
        }

        progress.phase("Splitting oversized chapters");
        chapters = chapters
            .into_iter()
            .flat_map(|chapter| split::split_chapter(chapter, options))
            .collect();

        if options.filter_boilerplate {
            let before = chapters.len();
            chapters = boilerplate::filter_chapters(chapters, "after split");
            drops.boilerplate_after_split = before - chapters.len();
        }

        // --- Phase 5: Reindex ---
        let chapters: Vec<Chapter> = chapters
            .into_iter()
            .enumerate()
            .map(|(i, chapter)| chapter.with_index(i + 1))
            .collect();

        info!(
            documents = total,
            chapters = chapters.len(),
            unreadable = drops.unreadable,
            render_failed = drops.render_failed,
            empty = drops.empty,
            untitled = drops.untitled,
            boilerplate_before_split = drops.boilerplate_before_split,
            boilerplate_after_split = drops.boilerplate_after_split,
            elapsed_ms = start.elapsed().as_millis(),
            "extraction finished"
        );

        if chapters.is_empty() {
            return Err(if drops.empty_with_images > 0 {
                FolioError::image_only(format!(
                    "{} of {total} documents held only images after cleanup",
                    drops.empty_with_images
                ))
            } else {
                FolioError::no_content(format!(
                    "all {total} candidate documents were dropped"
                ))
            });
        }

        let book = ExtractedBook {
            metadata: package.metadata,
            chapters,
        };
        progress.done(&book);

        Ok(book)
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract chapters from an EPUB file on disk with the default extractor.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn extract_book(
    path: &Path,
    options: &ExtractOptions,
    progress: &dyn ProgressReporter,
) -> Result<ExtractedBook> {
    let mut archive = EpubArchive::open(path)?;
    Extractor::new().extract(&mut archive, options, progress)
}

/// Extract chapters from an in-memory or otherwise seekable EPUB.
pub fn extract_book_from_reader<R: Read + Seek>(
    reader: R,
    options: &ExtractOptions,
    progress: &dyn ProgressReporter,
) -> Result<ExtractedBook> {
    let mut archive = EpubArchive::from_reader(reader)?;
    Extractor::new().extract(&mut archive, options, progress)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Markup-to-Markdown rendering, cleanup passes, and title normalization.
//!
//! Renders each content document's `<body>` to Markdown through a
//! [`MarkdownRenderer`] (the `htmd` crate by default), then applies the
//! cleanup pipeline that strips declarations, images, and internal links.

mod cleanup;
pub mod title;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use folio_shared::{ExtractOptions, FolioError, Result};

pub use title::{clean_title, normalize_title};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of rendering one content document.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    /// Cleaned Markdown; empty when nothing survived cleanup.
    pub markdown: String,
    /// Whether the source markup contained image tags.
    pub had_images: bool,
}

impl RenderedDocument {
    /// Whether cleanup left no text.
    pub fn is_empty(&self) -> bool {
        self.markdown.trim().is_empty()
    }
}

/// The delegated "render this markup fragment to Markdown" capability.
pub trait MarkdownRenderer {
    /// Render an HTML fragment to raw (uncleaned) Markdown.
    fn render(&self, html: &str) -> Result<String>;
}

/// Default renderer backed by `htmd`.
pub struct HtmdRenderer {
    converter: htmd::HtmlToMarkdown,
}

impl HtmdRenderer {
    /// Create a renderer that skips non-content tags.
    pub fn new() -> Self {
        Self {
            converter: htmd::HtmlToMarkdown::builder()
                .skip_tags(vec!["script", "style", "head", "title", "noscript", "iframe"])
                .build(),
        }
    }
}

impl Default for HtmdRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer for HtmdRenderer {
    fn render(&self, html: &str) -> Result<String> {
        self.converter
            .convert(html)
            .map_err(|e| FolioError::Conversion(format!("htmd conversion failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Render a content document to clean Markdown.
///
/// 1. Extracts the `<body>` markup
/// 2. Pre-processes HTML tables into markdown tables
/// 3. Renders HTML → Markdown via the renderer
/// 4. Runs the cleanup pipeline
#[instrument(skip_all, fields(len = markup.len()))]
pub fn render_document(
    markup: &str,
    renderer: &dyn MarkdownRenderer,
    options: &ExtractOptions,
) -> Result<RenderedDocument> {
    let body = extract_body_html(markup);
    let body = preprocess_tables(&body);

    let raw_markdown = renderer.render(&body)?;
    debug!(raw_len = raw_markdown.len(), "render complete");

    let markdown = cleanup::run_pipeline(&raw_markdown, options);

    Ok(RenderedDocument {
        markdown,
        had_images: contains_images(markup),
    })
}

/// Text of the first top-level (`# `) heading in a Markdown body.
pub fn extract_title_from_markdown(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^#[ \t]+(.+?)[ \t#]*$").expect("valid regex"));

    H1_RE
        .captures(md)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Whether raw markup carries image tags (`<img>`, SVG `<image>`).
pub fn contains_images(markup: &str) -> bool {
    static IMG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)<(?:img|image|svg:image)\b").expect("valid regex"));
    IMG_RE.is_match(markup)
}

// ---------------------------------------------------------------------------
// Table pre-processing
// ---------------------------------------------------------------------------

static TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static HEADER_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th").expect("valid selector"));
static DATA_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("valid selector"));
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("valid selector"));

/// Convert HTML `<table>` elements to markdown table syntax before rendering.
///
/// `htmd` 0.1 doesn't support table conversion, so we handle it manually.
fn preprocess_tables(html: &str) -> String {
    let doc = Html::parse_fragment(html);

    if doc.select(&TABLE).next().is_none() {
        return html.to_string();
    }

    let mut result = html.to_string();
    for table_el in doc.select(&TABLE) {
        let md_table = html_table_to_markdown(&table_el);
        result = result.replacen(&table_el.html(), &md_table, 1);
    }

    result
}

/// Convert a single HTML table element to a markdown table string.
fn html_table_to_markdown(table: &scraper::ElementRef) -> String {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut has_header = false;

    for tr in table.select(&ROW) {
        let ths: Vec<String> = tr.select(&HEADER_CELL).map(|cell| cell_text(&cell)).collect();
        if !ths.is_empty() {
            has_header = true;
            rows.push(ths);
            continue;
        }

        let tds: Vec<String> = tr.select(&DATA_CELL).map(|cell| cell_text(&cell)).collect();
        if !tds.is_empty() {
            rows.push(tds);
        }
    }

    let col_count = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }

    for row in &mut rows {
        row.resize(col_count, String::new());
    }

    let mut md = String::from("\n\n");

    md.push_str("| ");
    md.push_str(&rows[0].join(" | "));
    md.push_str(" |\n");

    md.push_str("| ");
    md.push_str(&vec!["---"; col_count].join(" | "));
    md.push_str(" |\n");

    let data_start = if has_header { 1 } else { 0 };
    for row in &rows[data_start..] {
        md.push_str("| ");
        md.push_str(&row.join(" | "));
        md.push_str(" |\n");
    }

    md.push('\n');
    md
}

fn cell_text(cell: &scraper::ElementRef) -> String {
    cell.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Inner markup of `<body>`, or the whole input when there is none.
fn extract_body_html(markup: &str) -> String {
    let doc = Html::parse_document(markup);
    doc.select(&BODY)
        .next()
        .map(|body| body.inner_html())
        .unwrap_or_else(|| markup.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn xhtml(body: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE html>\n\
             <html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>Ignored Head</title>\
             <style>p {{ color: red; }}</style></head><body>{body}</body></html>"
        )
    }

    fn render(body: &str) -> RenderedDocument {
        render_document(&xhtml(body), &HtmdRenderer::new(), &ExtractOptions::default()).unwrap()
    }

    /// Renderer that returns canned Markdown, for exercising the cleanup path alone.
    struct Canned(&'static str);

    impl MarkdownRenderer for Canned {
        fn render(&self, _html: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    impl MarkdownRenderer for Failing {
        fn render(&self, _html: &str) -> Result<String> {
            Err(FolioError::Conversion("boom".into()))
        }
    }

    #[test]
    fn renders_body_only() {
        let doc = render("<h1>Loomings</h1><p>Call me Ishmael.</p>");
        assert!(doc.markdown.contains("# Loomings"));
        assert!(doc.markdown.contains("Call me Ishmael."));
        assert!(!doc.markdown.contains("Ignored Head"));
        assert!(!doc.markdown.contains("color: red"));
        assert!(!doc.had_images);
    }

    #[test]
    fn image_only_document_is_empty_but_flagged() {
        let doc = render(r#"<div><img src="../images/page1.jpg" alt=""/></div>"#);
        assert!(doc.is_empty(), "markdown was {:?}", doc.markdown);
        assert!(doc.had_images);
    }

    #[test]
    fn images_survive_when_not_stripped() {
        let options = ExtractOptions {
            strip_images: false,
            ..ExtractOptions::default()
        };
        let doc = render_document(
            &xhtml(r#"<p>Figure:</p><img src="fig.png" alt="A figure"/>"#),
            &HtmdRenderer::new(),
            &options,
        )
        .unwrap();
        assert!(doc.markdown.contains("fig.png"));
    }

    #[test]
    fn internal_links_become_text() {
        let doc = render(
            r##"<p>See <a href="ch2.xhtml#s1">the next chapter</a> or <a href="https://example.com/x">the site</a>.</p>"##,
        );
        assert!(doc.markdown.contains("See the next chapter or [the site](https://example.com/x)."));
    }

    #[test]
    fn tables_become_pipe_tables() {
        let doc = render(
            "<table><tr><th>Name</th><th>Value</th></tr><tr><td>foo</td><td>bar</td></tr></table>",
        );
        assert!(doc.markdown.contains("| Name | Value |"));
        assert!(doc.markdown.contains("| foo | bar |"));
    }

    #[test]
    fn cleanup_runs_on_renderer_output() {
        let doc = render_document(
            &xhtml("<p>ignored</p>"),
            &Canned("<?xml version=\"1.0\"?>\n# Title\n\n\n\n\nBody \\[1\\]"),
            &ExtractOptions::default(),
        )
        .unwrap();
        assert_eq!(doc.markdown, "# Title\n\nBody [1]\n");
    }

    #[test]
    fn renderer_errors_propagate() {
        let err = render_document(&xhtml("<p>x</p>"), &Failing, &ExtractOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn first_heading_is_top_level_only() {
        assert_eq!(
            extract_title_from_markdown("## Sub\n\n# Real Title ##\n\ntext"),
            Some("Real Title".to_string())
        );
        assert_eq!(extract_title_from_markdown("## Only Sub"), None);
    }

    #[test]
    fn detects_image_tags() {
        assert!(contains_images(r#"<IMG SRC="a.png">"#));
        assert!(contains_images(r#"<svg><image xlink:href="p.jpg"/></svg>"#));
        assert!(!contains_images("<p>imagery</p>"));
    }
}

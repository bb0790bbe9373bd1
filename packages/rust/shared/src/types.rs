//! Core domain types for extracted books.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum length of a chapter slug.
const MAX_SLUG_LEN: usize = 60;

// ---------------------------------------------------------------------------
// BookMetadata
// ---------------------------------------------------------------------------

/// Bibliographic metadata read from the package manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    /// Book title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Authors in source order.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Primary language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Publisher name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Subject tags in source order.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Unique identifier (ISBN, UUID, URI).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Publisher-supplied description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// ManifestItem
// ---------------------------------------------------------------------------

/// One `<item>` of the package manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    /// Manifest id, unique within the package.
    pub id: String,
    /// Path relative to the package document.
    pub href: String,
    /// Declared media type.
    pub media_type: String,
    /// Whether the item declares the `nav` property.
    pub is_navigation_document: bool,
}

impl ManifestItem {
    /// Whether the item is an (X)HTML content document.
    pub fn is_markup(&self) -> bool {
        matches!(
            self.media_type.as_str(),
            "application/xhtml+xml" | "text/html" | "application/html+xml"
        )
    }
}

// ---------------------------------------------------------------------------
// TocEntry
// ---------------------------------------------------------------------------

/// A (target, label) pair from a navigation source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Target href relative to the package document, fragment included.
    pub target_href: String,
    /// Display label.
    pub label: String,
}

// ---------------------------------------------------------------------------
// Chapter
// ---------------------------------------------------------------------------

/// A cleaned, titled chapter ready for output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// 1-based position, contiguous across the output.
    pub index: usize,
    /// Display title (never empty).
    pub title: String,
    /// ASCII file-name-safe form of the title.
    pub slug: String,
    /// Archive path of the source document, plus `#part-N` for split fragments.
    pub source_file: String,
    /// Cleaned Markdown body.
    pub markdown: String,
    /// Words in `markdown`, leading frontmatter excluded.
    pub word_count: usize,
}

impl Chapter {
    /// Build a chapter, deriving `slug` and `word_count`.
    pub fn new(
        index: usize,
        title: impl Into<String>,
        source_file: impl Into<String>,
        markdown: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let markdown = markdown.into();
        Self {
            index,
            slug: slugify(&title),
            word_count: count_words(&markdown),
            title,
            source_file: source_file.into(),
            markdown,
        }
    }

    /// Same chapter at a new position.
    pub fn with_index(self, index: usize) -> Self {
        Self { index, ..self }
    }
}

// ---------------------------------------------------------------------------
// ExtractedBook
// ---------------------------------------------------------------------------

/// The result handed to the output writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedBook {
    /// Bibliographic metadata.
    pub metadata: BookMetadata,
    /// Chapters in reading order.
    pub chapters: Vec<Chapter>,
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Turn a title into a lowercase, hyphenated ASCII slug of at most 60 characters.
///
/// Never returns an empty string; titles with no ASCII alphanumerics become `chapter`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    if slug.is_empty() {
        "chapter".to_string()
    } else {
        slug
    }
}

/// Count words in a Markdown body, skipping a leading `---` frontmatter block
/// and bare heading markers.
pub fn count_words(md: &str) -> usize {
    static FRONTMATTER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)\A---\r?\n.*?\r?\n---[ \t]*(?:\r?\n|\z)").expect("valid regex"));

    let body = match FRONTMATTER_RE.find(md) {
        Some(m) => &md[m.end()..],
        None => md,
    };

    body.split_whitespace()
        .filter(|w| !w.chars().all(|c| c == '#'))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_strips_punctuation() {
        assert_eq!(slugify(" Chapter: One! "), "chapter-one");
        assert_eq!(slugify("The Cat's Pajamas"), "the-cat-s-pajamas");
    }

    #[test]
    fn slugify_is_idempotent() {
        let once = slugify(" Chapter: One! ");
        assert_eq!(slugify(&once), once);
    }

    #[test]
    fn slugify_never_empty() {
        assert_eq!(slugify(""), "chapter");
        assert_eq!(slugify("—  …"), "chapter");
        assert_eq!(slugify("Ἰλιάς"), "chapter");
    }

    #[test]
    fn slugify_caps_length_without_trailing_dash() {
        let title = "word ".repeat(30);
        let slug = slugify(&title);
        assert!(slug.len() <= 60);
        assert!(!slug.ends_with('-'));
        assert!(slug.starts_with("word-word"));
    }

    #[test]
    fn count_words_skips_frontmatter_and_markers() {
        let md = "---\ntitle: \"Some Title Here\"\n---\n# Heading Words\n\nOne two three.";
        assert_eq!(count_words(md), 5);
        assert_eq!(count_words("## A\n\nb c"), 3);
        assert_eq!(count_words(""), 0);
    }

    #[test]
    fn count_words_keeps_body_rule_lines() {
        // A horizontal rule that is not a leading block is not frontmatter.
        let md = "Alpha beta\n\n---\n\ngamma";
        assert_eq!(count_words(md), 4);
    }

    #[test]
    fn chapter_derives_fields() {
        let chapter = Chapter::new(3, "Chapter 1: Loomings", "OEBPS/ch1.xhtml", "Call me Ishmael.");
        assert_eq!(chapter.slug, "chapter-1-loomings");
        assert_eq!(chapter.word_count, 3);

        let moved = chapter.with_index(1);
        assert_eq!(moved.index, 1);
        assert_eq!(moved.word_count, 3);
    }

    #[test]
    fn extracted_book_serialization() {
        let book = ExtractedBook {
            metadata: BookMetadata {
                title: Some("Moby-Dick".into()),
                authors: vec!["Herman Melville".into()],
                ..BookMetadata::default()
            },
            chapters: vec![Chapter::new(1, "Loomings", "ch1.xhtml", "Call me Ishmael.")],
        };

        let json = serde_json::to_string(&book).expect("serialize");
        assert!(json.contains("\"word_count\":3"));
        let parsed: ExtractedBook = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, book);
    }
}

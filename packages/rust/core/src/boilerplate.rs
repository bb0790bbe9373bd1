//! Boilerplate classification.
//!
//! Front/back matter, licenses, and note sections are described as a table
//! of declarative [`BoilerplateRule`]s and evaluated by one generic
//! evaluator, [`classify_with`].

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use folio_shared::Chapter;

/// Characters of markdown sampled by content rules.
const CONTENT_SAMPLE_CHARS: usize = 2500;

/// How a matching rule affects the chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Keep the chapter regardless of every other rule.
    Keep,
    /// Exclude unconditionally.
    Hard,
    /// Exclude only when the chapter is at or below the rule's word ceiling.
    Soft,
}

/// One classification rule. Every predicate that is present must match.
#[derive(Debug, Clone, Copy)]
pub struct BoilerplateRule {
    pub id: &'static str,
    pub severity: Severity,
    /// Predicate over the normalized (lowercased, whitespace-collapsed) title.
    pub title_match: Option<fn(&str) -> bool>,
    /// Predicate over the lowercased title plus the start of the markdown.
    pub content_match: Option<fn(&str) -> bool>,
    /// Predicate over the whole chapter.
    pub structural: Option<fn(&Chapter) -> bool>,
    pub word_ceiling: Option<usize>,
}

impl BoilerplateRule {
    fn matches(&self, title: &str, sample: &str, chapter: &Chapter) -> bool {
        let any = self.title_match.is_some()
            || self.content_match.is_some()
            || self.structural.is_some();

        any && self.title_match.is_none_or(|f| f(title))
            && self.content_match.is_none_or(|f| f(sample))
            && self.structural.is_none_or(|f| f(chapter))
    }
}

/// Outcome of classifying one chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    /// Excluded by the rule with this id.
    Exclude(&'static str),
}

/// The built-in rule table.
pub const RULES: &[BoilerplateRule] = &[
    BoilerplateRule {
        id: "reference-section",
        severity: Severity::Keep,
        title_match: Some(is_reference_title),
        content_match: None,
        structural: None,
        word_ceiling: None,
    },
    BoilerplateRule {
        id: "matter-title",
        severity: Severity::Hard,
        title_match: Some(is_matter_title),
        content_match: None,
        structural: None,
        word_ceiling: None,
    },
    BoilerplateRule {
        id: "legal-notice",
        severity: Severity::Soft,
        title_match: None,
        content_match: Some(has_legal_vocabulary),
        structural: None,
        word_ceiling: Some(4000),
    },
    BoilerplateRule {
        id: "note-dense",
        severity: Severity::Hard,
        title_match: None,
        content_match: None,
        structural: Some(is_note_dense),
        word_ceiling: None,
    },
];

/// Classify a chapter against [`RULES`].
pub fn classify(chapter: &Chapter) -> Verdict {
    classify_with(RULES, chapter)
}

/// Classify a chapter against an explicit rule table.
///
/// Any matching `Keep` rule wins. Otherwise the first matching `Hard` rule,
/// or `Soft` rule within its word ceiling, excludes the chapter.
pub fn classify_with(rules: &[BoilerplateRule], chapter: &Chapter) -> Verdict {
    let title = normalize(&chapter.title);
    let sample = content_sample(&title, &chapter.markdown);

    let (keep, exclude): (Vec<&BoilerplateRule>, Vec<&BoilerplateRule>) = rules
        .iter()
        .partition(|rule| rule.severity == Severity::Keep);

    if keep.iter().any(|rule| rule.matches(&title, &sample, chapter)) {
        return Verdict::Keep;
    }

    exclude
        .into_iter()
        .filter(|rule| match rule.severity {
            Severity::Soft => rule
                .word_ceiling
                .is_none_or(|ceiling| chapter.word_count <= ceiling),
            _ => true,
        })
        .find(|rule| rule.matches(&title, &sample, chapter))
        .map_or(Verdict::Keep, |rule| Verdict::Exclude(rule.id))
}

/// Drop boilerplate chapters, logging each exclusion.
pub fn filter_chapters(chapters: Vec<Chapter>, pass: &str) -> Vec<Chapter> {
    chapters
        .into_iter()
        .filter(|chapter| match classify(chapter) {
            Verdict::Keep => true,
            Verdict::Exclude(rule) => {
                debug!(pass, rule, title = %chapter.title, source = %chapter.source_file, "excluded boilerplate");
                false
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

fn normalize(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn content_sample(title: &str, markdown: &str) -> String {
    let head: String = markdown.chars().take(CONTENT_SAMPLE_CHARS).collect();
    format!("{title}\n{head}").to_lowercase()
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

fn is_reference_title(title: &str) -> bool {
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b(?:index|glossary)\b").expect("valid regex"));
    RE.is_match(title)
}

fn is_matter_title(title: &str) -> bool {
    const TITLES: &[&str] = &[
        "cover",
        "title page",
        "contents",
        "table of contents",
        "about the author",
        "by the same author",
        "copyright page",
        "notes",
        "endnotes",
        "index",
        "bibliography",
        "references",
    ];
    TITLES.contains(&title)
}

fn has_legal_vocabulary(sample: &str) -> bool {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?x)
            project\s+gutenberg
            | all\s+rights\s+reserved
            | terms\s+of\s+(?:use|service)
            | licen[cs]e\s+(?:agreement|terms)
            | under\s+(?:the|a|this)\s+(?:[\w.-]+\s+){0,3}licen[cs]e\b
            | (?:may|must|shall)\s+not\s+be\s+(?:reproduced|copied|redistributed)
            | reproduced\s+(?:or\s+transmitted\s+)?in\s+any\s+form
            | without\s+(?:the\s+)?(?:prior\s+)?(?:express\s+)?written\s+permission
            | copyright\s+(?:©|\(c\)|notice|\d{4})
            | ©\s*\d{4}
            ",
        )
        .expect("valid regex")
    });
    RE.is_match(sample)
}

/// Inline citation-marker-like tokens: `[12]`, or list markers such as
/// `3.` / `iv)` that introduce text. Markers may carry a renderer escape (`3\.`).
static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)\[\d{1,4}\]|^[ \t]*(?:\d{1,3}|[ivxlc]{1,7})\\?[.)][ \t]+\p{L}")
        .expect("valid regex")
});

/// Line starting with a citation marker or a short number followed by a letter.
static NOTE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:\[\d{1,4}\]|(?:\d{1,3}|[ivxlc]{1,7})\\?[.)]|\d{1,3})\s*\p{L}")
        .expect("valid regex")
});

fn is_note_dense(chapter: &Chapter) -> bool {
    const MIN_CITATIONS: usize = 30;
    const MAX_CITATION_WORDS: usize = 15_000;
    const SCAN_LINES: usize = 350;
    const MIN_LINES: usize = 40;

    if chapter.word_count <= MAX_CITATION_WORDS
        && CITATION_RE.find_iter(&chapter.markdown).count() >= MIN_CITATIONS
    {
        return true;
    }

    let lines: Vec<&str> = chapter
        .markdown
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SCAN_LINES)
        .collect();
    if lines.len() < MIN_LINES {
        return false;
    }

    let noted = lines.iter().filter(|line| NOTE_LINE_RE.is_match(line)).count();
    noted * 3 >= lines.len()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

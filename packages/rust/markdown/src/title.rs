//! Chapter title cleanup and acceptance rules.
//!
//! [`clean_title`] strips Markdown decoration from a candidate; [`normalize_title`]
//! additionally canonicalizes chapter numbering and rejects candidates that
//! look like body prose rather than headings.

use std::sync::LazyLock;

use regex::Regex;

/// Longest accepted title, in characters.
const MAX_TITLE_CHARS: usize = 95;
/// Longest accepted title, in words.
const MAX_TITLE_WORDS: usize = 15;

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[((?:\\.|[^\]\\])*)\]\([^)]*\)").expect("valid regex"));
static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[(?:\\.|[^\]\\])*\]\([^)]*\)").expect("valid regex"));
static ESCAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\([\\`*_{}\[\]()#+\-.!])").expect("valid regex"));
static LEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\s*(?:\.{2,}|…|[·•]))+\s*\d{1,4}\s*$|\s*(?:\.{4,}|…{2,}|[·•](?:\s*[·•])+)\s*$")
        .expect("valid regex")
});
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\s*\[(?:\d{1,4}|[a-z*†‡]{1,2})\])+\s*$").expect("valid regex")
});
static CHAPTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^chapter\s+(\d+)\b\s*(.*)$").expect("valid regex"));
static SENTENCE_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.?!]\s+[A-Z]").expect("valid regex"));

/// Strip Markdown decoration from a title candidate.
///
/// Links collapse to their label, images and emphasis/code markers are
/// removed, trailing leader dots with page numbers and bracketed footnote
/// markers are dropped, and whitespace is collapsed.
pub fn clean_title(raw: &str) -> String {
    let text = IMAGE_RE.replace_all(raw, "");
    let text = LINK_RE.replace_all(&text, "$1");
    let text = ESCAPE_RE.replace_all(&text, "$1");
    let text = strip_trailing_decoration(&text);

    let text: String = text.chars().filter(|c| !matches!(c, '*' | '`')).collect();
    let text = text
        .split_whitespace()
        .map(|word| word.trim_matches('_'))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    // emphasis may have hidden a trailing marker: `**Title [1]**`
    strip_trailing_decoration(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_trailing_decoration(text: &str) -> String {
    let text = MARKER_RE.replace(text, "");
    let text = LEADER_RE.replace(&text, "");
    MARKER_RE.replace(&text, "").into_owned()
}

/// Clean and validate a title candidate.
///
/// Returns `None` when the candidate is empty or looks like prose that was
/// mistaken for a heading, so the caller can fall through to its next source.
pub fn normalize_title(raw: &str) -> Option<String> {
    let title = clean_title(raw);
    if title.is_empty() {
        return None;
    }

    if title.chars().all(|c| c.is_ascii_digit()) {
        return Some(format!("Chapter {}", trim_number(&title)));
    }

    if let Some(caps) = CHAPTER_RE.captures(&title) {
        let number = trim_number(&caps[1]);
        let suffix = caps[2].trim_start_matches(|c: char| {
            c.is_whitespace() || matches!(c, ':' | '.' | '-' | '–' | '—')
        });
        let suffix = suffix.trim();
        return Some(if suffix.is_empty() {
            format!("Chapter {number}")
        } else {
            format!("Chapter {number}: {suffix}")
        });
    }

    if looks_like_prose(&title) {
        return None;
    }

    Some(title)
}

/// Heuristics for body text that was rendered as a heading.
fn looks_like_prose(title: &str) -> bool {
    let words = title.split_whitespace().count();
    let clause_marks = title.chars().filter(|c| matches!(c, ',' | ';' | ':')).count();

    title.chars().count() > MAX_TITLE_CHARS
        || words > MAX_TITLE_WORDS
        || (words > 8 && SENTENCE_BREAK_RE.is_match(title))
        || (words > 12 && clause_marks >= 2)
}

/// `"007"` → `"7"`, keeping a lone `"0"`.
fn trim_number(digits: &str) -> &str {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() { "0" } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_title_strips_markup() {
        assert_eq!(clean_title("**The _Whale_**"), "The Whale");
        assert_eq!(clean_title("[Loomings](ch1.xhtml#top)"), "Loomings");
        assert_eq!(clean_title("![](orn.png) `Code` Title"), "Code Title");
        assert_eq!(clean_title("Part \\[One\\]"), "Part [One]");
    }

    #[test]
    fn clean_title_strips_trailing_decoration() {
        assert_eq!(clean_title("Nav Title [456]"), "Nav Title");
        assert_eq!(clean_title("Introduction ........ 12"), "Introduction");
        assert_eq!(clean_title("Prologue · 3"), "Prologue");
        assert_eq!(clean_title("Contents ........"), "Contents");
        assert_eq!(clean_title("Wait..."), "Wait...");
        assert_eq!(clean_title("To Be Continued…"), "To Be Continued…");
        assert_eq!(clean_title("Epilogue [a][*]"), "Epilogue");
        assert_eq!(clean_title("**Preface [1]**"), "Preface");
        assert_eq!(clean_title("  Many   spaces\there "), "Many spaces here");
    }

    #[test]
    fn numeric_titles_become_chapters() {
        assert_eq!(normalize_title("12").as_deref(), Some("Chapter 12"));
        assert_eq!(normalize_title("**03**").as_deref(), Some("Chapter 3"));
    }

    #[test]
    fn chapter_prefix_is_canonicalized() {
        assert_eq!(normalize_title("CHAPTER 4").as_deref(), Some("Chapter 4"));
        assert_eq!(
            normalize_title("chapter 7. The Storm").as_deref(),
            Some("Chapter 7: The Storm")
        );
        assert_eq!(
            normalize_title("Chapter 2 — Homecoming").as_deref(),
            Some("Chapter 2: Homecoming")
        );
        assert_eq!(normalize_title("Chapterhouse").as_deref(), Some("Chapterhouse"));
    }

    #[test]
    fn prose_candidates_are_rejected() {
        let long = "a".repeat(96);
        assert_eq!(normalize_title(&long), None);
        assert_eq!(
            normalize_title("one two three four five six seven eight nine ten eleven twelve thirteen fourteen fifteen sixteen"),
            None
        );
        assert_eq!(
            normalize_title("He walked in slowly today. Then everyone else left"),
            None
        );
        assert_eq!(
            normalize_title("It was cold, dark and wet; the men waited by the door for the ship"),
            None
        );
    }

    #[test]
    fn short_punctuated_titles_are_kept() {
        assert_eq!(normalize_title("Dr. Jekyll").as_deref(), Some("Dr. Jekyll"));
        assert_eq!(
            normalize_title("War, Peace, and Other Matters").as_deref(),
            Some("War, Peace, and Other Matters")
        );
    }

    #[test]
    fn empty_candidates_are_rejected() {
        assert_eq!(normalize_title(""), None);
        assert_eq!(normalize_title("  ** ** "), None);
        assert_eq!(normalize_title("[12]"), None);
    }
}

//! Splitting of oversized chapters.
//!
//! Prefers heading boundaries (`#`, then `##`), merges undersized segments
//! into their neighbours, and falls back to paragraph-aware word chunks when
//! the chapter has no usable heading structure.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use folio_markdown::normalize_title;
use folio_shared::{Chapter, ExtractOptions, count_words};

/// A slice of a chapter's markdown, optionally introduced by a heading.
#[derive(Debug, Clone)]
struct Segment {
    heading: Option<String>,
    markdown: String,
    words: usize,
}

impl Segment {
    fn new(heading: Option<String>, markdown: String) -> Self {
        let words = count_words(&markdown);
        Self {
            heading,
            markdown,
            words,
        }
    }

    /// Append `next` after a blank line.
    fn absorb(&mut self, next: Segment) {
        *self = Segment::new(
            self.heading.take().or(next.heading),
            format!("{}\n\n{}", self.markdown.trim_end(), next.markdown.trim_start()),
        );
    }
}

/// Split a chapter that exceeds `max_chapter_words`.
///
/// Chapters within budget, and chapters that yield fewer than two pieces,
/// come back unchanged as a single-element vector. Pieces keep the parent's
/// index; callers reindex afterwards.
pub fn split_chapter(chapter: Chapter, options: &ExtractOptions) -> Vec<Chapter> {
    let max = options.max_chapter_words;
    if chapter.word_count <= max {
        return vec![chapter];
    }

    let mut segments = split_at_headings(&chapter.markdown, 1);
    if segments.len() < 2 {
        segments = split_at_headings(&chapter.markdown, 2);
    }
    let segments = merge_undersized(segments, options);

    let segments = if segments.len() >= 2 {
        debug!(title = %chapter.title, parts = segments.len(), "split at headings");
        segments
    } else {
        let chunks = chunk_paragraphs(&chapter.markdown, max);
        debug!(title = %chapter.title, parts = chunks.len(), "split into word chunks");
        chunks
            .into_iter()
            .map(|md| Segment::new(None, md))
            .collect()
    };

    if segments.len() < 2 {
        debug!(title = %chapter.title, words = chapter.word_count, "no usable split, keeping oversized chapter");
        return vec![chapter];
    }

    segments
        .into_iter()
        .enumerate()
        .map(|(i, segment)| {
            let part = i + 1;
            let title = segment
                .heading
                .as_deref()
                .and_then(normalize_title)
                .unwrap_or_else(|| format!("{} Part {part}", chapter.title));
            Chapter::new(
                chapter.index,
                title,
                format!("{}#part-{part}", chapter.source_file),
                segment.markdown,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Heading segmentation
// ---------------------------------------------------------------------------

static ATX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})[ \t]+(.+?)[ \t#]*$").expect("valid regex"));

/// Cut `md` at every heading of exactly `level`, outside code fences.
///
/// Returns no segments unless there are at least two such headings. Text
/// before the first heading becomes its own segment.
fn split_at_headings(md: &str, level: usize) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut heading: Option<String> = None;
    let mut current: Vec<&str> = Vec::new();
    let mut headings = 0;
    let mut in_code_block = false;

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
        }

        let found = (!in_code_block)
            .then(|| ATX_RE.captures(line))
            .flatten()
            .filter(|caps| caps[1].len() == level)
            .map(|caps| caps[2].trim().to_string());

        if let Some(text) = found {
            push_segment(&mut segments, heading.take(), &current);
            current.clear();
            heading = Some(text);
            headings += 1;
        }
        current.push(line);
    }
    push_segment(&mut segments, heading, &current);

    if headings < 2 { Vec::new() } else { segments }
}

fn push_segment(segments: &mut Vec<Segment>, heading: Option<String>, lines: &[&str]) {
    let markdown = lines.join("\n").trim().to_string();
    if !markdown.is_empty() {
        segments.push(Segment::new(heading, markdown));
    }
}

/// Fold segments under `min_section_words` into the preceding segment, then
/// an undersized first segment into the next, without exceeding 1.25x max.
fn merge_undersized(mut segments: Vec<Segment>, options: &ExtractOptions) -> Vec<Segment> {
    let min = options.min_section_words;
    let limit = options.max_chapter_words + options.max_chapter_words / 4;

    loop {
        let mut merged = false;
        let mut i = 1;
        while i < segments.len() {
            if segments[i].words < min && segments[i - 1].words + segments[i].words <= limit {
                let next = segments.remove(i);
                segments[i - 1].absorb(next);
                merged = true;
            } else {
                i += 1;
            }
        }
        if !merged {
            break;
        }
    }

    if segments.len() >= 2
        && segments[0].words < min
        && segments[0].words + segments[1].words <= limit
    {
        let next = segments.remove(1);
        segments[0].absorb(next);
    }

    segments
}

// ---------------------------------------------------------------------------
// Word chunking
// ---------------------------------------------------------------------------

/// Group blank-line-separated blocks into chunks of at most `max` words.
///
/// A block over 1.5x `max` is emitted on its own, cut on word boundaries.
fn chunk_paragraphs(md: &str, max: usize) -> Vec<String> {
    static BLANK_LINE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("valid regex"));

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_words = 0;

    for block in BLANK_LINE_RE.split(md).map(str::trim).filter(|b| !b.is_empty()) {
        let words = count_words(block);

        if words * 2 > max * 3 {
            flush(&mut chunks, &mut current, &mut current_words);
            chunks.extend(hard_split(block, max));
            continue;
        }

        if !current.is_empty() && current_words + words > max {
            flush(&mut chunks, &mut current, &mut current_words);
        }
        current.push(block);
        current_words += words;
    }
    flush(&mut chunks, &mut current, &mut current_words);

    chunks
}

fn flush(chunks: &mut Vec<String>, current: &mut Vec<&str>, current_words: &mut usize) {
    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
        current.clear();
        *current_words = 0;
    }
}

fn hard_split(block: &str, max: usize) -> Vec<String> {
    block
        .split_whitespace()
        .collect::<Vec<_>>()
        .chunks(max.max(1))
        .map(|words| words.join(" "))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn options(max: usize, min: usize) -> ExtractOptions {
        ExtractOptions {
            max_chapter_words: max,
            min_section_words: min,
            ..ExtractOptions::default()
        }
    }

    fn paragraphs(word: &str, count: usize, words_each: usize) -> String {
        (0..count)
            .map(|_| vec![word; words_each].join(" "))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn chapter(markdown: &str) -> Chapter {
        Chapter::new(4, "Original", "OEBPS/ch.xhtml", markdown)
    }

    fn titles(chapters: &[Chapter]) -> Vec<&str> {
        chapters.iter().map(|c| c.title.as_str()).collect()
    }

    #[test]
    fn within_budget_passes_through() {
        let ch = chapter("# One\n\nshort\n\n# Two\n\nshort");
        let out = split_chapter(ch.clone(), &options(100, 10));
        assert_eq!(out, vec![ch]);
    }

    #[test]
    fn splits_at_top_level_headings() {
        let md = format!(
            "# Part A\n\n{}\n\n# Part B\n\n{}",
            paragraphs("alpha", 60, 1),
            paragraphs("beta", 60, 1)
        );
        let out = split_chapter(chapter(&md), &options(40, 10));
        assert_eq!(titles(&out), ["Part A", "Part B"]);
        assert!(out[0].markdown.starts_with("# Part A"));
        assert!(!out[0].markdown.contains("beta"));
        assert_eq!(out[1].source_file, "OEBPS/ch.xhtml#part-2");
        assert!(out.iter().all(|c| c.index == 4));
    }

    #[test]
    fn falls_back_to_second_level_headings() {
        let md = format!(
            "# Only Title\n\n## First\n\n{}\n\n## Second\n\n{}",
            paragraphs("alpha", 30, 1),
            paragraphs("beta", 30, 1)
        );
        let out = split_chapter(chapter(&md), &options(40, 10));
        // the lone top-level heading is an undersized preamble, folded forward
        assert_eq!(titles(&out), ["First", "Second"]);
        assert!(out[0].markdown.starts_with("# Only Title\n\n## First"));
    }

    #[test]
    fn undersized_segments_merge_backward() {
        let md = format!(
            "# One\n\n{}\n\n# Tiny\n\nfew words\n\n# Three\n\n{}",
            paragraphs("alpha", 30, 1),
            paragraphs("gamma", 30, 1)
        );
        let out = split_chapter(chapter(&md), &options(40, 10));
        assert_eq!(titles(&out), ["One", "Three"]);
        assert!(out[0].markdown.contains("# Tiny\n\nfew words"));
    }

    #[test]
    fn undersized_preamble_merges_forward() {
        let md = format!(
            "Opening line.\n\n# One\n\n{}\n\n# Two\n\n{}",
            paragraphs("alpha", 30, 1),
            paragraphs("beta", 30, 1)
        );
        let out = split_chapter(chapter(&md), &options(40, 10));
        assert_eq!(titles(&out), ["One", "Two"]);
        assert!(out[0].markdown.starts_with("Opening line.\n\n# One"));
    }

    #[test]
    fn headingless_chapter_chunks_paragraphs() {
        let md = paragraphs("word", 3, 45);
        let out = split_chapter(chapter(&md), &options(40, 10));
        assert!(out.len() >= 2);
        assert_eq!(out[0].title, "Original Part 1");
        assert_eq!(out[0].source_file, "OEBPS/ch.xhtml#part-1");
        assert!(out.iter().all(|c| c.word_count == 45));
    }

    #[test]
    fn huge_paragraph_is_hard_split() {
        let md = format!("intro words here\n\n{}", vec!["w"; 100].join(" "));
        let chunks = chunk_paragraphs(&md, 40);
        let sizes: Vec<usize> = chunks.iter().map(|c| count_words(c)).collect();
        assert_eq!(sizes, [3, 40, 40, 20]);
    }

    #[test]
    fn noisy_heading_falls_back_to_part_title() {
        let noisy = "It was the best of times, it was the worst of times, it was the age of wisdom, it was the age of foolishness";
        let md = format!(
            "# {noisy}\n\n{}\n\n# Clean Heading\n\n{}",
            paragraphs("alpha", 30, 1),
            paragraphs("beta", 30, 1)
        );
        let out = split_chapter(chapter(&md), &options(40, 10));
        assert_eq!(titles(&out), ["Original Part 1", "Clean Heading"]);
    }

    #[test]
    fn headings_inside_code_fences_are_ignored() {
        let md = format!(
            "```\n# not a heading\n```\n\n{}\n\n```\n# nor this\n```",
            paragraphs("word", 1, 50)
        );
        assert!(split_at_headings(&md, 1).is_empty());
    }

    #[test]
    fn unsplittable_chapter_is_kept() {
        let ch = chapter(&vec!["word"; 50].join(" "));
        let out = split_chapter(ch.clone(), &options(40, 10));
        assert_eq!(out, vec![ch]);
    }
}

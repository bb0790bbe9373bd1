//! Post-render cleanup pipeline for chapter Markdown.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! Image and internal-link passes are gated by [`ExtractOptions`].

use std::sync::LazyLock;

use regex::{Captures, Regex};

use folio_shared::ExtractOptions;

/// Inline link: `[label](target "optional title")`. Labels may contain
/// backslash escapes and one level of nested brackets.
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\[((?:\\.|\[(?:\\.|[^\]\\])*\]|[^\[\]\\])*)\]\(\s*([^)\s]*)(?:\s+"[^"]*")?\s*\)"#,
    )
    .expect("valid regex")
});

/// Run the full cleanup pipeline on raw rendered Markdown.
pub(crate) fn run_pipeline(md: &str, options: &ExtractOptions) -> String {
    let mut result = strip_declarations(md);

    result = strip_leftover_html(&result);
    if options.strip_images {
        result = strip_images(&result);
        result = strip_orphan_references(&result);
    }
    result = strip_fragment_links(&result);
    if options.strip_internal_links {
        result = strip_internal_links(&result);
    }
    result = collapse_blank_lines(&result);
    result = unescape_punctuation(&result);

    finish(&result)
}

// ---------------------------------------------------------------------------
// Pass 1: Processing instructions and doctype lines
// ---------------------------------------------------------------------------

/// Remove lines consisting only of `<?...?>` or `<!DOCTYPE ...>`.
fn strip_declarations(md: &str) -> String {
    static DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)^\s*(?:<\?.*\?>|<!doctype\b[^>]*>)\s*$").expect("valid regex")
    });

    md.lines()
        .filter(|line| !DECL_RE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Strip leftover layout tags
// ---------------------------------------------------------------------------

/// Remove stray layout tags that survived rendering, keeping their content.
///
/// Fenced code blocks are left untouched.
fn strip_leftover_html(md: &str) -> String {
    static LAYOUT_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)</?(?:div|span|section|article|aside|header|footer|figure|figcaption|details|summary|body|html|center|font)(?:\s[^>]*)?/?>",
        )
        .expect("valid regex")
    });

    let mut lines = Vec::new();
    let mut in_code_block = false;

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            lines.push(line.to_string());
            continue;
        }

        if in_code_block {
            lines.push(line.to_string());
        } else {
            lines.push(LAYOUT_TAG_RE.replace_all(line, "").into_owned());
        }
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 3: Images and orphaned reference definitions
// ---------------------------------------------------------------------------

/// Remove Markdown image syntax and raw image/SVG markup.
fn strip_images(md: &str) -> String {
    static MD_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"!\[(?:\\.|\[[^\]]*\]|[^\[\]\\])*\](?:\([^)]*\)|\[[^\]]*\])")
            .expect("valid regex")
    });
    static SVG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<svg\b.*?</svg>").expect("valid regex"));
    static HTML_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)<img\b[^>]*>|</?(?:svg:)?image\b[^>]*>").expect("valid regex")
    });

    let result = SVG_RE.replace_all(md, "");
    let result = HTML_IMAGE_RE.replace_all(&result, "");
    MD_IMAGE_RE.replace_all(&result, "").into_owned()
}

/// Drop `[label]: target` definitions nothing refers to anymore.
fn strip_orphan_references(md: &str) -> String {
    static DEF_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[ \t]{0,3}\[([^\]]+)\]:[ \t]*\S").expect("valid regex"));

    let body = md
        .lines()
        .filter(|line| !DEF_RE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();

    md.lines()
        .filter(|line| match DEF_RE.captures(line) {
            Some(caps) => body.contains(&format!("[{}]", caps[1].to_lowercase())),
            None => true,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4: Fragment-only and empty links
// ---------------------------------------------------------------------------

/// Replace `[label](#anchor)` with its label and drop `[](...)` residue.
fn strip_fragment_links(md: &str) -> String {
    rewrite_links(md, |label, target| {
        if label.trim().is_empty() {
            Some(String::new())
        } else if target.starts_with('#') {
            Some(link_text(label))
        } else {
            None
        }
    })
}

// ---------------------------------------------------------------------------
// Pass 5: Internal links
// ---------------------------------------------------------------------------

/// Replace every non-http(s) link with its label text.
fn strip_internal_links(md: &str) -> String {
    rewrite_links(md, |label, target| {
        let lower = target.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            None
        } else {
            Some(link_text(label))
        }
    })
}

/// Apply `rewrite` to every inline link that is not an image.
///
/// `rewrite` returns the replacement text, or `None` to keep the link.
fn rewrite_links(md: &str, rewrite: impl Fn(&str, &str) -> Option<String>) -> String {
    LINK_RE
        .replace_all(md, |caps: &Captures| {
            let whole = &caps[0];
            let start = caps.get(0).map_or(0, |m| m.start());

            // `![alt](src)` is an image, leave as-is
            if start > 0 && md.as_bytes()[start - 1] == b'!' {
                return whole.to_string();
            }

            rewrite(&caps[1], &caps[2]).unwrap_or_else(|| whole.to_string())
        })
        .into_owned()
}

/// Bare label text; double-bracketed footnote markers keep their brackets.
fn link_text(label: &str) -> String {
    let plain = unescape_punctuation(label);
    let plain = plain.trim();
    if plain.len() > 2 && plain.starts_with('[') && plain.ends_with(']') {
        format!("[{}]", label.trim())
    } else {
        label.to_string()
    }
}

// ---------------------------------------------------------------------------
// Pass 6: Blank lines
// ---------------------------------------------------------------------------

/// Blank out whitespace-only lines and collapse 3+ newlines to one blank line.
fn collapse_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let normalized = md
        .lines()
        .map(|line| if line.trim().is_empty() { "" } else { line })
        .collect::<Vec<_>>()
        .join("\n");

    MULTI_BLANK_RE.replace_all(&normalized, "\n\n").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 7: Unescape punctuation
// ---------------------------------------------------------------------------

/// Undo renderer escapes of `[`, `]`, `(`, `)` and `!`, and of the `.`/`)`
/// after a line-leading number (`12\.` back to `12.`).
fn unescape_punctuation(md: &str) -> String {
    static ESCAPE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\\([\[\]()!])").expect("valid regex"));
    static LIST_MARKER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^([ \t]*\d{1,9})\\([.)])").expect("valid regex"));

    let md = ESCAPE_RE.replace_all(md, "$1");
    LIST_MARKER_RE.replace_all(&md, "$1$2").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 8: Trailing whitespace and final newline
// ---------------------------------------------------------------------------

/// Trim each line's trailing whitespace and end with exactly one newline.
///
/// Empty input stays empty so callers can detect it.
fn finish(md: &str) -> String {
    let trimmed = md
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let trimmed = trimmed.trim();

    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> ExtractOptions {
        ExtractOptions::default()
    }

    #[test]
    fn strip_declarations_removes_pi_and_doctype_lines() {
        let input = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!DOCTYPE html>\n# Title\nText <?inline?> stays";
        assert_eq!(strip_declarations(input), "# Title\nText <?inline?> stays");
    }

    #[test]
    fn strip_leftover_html_keeps_content_and_code() {
        let input = "<div class=\"x\">Kept</div>\n```html\n<div>Code</div>\n```";
        let result = strip_leftover_html(input);
        assert_eq!(result, "Kept\n```html\n<div>Code</div>\n```");
    }

    #[test]
    fn strip_images_removes_all_forms() {
        let input = "A ![alt](a.png) B ![ref][img] C <img src=\"b.png\"/> D <svg><image href=\"c.jpg\"/></svg> E";
        assert_eq!(strip_images(input), "A  B  C  D  E");
    }

    #[test]
    fn strip_images_handles_escaped_alt_text() {
        assert_eq!(strip_images(r"x ![Fig \[1\]](f.png) y"), "x  y");
    }

    #[test]
    fn orphan_references_are_dropped() {
        let input = "Text with [kept][k]\n\n[k]: https://example.com\n[img]: images/cover.jpg";
        assert_eq!(
            strip_orphan_references(input),
            "Text with [kept][k]\n\n[k]: https://example.com"
        );
    }

    #[test]
    fn fragment_links_become_labels() {
        let input = "See [the note](#n1) and [](chapter2.xhtml) here.";
        assert_eq!(strip_fragment_links(input), "See the note and  here.");
    }

    #[test]
    fn fragment_pass_leaves_other_links() {
        let input = "[Next](ch2.xhtml) and [Web](https://example.com)";
        assert_eq!(strip_fragment_links(input), input);
    }

    #[test]
    fn internal_links_replaced_external_kept() {
        let input = "Read [chapter two](ch2.xhtml#s1), [mail](mailto:a@b.c) or [the site](https://example.com/a \"Site\").";
        assert_eq!(
            strip_internal_links(input),
            "Read chapter two, mail or [the site](https://example.com/a \"Site\")."
        );
    }

    #[test]
    fn internal_links_keep_double_bracket_markers() {
        assert_eq!(strip_internal_links("word[[12]](notes.xhtml#n12)"), "word[[12]]");
        assert_eq!(
            strip_internal_links(r"word[\[3\]](notes.xhtml#n3)"),
            r"word[\[3\]]"
        );
    }

    #[test]
    fn internal_links_skip_images() {
        let input = "![cover](images/cover.jpg)";
        assert_eq!(strip_internal_links(input), input);
    }

    #[test]
    fn collapse_blank_lines_normalizes_runs() {
        let input = "One\n   \n\t\n\n\nTwo\n\nThree";
        assert_eq!(collapse_blank_lines(input), "One\n\nTwo\n\nThree");
    }

    #[test]
    fn unescape_punctuation_restores_brackets() {
        assert_eq!(
            unescape_punctuation(r"\[1\] Hello\! \(aside\) \*kept\*"),
            r"[1] Hello! (aside) \*kept\*"
        );
    }

    #[test]
    fn unescape_punctuation_restores_leading_list_markers() {
        assert_eq!(
            unescape_punctuation("1\\. Smith, p. 4.\n  12\\) Jones\nPage 3\\. stays"),
            "1. Smith, p. 4.\n  12) Jones\nPage 3\\. stays"
        );
    }

    #[test]
    fn finish_trims_and_terminates() {
        assert_eq!(finish("\n\nBody  \nMore\t\n\n\n"), "Body\nMore\n");
        assert_eq!(finish("  \n \n"), "");
    }

    #[test]
    fn pipeline_with_defaults() {
        let input = "<?xml version=\"1.0\"?>\n# Chapter\n\n![](cover.jpg)\n\n\n\nSee [notes](notes.xhtml) and [web](http://x.org).\n\n[\\[1\\]](#fn1)\n";
        assert_eq!(
            run_pipeline(input, &defaults()),
            "# Chapter\n\nSee notes and [web](http://x.org).\n\n[[1]]\n"
        );
    }

    #[test]
    fn pipeline_respects_disabled_options() {
        let options = ExtractOptions {
            strip_images: false,
            strip_internal_links: false,
            ..defaults()
        };
        let input = "![alt](a.png)\n\n[next](ch2.xhtml)\n\n[top](#top)";
        assert_eq!(
            run_pipeline(input, &options),
            "![alt](a.png)\n\n[next](ch2.xhtml)\n\ntop\n"
        );
    }

    #[test]
    fn pipeline_image_only_is_empty() {
        assert_eq!(run_pipeline("<?xml version=\"1.0\"?>\n![](p1.jpg)\n\n![](p2.jpg)\n", &defaults()), "");
    }
}

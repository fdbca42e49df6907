//! Sanitizer: strips non-code wrapping from model output
//!
//! Generated text routinely arrives wrapped in Markdown fences and framed by
//! prose ("Here is the implementation:" ... "This runs in linear time.").
//! Everything downstream executes the text, so the wrapping has to go.
//!
//! # Rules
//!
//! 1. If any fence line (```` ``` ```` or `~~~`) exists, keep only the body of
//!    the first fenced block (to the next fence line, or end of text).
//! 2. Drop leading and trailing lines that are blank or read as prose. The
//!    first and last surviving lines anchor the code region.
//! 3. If the region holds nothing that looks like code, return the input
//!    untouched and let the validator report the failure.
//!
//! Sanitizing is a pure function and idempotent: the output never contains
//! fence lines and always starts and ends on an anchor line, so a second
//! pass keeps every line.

use regex::Regex;
use std::sync::LazyLock;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s{0,3}(?:`{3,}|~{3,})").expect("FENCE_RE regex should compile")
});

/// Line starts that are statements in the languages we generate.
static CODE_ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:import|from|def|class|fn|pub|use|mod|impl|struct|enum|trait|let|const|static|function|async|await|export|return|if|elif|else|for|while|loop|match|try|except|finally|with|raise|assert|print|package|func|var|type|yield|lambda|global|nonlocal|del|pass|break|continue)\b|#|//|/\*|\*/|@|\$|\)|\]|\})",
    )
    .expect("CODE_ANCHOR_RE regex should compile")
});

static MARKDOWN_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#{2,6}\s|^\*\*[^*]+\*\*:?$").expect("MARKDOWN_HEADING_RE regex should compile")
});

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_fence(line: &str) -> bool {
    FENCE_RE.is_match(line)
}

/// Whether an unindented line reads as natural-language framing.
fn is_prose(line: &str) -> bool {
    if line.starts_with(char::is_whitespace) {
        return false;
    }
    let trimmed = line.trim();
    if MARKDOWN_HEADING_RE.is_match(trimmed) {
        return true;
    }
    if CODE_ANCHOR_RE.is_match(trimmed) {
        return false;
    }
    let starts_upper = trimmed.chars().next().is_some_and(|c| c.is_uppercase());
    let words = trimmed.split_whitespace().count();
    let sentence_end = trimmed.ends_with(['.', '!', '?', ':']);
    let has_code_punct = trimmed.contains(['=', ';', '{', '}']);

    if !starts_upper || has_code_punct {
        return false;
    }
    // "Explanation:" / "Note:" style labels
    if words == 1 && trimmed.ends_with(':') {
        return true;
    }
    words >= 3 && sentence_end
}

/// Positive evidence that a line is code rather than leftover text.
fn is_code_like(line: &str) -> bool {
    if is_blank(line) || is_prose(line) {
        return false;
    }
    line.starts_with(char::is_whitespace)
        || CODE_ANCHOR_RE.is_match(line.trim())
        || line.contains(['(', ')', '[', ']', '{', '}', '=', ';', ':'])
}

/// Body of the first fenced block, or `None` when the text has no fences.
fn fenced_body(raw: &str) -> Option<Vec<&str>> {
    let mut lines = raw.lines();
    lines.by_ref().find(|l| is_fence(l))?;
    Some(lines.take_while(|l| !is_fence(l)).collect())
}

/// Strip fences and prose framing from generated text.
pub fn sanitize(raw: &str) -> String {
    let lines: Vec<&str> = match fenced_body(raw) {
        Some(body) => body,
        None => raw.lines().collect(),
    };
    let lines: Vec<&str> = lines
        .into_iter()
        .map(|l| l.trim_end())
        .collect();

    let keep = |l: &&str| !is_blank(l) && !is_prose(l);
    let Some(start) = lines.iter().position(keep) else {
        return raw.to_string();
    };
    let end = lines.iter().rposition(keep).unwrap_or(start);
    let region = &lines[start..=end];

    if !region.iter().any(|l| is_code_like(l)) {
        return raw.to_string();
    }
    region.join("\n")
}

/// Whether `text` would be changed by [`sanitize`].
pub fn needs_sanitizing(text: &str) -> bool {
    sanitize(text) != text
}

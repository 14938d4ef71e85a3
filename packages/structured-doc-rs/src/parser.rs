use crate::config::ResolvedOptions;
use crate::placeholder::{
    is_mostly_placeholder, is_placeholder, placeholder_line_counts, strip_placeholders,
};
use crate::types::{title_key, trim_block, CandidateDocument, CandidateSection};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)(?:\s+#+)?\s*$").expect("invalid heading regex"));
static DANGLING_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#{1,6}\s*$").expect("invalid dangling heading regex"));
static NUMERIC_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d\s\p{P}\p{S}]*$").expect("invalid numeric heading regex"));
static BOLD_WRAPPER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*\*(.+)\*\*$").expect("invalid bold wrapper regex"));

/// Text between the opening and (optional) closing marker of a generated turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedBlock {
    pub body: String,
    pub closed: bool,
}

#[derive(Debug, Default)]
struct RawSection<'a> {
    title: String,
    lines: Vec<&'a str>,
}

/// Heading skeleton of a markdown block before any placeholder filtering.
#[derive(Debug, Default)]
struct Outline<'a> {
    title: Option<String>,
    description: Vec<&'a str>,
    sections: Vec<RawSection<'a>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutlineStats {
    pub has_title: bool,
    pub section_count: usize,
}

pub fn extract_block(text: &str, options: &ResolvedOptions) -> Option<ExtractedBlock> {
    let start = text.find(&options.start_marker)?;
    let after = &text[start + options.start_marker.len()..];
    match after.find(&options.end_marker) {
        Some(end) => Some(ExtractedBlock {
            body: after[..end].to_string(),
            closed: true,
        }),
        None => Some(ExtractedBlock {
            body: strip_partial_marker(after, &options.end_marker).to_string(),
            closed: false,
        }),
    }
}

/// Parses possibly-truncated markdown into a candidate document, dropping elision filler.
pub fn parse_partial(text: &str, fallback_title: Option<&str>) -> CandidateDocument {
    parse_partial_with(text, fallback_title, &ResolvedOptions::default())
}

pub fn parse_partial_with(
    text: &str,
    fallback_title: Option<&str>,
    options: &ResolvedOptions,
) -> CandidateDocument {
    let body = scoped_body(text, options);
    build_candidate(&body, fallback_title, Some(options.placeholder_threshold))
}

/// Same as [`parse_partial`] but keeps every line; used for user-authored editor content.
pub fn parse_partial_raw(markdown: &str, fallback_title: Option<&str>) -> CandidateDocument {
    build_candidate(markdown, fallback_title, None)
}

pub fn outline_stats(markdown: &str) -> OutlineStats {
    let body = unwrap_markdown_fence(markdown);
    let outline = split_outline(&body);
    OutlineStats {
        has_title: outline.title.is_some(),
        section_count: outline.sections.len(),
    }
}

pub fn is_numeric_heading(text: &str) -> bool {
    NUMERIC_HEADING_RE.is_match(text.trim())
}

fn scoped_body(text: &str, options: &ResolvedOptions) -> String {
    let scoped = match extract_block(text, options) {
        Some(block) => block.body,
        None => text.to_string(),
    };
    unwrap_markdown_fence(&scoped)
}

fn build_candidate(
    body: &str,
    fallback_title: Option<&str>,
    placeholder_threshold: Option<f64>,
) -> CandidateDocument {
    let outline = split_outline(body);
    let mut candidate = CandidateDocument {
        has_heading_title: outline.title.is_some(),
        title: outline
            .title
            .clone()
            .or_else(|| fallback_title.map(str::to_string))
            .filter(|title| !title.trim().is_empty()),
        ..CandidateDocument::default()
    };

    let description = outline.description.join("\n");
    candidate.description = match placeholder_threshold {
        Some(threshold) => {
            candidate.placeholder_lines += placeholder_line_counts(&description).0;
            if is_mostly_placeholder(&description, threshold) {
                String::new()
            } else {
                trim_block(&strip_placeholders(&description)).to_string()
            }
        }
        None => trim_block(&description).to_string(),
    };

    let mut seen: HashSet<String> = HashSet::new();
    for section in outline.sections {
        let raw = section.lines.join("\n");

        if let Some(threshold) = placeholder_threshold {
            if is_placeholder(&section.title) {
                candidate.placeholder_lines += 1;
                continue;
            }
            let (placeholders, _) = placeholder_line_counts(&raw);
            candidate.placeholder_lines += placeholders;
            if is_mostly_placeholder(&raw, threshold) {
                candidate.elided_titles.push(section.title);
                continue;
            }
        }

        if !seen.insert(title_key(&section.title)) {
            continue;
        }

        let content = match placeholder_threshold {
            Some(_) => strip_placeholders(&raw),
            None => raw,
        };
        candidate.sections.push(CandidateSection {
            title: section.title,
            content: trim_block(&content).to_string(),
        });
    }

    candidate
}

fn split_outline(body: &str) -> Outline<'_> {
    let mut outline = Outline::default();
    let mut in_fence = false;
    let lines: Vec<&str> = body.lines().collect();
    let last_index = lines.len().saturating_sub(1);

    for (index, line) in lines.iter().copied().enumerate() {
        let trimmed_start = line.trim_start();
        if trimmed_start.starts_with("```") || trimmed_start.starts_with("~~~") {
            in_fence = !in_fence;
            push_line(&mut outline, line);
            continue;
        }

        let indent = line.len() - trimmed_start.len();
        if in_fence || indent > 3 {
            push_line(&mut outline, line);
            continue;
        }

        // A heading marker that has not received its text yet.
        if index == last_index && DANGLING_HEADING_RE.is_match(trimmed_start) {
            continue;
        }

        let Some(captures) = HEADING_RE.captures(trimmed_start) else {
            push_line(&mut outline, line);
            continue;
        };
        let level = captures.get(1).map_or(0, |m| m.as_str().len());
        let text = clean_heading_text(captures.get(2).map_or("", |m| m.as_str()));

        if text.is_empty() || is_numeric_heading(&text) {
            push_line(&mut outline, line);
            continue;
        }

        match level {
            1 if outline.title.is_none() && outline.sections.is_empty() => {
                outline.title = Some(text);
            }
            2 => outline.sections.push(RawSection {
                title: text,
                lines: Vec::new(),
            }),
            _ => push_line(&mut outline, line),
        }
    }

    outline
}

fn push_line<'a>(outline: &mut Outline<'a>, line: &'a str) {
    match outline.sections.last_mut() {
        Some(section) => section.lines.push(line),
        None => outline.description.push(line),
    }
}

fn clean_heading_text(text: &str) -> String {
    let trimmed = text.trim();
    let unwrapped = BOLD_WRAPPER_RE
        .captures(trimmed)
        .and_then(|captures| captures.get(1))
        .map_or(trimmed, |m| m.as_str());
    unwrapped.trim().to_string()
}

fn unwrap_markdown_fence(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let Some(first) = lines.iter().position(|line| !line.trim().is_empty()) else {
        return text.to_string();
    };
    let opener = lines[first].trim().to_lowercase();
    if opener != "```markdown" && opener != "```md" {
        return text.to_string();
    }

    let mut end = lines.len();
    if let Some(last) = lines.iter().rposition(|line| !line.trim().is_empty()) {
        if last > first && lines[last].trim() == "```" {
            end = last;
        }
    }
    lines[first + 1..end].join("\n")
}

/// Drops a trailing prefix of the closing marker that is still being streamed in.
fn strip_partial_marker<'a>(text: &'a str, marker: &str) -> &'a str {
    let mut cut = marker.len().saturating_sub(1);
    while cut > 0 {
        if marker.is_char_boundary(cut) && text.ends_with(&marker[..cut]) {
            return &text[..text.len() - cut];
        }
        cut -= 1;
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_title_description_and_sections() {
        let candidate = parse_partial(
            "# Checkout Revamp\n\nA faster checkout.\n\n## Goals\n\n- Cut steps\n\n## Scope\n\nWeb only.",
            None,
        );
        assert_eq!(candidate.title.as_deref(), Some("Checkout Revamp"));
        assert!(candidate.has_heading_title);
        assert_eq!(candidate.description, "A faster checkout.");
        assert_eq!(candidate.sections.len(), 2);
        assert_eq!(candidate.sections[0].title, "Goals");
        assert_eq!(candidate.sections[0].content, "- Cut steps");
        assert_eq!(candidate.sections[1].content, "Web only.");
    }

    #[test]
    fn keeps_streaming_trailing_section() {
        let candidate =
            parse_partial("# Doc\n\n## Goals\n\nFirst goal\n\n## Scope\n\nWeb and mo", None);
        assert_eq!(candidate.sections.len(), 2);
        assert_eq!(candidate.sections[1].content, "Web and mo");
    }

    #[test]
    fn dangling_heading_marker_is_ignored() {
        let candidate = parse_partial("# Doc\n\n## Goals\n\nFirst goal\n\n##", None);
        assert_eq!(candidate.sections.len(), 1);
        assert_eq!(candidate.sections[0].content, "First goal");
    }

    #[test]
    fn numeric_headings_fold_into_previous_block() {
        let candidate = parse_partial("# Doc\n\n## Goals\n\nText\n\n## 2.\n\nMore", None);
        assert_eq!(candidate.sections.len(), 1);
        assert_eq!(candidate.sections[0].content, "Text\n\n## 2.\n\nMore");
    }

    #[test]
    fn falls_back_to_prior_title() {
        let candidate = parse_partial("## Goals\n\nText", Some("Old Title"));
        assert_eq!(candidate.title.as_deref(), Some("Old Title"));
        assert!(!candidate.has_heading_title);
    }

    #[test]
    fn headings_inside_code_fences_are_content() {
        let candidate = parse_partial("# Doc\n\n## Setup\n\n```bash\n## not a heading\n```", None);
        assert_eq!(candidate.sections.len(), 1);
        assert!(candidate.sections[0].content.contains("## not a heading"));
    }

    #[test]
    fn elided_sections_are_reported_not_emitted() {
        let candidate = parse_partial(
            "# Doc\n\n## Goals\n\n[Goals section remains unchanged]\n\n## Scope\n\nNew scope.",
            None,
        );
        assert_eq!(candidate.sections.len(), 1);
        assert_eq!(candidate.sections[0].title, "Scope");
        assert_eq!(candidate.elided_titles, vec!["Goals".to_string()]);
        assert_eq!(candidate.placeholder_lines, 1);
    }

    #[test]
    fn extract_block_tolerates_missing_end_marker() {
        let options = ResolvedOptions::default();
        let text = "Sure!\n[[DOCUMENT_START]]\n# Doc\n\n## Goals\n\nText[[DOC";
        let block = extract_block(text, &options).unwrap();
        assert!(!block.closed);
        assert_eq!(block.body, "\n# Doc\n\n## Goals\n\nText");

        let closed =
            extract_block("[[DOCUMENT_START]]# A[[DOCUMENT_END]] trailing", &options).unwrap();
        assert!(closed.closed);
        assert_eq!(closed.body, "# A");
        assert!(extract_block("no markers", &options).is_none());
    }

    #[test]
    fn unwraps_markdown_fence_and_bold_titles() {
        let candidate = parse_partial("```markdown\n# **Doc**\n\n## Goals\n\nText\n```", None);
        assert_eq!(candidate.title.as_deref(), Some("Doc"));
        assert_eq!(candidate.sections[0].content, "Text");
    }

    #[test]
    fn duplicate_titles_keep_first_occurrence() {
        let candidate = parse_partial("# Doc\n\n## Goals\n\nOne\n\n## goals\n\nTwo", None);
        assert_eq!(candidate.sections.len(), 1);
        assert_eq!(candidate.sections[0].content, "One");
    }

    #[test]
    fn raw_parse_keeps_user_written_filler() {
        let candidate = parse_partial_raw("# Notes\n\n## Status\n\n[unchanged]", None);
        assert_eq!(candidate.sections[0].content, "[unchanged]");
        assert!(candidate.elided_titles.is_empty());
        let stripped = parse_partial("# Notes\n\n## Status\n\n[unchanged]", None);
        assert_eq!(stripped.elided_titles, vec!["Status"]);
    }

    #[test]
    fn filler_naming_a_section_elides_it() {
        let candidate = parse_partial(
            "# Doc\n\n## 1. User Stories\n\n[User Stories section remains unchanged]\n\n## 2. Scope\n\nWeb",
            None,
        );
        assert_eq!(candidate.elided_titles, vec!["1. User Stories"]);
        assert_eq!(candidate.sections.len(), 1);
        assert_eq!(candidate.sections[0].title, "2. Scope");
    }

    #[test]
    fn filler_headings_are_dropped() {
        let candidate = parse_partial(
            "# Doc\n\n## Goals\n\nShip v1\n\n## [Other sections remain unchanged]",
            None,
        );
        let titles: Vec<&str> =
            candidate.sections.iter().map(|section| section.title.as_str()).collect();
        assert_eq!(titles, vec!["Goals"]);
        assert!(candidate.elided_titles.is_empty());
        assert_eq!(candidate.placeholder_lines, 1);
    }

    #[test]
    fn outline_stats_counts_real_headings() {
        let stats = outline_stats("# Doc\n\n## A\n\n## 3\n\n## B");
        assert!(stats.has_title);
        assert_eq!(stats.section_count, 2);
    }
}

//! Detection of generator-emitted elision filler ("[rest of section unchanged]").
//!
//! Classification runs an ordered rule table; the first matching rule wins and
//! reports its id and confidence tier. A narrative guard runs before the table
//! so product prose that happens to use the same vocabulary is never dropped.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashSet;

const MAX_PLACEHOLDER_CHARS: usize = 160;
const MAX_SENTENCE_TEMPLATE_WORDS: usize = 12;
const MAX_INLINE_SPAN_CHARS: usize = 120;

const KEYWORDS: &str = r"unchanged|unmodified|same|remains?|remained|remaining|continues?|continued|continuing|skip(?:ped|ping)?|omit(?:ted|ting)?|identical|before|previously|as[- ]is|not changed|no changes?|retained|kept|intact";
const BRACKET_NOUNS: &str =
    r"sections?|content|contents|document|doc|text|rest|remainder|parts?|details|everything";
const CONTEXT_NOUNS: &str = r"sections?|content|contents|document|text";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    /// Bracket-delimited template.
    Template,
    /// Curated exact phrase.
    Exact,
    /// Keyword co-occurrence or sentence template.
    Keyword,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderMatch {
    pub rule_id: &'static str,
    pub tier: ConfidenceTier,
}

enum RuleKind {
    Pattern(Regex),
    AllOf(Vec<Regex>),
    ExactPhrase,
}

struct PlaceholderRule {
    id: &'static str,
    tier: ConfidenceTier,
    kind: RuleKind,
    /// Keyword-tier rules only fire on short lines.
    short_only: bool,
}

const EXACT_PHRASES: [&str; 32] = [
    "rest of the document remains unchanged",
    "rest of the document unchanged",
    "rest of document unchanged",
    "the rest of the document remains the same",
    "rest of the document remains the same",
    "rest of the section remains unchanged",
    "rest of section unchanged",
    "rest unchanged",
    "remaining sections unchanged",
    "remaining sections remain unchanged",
    "other sections remain unchanged",
    "all other sections remain unchanged",
    "previous sections remain unchanged",
    "sections unchanged",
    "no changes to this section",
    "no changes",
    "unchanged",
    "same as before",
    "same as above",
    "as before",
    "as above",
    "content unchanged",
    "content remains the same",
    "existing content",
    "existing content remains",
    "continued from above",
    "continues as before",
    "omitted for brevity",
    "...",
    "…",
    "etc",
    "and so on",
];

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("invalid placeholder regex")
}

static RULES: Lazy<Vec<PlaceholderRule>> = Lazy::new(|| {
    let open = r"[\[({<]";
    let close = r"[\])}>]";
    let inner = r"[^\])}>]*";
    vec![
        PlaceholderRule {
            id: "bracket_ellipsis_only",
            tier: ConfidenceTier::Template,
            kind: RuleKind::Pattern(compile(&format!(r"^{open}\s*(?:\.{{3,}}|…)\s*{close}$"))),
            short_only: false,
        },
        PlaceholderRule {
            id: "bracket_keyword_noun",
            tier: ConfidenceTier::Template,
            kind: RuleKind::Pattern(compile(&format!(
                r"(?i)^{open}{inner}\b(?:{KEYWORDS})\b{inner}\b(?:{BRACKET_NOUNS})\b{inner}{close}$"
            ))),
            short_only: false,
        },
        PlaceholderRule {
            id: "bracket_noun_keyword",
            tier: ConfidenceTier::Template,
            kind: RuleKind::Pattern(compile(&format!(
                r"(?i)^{open}{inner}\b(?:{BRACKET_NOUNS})\b{inner}\b(?:{KEYWORDS})\b{inner}{close}$"
            ))),
            short_only: false,
        },
        PlaceholderRule {
            id: "bracket_ellipsis_keyword",
            tier: ConfidenceTier::Template,
            kind: RuleKind::Pattern(compile(&format!(
                r"(?i)^{open}{inner}(?:\.{{3,}}|…){inner}\b(?:{KEYWORDS})\b{inner}{close}$"
            ))),
            short_only: false,
        },
        PlaceholderRule {
            id: "bracket_keyword_ellipsis",
            tier: ConfidenceTier::Template,
            kind: RuleKind::Pattern(compile(&format!(
                r"(?i)^{open}{inner}\b(?:{KEYWORDS})\b{inner}(?:\.{{3,}}|…){inner}{close}$"
            ))),
            short_only: false,
        },
        PlaceholderRule {
            id: "exact_phrase",
            tier: ConfidenceTier::Exact,
            kind: RuleKind::ExactPhrase,
            short_only: false,
        },
        PlaceholderRule {
            id: "keyword_with_context_noun",
            tier: ConfidenceTier::Keyword,
            kind: RuleKind::AllOf(vec![
                compile(&format!(r"(?i)\b(?:{KEYWORDS})\b")),
                compile(&format!(r"(?i)\b(?:{CONTEXT_NOUNS})\b")),
            ]),
            short_only: true,
        },
        PlaceholderRule {
            id: "keyword_with_structural_marker",
            tier: ConfidenceTier::Keyword,
            kind: RuleKind::AllOf(vec![
                compile(&format!(r"(?i)\b(?:{KEYWORDS})\b")),
                compile(r"[\[\]]|\.{3,}|…"),
            ]),
            short_only: true,
        },
        PlaceholderRule {
            id: "sentence_remains_unchanged",
            tier: ConfidenceTier::Keyword,
            kind: RuleKind::Pattern(compile(
                r"(?i)\b(?:remains?|remained|stays?|stayed|is|are) (?:unchanged|the same|as is|intact)\b",
            )),
            short_only: true,
        },
        PlaceholderRule {
            id: "sentence_continues_as_before",
            tier: ConfidenceTier::Keyword,
            kind: RuleKind::Pattern(compile(r"(?i)\bcontinues? as (?:before|above|previously)\b")),
            short_only: true,
        },
        PlaceholderRule {
            id: "sentence_as_before",
            tier: ConfidenceTier::Keyword,
            kind: RuleKind::Pattern(compile(
                r"(?i)(?:^|\b(?:same|identical|unchanged|kept|retained) )as (?:before|above|earlier|previously)\b",
            )),
            short_only: true,
        },
    ]
});

static NARRATIVE_WORDS_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\b(?:customers?|clients?|features?|launch(?:ed|es|ing)?|revenue|sales|adoption|popular|growth|quarters?|released|shipped|stakeholders?|budget|deadline|competitors?)\b",
    )
});

/// A section named inside a bracketed note: `[User Stories section ...]` or
/// `[Section 2 ("Scope") ...]`.
static SECTION_REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r#"(?i)(?:[\w'’&/-]+\s+){1,4}sections?\b|\bsections?\s+(?:\d+\s*)?(?:\([^)]*\)|"[^"]*"|“[^”]*”|'[^']*')"#,
    )
});

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\b\d+(?:\.\d+)?\s*(?:ms|seconds?|minutes?|hours?|days?|weeks?|months?|quarters?|years?|sprints?)\b|\d+(?:\.\d+)?\s*%|\$\s?\d",
    )
});

static LIST_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"^(?:>\s*)*(?:[-*+]\s+(?:\[[ xX]\]\s+)?|\d+[.)]\s+)?"));

static HTML_COMMENT_RE: Lazy<Regex> = Lazy::new(|| compile(r"^<!--\s*(.*?)\s*-->$"));

static WORD_RE: Lazy<Regex> = Lazy::new(|| compile(r"[A-Za-z][A-Za-z'’-]*"));

static VOCABULARY: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "of", "to", "this", "that", "these", "those", "and", "or", "is", "are",
        "as", "from", "for", "in", "on", "at", "all", "other", "rest", "remaining", "remain",
        "remains", "remained", "previous", "previously", "above", "below", "earlier", "before",
        "see", "here", "same", "no", "changes", "change", "changed", "not", "unchanged",
        "unmodified", "section", "sections", "content", "contents", "document", "doc", "text",
        "part", "parts", "details", "everything", "omitted", "omit", "skipped", "skip",
        "identical", "continue", "continues", "continued", "kept", "retained", "intact", "stays",
        "stay", "existing", "brevity", "etc", "note", "remainder", "original", "it", "its",
    ]
    .into_iter()
    .collect()
});

/// Returns the first rule that classifies `line` as elision filler.
pub fn match_placeholder(line: &str) -> Option<PlaceholderMatch> {
    let peeled = peel_decoration(line);
    if peeled.is_empty() || peeled.chars().count() > MAX_PLACEHOLDER_CHARS {
        return None;
    }
    let bracketed = is_bracket_wrapped(&peeled);
    // Section titles in a bracketed note are references, not narrative.
    let guarded = if bracketed {
        SECTION_REFERENCE_RE.replace_all(&peeled, "section")
    } else {
        Cow::Borrowed(peeled.as_str())
    };
    if has_narrative_indicator(&guarded) {
        return None;
    }

    let word_count = WORD_RE.find_iter(&peeled).count();

    for rule in RULES.iter() {
        if rule.short_only {
            if word_count > MAX_SENTENCE_TEMPLATE_WORDS {
                continue;
            }
            if !bracketed && has_named_entity(&peeled) {
                continue;
            }
        }

        let matched = match &rule.kind {
            RuleKind::Pattern(regex) => regex.is_match(&peeled),
            RuleKind::AllOf(regexes) => regexes.iter().all(|regex| regex.is_match(&peeled)),
            RuleKind::ExactPhrase => {
                let normalized = normalize_phrase(&peeled);
                EXACT_PHRASES.iter().any(|phrase| *phrase == normalized)
            }
        };

        if matched {
            return Some(PlaceholderMatch {
                rule_id: rule.id,
                tier: rule.tier,
            });
        }
    }

    None
}

pub fn is_placeholder(line: &str) -> bool {
    match_placeholder(line).is_some()
}

/// Removes placeholder lines and bracketed placeholder spans. Fenced code is left alone.
/// The input is returned byte-for-byte when nothing was removed.
pub fn strip_placeholders(text: &str) -> String {
    let mut output: Vec<String> = Vec::new();
    let mut removed = false;
    let mut in_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            output.push(line.to_string());
            continue;
        }
        if in_fence {
            output.push(line.to_string());
            continue;
        }
        // Spans go first so prose around an inline note survives the line check.
        let (candidate, span_removed) = match strip_inline_spans(line) {
            Some(cleaned) => (cleaned, true),
            None => (line.to_string(), false),
        };
        if candidate.trim().is_empty() || is_placeholder(&candidate) {
            removed = true;
            continue;
        }
        removed |= span_removed;
        output.push(candidate);
    }

    if !removed {
        return text.to_string();
    }

    collapse_blank_runs(&output)
}

/// Counts `(placeholder lines, non-empty lines)` outside fenced code.
pub fn placeholder_line_counts(text: &str) -> (usize, usize) {
    let mut placeholders = 0;
    let mut total = 0;
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            total += 1;
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        total += 1;
        if !in_fence && is_placeholder(line) {
            placeholders += 1;
        }
    }

    (placeholders, total)
}

pub fn placeholder_ratio(text: &str) -> f64 {
    let (placeholders, total) = placeholder_line_counts(text);
    if total == 0 {
        return 0.0;
    }
    placeholders as f64 / total as f64
}

pub fn is_mostly_placeholder(text: &str, threshold: f64) -> bool {
    let (placeholders, total) = placeholder_line_counts(text);
    placeholders > 0 && placeholders as f64 / total as f64 >= threshold
}

fn peel_decoration(line: &str) -> String {
    let mut peeled = line.trim().to_string();

    if let Some(captures) = HTML_COMMENT_RE.captures(&peeled) {
        let inner = captures.get(1).map_or("", |m| m.as_str());
        peeled = format!("[{inner}]");
    }

    let marker_len = LIST_MARKER_RE.find(&peeled).map_or(0, |m| m.end());
    peeled = peeled[marker_len..].trim().to_string();

    loop {
        let trimmed = peeled
            .strip_prefix("**")
            .and_then(|value| value.strip_suffix("**"))
            .or_else(|| peeled.strip_prefix('*').and_then(|value| value.strip_suffix('*')))
            .or_else(|| peeled.strip_prefix('_').and_then(|value| value.strip_suffix('_')));
        match trimmed {
            Some(inner) if !inner.is_empty() => peeled = inner.trim().to_string(),
            _ => break,
        }
    }

    peeled
}

fn is_bracket_wrapped(text: &str) -> bool {
    let (Some(first), Some(last)) = (text.chars().next(), text.chars().last()) else {
        return false;
    };
    matches!(
        (first, last),
        ('[', ']') | ('(', ')') | ('{', '}') | ('<', '>')
    )
}

fn has_narrative_indicator(text: &str) -> bool {
    NARRATIVE_WORDS_RE.is_match(text)
        || DURATION_RE.is_match(text)
        || text.contains("](")
        || text.contains("://")
}

/// Capitalized or all-caps words past the first that are not placeholder vocabulary.
fn has_named_entity(text: &str) -> bool {
    WORD_RE.find_iter(text).skip(1).any(|word| {
        let word = word.as_str();
        let starts_upper = word.chars().next().is_some_and(char::is_uppercase);
        starts_upper && !VOCABULARY.contains(word.to_lowercase().as_str())
    })
}

fn normalize_phrase(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|ch| {
            !matches!(ch, '[' | ']' | '(' | ')' | '{' | '}' | '<' | '>' | '*' | '_' | '"' | '\'')
        })
        .collect();
    let cleaned = cleaned.to_lowercase();
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let joined = words.join(" ");
    let trimmed = joined.trim_end_matches(['.', ':', ';', '!', ',']);
    if trimmed.is_empty() && !joined.is_empty() {
        // Lines made only of dots normalize to the ellipsis phrase.
        return "...".to_string();
    }
    trimmed.to_string()
}

fn strip_inline_spans(line: &str) -> Option<String> {
    let bytes = line.as_bytes();
    let mut result = String::with_capacity(line.len());
    let mut cursor = 0;
    let mut changed = false;
    let mut search_from = 0;

    while let Some(open_offset) = line[search_from..].find('[') {
        let open = search_from + open_offset;
        let Some(close_offset) = line[open + 1..].find(']') else {
            break;
        };
        let close = open + 1 + close_offset;
        let span = &line[open..=close];
        let inner = &line[open + 1..close];
        let is_link = bytes.get(close + 1) == Some(&b'(');
        let is_image = open > 0 && bytes[open - 1] == b'!';
        let is_task = inner.trim().is_empty() || inner.eq_ignore_ascii_case("x");

        if !is_link
            && !is_image
            && !is_task
            && !inner.contains('[')
            && inner.chars().count() <= MAX_INLINE_SPAN_CHARS
            && is_placeholder(span)
        {
            let before = &line[cursor..open];
            result.push_str(before);
            let mut next = close + 1;
            if before.ends_with(' ') && line[next..].starts_with(' ') {
                next += 1;
            }
            cursor = next;
            changed = true;
            search_from = next;
        } else {
            search_from = open + 1;
        }
    }

    if !changed {
        return None;
    }
    result.push_str(&line[cursor..]);
    Some(result.trim_end().to_string())
}

fn collapse_blank_runs(lines: &[String]) -> String {
    let mut output: Vec<&str> = Vec::with_capacity(lines.len());
    for line in lines {
        let blank = line.trim().is_empty();
        if blank && output.last().is_none_or(|last| last.trim().is_empty()) {
            continue;
        }
        output.push(line.as_str());
    }
    while output.last().is_some_and(|last| last.trim().is_empty()) {
        output.pop();
    }
    output.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracketed_section_note_is_placeholder() {
        let matched = match_placeholder("[Section 2 remains unchanged]").unwrap();
        assert_eq!(matched.tier, ConfidenceTier::Template);
        assert_eq!(matched.rule_id, "bracket_noun_keyword");
    }

    #[test]
    fn narrative_with_shared_vocabulary_is_kept() {
        assert!(!is_placeholder(
            "We launched this feature and it remained popular for 3 continuous quarters"
        ));
    }

    #[test]
    fn exact_phrases_match_after_normalization() {
        assert_eq!(
            match_placeholder("*Rest of the document remains unchanged.*")
                .unwrap()
                .rule_id,
            "exact_phrase"
        );
        assert!(is_placeholder("..."));
        assert!(is_placeholder("> (unchanged)"));
    }

    #[test]
    fn bracketed_notes_naming_a_section_are_placeholders() {
        for line in [
            "[User Stories section remains unchanged]",
            "[Success Metrics section remains unchanged]",
            "[Release Plan section unchanged]",
            "[Roadmap section remains unchanged]",
            "[Key Features section remains unchanged]",
            "[Section 4 (\"Customer Journeys\") unchanged]",
        ] {
            assert!(is_placeholder(line), "{line}");
        }
        assert!(!is_placeholder("Our customers keep this section unchanged"));
    }

    #[test]
    fn sentence_templates_match_short_lines() {
        assert!(is_placeholder("This section stays the same."));
        assert!(is_placeholder("Continues as before"));
        assert!(is_placeholder("- [... skipped ...]"));
        assert!(is_placeholder("<!-- content unchanged -->"));
    }

    #[test]
    fn ordinary_content_is_not_placeholder() {
        assert!(!is_placeholder("Reduce checkout time to under a minute."));
        assert!(!is_placeholder("## Goals"));
        assert!(!is_placeholder("Before launch we need legal sign-off."));
        assert!(!is_placeholder("The Stripe integration remains unchanged"));
        assert!(!is_placeholder("[Design doc](https://example.com/unchanged-section)"));
    }

    #[test]
    fn strip_removes_lines_and_inline_spans() {
        let text = "Intro line. [rest of section unchanged]\n\n[Section 3 remains unchanged]\n\nClosing line.";
        assert_eq!(strip_placeholders(text), "Intro line.\n\nClosing line.");
    }

    #[test]
    fn strip_keeps_text_untouched_without_matches() {
        let text = "Line one\n\n\nLine two  ";
        assert_eq!(strip_placeholders(text), text);
    }

    #[test]
    fn strip_leaves_fenced_code_alone() {
        let text = "```\n[content unchanged]\n```";
        assert_eq!(strip_placeholders(text), text);
    }

    #[test]
    fn mostly_placeholder_blocks_are_detected() {
        assert!(is_mostly_placeholder("[unchanged]\n\n...", 0.5));
        assert!(!is_mostly_placeholder("Real content.\nMore content.\n[unchanged]", 0.5));
        assert_eq!(placeholder_ratio(""), 0.0);
    }
}

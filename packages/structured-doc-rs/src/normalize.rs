use crate::types::{now_ms, title_key, Document, Section};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashSet};

const MAX_STUTTER_WINDOW: usize = 6;
const MIN_DUPLICATE_PARAGRAPH_CHARS: usize = 24;
const MIN_SUB_POINT_CHARS: usize = 3;

static NUMERIC_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)(\d{1,3})([.):]?)(\s+)(\S.*)$").expect("invalid numeric prefix regex")
});
static CROSS_REF_RE: Lazy<Regex> =
    Lazy::new(|| {
        Regex::new(r"(?i)\b(section)(\s+)(\d+)\b").expect("invalid cross reference regex")
    });
static LIST_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)(\d+)(\.\s+)(.*)$").expect("invalid list marker regex"));
static ORDERED_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)\d+[.)]\s+(.*)$").expect("invalid ordered item regex"));
static BULLET_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)[-*+]\s+(.*)$").expect("invalid bullet item regex"));
static SUB_POINT_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[:;,]|\s+and\s+").expect("invalid sub point regex"));
static HORIZONTAL_RULE_RE: Lazy<Regex> =
    Lazy::new(|| {
        Regex::new(r"^(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})$")
            .expect("invalid rule regex")
    });

// =============================================================================
// Ordering and renumbering
// =============================================================================

pub fn numeric_prefix(title: &str) -> Option<u32> {
    NUMERIC_PREFIX_RE
        .captures(title)
        .and_then(|captures| captures.get(2))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

/// Title with its leading number removed, lowercased; used to pair sections across renumbering.
pub fn unnumbered_title_key(title: &str) -> String {
    match NUMERIC_PREFIX_RE.captures(title) {
        Some(captures) => title_key(captures.get(5).map_or("", |m| m.as_str())),
        None => title_key(title),
    }
}

/// Stable sort: numbered titles ascending, unprefixed titles after them in their current order.
pub fn sort_by_numeric_prefix(sections: &mut [Section]) {
    sections.sort_by_key(|section| match numeric_prefix(&section.title) {
        Some(number) => (0u8, number),
        None => (1u8, 0),
    });
}

pub fn renumber_after_deletion(sections: &[Section]) -> Vec<Section> {
    let (numbered, rest): (Vec<&Section>, Vec<&Section>) = sections
        .iter()
        .partition(|section| numeric_prefix(&section.title).is_some());

    numbered
        .into_iter()
        .enumerate()
        .map(|(index, section)| Section {
            title: with_number(&section.title, index as u32 + 1),
            ..section.clone()
        })
        .chain(rest.into_iter().cloned())
        .collect()
}

/// Renumbers numbered sections 1..N in their current positions.
fn renumber_in_place(sections: &mut [Section]) {
    let mut next = 1;
    for section in sections.iter_mut() {
        if numeric_prefix(&section.title).is_some() {
            section.title = with_number(&section.title, next);
            next += 1;
        }
    }
}

fn with_number(title: &str, number: u32) -> String {
    NUMERIC_PREFIX_RE
        .replace(title, |captures: &Captures| {
            format!(
                "{}{}{}{}{}",
                &captures[1], number, &captures[3], &captures[4], &captures[5]
            )
        })
        .into_owned()
}

/// Old section number -> new section number, joined by id and then by unnumbered title.
pub fn build_renumber_map(
    old_sections: &[Section],
    new_sections: &[Section],
) -> BTreeMap<u32, u32> {
    let mut map = BTreeMap::new();

    for section in new_sections {
        let Some(new_number) = numeric_prefix(&section.title) else {
            continue;
        };
        let key = unnumbered_title_key(&section.title);
        let previous = old_sections
            .iter()
            .find(|old| old.id == section.id)
            .or_else(|| {
                old_sections
                    .iter()
                    .find(|old| unnumbered_title_key(&old.title) == key)
            });
        if let Some(old_number) = previous.and_then(|old| numeric_prefix(&old.title)) {
            map.insert(old_number, new_number);
        }
    }

    map
}

pub fn rewrite_cross_references(sections: &[Section], old_sections: &[Section]) -> Vec<Section> {
    let map = build_renumber_map(old_sections, sections);
    if map.iter().all(|(old, new)| old == new) {
        return sections.to_vec();
    }
    let old_titles = numbered_titles(old_sections);

    sections
        .iter()
        .map(|section| Section {
            content: apply_renumber_map(&section.content, &map, &old_titles),
            ..section.clone()
        })
        .collect()
}

/// Rewrites `Section <n>` mentions and leading `<n>.` markers that name an old section.
pub fn apply_renumber_map(
    text: &str,
    map: &BTreeMap<u32, u32>,
    old_titles: &BTreeMap<u32, String>,
) -> String {
    if map.is_empty() {
        return text.to_string();
    }

    let rewritten: Vec<String> = text
        .split('\n')
        .map(|line| {
            let (marker, rest) = match LIST_MARKER_RE.captures(line) {
                Some(captures) => {
                    let number = captures[2].parse::<u32>().ok();
                    let body = captures.get(4).map_or("", |m| m.as_str());
                    let names_section = number
                        .and_then(|number| old_titles.get(&number))
                        .is_some_and(|title| normalize_point(body).starts_with(title.as_str()));
                    let mapped = number
                        .filter(|_| names_section)
                        .and_then(|number| map.get(&number))
                        .map(|number| number.to_string())
                        .unwrap_or_else(|| captures[2].to_string());
                    (format!("{}{}{}", &captures[1], mapped, &captures[3]), body)
                }
                None => (String::new(), line),
            };

            let rest = CROSS_REF_RE.replace_all(rest, |captures: &Captures| {
                let number = captures[3].parse::<u32>().ok();
                match number.and_then(|number| map.get(&number)) {
                    Some(mapped) => format!("{}{}{}", &captures[1], &captures[2], mapped),
                    None => captures[0].to_string(),
                }
            });
            format!("{marker}{rest}")
        })
        .collect();

    rewritten.join("\n")
}

fn numbered_titles(sections: &[Section]) -> BTreeMap<u32, String> {
    sections
        .iter()
        .filter_map(|section| {
            numeric_prefix(&section.title)
                .map(|number| (number, normalize_point(&unnumbered_title_key(&section.title))))
        })
        .collect()
}

// =============================================================================
// User edits
// =============================================================================

/// Explicit user deletion: remove, renumber, rewrite references in the survivors.
pub fn delete_section(document: &Document, section_id: &str) -> Document {
    let remaining: Vec<Section> = document
        .sections
        .iter()
        .filter(|section| section.id != section_id)
        .cloned()
        .collect();
    if remaining.len() == document.sections.len() {
        return document.clone();
    }

    let renumbered = renumber_after_deletion(&remaining);
    finish_structural_edit(document, renumbered)
}

/// Manual reorder: move, renumber in the new order, then re-sort by prefix.
pub fn move_section(document: &Document, section_id: &str, to_index: usize) -> Document {
    let Some(from) = document
        .sections
        .iter()
        .position(|section| section.id == section_id)
    else {
        return document.clone();
    };

    let mut sections = document.sections.clone();
    let moved = sections.remove(from);
    let target = to_index.min(sections.len());
    sections.insert(target, moved);
    renumber_in_place(&mut sections);
    sort_by_numeric_prefix(&mut sections);
    finish_structural_edit(document, sections)
}

fn finish_structural_edit(document: &Document, sections: Vec<Section>) -> Document {
    let map = build_renumber_map(&document.sections, &sections);
    let old_titles = numbered_titles(&document.sections);
    let sections = rewrite_cross_references(&sections, &document.sections);

    Document {
        title: document.title.clone(),
        description: apply_renumber_map(&document.description, &map, &old_titles),
        sections,
        last_updated: now_ms(),
    }
}

// =============================================================================
// De-duplication
// =============================================================================

/// Collapses back-to-back repeats of the same run of up to six lines (generator stutter).
pub fn collapse_repeated_lines(text: &str) -> String {
    let mut output: Vec<(&str, bool)> = Vec::new();
    let mut in_fence = false;
    let mut changed = false;

    for line in text.split('\n') {
        let is_fence = line.trim_start().starts_with("```");
        if is_fence {
            in_fence = !in_fence;
        }
        output.push((line, in_fence || is_fence));

        loop {
            let len = output.len();
            let mut collapsed = false;
            for window in 1..=MAX_STUTTER_WINDOW {
                if len < window * 2 {
                    break;
                }
                let tail = &output[len - window..];
                let previous = &output[len - 2 * window..len - window];
                let comparable = tail.iter().chain(previous).all(|(_, fenced)| !fenced)
                    && tail.iter().any(|(line, _)| !line.trim().is_empty());
                let repeated = tail
                    .iter()
                    .map(|(line, _)| line)
                    .eq(previous.iter().map(|(line, _)| line));
                if comparable && repeated {
                    output.truncate(len - window);
                    collapsed = true;
                    changed = true;
                    break;
                }
            }
            if !collapsed {
                break;
            }
        }
    }

    if !changed {
        return text.to_string();
    }
    output
        .into_iter()
        .map(|(line, _)| line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drops paragraphs that repeat an earlier one ignoring case and spacing; the first copy wins.
pub fn dedupe_paragraphs(text: &str) -> String {
    let blocks = split_paragraphs(text);
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept: Vec<&str> = Vec::with_capacity(blocks.len());
    let mut changed = false;

    for block in &blocks {
        if is_dedupe_exempt(block) {
            kept.push(block);
            continue;
        }
        let key = block.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if seen.insert(key) {
            kept.push(block);
        } else {
            changed = true;
        }
    }

    if !changed {
        return text.to_string();
    }
    kept.join("\n\n")
}

/// Removes nested bullets under a numbered item that only repeat the item's own inline text.
pub fn remove_repeated_sub_bullets(text: &str) -> String {
    let mut output: Vec<&str> = Vec::new();
    let mut current_item: Option<(usize, HashSet<String>)> = None;
    let mut changed = false;

    for line in text.split('\n') {
        if line.trim().is_empty() {
            output.push(line);
            continue;
        }

        if let Some(captures) = ORDERED_ITEM_RE.captures(line) {
            let indent = captures[1].len();
            current_item = Some((indent, sub_points(&captures[2])));
            output.push(line);
            continue;
        }

        if let (Some((item_indent, points)), Some(captures)) =
            (current_item.as_ref(), BULLET_ITEM_RE.captures(line))
        {
            if captures[1].len() > *item_indent {
                if points.contains(&normalize_point(&captures[2])) {
                    changed = true;
                    continue;
                }
                output.push(line);
                continue;
            }
        }

        let indent = line.len() - line.trim_start().len();
        if current_item
            .as_ref()
            .is_some_and(|(item_indent, _)| indent <= *item_indent)
        {
            current_item = None;
        }
        output.push(line);
    }

    if !changed {
        return text.to_string();
    }
    output.join("\n")
}

pub fn dedupe_content(text: &str) -> String {
    let collapsed = collapse_repeated_lines(text);
    let paragraphs = dedupe_paragraphs(&collapsed);
    remove_repeated_sub_bullets(&paragraphs)
}

pub fn dedupe_document(document: &Document) -> Document {
    Document {
        title: document.title.clone(),
        description: dedupe_content(&document.description),
        sections: document
            .sections
            .iter()
            .map(|section| Section {
                content: dedupe_content(&section.content),
                ..section.clone()
            })
            .collect(),
        last_updated: document.last_updated,
    }
}

fn split_paragraphs(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in text.split('\n') {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence && line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        current.push(line);
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }

    blocks
}

fn is_dedupe_exempt(block: &str) -> bool {
    let trimmed = block.trim();
    trimmed.starts_with("```")
        || trimmed.starts_with('#')
        || trimmed.starts_with('|')
        || HORIZONTAL_RULE_RE.is_match(trimmed)
        || trimmed.chars().count() < MIN_DUPLICATE_PARAGRAPH_CHARS
}

/// The item text itself plus each part split on `:`, `,`, `;` and ` and `.
fn sub_points(text: &str) -> HashSet<String> {
    let mut points: HashSet<String> = SUB_POINT_SPLIT_RE
        .split(text)
        .map(normalize_point)
        .filter(|point| point.chars().count() >= MIN_SUB_POINT_CHARS)
        .collect();
    points.insert(normalize_point(text));
    points
}

fn normalize_point(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|ch| !matches!(ch, '*' | '_' | '`'))
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .trim_end_matches(['.', ';', ':', ','])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: &str, title: &str, content: &str) -> Section {
        Section {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
        }
    }

    fn titles(sections: &[Section]) -> Vec<&str> {
        sections.iter().map(|section| section.title.as_str()).collect()
    }

    #[test]
    fn sorts_numbered_titles_first() {
        let mut sections = vec![
            section("a", "3. Risks", ""),
            section("b", "Appendix", ""),
            section("c", "1. Summary", ""),
            section("d", "2. Scope", ""),
        ];
        sort_by_numeric_prefix(&mut sections);
        assert_eq!(titles(&sections), vec!["1. Summary", "2. Scope", "3. Risks", "Appendix"]);
    }

    #[test]
    fn renumbers_after_deletion_and_rewrites_references() {
        let old = vec![
            section("a", "1. Intro", ""),
            section("b", "2. Scope", "Covers web."),
            section("c", "Appendix", "For details see Section 2 and section 1."),
        ];
        let remaining: Vec<Section> = old[1..].to_vec();

        let renumbered = renumber_after_deletion(&remaining);
        assert_eq!(titles(&renumbered), vec!["1. Scope", "Appendix"]);

        let rewritten = rewrite_cross_references(&renumbered, &old);
        assert_eq!(
            rewritten[1].content,
            "For details see Section 1 and section 1."
        );
    }

    #[test]
    fn renumber_map_joins_by_id_then_title() {
        let old = vec![section("a", "2. Scope", ""), section("b", "3. Risks", "")];
        let new = vec![section("a", "1. Scope", ""), section("z", "2. Risks", "")];
        let map = build_renumber_map(&old, &new);
        assert_eq!(map.get(&2), Some(&1));
        assert_eq!(map.get(&3), Some(&2));
    }

    #[test]
    fn list_markers_are_rewritten_only_when_they_name_a_section() {
        let old = vec![
            section("a", "1. Intro", ""),
            section("b", "2. Scope", ""),
            section("c", "3. Risks", "Outline:\n2. Scope of launch\n3. Ship it"),
        ];
        let remaining = renumber_after_deletion(&old[1..]);
        let rewritten = rewrite_cross_references(&remaining, &old);
        assert_eq!(rewritten[1].content, "Outline:\n1. Scope of launch\n3. Ship it");
    }

    #[test]
    fn delete_section_rewrites_description_too() {
        let document = Document {
            title: "Doc".to_string(),
            description: "Start with Section 3.".to_string(),
            sections: vec![
                section("a", "1. Intro", ""),
                section("b", "2. Scope", ""),
                section("c", "3. Risks", ""),
            ],
            last_updated: 0,
        };
        let updated = delete_section(&document, "b");
        assert_eq!(titles(&updated.sections), vec!["1. Intro", "2. Risks"]);
        assert_eq!(updated.description, "Start with Section 2.");
        assert_eq!(delete_section(&document, "missing"), document);
    }

    #[test]
    fn move_section_renumbers_in_new_order() {
        let document = Document {
            title: "Doc".to_string(),
            description: String::new(),
            sections: vec![
                section("a", "1. Intro", ""),
                section("b", "2. Scope", "Depends on Section 1."),
                section("c", "Appendix", ""),
            ],
            last_updated: 0,
        };
        let moved = move_section(&document, "b", 0);
        assert_eq!(titles(&moved.sections), vec!["1. Scope", "2. Intro", "Appendix"]);
        assert_eq!(moved.sections[0].content, "Depends on Section 2.");
    }

    #[test]
    fn collapses_stuttered_runs() {
        assert_eq!(collapse_repeated_lines("a\nb\na\nb\nc"), "a\nb\nc");
        assert_eq!(collapse_repeated_lines("same\nsame\nsame"), "same");
        assert_eq!(collapse_repeated_lines("x\n\n\ny"), "x\n\n\ny");
        assert_eq!(collapse_repeated_lines("```\nloop\nloop\n```"), "```\nloop\nloop\n```");
    }

    #[test]
    fn removes_near_duplicate_paragraphs() {
        let text = "The checkout flow has three steps.\n\nOther text here that is long.\n\nthe checkout  flow has THREE steps.";
        assert_eq!(
            dedupe_paragraphs(text),
            "The checkout flow has three steps.\n\nOther text here that is long."
        );
        assert_eq!(dedupe_paragraphs("---\n\nShort\n\n---\n\nShort"), "---\n\nShort\n\n---\n\nShort");
    }

    #[test]
    fn drops_sub_bullets_repeating_item_text() {
        let text = "1. Improve signup: fewer fields, social login\n   - Fewer fields\n   - Social login.\n   - Magic links\n2. Next";
        assert_eq!(
            remove_repeated_sub_bullets(text),
            "1. Improve signup: fewer fields, social login\n   - Magic links\n2. Next"
        );
    }

    #[test]
    fn keeps_sub_bullets_that_only_share_a_substring() {
        let text = "1. Ship the reporting dashboard\n   - Port\n   - Export to CSV";
        assert_eq!(remove_repeated_sub_bullets(text), text);
        assert_eq!(dedupe_content(text), text);

        let listed = "1. Checkout and payments\n   - Payments\n   - Pay";
        assert_eq!(remove_repeated_sub_bullets(listed), "1. Checkout and payments\n   - Pay");
    }
}

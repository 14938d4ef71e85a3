//! Canonical markdown to editor markup and back.
//!
//! Markup is the TipTap-flavoured HTML subset the rich-text editor reads and
//! writes. Both directions go through [`MarkupNode`] trees; any conversion
//! failure is logged and the caller gets its input back untouched.

mod from_markup;
mod node;
mod to_markup;

pub use from_markup::{nodes_to_markdown, render_inline};
pub use node::{
    decode_entities, escape_attribute, escape_text, parse_markup, render_markup, MarkupNode,
    MarkupVisitor, MAX_DEPTH, ROOT_TAG, TEXT_TAG,
};
pub use to_markup::{markdown_to_nodes, parse_inline, renumber_ordered_lists};

use crate::config::DEFAULT_TITLE;
use crate::error::DocResult;
use crate::types::{mint_section_id, now_ms, title_key, Document, Section};
use std::collections::HashSet;
use tracing::warn;

const SECTION_ID_ATTRIBUTE: &str = "data-section-id";

pub fn markdown_to_markup(markdown: &str) -> String {
    match markdown_to_nodes(markdown) {
        Ok(nodes) => render_markup(&nodes),
        Err(error) => {
            warn!(error = %error, "markdown to markup conversion failed");
            markdown.to_string()
        }
    }
}

pub fn markup_to_markdown(markup: &str) -> String {
    match try_markup_to_markdown(markup) {
        Ok(markdown) => markdown,
        Err(error) => {
            warn!(error = %error, "markup to markdown conversion failed");
            markup.to_string()
        }
    }
}

pub fn try_markup_to_markdown(markup: &str) -> DocResult<String> {
    let root = parse_markup(markup)?;
    Ok(nodes_to_markdown(&root.children))
}

/// `<h1>` title, description blocks, then `<h2 data-section-id>` plus content per section.
pub fn to_markup(document: &Document) -> String {
    let mut nodes = vec![MarkupNode::element(
        "h1",
        vec![MarkupNode::text(document.title.trim())],
    )];
    nodes.extend(content_nodes(&document.description));

    for section in &document.sections {
        nodes.push(
            MarkupNode::element("h2", vec![MarkupNode::text(section.title.trim())])
                .with_attribute(SECTION_ID_ATTRIBUTE, section.id.as_str()),
        );
        nodes.extend(content_nodes(&section.content));
    }

    render_markup(&nodes)
}

/// Reads an edited document back. The markup is authoritative: sections it no longer
/// contains were deleted. Ids come from `data-section-id`, then from a title match.
pub fn from_markup(markup: &str, existing: Option<&Document>) -> Document {
    match try_from_markup(markup, existing) {
        Ok(document) => document,
        Err(error) => {
            warn!(error = %error, "markup to document conversion failed");
            existing
                .cloned()
                .unwrap_or_else(|| Document::new(DEFAULT_TITLE))
        }
    }
}

pub fn try_from_markup(markup: &str, existing: Option<&Document>) -> DocResult<Document> {
    let root = parse_markup(markup)?;

    let mut title: Option<String> = None;
    let mut description: Vec<MarkupNode> = Vec::new();
    let mut drafts: Vec<(Option<String>, String, Vec<MarkupNode>)> = Vec::new();

    for node in root.children {
        let heading_text = node.text_content().trim().to_string();
        if node.tag == "h2" && !heading_text.is_empty() {
            let id = node.attr(SECTION_ID_ATTRIBUTE).map(str::to_string);
            drafts.push((id, heading_text, Vec::new()));
            continue;
        }
        if node.tag == "h1" && title.is_none() && drafts.is_empty() && !heading_text.is_empty() {
            title = Some(heading_text);
            continue;
        }
        match drafts.last_mut() {
            Some((_, _, content)) => content.push(node),
            None => description.push(node),
        }
    }

    let mut used: HashSet<String> = HashSet::new();
    let sections: Vec<Section> = drafts
        .into_iter()
        .map(|(id, title, content)| {
            let id = resolve_section_id(id, &title, existing, &used);
            used.insert(id.clone());
            Section {
                id,
                title,
                content: nodes_to_markdown(&content),
            }
        })
        .collect();

    let document = Document {
        title: title
            .or_else(|| existing.map(|document| document.title.clone()))
            .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        description: nodes_to_markdown(&description),
        sections,
        last_updated: now_ms(),
    };

    if let Some(existing) = existing {
        if existing.same_content(&document) {
            return Ok(existing.clone());
        }
    }
    Ok(document)
}

/// Without a baseline the markup ids are trusted as-is.
fn resolve_section_id(
    candidate: Option<String>,
    title: &str,
    existing: Option<&Document>,
    used: &HashSet<String>,
) -> String {
    let available = |id: &str| !id.is_empty() && !used.contains(id);

    if let Some(id) = candidate.filter(|id| available(id)) {
        let known = existing.is_none_or(|document| document.section_by_id(&id).is_some());
        if known {
            return id;
        }
    }

    let key = title_key(title);
    existing
        .and_then(|document| {
            document
                .sections
                .iter()
                .find(|section| section.title_key() == key && available(&section.id))
        })
        .map(|section| section.id.clone())
        .unwrap_or_else(mint_section_id)
}

fn content_nodes(markdown: &str) -> Vec<MarkupNode> {
    if markdown.trim().is_empty() {
        return Vec::new();
    }
    match markdown_to_nodes(markdown) {
        Ok(nodes) => nodes,
        Err(error) => {
            warn!(error = %error, "section content kept as plain text");
            vec![MarkupNode::element("p", vec![MarkupNode::text(markdown)])]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document {
            title: "Checkout Revamp".to_string(),
            description: "A faster *checkout* with [docs](https://example.com/docs).".to_string(),
            sections: vec![
                Section::new("1. Goals", "- Cut steps\n  - Remove coupon box\n- Add **Apple Pay**"),
                Section::new(
                    "2. Plan",
                    "| Step | Owner |\n| --- | --- |\n| Build | Web |\n\n```rust\nfn main() {}\n```",
                ),
                Section::new("Appendix", "1. First\n2. Second\n   - Detail"),
            ],
            last_updated: 5,
        }
    }

    #[test]
    fn document_round_trips_through_markup() {
        let document = sample();
        let markup = to_markup(&document);
        assert!(markup.starts_with("<h1>Checkout Revamp</h1>"));
        let heading = format!("<h2 data-section-id=\"{}\">1. Goals</h2>", document.sections[0].id);
        assert!(markup.contains(&heading));
        assert_eq!(from_markup(&markup, Some(&document)), document);
    }

    #[test]
    fn markup_is_authoritative_for_deletions_and_ids() {
        let document = sample();
        let edited = format!(
            "<h1>Checkout Revamp</h1><h2 data-section-id=\"{}\">2. Plan</h2><p>Rewritten.</p><h2>appendix</h2><p>New.</p><h2>Risks</h2>",
            document.sections[1].id
        );
        let updated = from_markup(&edited, Some(&document));

        assert_eq!(updated.sections.len(), 3);
        assert_eq!(updated.sections[0].id, document.sections[1].id);
        assert_eq!(updated.sections[0].content, "Rewritten.");
        assert_eq!(updated.sections[1].id, document.sections[2].id);
        assert!(document.section_by_id(&updated.sections[2].id).is_none());
        assert_eq!(updated.description, "");
    }

    #[test]
    fn unknown_ids_are_not_trusted_against_a_baseline() {
        let document = sample();
        let updated = from_markup("<h2 data-section-id=\"sec_forged\">Goals</h2>", Some(&document));
        assert_ne!(updated.sections[0].id, "sec_forged");
        assert_eq!(updated.title, document.title);
    }

    #[test]
    fn conversion_failure_returns_original_input() {
        let broken = "<p>unterminated <strong";
        assert_eq!(markup_to_markdown(broken), broken);
        let document = sample();
        assert_eq!(from_markup("<p>x</section>", Some(&document)), document);
        assert_eq!(from_markup("<p>x</section>", None).title, DEFAULT_TITLE);
    }

    #[test]
    fn markdown_round_trip_keeps_structure() {
        let markdown = "- Item one\n  - Nested **bold** and [link](https://x.io)\n- Item *two*\n\n1. First\n2. Second\n   - Sub\n\n| A | B |\n| --- | --- |\n| 1 | 2 |";
        assert_eq!(markup_to_markdown(&markdown_to_markup(markdown)), markdown);

        for broken in ["- first line  \n  second line\n- next", "- [x] done  \n      later"] {
            assert_eq!(markup_to_markdown(&markdown_to_markup(broken)), broken);
        }
    }
}

use crate::config::ResolvedOptions;
use crate::error::{DocError, DocResult};
use crate::normalize::sort_by_numeric_prefix;
use crate::parser::parse_partial_with;
use crate::types::{mint_section_id, now_ms, title_key, CandidateDocument, Document, Section};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub preserved: usize,
    pub updated: usize,
    pub inserted: usize,
}

/// Reconciles a candidate with the persisted document. Sections missing from the
/// candidate are kept as they are; matching titles keep their ids.
pub fn merge_documents(
    candidate: &CandidateDocument,
    existing: Option<&Document>,
    options: &ResolvedOptions,
) -> DocResult<(Document, MergeStats)> {
    if candidate.is_degenerate() {
        return Err(DocError::MalformedInput(
            "candidate has neither a title heading nor section headings".to_string(),
        ));
    }

    let title = candidate
        .resolved_title()
        .map(str::to_string)
        .or_else(|| existing.map(|document| document.title.clone()))
        .unwrap_or_else(|| options.default_title.clone());

    let description = if candidate.description.trim().is_empty() {
        existing
            .map(|document| document.description.clone())
            .unwrap_or_default()
    } else {
        candidate.description.clone()
    };

    let existing_sections = existing.map_or(&[][..], |document| document.sections.as_slice());
    let candidate_by_key: HashMap<String, usize> = candidate
        .sections
        .iter()
        .enumerate()
        .map(|(index, section)| (title_key(&section.title), index))
        .collect();

    let mut stats = MergeStats::default();
    let mut matched: HashSet<String> = HashSet::new();
    let mut sections: Vec<Section> =
        Vec::with_capacity(existing_sections.len() + candidate.sections.len());

    for section in existing_sections {
        let key = section.title_key();
        let update = candidate_by_key
            .get(&key)
            .filter(|_| !matched.contains(&key))
            .map(|index| &candidate.sections[*index]);

        match update {
            Some(update) => {
                // An update that has not streamed any body yet never blanks stored content.
                let keep_existing =
                    update.content.trim().is_empty() && !section.content.trim().is_empty();
                let content = if keep_existing {
                    section.content.clone()
                } else {
                    update.content.clone()
                };
                sections.push(Section {
                    id: section.id.clone(),
                    title: update.title.clone(),
                    content,
                });
                matched.insert(key);
                stats.updated += 1;
            }
            None => {
                sections.push(section.clone());
                stats.preserved += 1;
            }
        }
    }

    for (index, update) in candidate.sections.iter().enumerate() {
        let key = title_key(&update.title);
        if matched.contains(&key) {
            continue;
        }
        let position = insertion_point(&sections, candidate, index);
        sections.insert(
            position,
            Section {
                id: mint_section_id(),
                title: update.title.clone(),
                content: update.content.clone(),
            },
        );
        matched.insert(key);
        stats.inserted += 1;
    }

    sort_by_numeric_prefix(&mut sections);

    let merged = Document {
        title,
        description,
        sections,
        last_updated: now_ms(),
    };

    if let Some(existing) = existing {
        if existing.same_content(&merged) {
            return Ok((existing.clone(), stats));
        }
    }

    Ok((merged, stats))
}

/// Falls back to `existing` on any failure; a bad parse never blanks stored work.
pub fn merge_candidate(
    candidate: &CandidateDocument,
    existing: Option<&Document>,
    options: &ResolvedOptions,
) -> Option<Document> {
    match merge_documents(candidate, existing, options) {
        Ok((document, stats)) => {
            debug!(
                preserved = stats.preserved,
                updated = stats.updated,
                inserted = stats.inserted,
                elided = candidate.elided_titles.len(),
                "merged candidate into document"
            );
            Some(document)
        }
        Err(DocError::MalformedInput(reason)) => {
            debug!(%reason, "ignoring candidate without structure");
            existing.cloned()
        }
        Err(error) => {
            warn!(error = %error, "merge failed; keeping existing document");
            existing.cloned()
        }
    }
}

pub fn merge_markdown(markdown: &str, existing: Option<&Document>) -> Option<Document> {
    merge_markdown_with(markdown, existing, &ResolvedOptions::default())
}

pub fn merge_markdown_with(
    markdown: &str,
    existing: Option<&Document>,
    options: &ResolvedOptions,
) -> Option<Document> {
    let fallback_title = existing.map(|document| document.title.as_str());
    let candidate = parse_partial_with(markdown, fallback_title, options);
    merge_candidate(&candidate, existing, options)
}

/// New sections land after the nearest earlier candidate section already placed,
/// else before the nearest later one, else at the end.
fn insertion_point(sections: &[Section], candidate: &CandidateDocument, index: usize) -> usize {
    let position_of = |candidate_index: usize| {
        let key = title_key(&candidate.sections[candidate_index].title);
        sections.iter().position(|section| section.title_key() == key)
    };

    if let Some(position) = (0..index).rev().find_map(position_of) {
        return position + 1;
    }
    if let Some(position) = (index + 1..candidate.sections.len()).find_map(position_of) {
        return position;
    }
    sections.len()
}

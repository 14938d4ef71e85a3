pub mod config;
pub mod error;
pub mod logging;
pub mod markup;
pub mod merge;
pub mod normalize;
pub mod parser;
pub mod placeholder;
pub mod recovery;
pub mod types;

use std::collections::HashMap;

use napi::bindgen_prelude::Result;
use napi_derive::napi;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use config::{EngineOptions, ResolvedOptions};
pub use error::{DocError, DocResult};
pub use markup::{from_markup, markdown_to_markup, markup_to_markdown, to_markup};
pub use merge::{merge_documents, merge_markdown, merge_markdown_with, MergeStats};
pub use normalize::{
    build_renumber_map, dedupe_content, dedupe_document, delete_section, move_section,
    renumber_after_deletion, rewrite_cross_references, sort_by_numeric_prefix,
};
pub use parser::{
    extract_block, parse_partial, parse_partial_raw, parse_partial_with, ExtractedBlock,
};
pub use placeholder::{
    is_placeholder, match_placeholder, strip_placeholders, ConfidenceTier, PlaceholderMatch,
};
pub use recovery::{
    is_complete, process_stream_text, recover, DocumentStream, JsonFileSnapshotStore,
    MemorySnapshotStore, SnapshotStore, StreamUpdate,
};
pub use types::{CandidateDocument, CandidateSection, Document, Section};

fn to_napi_error(error: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(error.to_string())
}

fn parse_input<T: DeserializeOwned>(value: Value, label: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|error| to_napi_error(format!("Invalid {label}: {error}")))
}

fn parse_optional_document(value: Option<Value>) -> Result<Option<Document>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_input::<Document>(value, "document").map(Some),
    }
}

#[napi(js_name = "parsePartial")]
pub fn parse_partial_binding(
    text: String,
    fallback_title: Option<String>,
    options: Option<Value>,
) -> Result<Value> {
    let options = ResolvedOptions::from_value(options);
    let candidate = parse_partial_with(&text, fallback_title.as_deref(), &options);
    serde_json::to_value(candidate).map_err(to_napi_error)
}

/// Editor-authored markdown: nothing is treated as generator filler.
#[napi(js_name = "parseEditorMarkdown")]
pub fn parse_editor_markdown(markdown: String, fallback_title: Option<String>) -> Result<Value> {
    let candidate = parse_partial_raw(&markdown, fallback_title.as_deref());
    serde_json::to_value(candidate).map_err(to_napi_error)
}

#[napi(js_name = "classifyPlaceholder")]
pub fn classify_placeholder(line: String) -> bool {
    is_placeholder(&line)
}

#[napi(js_name = "matchPlaceholder")]
pub fn match_placeholder_binding(line: String) -> Result<Value> {
    serde_json::to_value(match_placeholder(&line)).map_err(to_napi_error)
}

#[napi(js_name = "stripPlaceholders")]
pub fn strip_placeholders_binding(text: String) -> String {
    strip_placeholders(&text)
}

#[napi(js_name = "merge")]
pub fn merge_binding(
    candidate_markdown: String,
    existing: Option<Value>,
    options: Option<Value>,
) -> Result<Value> {
    let existing = parse_optional_document(existing)?;
    let options = ResolvedOptions::from_value(options);
    let merged = merge_markdown_with(&candidate_markdown, existing.as_ref(), &options);
    serde_json::to_value(merged).map_err(to_napi_error)
}

#[napi(js_name = "toMarkup")]
pub fn to_markup_binding(document: Value) -> Result<String> {
    let document = parse_input::<Document>(document, "document")?;
    Ok(to_markup(&document))
}

#[napi(js_name = "fromMarkup")]
pub fn from_markup_binding(markup: String, existing: Option<Value>) -> Result<Value> {
    let existing = parse_optional_document(existing)?;
    serde_json::to_value(from_markup(&markup, existing.as_ref())).map_err(to_napi_error)
}

#[napi(js_name = "markdownToMarkup")]
pub fn markdown_to_markup_binding(markdown: String) -> String {
    markdown_to_markup(&markdown)
}

#[napi(js_name = "markupToMarkdown")]
pub fn markup_to_markdown_binding(markup: String) -> String {
    markup_to_markdown(&markup)
}

#[napi(js_name = "toMarkdown")]
pub fn to_markdown_binding(document: Value) -> Result<String> {
    let document = parse_input::<Document>(document, "document")?;
    Ok(document.to_markdown())
}

#[napi(js_name = "sortByNumericPrefix")]
pub fn sort_by_numeric_prefix_binding(sections: Value) -> Result<Value> {
    let mut sections = parse_input::<Vec<Section>>(sections, "sections")?;
    sort_by_numeric_prefix(&mut sections);
    serde_json::to_value(sections).map_err(to_napi_error)
}

#[napi(js_name = "renumberAfterDeletion")]
pub fn renumber_after_deletion_binding(sections: Value) -> Result<Value> {
    let sections = parse_input::<Vec<Section>>(sections, "sections")?;
    serde_json::to_value(renumber_after_deletion(&sections)).map_err(to_napi_error)
}

#[napi(js_name = "rewriteCrossReferences")]
pub fn rewrite_cross_references_binding(sections: Value, old_sections: Value) -> Result<Value> {
    let sections = parse_input::<Vec<Section>>(sections, "sections")?;
    let old_sections = parse_input::<Vec<Section>>(old_sections, "old sections")?;
    serde_json::to_value(rewrite_cross_references(&sections, &old_sections)).map_err(to_napi_error)
}

#[napi(js_name = "deleteSection")]
pub fn delete_section_binding(document: Value, section_id: String) -> Result<Value> {
    let document = parse_input::<Document>(document, "document")?;
    serde_json::to_value(delete_section(&document, &section_id)).map_err(to_napi_error)
}

#[napi(js_name = "moveSection")]
pub fn move_section_binding(document: Value, section_id: String, to_index: u32) -> Result<Value> {
    let document = parse_input::<Document>(document, "document")?;
    let moved = move_section(&document, &section_id, to_index as usize);
    serde_json::to_value(moved).map_err(to_napi_error)
}

#[napi(js_name = "dedupeContent")]
pub fn dedupe_content_binding(text: String) -> String {
    dedupe_content(&text)
}

#[napi(js_name = "initLogging")]
pub fn init_logging(level: Option<String>) -> bool {
    logging::init(level.as_deref())
}

#[napi(js_name = "drainLogs")]
pub fn drain_logs() -> Result<Value> {
    serde_json::to_value(logging::drain()).map_err(to_napi_error)
}

/// One stream per document kind, each backed by its own in-memory slot.
#[napi(js_name = "DocumentStreamEngine")]
pub struct DocumentStreamEngineBinding {
    options: ResolvedOptions,
    streams: HashMap<String, DocumentStream<MemorySnapshotStore>>,
}

#[napi]
impl DocumentStreamEngineBinding {
    #[napi(constructor)]
    pub fn new(options: Option<Value>) -> Result<Self> {
        let options = match options {
            Some(Value::Null) | None => ResolvedOptions::from_env(),
            Some(value) => {
                let parsed = parse_input::<EngineOptions>(value, "engine options")?;
                ResolvedOptions::from_options(Some(parsed))
            }
        };
        if let Some(level) = options.log_level.as_deref() {
            logging::init(Some(level));
        }
        Ok(Self {
            options,
            streams: HashMap::new(),
        })
    }

    #[napi]
    pub fn ingest(&mut self, kind: String, text: String, finished: Option<bool>) -> Result<Value> {
        let update = self.stream(&kind).ingest(&text, finished.unwrap_or(false));
        serde_json::to_value(update).map_err(to_napi_error)
    }

    #[napi(js_name = "getSnapshot")]
    pub fn get_snapshot(&self, kind: String) -> Result<Value> {
        let snapshot = self.streams.get(&kind).and_then(DocumentStream::snapshot);
        serde_json::to_value(snapshot).map_err(to_napi_error)
    }

    #[napi(js_name = "setSnapshot")]
    pub fn set_snapshot(&mut self, kind: String, document: Value) -> Result<()> {
        let document = parse_input::<Document>(document, "document")?;
        let stream = self.stream(&kind);
        stream.store_mut().save(&kind, &document).map_err(to_napi_error)?;
        stream.reset();
        Ok(())
    }

    #[napi(js_name = "clearSnapshot")]
    pub fn clear_snapshot(&mut self, kind: String) {
        if let Some(stream) = self.streams.get_mut(&kind) {
            stream.store_mut().remove(&kind);
            stream.reset();
        }
    }
}

impl DocumentStreamEngineBinding {
    fn stream(&mut self, kind: &str) -> &mut DocumentStream<MemorySnapshotStore> {
        let options = &self.options;
        self.streams
            .entry(kind.to_string())
            .or_insert_with(|| {
                DocumentStream::new(kind, MemorySnapshotStore::new(), options.clone())
            })
    }
}

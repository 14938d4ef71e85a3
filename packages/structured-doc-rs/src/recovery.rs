use crate::config::ResolvedOptions;
use crate::error::{DocError, DocResult};
use crate::merge::merge_markdown_with;
use crate::normalize::dedupe_document;
use crate::parser::{extract_block, outline_stats};
use crate::placeholder::{is_mostly_placeholder, placeholder_line_counts, strip_placeholders};
use crate::types::{now_ms, trim_block, Document};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The only storage access point: one persisted document per document kind.
pub trait SnapshotStore {
    fn load(&self, kind: &str) -> DocResult<Option<Document>>;
    fn save(&mut self, kind: &str, document: &Document) -> DocResult<()>;
}

#[derive(Clone, Debug, Default)]
pub struct MemorySnapshotStore {
    slots: HashMap<String, Document>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&mut self, kind: &str) -> Option<Document> {
        self.slots.remove(kind)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, kind: &str) -> DocResult<Option<Document>> {
        Ok(self.slots.get(kind).cloned())
    }

    fn save(&mut self, kind: &str, document: &Document) -> DocResult<()> {
        self.slots.insert(kind.to_string(), document.clone());
        Ok(())
    }
}

/// Stores each slot as `<dir>/<kind>.json`.
#[derive(Clone, Debug)]
pub struct JsonFileSnapshotStore {
    dir: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, kind: &str) -> DocResult<PathBuf> {
        let valid = !kind.is_empty()
            && kind
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !valid {
            return Err(DocError::StorageUnavailable(format!("invalid slot kind: {kind:?}")));
        }
        Ok(self.dir.join(format!("{kind}.json")))
    }

    fn read_slot(&self, kind: &str) -> DocResult<Option<Document>> {
        let path = self.slot_path(kind)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write_slot(&self, kind: &str, document: &Document) -> DocResult<()> {
        let path = self.slot_path(kind)?;
        fs::create_dir_all(&self.dir)?;
        let serialized = serde_json::to_string_pretty(document)?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serialized)?;
        fs::rename(staging, path)?;
        Ok(())
    }
}

impl SnapshotStore for JsonFileSnapshotStore {
    fn load(&self, kind: &str) -> DocResult<Option<Document>> {
        self.read_slot(kind).map_err(DocError::into_storage)
    }

    fn save(&mut self, kind: &str, document: &Document) -> DocResult<()> {
        self.write_slot(kind, document).map_err(DocError::into_storage)
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamUpdate {
    /// What the editor should show for this tick.
    pub markdown: String,
    pub document: Option<Document>,
    pub complete: bool,
    pub recovered: bool,
    pub closed: bool,
}

/// A title heading plus enough real section headings, and not mostly filler.
pub fn is_complete(body: &str, options: &ResolvedOptions) -> bool {
    ensure_complete(body, options).is_ok()
}

fn ensure_complete(body: &str, options: &ResolvedOptions) -> DocResult<()> {
    if is_mostly_placeholder(body, options.placeholder_threshold) {
        return Err(DocError::IncompleteStream("block is mostly placeholder lines".to_string()));
    }
    let stats = outline_stats(body);
    if !stats.has_title {
        return Err(DocError::IncompleteStream("no title heading yet".to_string()));
    }
    if stats.section_count < options.min_complete_sections {
        return Err(DocError::IncompleteStream(format!(
            "{} of {} section headings",
            stats.section_count, options.min_complete_sections
        )));
    }
    Ok(())
}

/// Merges a partial block onto the last good snapshot and returns the merged document.
pub fn recover(
    body: &str,
    existing: Option<&Document>,
    options: &ResolvedOptions,
) -> Option<Document> {
    merge_markdown_with(body, existing, options)
}

/// One tick of the stream: extract, merge against the stored slot, persist, and pick
/// what to display. Returns `None` until the opening marker has arrived.
pub fn process_stream_text<S: SnapshotStore + ?Sized>(
    text: &str,
    kind: &str,
    finished: bool,
    store: &mut S,
    options: &ResolvedOptions,
) -> Option<StreamUpdate> {
    let block = extract_block(text, options)?;
    let closed = block.closed || finished;
    let settled = settled_body(&block.body, closed);
    let shown = display_body(&block.body, closed);
    let (placeholder_lines, _) = placeholder_line_counts(shown);

    let direct = match ensure_complete(shown, options) {
        Ok(()) if placeholder_lines == 0 => true,
        Ok(()) => {
            debug!(kind, placeholder_lines, "complete block carries elisions; recovering");
            false
        }
        Err(reason) => {
            debug!(kind, %reason, "recovering from last snapshot");
            false
        }
    };

    let existing = match store.load(kind) {
        Ok(document) => document,
        Err(error) => {
            warn!(kind, error = %error, "snapshot load failed; merging without a baseline");
            None
        }
    };

    // Only complete lines are persisted; a half-written line may be the start of a placeholder.
    let mut merged = recover(settled, existing.as_ref(), options);
    if finished && options.dedupe_on_finish {
        merged = merged.map(|document| {
            let deduped = dedupe_document(&document);
            if deduped.same_content(&document) {
                document
            } else {
                Document {
                    last_updated: now_ms(),
                    ..deduped
                }
            }
        });
    }

    if let Some(document) = merged.as_ref() {
        let changed = existing.as_ref() != Some(document);
        if changed {
            if let Err(error) = store.save(kind, document) {
                warn!(kind, error = %error, "snapshot save failed");
            }
        }
    }

    let markdown = if direct {
        format!("{}\n", trim_block(shown))
    } else {
        let preview = if shown.len() > settled.len() {
            recover(shown, merged.as_ref(), options)
        } else {
            merged.clone()
        };
        match preview {
            Some(document) => document.to_markdown(),
            None => strip_placeholders(shown),
        }
    };

    Some(StreamUpdate {
        markdown,
        document: merged,
        complete: direct,
        recovered: !direct,
        closed,
    })
}

/// The body up to its last line break while the block is still open.
fn settled_body(body: &str, closed: bool) -> &str {
    if closed {
        return body;
    }
    match body.rfind('\n') {
        Some(end) => &body[..=end],
        None => "",
    }
}

/// Hides a trailing fragment that is a heading or an opened bracket still being written.
fn display_body(body: &str, closed: bool) -> &str {
    if closed || body.ends_with('\n') {
        return body;
    }
    let start = body.rfind('\n').map_or(0, |index| index + 1);
    if is_unsettled_fragment(&body[start..]) {
        &body[..start]
    } else {
        body
    }
}

fn is_unsettled_fragment(line: &str) -> bool {
    let trimmed = line.trim_start();
    let unclosed = |open: char, close: char| trimmed.starts_with(open) && !trimmed.contains(close);
    trimmed.starts_with('#')
        || unclosed('[', ']')
        || unclosed('(', ')')
        || unclosed('<', '>')
        || unclosed('{', '}')
        || (!trimmed.is_empty() && trimmed.chars().all(|ch| ch == '.' || ch == '\u{2026}'))
}

/// Per-turn driver that skips ticks whose text has not changed.
pub struct DocumentStream<S: SnapshotStore> {
    kind: String,
    store: S,
    options: ResolvedOptions,
    last_text: String,
    last_finished: bool,
    last_update: Option<StreamUpdate>,
}

impl<S: SnapshotStore> DocumentStream<S> {
    pub fn new(kind: impl Into<String>, store: S, options: ResolvedOptions) -> Self {
        Self {
            kind: kind.into(),
            store,
            options,
            last_text: String::new(),
            last_finished: false,
            last_update: None,
        }
    }

    pub fn ingest(&mut self, text: &str, finished: bool) -> Option<StreamUpdate> {
        if self.last_update.is_some() && text == self.last_text && finished == self.last_finished {
            return self.last_update.clone();
        }

        let update =
            process_stream_text(text, &self.kind, finished, &mut self.store, &self.options);
        self.last_text = text.to_string();
        self.last_finished = finished;
        self.last_update = update.clone();
        update
    }

    /// Forget the previous turn; the stored slot is kept.
    pub fn reset(&mut self) {
        self.last_text.clear();
        self.last_finished = false;
        self.last_update = None;
    }

    pub fn snapshot(&self) -> Option<Document> {
        self.store.load(&self.kind).ok().flatten()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    impl SnapshotStore for FailingStore {
        fn load(&self, _kind: &str) -> DocResult<Option<Document>> {
            Err(DocError::StorageUnavailable("offline".to_string()))
        }

        fn save(&mut self, _kind: &str, _document: &Document) -> DocResult<()> {
            Err(DocError::StorageUnavailable("offline".to_string()))
        }
    }

    fn wrap(body: &str, closed: bool) -> String {
        let options = ResolvedOptions::default();
        if closed {
            format!("Here you go.\n{}\n{}\n{}", options.start_marker, body, options.end_marker)
        } else {
            format!("Here you go.\n{}\n{}", options.start_marker, body)
        }
    }

    #[test]
    fn completeness_needs_title_and_two_sections() {
        let options = ResolvedOptions::default();
        assert!(is_complete("# Doc\n\n## A\n\nx\n\n## B\n\ny", &options));
        assert!(!is_complete("# Doc\n\n## A\n\nx", &options));
        assert!(!is_complete("## A\n\n## B", &options));
        let filler = "# Doc\n\n## A\n\n## B\n\n[unchanged]\n\n[unchanged]\n\n...\n\n[rest unchanged]\n\n[same as before]";
        assert!(!is_complete(filler, &options));
    }

    #[test]
    fn no_marker_means_no_update() {
        let mut store = MemorySnapshotStore::new();
        let options = ResolvedOptions::default();
        assert!(process_stream_text("Thinking...", "prd", false, &mut store, &options).is_none());
        assert!(store.load("prd").unwrap().is_none());
    }

    #[test]
    fn incomplete_block_is_recovered_from_snapshot() {
        let mut store = MemorySnapshotStore::new();
        let options = ResolvedOptions::default();
        let first = wrap("# Doc\n\n## Goals\n\nShip v1\n\n## Scope\n\nWeb", true);
        let initial = process_stream_text(&first, "prd", true, &mut store, &options).unwrap();
        assert!(initial.complete);
        assert!(!initial.recovered);

        let partial = wrap("# Doc\n\n## Scope\n\nWeb and i", false);
        let update = process_stream_text(&partial, "prd", false, &mut store, &options).unwrap();
        assert!(update.recovered);
        assert!(!update.closed);
        assert_eq!(
            update.markdown,
            "# Doc\n\n## Goals\n\nShip v1\n\n## Scope\n\nWeb and i\n"
        );
    }

    #[test]
    fn half_written_lines_are_not_persisted() {
        let mut store = MemorySnapshotStore::new();
        let options = ResolvedOptions::default();
        let first = wrap("# Doc\n\n## Goals\n\nShip v1\n\n## Scope\n\nWeb", true);
        process_stream_text(&first, "prd", true, &mut store, &options).unwrap();

        let partial = wrap("# Doc\n\n## Goals\n\n[Section rem", false);
        let update = process_stream_text(&partial, "prd", false, &mut store, &options).unwrap();
        assert!(!update.markdown.contains("[Section"));
        assert_eq!(store.load("prd").unwrap().unwrap().sections[0].content, "Ship v1");

        let heading = wrap("# Doc\n\n## Goals\n\nShip v1\n\n## Sco", false);
        process_stream_text(&heading, "prd", false, &mut store, &options).unwrap();
        let titles: Vec<String> = store
            .load("prd")
            .unwrap()
            .unwrap()
            .sections
            .into_iter()
            .map(|section| section.title)
            .collect();
        assert_eq!(titles, vec!["Goals", "Scope"]);
    }

    #[test]
    fn storage_failures_degrade_to_no_baseline() {
        let mut store = FailingStore;
        let options = ResolvedOptions::default();
        let text = wrap("# Doc\n\n## Goals\n\nShip v1", false);
        let update = process_stream_text(&text, "prd", false, &mut store, &options).unwrap();
        let document = update.document.unwrap();
        assert_eq!(document.title, "Doc");
        assert_eq!(document.sections.len(), 1);
    }

    #[test]
    fn finished_stream_dedupes_before_saving() {
        let mut store = MemorySnapshotStore::new();
        let options = ResolvedOptions::default();
        let text = wrap(
            "# Doc\n\n## Goals\n\nShip the new checkout flow.\n\nShip the new checkout flow.\n\n## Scope\n\nWeb",
            false,
        );
        let update = process_stream_text(&text, "prd", true, &mut store, &options).unwrap();
        assert!(update.closed);
        let saved = store.load("prd").unwrap().unwrap();
        assert_eq!(saved.sections[0].content, "Ship the new checkout flow.");
    }

    #[test]
    fn stream_driver_skips_unchanged_ticks() {
        let mut stream =
            DocumentStream::new("ticket", MemorySnapshotStore::new(), ResolvedOptions::default());
        let text = wrap("# Bug\n\n## Steps\n\n1. Open app", false);
        let first = stream.ingest(&text, false).unwrap();
        let again = stream.ingest(&text, false).unwrap();
        assert_eq!(first, again);
        assert_eq!(stream.snapshot().unwrap().sections.len(), 1);
    }

    #[test]
    fn cleared_slot_starts_the_next_turn_fresh() {
        let mut stream =
            DocumentStream::new("prd", MemorySnapshotStore::new(), ResolvedOptions::default());
        stream.ingest(&wrap("# Doc\n\n## Goals\n\nShip v1\n\n## Scope\n\nWeb", true), true);
        assert!(stream.store_mut().remove("prd").is_some());
        stream.reset();
        assert!(stream.snapshot().is_none());

        let update = stream.ingest(&wrap("# Doc\n\n## Scope\n\nMobile", true), true).unwrap();
        let titles: Vec<String> = update
            .document
            .unwrap()
            .sections
            .into_iter()
            .map(|section| section.title)
            .collect();
        assert_eq!(titles, vec!["Scope"]);
    }

    #[test]
    fn json_file_store_persists_slots() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileSnapshotStore::new(dir.path().join("snapshots"));
        assert!(store.load("prd").unwrap().is_none());

        let mut document = Document::new("Doc");
        document.description = "Intro".to_string();
        store.save("prd", &document).unwrap();

        let reopened = JsonFileSnapshotStore::new(store.dir().to_path_buf());
        assert_eq!(reopened.load("prd").unwrap(), Some(document));
        assert!(matches!(
            reopened.load("../escape"),
            Err(DocError::StorageUnavailable(_))
        ));
    }

    #[test]
    fn corrupt_slot_is_storage_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("prd.json"), "{not json").unwrap();
        let store = JsonFileSnapshotStore::new(dir.path());
        assert!(matches!(store.load("prd"), Err(DocError::StorageUnavailable(_))));
    }
}

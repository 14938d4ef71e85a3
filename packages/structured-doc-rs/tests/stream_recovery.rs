use structured_doc_rs::{
    DocumentStream, MemorySnapshotStore, ResolvedOptions, Section, SnapshotStore,
};

const FIRST_TURN: &str = "Here is the first draft.
[[DOCUMENT_START]]
# Checkout Revamp

A faster checkout.

## 1. Goals

Reduce checkout time to under a minute.

## 2. Scope

Web only.

## 3. Risks

Payment provider latency.
[[DOCUMENT_END]]
Let me know what to change.";

const SECOND_TURN: &str = "Updating the scope.
[[DOCUMENT_START]]
# Checkout Revamp

## 1. Goals

[Section 1 remains unchanged]

## 2. Scope

Web and mobile web.
[[DOCUMENT_END]]";

const THIRD_TURN: &str = "Final version.
[[DOCUMENT_START]]
# Checkout Revamp

A faster checkout.

## 1. Goals

Reduce checkout time to under a minute.

## 2. Scope

Web and mobile web.

## 3. Risks

Payment provider latency.

Fraud checks.
[[DOCUMENT_END]]";

fn stream() -> DocumentStream<MemorySnapshotStore> {
    DocumentStream::new("prd", MemorySnapshotStore::new(), ResolvedOptions::default())
}

fn ids(sections: &[Section]) -> Vec<String> {
    sections.iter().map(|section| section.id.clone()).collect()
}

fn prefixes(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .map(|(index, _)| &text[..index])
        .chain(std::iter::once(text))
}

#[test]
fn first_complete_turn_is_shown_verbatim() {
    let mut stream = stream();
    let update = stream.ingest(FIRST_TURN, true).unwrap();
    assert!(update.complete);
    assert!(update.closed);
    assert!(update.markdown.starts_with("# Checkout Revamp\n\nA faster checkout.\n\n## 1. Goals"));

    let stored = stream.snapshot().unwrap();
    let titles: Vec<&str> = stored.sections.iter().map(|section| section.title.as_str()).collect();
    assert_eq!(titles, vec!["1. Goals", "2. Scope", "3. Risks"]);
    assert_eq!(stored.description, "A faster checkout.");
}

#[test]
fn elided_turn_never_loses_stored_sections_mid_stream() {
    let mut stream = stream();
    stream.ingest(FIRST_TURN, true).unwrap();
    let baseline = stream.snapshot().unwrap();

    for prefix in prefixes(SECOND_TURN) {
        let update = stream.ingest(prefix, false);
        let stored = stream.snapshot().unwrap();

        assert_eq!(ids(&stored.sections), ids(&baseline.sections), "prefix {prefix:?}");
        assert_eq!(stored.sections[0].content, baseline.sections[0].content);
        assert_eq!(stored.sections[2].content, baseline.sections[2].content);
        assert!(
            ["Web only.", "Web and mobile web."].contains(&stored.sections[1].content.as_str()),
            "prefix {prefix:?} stored {:?}",
            stored.sections[1].content
        );
        if let Some(update) = update {
            assert!(!update.markdown.contains("remains unchanged"), "prefix {prefix:?}");
        }
    }

    let update = stream.ingest(SECOND_TURN, true).unwrap();
    assert!(update.recovered);
    assert!(update.markdown.contains("Reduce checkout time to under a minute."));
    assert!(update.markdown.contains("Web and mobile web."));
    assert!(update.markdown.contains("Payment provider latency."));
    assert_eq!(stream.snapshot().unwrap().description, "A faster checkout.");
}

#[test]
fn three_turns_end_on_the_final_content_with_original_ids() {
    let mut stream = stream();
    stream.ingest(FIRST_TURN, true).unwrap();
    let original_ids = ids(&stream.snapshot().unwrap().sections);

    stream.ingest(SECOND_TURN, true).unwrap();
    let last = stream.ingest(THIRD_TURN, true).unwrap();
    assert!(last.complete);

    let stored = stream.snapshot().unwrap();
    assert_eq!(ids(&stored.sections), original_ids);
    assert_eq!(stored.title, "Checkout Revamp");
    assert_eq!(stored.description, "A faster checkout.");
    assert_eq!(stored.sections[1].content, "Web and mobile web.");
    assert_eq!(stored.sections[2].content, "Payment provider latency.\n\nFraud checks.");
    assert_eq!(last.markdown, stored.to_markdown());
    assert_eq!(last.document.as_ref(), Some(&stored));
}

#[test]
fn reset_keeps_the_stored_slot() {
    let mut stream = stream();
    stream.ingest(FIRST_TURN, true).unwrap();
    stream.reset();
    assert!(stream.store().load("prd").unwrap().is_some());
    assert!(stream.ingest("No document this time.", true).is_none());
    assert_eq!(stream.snapshot().unwrap().sections.len(), 3);
}

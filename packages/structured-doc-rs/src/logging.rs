use serde::Serialize;
use serde_json::Value;
use std::{
    collections::{BTreeMap, VecDeque},
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::LevelFilter,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

use crate::types::now_ms;
use once_cell::sync::Lazy;

pub const MAX_CAPTURED_ENTRIES: usize = 1000;
const DEFAULT_LEVEL: LevelFilter = LevelFilter::INFO;

type SharedBuffer = Arc<Mutex<VecDeque<LogEntry>>>;

static CAPTURED: Lazy<SharedBuffer> =
    Lazy::new(|| Arc::new(Mutex::new(VecDeque::with_capacity(MAX_CAPTURED_ENTRIES))));

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: String,
    pub target: String,
    pub message: Option<String>,
    pub fields: BTreeMap<String, Value>,
    pub timestamp_ms: i64,
}

/// Installs the global subscriber: captured entries for the host plus a stderr fmt layer.
/// Returns false when a subscriber was already installed.
pub fn init(level: Option<&str>) -> bool {
    let filter = parse_level(level);
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(CaptureLayer::global())
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        );

    subscriber.try_init().is_ok()
}

/// Takes every captured entry, oldest first.
pub fn drain() -> Vec<LogEntry> {
    CaptureLayer::global().drain()
}

pub fn parse_level(level: Option<&str>) -> LevelFilter {
    level
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| LevelFilter::from_str(value).ok())
        .unwrap_or(DEFAULT_LEVEL)
}

/// Keeps the newest entries in a bounded ring until the host drains them.
#[derive(Clone)]
pub struct CaptureLayer {
    buffer: SharedBuffer,
    capacity: usize,
}

impl CaptureLayer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn global() -> Self {
        Self {
            buffer: Arc::clone(&CAPTURED),
            capacity: MAX_CAPTURED_ENTRIES,
        }
    }

    pub fn drain(&self) -> Vec<LogEntry> {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.drain(..).collect()
    }

    fn push(&self, entry: LogEntry) {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        while buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(entry);
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let mut fields = visitor.fields;
        let message = fields.remove("message").map(|value| match value {
            Value::String(text) => text,
            other => other.to_string(),
        });

        self.push(LogEntry {
            level: metadata.level().as_str().to_string(),
            target: metadata.target().to_string(),
            message,
            fields,
            timestamp_ms: now_ms(),
        });
    }
}

#[derive(Default)]
struct JsonVisitor {
    fields: BTreeMap<String, Value>,
}

impl tracing_subscriber::field::Visit for JsonVisitor {
    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        let number =
            serde_json::Number::from_f64(value).unwrap_or_else(|| serde_json::Number::from(0));
        self.fields.insert(field.name().to_string(), Value::Number(number));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_error(
        &mut self,
        field: &tracing::field::Field,
        value: &(dyn std::error::Error + 'static),
    ) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), Value::String(format!("{value:?}")));
    }
}

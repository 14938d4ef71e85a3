use serde::Deserialize;
use std::env;

pub const DEFAULT_START_MARKER: &str = "[[DOCUMENT_START]]";
pub const DEFAULT_END_MARKER: &str = "[[DOCUMENT_END]]";
pub const DEFAULT_TITLE: &str = "Untitled Document";
const DEFAULT_MIN_COMPLETE_SECTIONS: usize = 2;
const DEFAULT_PLACEHOLDER_THRESHOLD: f64 = 0.5;

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    pub start_marker: Option<String>,
    pub end_marker: Option<String>,
    pub default_title: Option<String>,
    pub min_complete_sections: Option<usize>,
    pub placeholder_threshold: Option<f64>,
    pub dedupe_on_finish: Option<bool>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedOptions {
    pub start_marker: String,
    pub end_marker: String,
    pub default_title: String,
    pub min_complete_sections: usize,
    pub placeholder_threshold: f64,
    pub dedupe_on_finish: bool,
    pub log_level: Option<String>,
}

impl Default for ResolvedOptions {
    fn default() -> Self {
        Self::from_options(None)
    }
}

impl ResolvedOptions {
    pub fn from_options(options: Option<EngineOptions>) -> Self {
        let options = options.unwrap_or_default();
        Self {
            start_marker: non_empty(options.start_marker)
                .unwrap_or_else(|| DEFAULT_START_MARKER.to_string()),
            end_marker: non_empty(options.end_marker)
                .unwrap_or_else(|| DEFAULT_END_MARKER.to_string()),
            default_title: non_empty(options.default_title)
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            min_complete_sections: options
                .min_complete_sections
                .unwrap_or(DEFAULT_MIN_COMPLETE_SECTIONS),
            placeholder_threshold: options
                .placeholder_threshold
                .filter(|value| *value > 0.0 && *value <= 1.0)
                .unwrap_or(DEFAULT_PLACEHOLDER_THRESHOLD),
            dedupe_on_finish: options.dedupe_on_finish.unwrap_or(true),
            log_level: non_empty(options.log_level),
        }
    }

    pub fn from_value(value: Option<serde_json::Value>) -> Self {
        let parsed = value.and_then(|value| serde_json::from_value::<EngineOptions>(value).ok());
        Self::from_options(parsed)
    }

    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Environment overrides win over explicit options; `lookup` is injectable for tests.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(marker) = non_empty(lookup("STRUCTURED_DOC_START_MARKER")) {
            self.start_marker = marker;
        }
        if let Some(marker) = non_empty(lookup("STRUCTURED_DOC_END_MARKER")) {
            self.end_marker = marker;
        }
        if let Some(title) = non_empty(lookup("STRUCTURED_DOC_DEFAULT_TITLE")) {
            self.default_title = title;
        }
        if let Some(level) = non_empty(lookup("STRUCTURED_DOC_LOG")) {
            self.log_level = Some(level);
        }
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_apply_when_options_missing() {
        let resolved = ResolvedOptions::from_value(None);
        assert_eq!(resolved.start_marker, DEFAULT_START_MARKER);
        assert_eq!(resolved.end_marker, DEFAULT_END_MARKER);
        assert_eq!(resolved.min_complete_sections, 2);
        assert!(resolved.dedupe_on_finish);
    }

    #[test]
    fn camel_case_options_are_respected() {
        let resolved = ResolvedOptions::from_value(Some(json!({
            "startMarker": "<doc>",
            "endMarker": "</doc>",
            "minCompleteSections": 3,
            "placeholderThreshold": 7.5
        })));
        assert_eq!(resolved.start_marker, "<doc>");
        assert_eq!(resolved.end_marker, "</doc>");
        assert_eq!(resolved.min_complete_sections, 3);
        assert_eq!(resolved.placeholder_threshold, 0.5);
    }

    #[test]
    fn env_lookup_overrides_markers() {
        let resolved = ResolvedOptions::default().with_overrides(|key| match key {
            "STRUCTURED_DOC_START_MARKER" => Some("<<BEGIN>>".to_string()),
            "STRUCTURED_DOC_LOG" => Some("debug".to_string()),
            "STRUCTURED_DOC_END_MARKER" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(resolved.start_marker, "<<BEGIN>>");
        assert_eq!(resolved.end_marker, DEFAULT_END_MARKER);
        assert_eq!(resolved.log_level.as_deref(), Some("debug"));
    }
}

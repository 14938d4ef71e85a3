use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl Section {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: mint_section_id(),
            title: title.into(),
            content: content.into(),
        }
    }

    pub fn title_key(&self) -> String {
        title_key(&self.title)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub last_updated: i64,
}

impl Document {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            sections: Vec::new(),
            last_updated: now_ms(),
        }
    }

    /// Same title, description and sections; `last_updated` is ignored.
    pub fn same_content(&self, other: &Document) -> bool {
        self.title == other.title
            && self.description == other.description
            && self.sections == other.sections
    }

    pub fn section_by_id(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.id == id)
    }

    /// Canonical markdown: `# title`, description, then one `## ` block per section.
    pub fn to_markdown(&self) -> String {
        let mut blocks: Vec<String> = Vec::with_capacity(self.sections.len() * 2 + 2);
        blocks.push(format!("# {}", self.title.trim()));

        let description = trim_block(&self.description);
        if !description.is_empty() {
            blocks.push(description.to_string());
        }

        for section in &self.sections {
            blocks.push(format!("## {}", section.title.trim()));
            let content = trim_block(&section.content);
            if !content.is_empty() {
                blocks.push(content.to_string());
            }
        }

        let mut markdown = blocks.join("\n\n");
        markdown.push('\n');
        markdown
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSection {
    pub title: String,
    pub content: String,
}

/// Transient parse of the latest streamed text; always merged before it is persisted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDocument {
    pub title: Option<String>,
    pub description: String,
    pub sections: Vec<CandidateSection>,
    pub elided_titles: Vec<String>,
    pub placeholder_lines: usize,
    pub has_heading_title: bool,
}

impl CandidateDocument {
    pub fn is_degenerate(&self) -> bool {
        !self.has_heading_title && self.sections.is_empty()
    }

    pub fn resolved_title(&self) -> Option<&str> {
        self.title.as_deref().filter(|title| !title.trim().is_empty())
    }
}

/// Drops leading blank lines and trailing whitespace; indentation of the first line is kept.
pub fn trim_block(text: &str) -> &str {
    let trimmed = text.trim_end();
    let mut start = 0;
    for line in trimmed.split_inclusive('\n') {
        if !line.trim().is_empty() {
            break;
        }
        start += line.len();
    }
    &trimmed[start..]
}

pub fn title_key(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn mint_section_id() -> String {
    format!("sec_{}", Uuid::new_v4().simple())
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

use crate::error::{DocError, DocResult};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

pub const ROOT_TAG: &str = "#root";
pub const TEXT_TAG: &str = "#text";
pub const MAX_DEPTH: usize = 100;

const VOID_TAGS: [&str; 6] = ["br", "hr", "img", "input", "meta", "link"];
const INLINE_TAGS: [&str; 16] = [
    "a", "b", "br", "code", "del", "em", "i", "img", "mark", "s", "span", "strike", "strong", "sub",
    "sup", "u",
];

static PARSE_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| {
        Regex::new(r#"<(\/?)([A-Za-z][\w-]*)([^<>]*)>"#).expect("invalid parse tag regex")
    });
static PARSE_ATTR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([\w-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("invalid parse attr regex")
});
static COMMENT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("invalid comment regex"));
static UNTERMINATED_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\/?[A-Za-z]").expect("invalid unterminated tag regex"));
static ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z]{2,8});")
        .expect("invalid entity regex")
});

/// One element or text run of an editor markup tree. Text nodes carry `text` and no children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarkupNode {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<MarkupNode>,
    pub text: Option<String>,
}

impl MarkupNode {
    pub fn element(tag: impl Into<String>, children: Vec<MarkupNode>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            children,
            text: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            tag: TEXT_TAG.to_string(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            text: Some(text.into()),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    pub fn is_inline(&self) -> bool {
        self.is_text() || INLINE_TAGS.contains(&self.tag.as_str())
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn text_content(&self) -> String {
        let mut collector = TextCollector::default();
        collector.visit(self);
        collector.text
    }

    pub fn children_tagged<'a>(
        &'a self,
        tag: &'a str,
    ) -> impl Iterator<Item = &'a MarkupNode> + 'a {
        self.children.iter().filter(move |child| child.tag == tag)
    }
}

/// Walks a markup tree. `visit` dispatches on the node kind.
pub trait MarkupVisitor {
    type Output;

    fn visit_text(&mut self, text: &str) -> Self::Output;
    fn visit_element(&mut self, node: &MarkupNode) -> Self::Output;

    fn visit(&mut self, node: &MarkupNode) -> Self::Output {
        match node.text.as_deref() {
            Some(text) => self.visit_text(text),
            None => self.visit_element(node),
        }
    }
}

#[derive(Default)]
struct TextCollector {
    text: String,
}

impl MarkupVisitor for TextCollector {
    type Output = ();

    fn visit_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn visit_element(&mut self, node: &MarkupNode) {
        for child in &node.children {
            self.visit(child);
        }
    }
}

#[derive(Debug)]
struct ArenaNode {
    tag: String,
    attributes: BTreeMap<String, String>,
    children: Vec<usize>,
    text: Option<String>,
}

/// Builds a tree under a `#root` element. Missing close tags are closed implicitly;
/// stray close tags, unterminated tags and nesting past `MAX_DEPTH` fail.
pub fn parse_markup(markup: &str) -> DocResult<MarkupNode> {
    let source = COMMENT_REGEX.replace_all(markup, "");
    let mut arena: Vec<ArenaNode> = vec![ArenaNode {
        tag: ROOT_TAG.to_string(),
        attributes: BTreeMap::new(),
        children: Vec::new(),
        text: None,
    }];
    let mut stack: Vec<usize> = vec![0];
    let mut last_index = 0;

    for captures in PARSE_TAG_REGEX.captures_iter(&source) {
        let Some(matched) = captures.get(0) else {
            continue;
        };

        if matched.start() > last_index {
            add_text_node(&mut arena, &stack, &source[last_index..matched.start()])?;
        }

        let is_close = captures.get(1).map(|value| value.as_str()) == Some("/");
        let tag = captures
            .get(2)
            .map(|value| value.as_str().to_lowercase())
            .unwrap_or_default();
        let attrs = captures.get(3).map_or("", |value| value.as_str());

        if is_close {
            handle_close_tag(&arena, &mut stack, &tag)?;
        } else {
            let self_closing = attrs.trim_end().ends_with('/');
            add_element_node(&mut arena, &mut stack, tag, parse_attrs(attrs), self_closing)?;
        }

        last_index = matched.end();
    }

    if last_index < source.len() {
        add_text_node(&mut arena, &stack, &source[last_index..])?;
    }

    Ok(build_tree(0, &arena))
}

/// Serializes nodes back to markup with escaped text and attributes.
pub fn render_markup(nodes: &[MarkupNode]) -> String {
    let mut output = String::new();
    for node in nodes {
        render_node(node, &mut output);
    }
    output
}

fn render_node(node: &MarkupNode, output: &mut String) {
    if let Some(text) = node.text.as_deref() {
        output.push_str(&escape_text(text));
        return;
    }
    if node.tag == ROOT_TAG {
        for child in &node.children {
            render_node(child, output);
        }
        return;
    }

    output.push('<');
    output.push_str(&node.tag);
    for (name, value) in &node.attributes {
        output.push(' ');
        output.push_str(name);
        output.push_str("=\"");
        output.push_str(&escape_attribute(value));
        output.push('"');
    }
    output.push('>');

    if is_void_tag(&node.tag) {
        return;
    }
    for child in &node.children {
        render_node(child, output);
    }
    output.push_str("</");
    output.push_str(&node.tag);
    output.push('>');
}

pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn escape_attribute(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

pub fn decode_entities(text: &str) -> String {
    ENTITY_REGEX
        .replace_all(text, |captures: &Captures| {
            let entity = &captures[1];
            let hex = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X"));
            let decoded = if let Some(hex) = hex {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(decimal) = entity.strip_prefix('#') {
                decimal.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded.map_or_else(|| captures[0].to_string(), |ch| ch.to_string())
        })
        .into_owned()
}

fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

fn parse_attrs(attrs: &str) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();

    for caps in PARSE_ATTR_REGEX.captures_iter(attrs) {
        let Some(name) = caps.get(1) else { continue };
        let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
        result.insert(name.as_str().to_lowercase(), decode_entities(value));
    }

    result
}

fn add_text_node(arena: &mut Vec<ArenaNode>, stack: &[usize], raw: &str) -> DocResult<()> {
    if let Some(found) = UNTERMINATED_TAG_REGEX.find(raw) {
        let preview: String = raw[found.start()..].chars().take(24).collect();
        return Err(DocError::ConversionFailure(format!("unterminated tag near {preview:?}")));
    }

    let preformatted = stack.iter().any(|index| arena[*index].tag == "pre");
    // Formatting whitespace between block tags.
    if raw.trim().is_empty() && raw.contains('\n') && !preformatted {
        return Ok(());
    }

    let Some(parent_index) = stack.last().copied() else {
        return Ok(());
    };
    let node_index = arena.len();
    arena.push(ArenaNode {
        tag: TEXT_TAG.to_string(),
        attributes: BTreeMap::new(),
        children: Vec::new(),
        text: Some(decode_entities(raw)),
    });
    arena[parent_index].children.push(node_index);
    Ok(())
}

fn add_element_node(
    arena: &mut Vec<ArenaNode>,
    stack: &mut Vec<usize>,
    tag: String,
    attributes: BTreeMap<String, String>,
    self_closing: bool,
) -> DocResult<()> {
    let Some(parent_index) = stack.last().copied() else {
        return Ok(());
    };

    let opens_scope = !is_void_tag(&tag) && !self_closing;
    let node_index = arena.len();
    arena.push(ArenaNode {
        tag,
        attributes,
        children: Vec::new(),
        text: None,
    });
    arena[parent_index].children.push(node_index);

    if opens_scope {
        if stack.len() > MAX_DEPTH {
            return Err(DocError::ConversionFailure(format!(
                "markup nesting exceeds {MAX_DEPTH} levels"
            )));
        }
        stack.push(node_index);
    }
    Ok(())
}

fn handle_close_tag(arena: &[ArenaNode], stack: &mut Vec<usize>, tag: &str) -> DocResult<()> {
    if is_void_tag(tag) {
        return Ok(());
    }

    let Some(position) = stack
        .iter()
        .skip(1)
        .rposition(|index| arena[*index].tag == tag)
    else {
        return Err(DocError::ConversionFailure(format!(
            "closing </{tag}> has no matching opening tag"
        )));
    };

    // `position` is relative to the skipped root.
    stack.truncate(position + 1);
    Ok(())
}

fn build_tree(index: usize, arena: &[ArenaNode]) -> MarkupNode {
    let node = &arena[index];
    MarkupNode {
        tag: node.tag.clone(),
        attributes: node.attributes.clone(),
        children: node
            .children
            .iter()
            .map(|child| build_tree(*child, arena))
            .collect(),
        text: node.text.clone(),
    }
}

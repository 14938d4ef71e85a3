use super::node::{MarkupNode, MarkupVisitor};

const BULLET_CHILD_INDENT: usize = 2;
const ORDERED_CHILD_INDENT: usize = 3;

/// Serializes block nodes to markdown, blocks separated by one blank line.
pub fn nodes_to_markdown(nodes: &[MarkupNode]) -> String {
    let mut writer = MarkdownWriter::default();
    nodes
        .iter()
        .filter_map(|node| writer.visit(node))
        .filter(|block| !block.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Emits one markdown block per visited node. A code header div is remembered
/// until the `pre` that follows it.
#[derive(Default)]
struct MarkdownWriter {
    pending_language: Option<String>,
}

impl MarkupVisitor for MarkdownWriter {
    type Output = Option<String>;

    fn visit_text(&mut self, text: &str) -> Option<String> {
        let collapsed = collapse_whitespace(text);
        let trimmed = collapsed.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn visit_element(&mut self, node: &MarkupNode) -> Option<String> {
        let language = self.pending_language.take();

        match node.tag.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level: usize = node.tag[1..].parse().unwrap_or(1);
                let text = render_inline(&node.children);
                Some(format!("{} {}", "#".repeat(level), text.trim()))
            }
            "p" => {
                let text = render_inline(&node.children);
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            "blockquote" => {
                let inner = nodes_to_markdown(&node.children);
                let quoted: Vec<String> = inner
                    .split('\n')
                    .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {line}") })
                    .collect();
                Some(quoted.join("\n"))
            }
            "hr" => Some("---".to_string()),
            "div" if node.attr("data-type") == Some("code-header") => {
                self.pending_language = node
                    .attr("data-language")
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string);
                None
            }
            "pre" => Some(render_code_block(node, language)),
            "ul" | "ol" => Some(render_list(node, 0).join("\n")),
            "table" => render_table(node),
            "img" => Some(render_image(node)),
            "br" => None,
            _ if node.children.iter().all(MarkupNode::is_inline) => {
                let text = render_inline(&node.children);
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            _ => {
                let inner = nodes_to_markdown(&node.children);
                (!inner.is_empty()).then_some(inner)
            }
        }
    }
}

fn render_code_block(node: &MarkupNode, header_language: Option<String>) -> String {
    let code = node.children_tagged("code").next();
    let class_language = code
        .and_then(|code| code.attr("class"))
        .and_then(|class| {
            class
                .split_whitespace()
                .find_map(|name| name.strip_prefix("language-"))
        })
        .map(str::to_string);
    let language = class_language.or(header_language).unwrap_or_default();
    let content = code.map_or_else(|| node.text_content(), MarkupNode::text_content);
    format!("```{language}\n{}\n```", content.trim_end_matches('\n'))
}

/// Renders list items line by line; nested lists indent 2 under bullets and 3 under numbers.
fn render_list(node: &MarkupNode, indent: usize) -> Vec<String> {
    let ordered = node.tag == "ol";
    let task_list = node.attr("data-type") == Some("taskList");
    let mut number = node
        .attr("start")
        .and_then(|start| start.trim().parse::<u32>().ok())
        .unwrap_or(1);
    let padding = " ".repeat(indent);
    let mut lines = Vec::new();

    for item in node.children_tagged("li") {
        let is_task = task_list || item.attr("data-type") == Some("taskItem");
        let marker = if ordered {
            format!("{number}. ")
        } else if is_task {
            let checked = item.attr("data-checked") == Some("true");
            if checked { "- [x] ".to_string() } else { "- [ ] ".to_string() }
        } else {
            "- ".to_string()
        };
        let child_indent = indent
            + if ordered { ORDERED_CHILD_INDENT } else { BULLET_CHILD_INDENT };

        let mut nested: Vec<String> = Vec::new();
        let mut content: Vec<&MarkupNode> = Vec::new();
        for child in &item.children {
            match child.tag.as_str() {
                "ul" | "ol" => nested.extend(render_list(child, child_indent)),
                _ => content.push(child),
            }
        }

        // Hard breaks continue under the item text.
        let continuation = format!("\n{}", " ".repeat(indent + marker.len()));
        let text = inline_parts(&content).join(" ").replace('\n', &continuation);
        lines.push(format!("{padding}{marker}{text}").trim_end().to_string());
        lines.extend(nested);
        number += 1;
    }

    lines
}

fn render_table(node: &MarkupNode) -> Option<String> {
    let mut rows: Vec<&MarkupNode> = Vec::new();
    collect_rows(node, &mut rows);

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            row.children
                .iter()
                .filter(|cell| cell.tag == "th" || cell.tag == "td")
                .map(table_cell)
                .collect()
        })
        .filter(|row: &Vec<String>| !row.is_empty())
        .collect();

    let columns = cells.iter().map(Vec::len).max()?;
    let format_row = |row: &[String]| {
        let mut padded: Vec<&str> = row.iter().map(String::as_str).collect();
        padded.resize(columns, "");
        format!("| {} |", padded.join(" | "))
    };

    // Markdown tables always have a header; a header-less first row is promoted.
    let mut lines = vec![format_row(&cells[0])];
    lines.push(format!("| {} |", vec!["---"; columns].join(" | ")));
    lines.extend(cells[1..].iter().map(|row| format_row(row)));
    Some(lines.join("\n"))
}

fn collect_rows<'a>(node: &'a MarkupNode, rows: &mut Vec<&'a MarkupNode>) {
    for child in &node.children {
        match child.tag.as_str() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => collect_rows(child, rows),
            _ => {}
        }
    }
}

fn table_cell(cell: &MarkupNode) -> String {
    let content: Vec<&MarkupNode> = cell.children.iter().collect();
    inline_parts(&content)
        .join(" ")
        .replace('\n', " ")
        .replace('|', "\\|")
        .trim()
        .to_string()
}

/// Runs of inline children render together; block children each become one part.
fn inline_parts(children: &[&MarkupNode]) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut run: Vec<MarkupNode> = Vec::new();

    let flush = |run: &mut Vec<MarkupNode>, parts: &mut Vec<String>| {
        if run.is_empty() {
            return;
        }
        let text = render_inline(run);
        let text = text.trim();
        if !text.is_empty() {
            parts.push(text.to_string());
        }
        run.clear();
    };

    for child in children {
        if child.is_inline() {
            run.push((*child).clone());
            continue;
        }
        flush(&mut run, &mut parts);
        let block = match child.tag.as_str() {
            "p" => render_inline(&child.children).trim().to_string(),
            _ => nodes_to_markdown(std::slice::from_ref(*child)),
        };
        if !block.is_empty() {
            parts.push(block);
        }
    }
    flush(&mut run, &mut parts);

    parts
}

/// Serializes each inline child on its own, so mixed styling nests correctly.
pub fn render_inline(children: &[MarkupNode]) -> String {
    children.iter().map(render_inline_node).collect()
}

fn render_inline_node(node: &MarkupNode) -> String {
    if let Some(text) = node.text.as_deref() {
        return collapse_whitespace(text);
    }

    match node.tag.as_str() {
        "strong" | "b" => wrap_inline(&render_inline(&node.children), "**", "**"),
        "em" | "i" => wrap_inline(&render_inline(&node.children), "*", "*"),
        "s" | "del" | "strike" => wrap_inline(&render_inline(&node.children), "~~", "~~"),
        "u" => wrap_inline(&render_inline(&node.children), "<u>", "</u>"),
        "code" => format!("`{}`", node.text_content()),
        "a" => {
            let text = render_inline(&node.children);
            let href = node.attr("href").unwrap_or_default();
            match node.attr("title").filter(|title| !title.is_empty()) {
                Some(title) => format!("[{}]({href} \"{title}\")", text.trim()),
                None => format!("[{}]({href})", text.trim()),
            }
        }
        "img" => render_image(node),
        "br" => "  \n".to_string(),
        _ => render_inline(&node.children),
    }
}

/// Keeps surrounding spaces outside the markers; `** bold**` is not emphasis.
fn wrap_inline(inner: &str, open: &str, close: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return inner.to_string();
    }
    let leading = &inner[..inner.len() - inner.trim_start().len()];
    let trailing = &inner[inner.trim_end().len()..];
    format!("{leading}{open}{trimmed}{close}{trailing}")
}

fn render_image(node: &MarkupNode) -> String {
    let alt = node.attr("alt").unwrap_or_default();
    let src = node.attr("src").unwrap_or_default();
    match node.attr("title").filter(|title| !title.is_empty()) {
        Some(title) => format!("![{alt}]({src} \"{title}\")"),
        None => format!("![{alt}]({src})"),
    }
}

fn collapse_whitespace(text: &str) -> String {
    if !text.contains(['\n', '\t']) {
        return text.to_string();
    }
    text.replace(['\n', '\t'], " ")
}

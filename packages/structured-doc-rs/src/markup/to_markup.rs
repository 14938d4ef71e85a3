use super::node::{MarkupNode, MAX_DEPTH};
use crate::error::{DocError, DocResult};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(`{3,}|~{3,})\s*([\w+#.-]*)\s*$").expect("invalid fence regex"));
static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)(?:\s+#+)?\s*$").expect("invalid heading regex"));
static HORIZONTAL_RULE_RE: Lazy<Regex> =
    Lazy::new(|| {
        Regex::new(r"^(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})$")
            .expect("invalid rule regex")
    });
static LIST_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| {
        Regex::new(r"^(\s*)([-*+]|\d{1,9}[.)])\s+(.*)$").expect("invalid list item regex")
    });
static ORDERED_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| {
        Regex::new(r"^(\s*)(\d{1,9})([.)])(\s+.*)$").expect("invalid ordered marker regex")
    });
static BULLET_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)[-*+]\s+").expect("invalid bullet marker regex"));
static TASK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([ xX])\](?:\s+(.*))?$").expect("invalid task regex"));
static QUOTE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*>\s?").expect("invalid quote marker regex"));
static TABLE_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| {
        Regex::new(r"^\|?\s*:?-+:?\s*(?:\|\s*:?-+:?\s*)*\|?$")
            .expect("invalid table separator regex")
    });
static LONE_IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^!\[([^\]]*)\]\(([^)\s]+)(?:\s+"([^"]*)")?\)$"#).expect("invalid image regex")
});

static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").expect("invalid code regex"));
static IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"!\[([^\]]*)\]\(([^)\s]+)(?:\s+"([^"]*)")?\)"#).expect("invalid image regex")
});
static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\[([^\]]+)\]\(([^)\s]+)(?:\s+"([^"]*)")?\)"#).expect("invalid link regex")
});
static STRONG_EMPHASIS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*\*([^*]+?)\*\*\*").expect("invalid strong emphasis regex"));
static STRONG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*|\b__(.+?)__\b").expect("invalid strong regex"));
static EMPHASIS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*([^*\s][^*]*)\*|\b_([^_]+)_\b").expect("invalid emphasis regex"));
static STRIKETHROUGH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"~~(.+?)~~").expect("invalid strikethrough regex"));
static UNDERLINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<u>(.+?)</u>").expect("invalid underline regex"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InlineKind {
    Code,
    Image,
    Link,
    StrongEmphasis,
    Strong,
    Emphasis,
    Strikethrough,
    Underline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ListKind {
    Bullet,
    Ordered,
    Task,
}

struct ListItemLine<'a> {
    indent: usize,
    kind: ListKind,
    number: u32,
    checked: bool,
    content: &'a str,
}

struct ListItem {
    /// Raw source lines; trailing spaces mark hard breaks.
    lines: Vec<String>,
    checked: bool,
    sublists: Vec<MarkupNode>,
}

struct ListFrame {
    indent: usize,
    kind: ListKind,
    start: u32,
    items: Vec<ListItem>,
}

/// Rewrites ordered markers so each contiguous run counts up from its first number.
pub fn renumber_ordered_lists(markdown: &str) -> String {
    // (indent, next number) for every open ordered run.
    let mut counters: Vec<(usize, u32)> = Vec::new();
    let mut in_fence = false;
    let mut output: Vec<String> = Vec::new();

    for line in markdown.split('\n') {
        if FENCE_RE.is_match(line.trim()) {
            in_fence = !in_fence;
            output.push(line.to_string());
            continue;
        }
        if in_fence || line.trim().is_empty() {
            output.push(line.to_string());
            continue;
        }

        let indent = indent_width(line);
        if let Some(captures) = ORDERED_MARKER_RE.captures(line) {
            counters.retain(|(open, _)| *open <= indent);
            let number = match counters.last_mut() {
                Some((open, next)) if *open == indent => {
                    let current = *next;
                    *next += 1;
                    current
                }
                _ => {
                    let first = captures[2].parse::<u32>().unwrap_or(1);
                    counters.push((indent, first + 1));
                    first
                }
            };
            output.push(format!("{}{}{}{}", &captures[1], number, &captures[3], &captures[4]));
            continue;
        }

        if BULLET_MARKER_RE.is_match(line) {
            counters.retain(|(open, _)| *open < indent);
        } else if indent == 0 {
            counters.clear();
        }
        output.push(line.to_string());
    }

    output.join("\n")
}

/// Parses markdown into markup block nodes.
pub fn markdown_to_nodes(markdown: &str) -> DocResult<Vec<MarkupNode>> {
    let renumbered = renumber_ordered_lists(markdown);
    let lines: Vec<&str> = renumbered.split('\n').collect();
    parse_blocks(&lines, 0)
}

fn parse_blocks(lines: &[&str], depth: usize) -> DocResult<Vec<MarkupNode>> {
    if depth > MAX_DEPTH {
        return Err(DocError::ConversionFailure(format!(
            "blockquote nesting exceeds {MAX_DEPTH} levels"
        )));
    }

    let mut nodes = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        let trimmed = line.trim();

        if trimmed.is_empty() {
            index += 1;
            continue;
        }

        if indent_width(line) <= 3 {
            if let Some(captures) = FENCE_RE.captures(trimmed) {
                let (code_nodes, end) = parse_fence(lines, index, &captures[1], &captures[2]);
                nodes.extend(code_nodes);
                index = end;
                continue;
            }

            if let Some(captures) = HEADING_RE.captures(trimmed) {
                let level = captures[1].len();
                nodes.push(MarkupNode::element(format!("h{level}"), parse_inline(&captures[2])));
                index += 1;
                continue;
            }

            if HORIZONTAL_RULE_RE.is_match(trimmed) {
                nodes.push(MarkupNode::element("hr", Vec::new()));
                index += 1;
                continue;
            }

            if trimmed.starts_with('>') {
                let mut inner: Vec<&str> = Vec::new();
                while index < lines.len() && lines[index].trim_start().starts_with('>') {
                    let stripped = QUOTE_MARKER_RE.find(lines[index]).map_or(0, |m| m.end());
                    inner.push(&lines[index][stripped..]);
                    index += 1;
                }
                nodes.push(MarkupNode::element("blockquote", parse_blocks(&inner, depth + 1)?));
                continue;
            }
        }

        if parse_list_item(line).is_some() {
            let (list_nodes, end) = parse_list(lines, index)?;
            nodes.extend(list_nodes);
            index = end;
            continue;
        }

        if trimmed.contains('|') {
            if let Some((table, end)) = parse_table(lines, index) {
                nodes.push(table);
                index = end;
                continue;
            }
        }

        if let Some(captures) = LONE_IMAGE_RE.captures(trimmed) {
            nodes.push(image_node(&captures));
            index += 1;
            continue;
        }

        let mut paragraph: Vec<&str> = vec![line];
        while index + 1 < lines.len()
            && !lines[index + 1].trim().is_empty()
            && !is_block_start(lines, index + 1)
        {
            index += 1;
            paragraph.push(lines[index]);
        }
        nodes.push(MarkupNode::element("p", paragraph_inline(&paragraph)));
        index += 1;
    }

    Ok(nodes)
}

fn is_block_start(lines: &[&str], index: usize) -> bool {
    let line = lines[index];
    let trimmed = line.trim();
    if indent_width(line) <= 3
        && (FENCE_RE.is_match(trimmed)
            || HEADING_RE.is_match(trimmed)
            || HORIZONTAL_RULE_RE.is_match(trimmed)
            || trimmed.starts_with('>'))
    {
        return true;
    }
    if parse_list_item(line).is_some() {
        return true;
    }
    trimmed.contains('|')
        && lines
            .get(index + 1)
            .is_some_and(|next| TABLE_SEPARATOR_RE.is_match(next.trim()))
}

/// Soft-wrapped lines are joined with a space; trailing double spaces or a backslash
/// force a line break.
fn paragraph_inline(lines: &[&str]) -> Vec<MarkupNode> {
    let mut children: Vec<MarkupNode> = Vec::new();
    let last = lines.len().saturating_sub(1);

    for (position, line) in lines.iter().enumerate() {
        let hard_break =
            position < last && (line.ends_with("  ") || line.trim_end().ends_with('\\'));
        let text = line.trim().trim_end_matches('\\').trim_end();
        children.extend(parse_inline(text));
        if position < last {
            if hard_break {
                children.push(MarkupNode::element("br", Vec::new()));
            } else {
                children.push(MarkupNode::text(" "));
            }
        }
    }

    merge_text_runs(children)
}

fn parse_fence(
    lines: &[&str],
    start: usize,
    fence: &str,
    language: &str,
) -> (Vec<MarkupNode>, usize) {
    let marker = fence.chars().next();
    let mut body: Vec<&str> = Vec::new();
    let mut index = start + 1;

    while index < lines.len() {
        let trimmed = lines[index].trim();
        if trimmed.len() >= fence.len() && trimmed.chars().all(|ch| Some(ch) == marker) {
            index += 1;
            break;
        }
        body.push(lines[index]);
        index += 1;
    }

    let mut code = MarkupNode::element("code", vec![MarkupNode::text(body.join("\n"))]);
    let mut nodes = Vec::with_capacity(2);
    if !language.is_empty() {
        code = code.with_attribute("class", format!("language-{language}"));
        nodes.push(
            MarkupNode::element("div", Vec::new())
                .with_attribute("data-type", "code-header")
                .with_attribute("data-language", language),
        );
    }
    nodes.push(MarkupNode::element("pre", vec![code]));
    (nodes, index)
}

fn parse_list_item(line: &str) -> Option<ListItemLine<'_>> {
    if HORIZONTAL_RULE_RE.is_match(line.trim()) {
        return None;
    }
    let captures = LIST_ITEM_RE.captures(line)?;
    let indent = indent_width(captures.get(1).map_or("", |m| m.as_str()));
    let marker = captures.get(2).map_or("", |m| m.as_str());
    let content = captures.get(3).map_or("", |m| m.as_str());

    if marker.starts_with(|ch: char| ch.is_ascii_digit()) {
        let number = marker
            .trim_end_matches(['.', ')'])
            .parse::<u32>()
            .unwrap_or(1);
        return Some(ListItemLine {
            indent,
            kind: ListKind::Ordered,
            number,
            checked: false,
            content,
        });
    }

    if let Some(task) = TASK_RE.captures(content) {
        let checked = task[1].eq_ignore_ascii_case("x");
        let text = task.get(2).map_or("", |m| m.as_str());
        return Some(ListItemLine {
            indent,
            kind: ListKind::Task,
            number: 1,
            checked,
            content: text,
        });
    }

    Some(ListItemLine {
        indent,
        kind: ListKind::Bullet,
        number: 1,
        checked: false,
        content,
    })
}

/// Builds nested lists with a stack of open lists keyed by indentation.
fn parse_list(lines: &[&str], start: usize) -> DocResult<(Vec<MarkupNode>, usize)> {
    let mut output: Vec<MarkupNode> = Vec::new();
    let mut stack: Vec<ListFrame> = Vec::new();
    let mut index = start;

    while index < lines.len() {
        let line = lines[index];

        if line.trim().is_empty() {
            let next =
                (index + 1..lines.len()).find(|position| !lines[*position].trim().is_empty());
            let continues = next.is_some_and(|position| {
                parse_list_item(lines[position]).is_some() || indent_width(lines[position]) > 0
            });
            if !continues {
                break;
            }
            index += 1;
            continue;
        }

        if let Some(item) = parse_list_item(line) {
            while stack.last().is_some_and(|top| top.indent > item.indent) {
                close_frame(&mut stack, &mut output);
            }
            if stack
                .last()
                .is_some_and(|top| top.indent == item.indent && top.kind != item.kind)
            {
                close_frame(&mut stack, &mut output);
            }
            if stack.last().is_none_or(|top| top.indent < item.indent) {
                if stack.len() >= MAX_DEPTH {
                    return Err(DocError::ConversionFailure(format!(
                        "list nesting exceeds {MAX_DEPTH} levels"
                    )));
                }
                stack.push(ListFrame {
                    indent: item.indent,
                    kind: item.kind,
                    start: item.number,
                    items: Vec::new(),
                });
            }
            if let Some(top) = stack.last_mut() {
                let content = item.content.trim_start();
                top.items.push(ListItem {
                    lines: if content.trim().is_empty() {
                        Vec::new()
                    } else {
                        vec![content.to_string()]
                    },
                    checked: item.checked,
                    sublists: Vec::new(),
                });
            }
        } else if indent_width(line) > 0 && !stack.is_empty() {
            if let Some(item) = stack.last_mut().and_then(|top| top.items.last_mut()) {
                item.lines.push(line.trim_start().to_string());
            }
        } else {
            break;
        }

        index += 1;
    }

    while !stack.is_empty() {
        close_frame(&mut stack, &mut output);
    }

    Ok((output, index))
}

fn close_frame(stack: &mut Vec<ListFrame>, output: &mut Vec<MarkupNode>) {
    let Some(frame) = stack.pop() else {
        return;
    };
    let node = frame_to_node(frame);
    match stack.last_mut().and_then(|parent| parent.items.last_mut()) {
        Some(parent_item) => parent_item.sublists.push(node),
        None => output.push(node),
    }
}

fn frame_to_node(frame: ListFrame) -> MarkupNode {
    let items: Vec<MarkupNode> = frame
        .items
        .into_iter()
        .map(|item| {
            let lines: Vec<&str> = item.lines.iter().map(String::as_str).collect();
            let mut children = vec![MarkupNode::element("p", paragraph_inline(&lines))];
            children.extend(item.sublists);
            let node = MarkupNode::element("li", children);
            match frame.kind {
                ListKind::Task => node
                    .with_attribute("data-type", "taskItem")
                    .with_attribute("data-checked", if item.checked { "true" } else { "false" }),
                _ => node,
            }
        })
        .collect();

    match frame.kind {
        ListKind::Bullet => MarkupNode::element("ul", items),
        ListKind::Task => MarkupNode::element("ul", items).with_attribute("data-type", "taskList"),
        ListKind::Ordered if frame.start != 1 => {
            MarkupNode::element("ol", items).with_attribute("start", frame.start.to_string())
        }
        ListKind::Ordered => MarkupNode::element("ol", items),
    }
}

fn parse_table(lines: &[&str], start: usize) -> Option<(MarkupNode, usize)> {
    let header = *lines.get(start)?;
    let separator = *lines.get(start + 1)?;
    if !TABLE_SEPARATOR_RE.is_match(separator.trim()) {
        return None;
    }

    let row = |line: &str, cell_tag: &str| {
        let cells = split_table_row(line)
            .into_iter()
            .map(|cell| {
                MarkupNode::element(cell_tag, vec![MarkupNode::element("p", parse_inline(&cell))])
            })
            .collect();
        MarkupNode::element("tr", cells)
    };

    let mut rows = vec![row(header, "th")];
    let mut index = start + 2;
    while index < lines.len() && lines[index].contains('|') && !lines[index].trim().is_empty() {
        rows.push(row(lines[index], "td"));
        index += 1;
    }

    let body = MarkupNode::element("tbody", rows);
    Some((MarkupNode::element("table", vec![body]), index))
}

/// Splits on unescaped pipes; `\|` stays inside the cell as a literal pipe.
fn split_table_row(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let trimmed = if trimmed.ends_with('|') && !trimmed.ends_with("\\|") {
        &trimmed[..trimmed.len() - 1]
    } else {
        trimmed
    };

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = trimmed.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(ch),
        }
    }
    cells.push(current.trim().to_string());
    cells
}

fn image_node(captures: &Captures) -> MarkupNode {
    let mut node = MarkupNode::element("img", Vec::new())
        .with_attribute("src", &captures[2])
        .with_attribute("alt", captures.get(1).map_or("", |m| m.as_str()));
    if let Some(title) = captures.get(3) {
        node = node.with_attribute("title", title.as_str());
    }
    node
}

/// Inline markdown to markup; the earliest match wins and its inner text is parsed again.
pub fn parse_inline(text: &str) -> Vec<MarkupNode> {
    let mut nodes: Vec<MarkupNode> = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let candidates: [(&Regex, InlineKind); 8] = [
            (&CODE_RE, InlineKind::Code),
            (&IMAGE_RE, InlineKind::Image),
            (&LINK_RE, InlineKind::Link),
            (&STRONG_EMPHASIS_RE, InlineKind::StrongEmphasis),
            (&STRONG_RE, InlineKind::Strong),
            (&EMPHASIS_RE, InlineKind::Emphasis),
            (&STRIKETHROUGH_RE, InlineKind::Strikethrough),
            (&UNDERLINE_RE, InlineKind::Underline),
        ];

        let mut earliest: Option<(usize, usize, MarkupNode)> = None;
        for (regex, kind) in candidates {
            let Some(captures) = regex.captures(remaining) else {
                continue;
            };
            let Some(matched) = captures.get(0) else {
                continue;
            };
            if earliest.as_ref().is_none_or(|current| matched.start() < current.0) {
                earliest = Some((matched.start(), matched.end(), inline_node(kind, &captures)));
            }
        }

        match earliest {
            Some((start, end, node)) => {
                if start > 0 {
                    nodes.push(MarkupNode::text(&remaining[..start]));
                }
                nodes.push(node);
                remaining = &remaining[end..];
            }
            None => {
                nodes.push(MarkupNode::text(remaining));
                break;
            }
        }
    }

    nodes
}

fn inline_node(kind: InlineKind, captures: &Captures) -> MarkupNode {
    let group = |index: usize| captures.get(index).map_or("", |m| m.as_str());
    let either = || captures.get(1).or_else(|| captures.get(2)).map_or("", |m| m.as_str());

    match kind {
        InlineKind::Code => MarkupNode::element("code", vec![MarkupNode::text(group(1))]),
        InlineKind::Image => image_node(captures),
        InlineKind::Link => {
            let mut node =
                MarkupNode::element("a", parse_inline(group(1))).with_attribute("href", group(2));
            if let Some(title) = captures.get(3) {
                node = node.with_attribute("title", title.as_str());
            }
            node
        }
        InlineKind::StrongEmphasis => MarkupNode::element(
            "strong",
            vec![MarkupNode::element("em", parse_inline(group(1)))],
        ),
        InlineKind::Strong => MarkupNode::element("strong", parse_inline(either())),
        InlineKind::Emphasis => MarkupNode::element("em", parse_inline(either())),
        InlineKind::Strikethrough => MarkupNode::element("s", parse_inline(group(1))),
        InlineKind::Underline => MarkupNode::element("u", parse_inline(group(1))),
    }
}

fn merge_text_runs(nodes: Vec<MarkupNode>) -> Vec<MarkupNode> {
    let mut merged: Vec<MarkupNode> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let (Some(text), Some(previous)) = (node.text.as_deref(), merged.last_mut()) {
            if let Some(existing) = previous.text.as_mut() {
                existing.push_str(text);
                continue;
            }
        }
        merged.push(node);
    }
    merged
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|ch| ch.is_whitespace())
        .map(|ch| if ch == '\t' { 4 } else { 1 })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::node::render_markup;

    fn markup(markdown: &str) -> String {
        render_markup(&markdown_to_nodes(markdown).unwrap())
    }

    #[test]
    fn renumbers_each_contiguous_run() {
        assert_eq!(
            renumber_ordered_lists("1. a\n1. b\n   1. x\n   5. y\n1. c\n\nText\n\n4. d\n9. e"),
            "1. a\n2. b\n   1. x\n   2. y\n3. c\n\nText\n\n4. d\n5. e"
        );
        assert_eq!(renumber_ordered_lists("```\n1. a\n1. b\n```"), "```\n1. a\n1. b\n```");
    }

    #[test]
    fn headings_paragraphs_and_rules() {
        assert_eq!(
            markup("## Goals\n\nFirst line\nsecond line\n\n---"),
            "<h2>Goals</h2><p>First line second line</p><hr>"
        );
    }

    #[test]
    fn nested_inline_styles() {
        assert_eq!(
            markup("Try **bold [link](https://x.io)** and *it* or `a*b*c` ~~gone~~"),
            "<p>Try <strong>bold <a href=\"https://x.io\">link</a></strong> and <em>it</em> or <code>a*b*c</code> <s>gone</s></p>"
        );
        assert_eq!(markup("***both***"), "<p><strong><em>both</em></strong></p>");
        assert_eq!(markup("snake_case_name"), "<p>snake_case_name</p>");
    }

    #[test]
    fn nested_lists_follow_indentation() {
        assert_eq!(
            markup("- one\n  - inner\n- two\n\n3. three\n4. four"),
            "<ul><li><p>one</p><ul><li><p>inner</p></li></ul></li><li><p>two</p></li></ul>\
             <ol start=\"3\"><li><p>three</p></li><li><p>four</p></li></ol>"
        );
    }

    #[test]
    fn spaced_rules_are_not_lists() {
        assert_eq!(markup("* * *"), "<hr>");
        assert_eq!(markup("- - -\n\n- item"), "<hr><ul><li><p>item</p></li></ul>");
    }

    #[test]
    fn list_continuations_keep_hard_breaks() {
        assert_eq!(
            markup("- first line  \n  second line"),
            "<ul><li><p>first line<br>second line</p></li></ul>"
        );
        assert_eq!(markup("- first\n  second"), "<ul><li><p>first second</p></li></ul>");
    }

    #[test]
    fn task_lists_carry_checked_state() {
        assert_eq!(
            markup("- [x] done\n- [ ] todo"),
            "<ul data-type=\"taskList\"><li data-checked=\"true\" data-type=\"taskItem\"><p>done</p></li>\
             <li data-checked=\"false\" data-type=\"taskItem\"><p>todo</p></li></ul>"
        );
    }

    #[test]
    fn fenced_code_gets_language_header() {
        assert_eq!(
            markup("```rust\nfn main() {\n    let a = 1 < 2;\n}\n```"),
            "<div data-language=\"rust\" data-type=\"code-header\"></div>\
             <pre><code class=\"language-rust\">fn main() {\n    let a = 1 &lt; 2;\n}</code></pre>"
        );
    }

    #[test]
    fn blockquote_lines_fold_together() {
        assert_eq!(
            markup("> first\n> second\n>\n> - item"),
            "<blockquote><p>first second</p><ul><li><p>item</p></li></ul></blockquote>"
        );
    }

    #[test]
    fn tables_keep_escaped_pipes() {
        assert_eq!(
            markup("| Step | Note |\n| --- | --- |\n| Build | a \\| b |"),
            "<table><tbody><tr><th><p>Step</p></th><th><p>Note</p></th></tr>\
             <tr><td><p>Build</p></td><td><p>a | b</p></td></tr></tbody></table>"
        );
    }

    #[test]
    fn deep_blockquotes_fail() {
        let deep = format!("{} text", ">".repeat(MAX_DEPTH + 2));
        assert!(matches!(markdown_to_nodes(&deep), Err(DocError::ConversionFailure(_))));
    }
}

//! A small, logic-light template language for narrative XHTML.
//!
//! Templates are plain XHTML with `{{ .. }}` tags evaluated against a resource's JSON form:
//!
//! ```text
//! {{ path }}                          escaped primitive values, joined with ", "
//! {{#each path}} .. {{/each}}         repeat for every item, with the item as context
//! {{#if path}} .. {{else}} .. {{/if}} conditional on a non-empty value
//! {{! comment }}                      ignored
//! ```
//!
//! Paths are dotted element names (`code.coding.display`), evaluated like FHIRPath
//! collections: arrays are flattened at every step and missing elements yield nothing.
//! A segment may select one item of the collection (`coding[0]`) and `.` is the current
//! context.

use crate::{NarrativeError, NarrativeResult};
use serde_json::Value;
use std::fmt;

/// Errors raised while rendering an already parsed template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("`{path}` is a complex element and cannot be rendered as text")]
    ComplexValue { path: String },
}

/// A parsed template.
#[derive(Clone, Debug)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

#[derive(Clone, Debug)]
enum Node {
    Text(String),
    Value(Path),
    Each(Path, Vec<Node>),
    If(Path, Vec<Node>, Vec<Node>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Path {
    segments: Vec<Segment>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Segment {
    name: String,
    index: Option<usize>,
}

enum Block {
    Each(Path),
    If(Path),
}

struct Frame {
    block: Block,
    body: Vec<Node>,
    otherwise: Option<Vec<Node>>,
}

impl Frame {
    fn target(&mut self) -> &mut Vec<Node> {
        match &mut self.otherwise {
            Some(otherwise) => otherwise,
            None => &mut self.body,
        }
    }
}

impl Template {
    /// Parse template `source`; `name` is used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`NarrativeError::TemplateSyntax`] for unterminated tags, unbalanced blocks,
    /// empty expressions or malformed paths.
    pub fn parse(name: impl Into<String>, source: &str) -> NarrativeResult<Self> {
        let name = name.into();
        let syntax = |message: String| NarrativeError::TemplateSyntax {
            template: name.clone(),
            message,
        };

        let mut root = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        let mut rest = source;

        while let Some(open) = rest.find("{{") {
            let text = &rest[..open];
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| {
                syntax(format!("unterminated tag at `{}`", preview(&rest[open..])))
            })?;
            let tag = after[..close].trim();
            rest = &after[close + 2..];

            if !text.is_empty() {
                target(&mut stack, &mut root).push(Node::Text(text.to_string()));
            }

            if tag.starts_with('!') {
                continue;
            } else if let Some(path) = tag.strip_prefix("#each") {
                let path = parse_path(path).map_err(&syntax)?;
                stack.push(Frame {
                    block: Block::Each(path),
                    body: Vec::new(),
                    otherwise: None,
                });
            } else if let Some(path) = tag.strip_prefix("#if") {
                let path = parse_path(path).map_err(&syntax)?;
                stack.push(Frame {
                    block: Block::If(path),
                    body: Vec::new(),
                    otherwise: None,
                });
            } else if tag == "else" {
                match stack.last_mut() {
                    Some(frame)
                        if matches!(frame.block, Block::If(_)) && frame.otherwise.is_none() =>
                    {
                        frame.otherwise = Some(Vec::new());
                    }
                    _ => return Err(syntax("`{{else}}` outside of `{{#if}}`".into())),
                }
            } else if tag == "/each" {
                match stack.pop() {
                    Some(Frame { block: Block::Each(path), body, .. }) => {
                        target(&mut stack, &mut root).push(Node::Each(path, body));
                    }
                    _ => return Err(syntax("`{{/each}}` without matching `{{#each}}`".into())),
                }
            } else if tag == "/if" {
                match stack.pop() {
                    Some(Frame { block: Block::If(path), body, otherwise }) => {
                        target(&mut stack, &mut root).push(Node::If(
                            path,
                            body,
                            otherwise.unwrap_or_default(),
                        ));
                    }
                    _ => return Err(syntax("`{{/if}}` without matching `{{#if}}`".into())),
                }
            } else if tag.starts_with('#') || tag.starts_with('/') {
                return Err(syntax(format!("unknown block `{tag}`")));
            } else {
                let path = parse_path(tag).map_err(&syntax)?;
                target(&mut stack, &mut root).push(Node::Value(path));
            }
        }

        if !rest.is_empty() {
            target(&mut stack, &mut root).push(Node::Text(rest.to_string()));
        }

        if let Some(frame) = stack.last() {
            let open = match &frame.block {
                Block::Each(path) => format!("{{{{#each {path}}}}}"),
                Block::If(path) => format!("{{{{#if {path}}}}}"),
            };
            return Err(syntax(format!("unclosed `{open}`")));
        }

        Ok(Self { name, nodes: root })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the template against `context`.
    pub fn render(&self, context: &Value) -> Result<String, TemplateError> {
        let mut out = String::new();
        render_nodes(&self.nodes, context, &mut out)?;
        Ok(out)
    }
}

fn target<'a>(stack: &'a mut [Frame], root: &'a mut Vec<Node>) -> &'a mut Vec<Node> {
    match stack.last_mut() {
        Some(frame) => frame.target(),
        None => root,
    }
}

fn preview(text: &str) -> String {
    text.chars().take(24).collect()
}

fn parse_path(text: &str) -> Result<Path, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty expression".into());
    }
    if text == "." {
        return Ok(Path {
            segments: Vec::new(),
        });
    }

    let segments = text
        .split('.')
        .map(|part| parse_segment(part).ok_or_else(|| format!("invalid path `{text}`")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Path { segments })
}

fn parse_segment(part: &str) -> Option<Segment> {
    let (name, index) = match part.split_once('[') {
        Some((name, rest)) => {
            let index = rest.strip_suffix(']')?.trim().parse::<usize>().ok()?;
            (name, Some(index))
        }
        None => (part, None),
    };

    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then(|| Segment {
        name: name.to_string(),
        index,
    })
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, ".");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", segment.name)?;
            if let Some(index) = segment.index {
                write!(f, "[{index}]")?;
            }
        }
        Ok(())
    }
}

fn evaluate<'v>(path: &Path, context: &'v Value) -> Vec<&'v Value> {
    let mut current = vec![context];
    for segment in &path.segments {
        let mut next = Vec::new();
        for item in current {
            match item.get(&segment.name) {
                Some(Value::Array(items)) => next.extend(items.iter().filter(|v| !v.is_null())),
                Some(Value::Null) | None => {}
                Some(child) => next.push(child),
            }
        }
        if let Some(index) = segment.index {
            next = next.into_iter().nth(index).into_iter().collect();
        }
        current = next;
    }
    current
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Null => false,
        _ => true,
    }
}

fn render_nodes(nodes: &[Node], context: &Value, out: &mut String) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Value(path) => {
                let values = evaluate(path, context)
                    .into_iter()
                    .map(|value| match value {
                        Value::String(text) => Ok(escape_xhtml(text)),
                        Value::Number(number) => Ok(number.to_string()),
                        Value::Bool(flag) => Ok(flag.to_string()),
                        _ => Err(TemplateError::ComplexValue {
                            path: path.to_string(),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                out.push_str(&values.join(", "));
            }
            Node::Each(path, body) => {
                for item in evaluate(path, context) {
                    render_nodes(body, item, out)?;
                }
            }
            Node::If(path, body, otherwise) => {
                if evaluate(path, context).into_iter().any(is_truthy) {
                    render_nodes(body, context, out)?;
                } else {
                    render_nodes(otherwise, context, out)?;
                }
            }
        }
    }
    Ok(())
}

/// Escape text for inclusion in XHTML content or attribute values.
pub fn escape_xhtml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

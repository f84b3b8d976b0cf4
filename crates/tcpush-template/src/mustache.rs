//! Logic-less template parsing and rendering.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tcpush_core::{Error, Result, SlugCache};

use crate::transforms::TransformTable;

/// A node of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Variable {
        name: String,
        escape: bool,
    },
    Section {
        name: String,
        inverted: bool,
        /// Unrendered body text, handed to transforms.
        raw: String,
        children: Vec<Node>,
    },
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let mut parser = Parser { src: source, pos: 0 };
        let (nodes, _) = parser.parse_nodes(None)?;
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Parse until end of input or the closing tag of `open`.
    ///
    /// Returns the nodes and the offset where the body ended.
    fn parse_nodes(&mut self, open: Option<&str>) -> Result<(Vec<Node>, usize)> {
        let src = self.src;
        let mut nodes = Vec::new();

        loop {
            let Some(rel) = src[self.pos..].find("{{") else {
                if let Some(name) = open {
                    return Err(Error::Render(format!("Unclosed section \"{}\"", name)));
                }
                push_text(&mut nodes, &src[self.pos..]);
                self.pos = src.len();
                return Ok((nodes, src.len()));
            };

            let tag_start = self.pos + rel;
            push_text(&mut nodes, &src[self.pos..tag_start]);

            if src[tag_start..].starts_with("{{{") {
                let inner_start = tag_start + 3;
                let end = self.find_close(inner_start, "}}}")?;
                let name = self.tag_name(&src[inner_start..end])?;
                nodes.push(Node::Variable {
                    name,
                    escape: false,
                });
                self.pos = end + 3;
                continue;
            }

            let inner_start = tag_start + 2;
            let end = self.find_close(inner_start, "}}")?;
            let content = src[inner_start..end].trim();
            self.pos = end + 2;

            let mut chars = content.chars();
            match chars.next() {
                Some(sigil @ ('#' | '^')) => {
                    let name = self.tag_name(chars.as_str())?;
                    let body_start = self.pos;
                    let (children, body_end) = self.parse_nodes(Some(&name))?;
                    nodes.push(Node::Section {
                        raw: src[body_start..body_end].to_string(),
                        name,
                        inverted: sigil == '^',
                        children,
                    });
                }
                Some('/') => {
                    let name = self.tag_name(chars.as_str())?;
                    return match open {
                        Some(expected) if expected == name => Ok((nodes, tag_start)),
                        Some(expected) => Err(Error::Render(format!(
                            "Unclosed section \"{}\" at {}",
                            expected, tag_start
                        ))),
                        None => Err(Error::Render(format!(
                            "Unopened section \"{}\" at {}",
                            name, tag_start
                        ))),
                    };
                }
                Some('!') => {}
                Some('&') => {
                    let name = self.tag_name(chars.as_str())?;
                    nodes.push(Node::Variable {
                        name,
                        escape: false,
                    });
                }
                Some('>') => {
                    return Err(Error::Render("partials are not supported".to_string()));
                }
                Some('=') => {
                    return Err(Error::Render(
                        "changing delimiters is not supported".to_string(),
                    ));
                }
                _ => {
                    let name = self.tag_name(content)?;
                    nodes.push(Node::Variable { name, escape: true });
                }
            }
        }
    }

    fn find_close(&self, from: usize, close: &str) -> Result<usize> {
        self.src[from..]
            .find(close)
            .map(|rel| from + rel)
            .ok_or_else(|| Error::Render(format!("Unclosed tag at {}", from)))
    }

    fn tag_name(&self, raw: &str) -> Result<String> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(Error::Render(format!("Empty tag before {}", self.pos)));
        }
        Ok(name.to_string())
    }
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if !text.is_empty() {
        nodes.push(Node::Text(text.to_string()));
    }
}

/// Everything a render pass needs: the field context, the transform table,
/// the label cache and the instant rendering began.
pub struct RenderScope<'a> {
    context: &'a Map<String, Value>,
    transforms: &'a TransformTable,
    slugs: &'a mut SlugCache,
    now: DateTime<Utc>,
}

impl<'a> RenderScope<'a> {
    pub fn new(
        context: &'a Map<String, Value>,
        transforms: &'a TransformTable,
        slugs: &'a mut SlugCache,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            context,
            transforms,
            slugs,
            now,
        }
    }

    /// Render template text against this scope.
    pub fn render(&mut self, text: &str) -> Result<String> {
        let template = Template::parse(text)?;
        self.render_template(&template)
    }

    pub fn render_template(&mut self, template: &Template) -> Result<String> {
        let mut out = String::new();
        self.render_nodes(template.nodes(), &mut out)?;
        Ok(out)
    }

    /// The instant the render pass started; stable for the whole pass.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn slugs(&mut self) -> &mut SlugCache {
        &mut *self.slugs
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.context.get(name)
    }

    fn render_nodes(&mut self, nodes: &[Node], out: &mut String) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Variable { name, escape } => {
                    if self.transforms.get(name).is_some() {
                        return Err(Error::Render(format!(
                            "\"{}\" is a transform and must be used as a section",
                            name
                        )));
                    }
                    let text = self.lookup(name).map(display_value).unwrap_or_default();
                    if *escape {
                        out.push_str(&escape_html(&text));
                    } else {
                        out.push_str(&text);
                    }
                }
                Node::Section {
                    name,
                    inverted,
                    raw,
                    children,
                } => {
                    let transforms = self.transforms;
                    if let Some(transform) = transforms.get(name) {
                        if *inverted {
                            continue;
                        }
                        out.push_str(&transform.apply(raw, self)?);
                    } else {
                        let truthy = self.lookup(name).is_some_and(is_truthy);
                        if truthy != *inverted {
                            self.render_nodes(children, out)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Render `template` against plain fields. No transforms are available.
pub fn render_fields(template: &str, fields: &Map<String, Value>) -> Result<String> {
    let transforms = TransformTable::new();
    let mut slugs = SlugCache::new();
    RenderScope::new(fields, &transforms, &mut slugs, Utc::now()).render(template)
}

/// Text form of a context value.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Escape the characters mustache escapes in `{{name}}` tags.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '/' => out.push_str("&#x2F;"),
            '`' => out.push_str("&#x60;"),
            '=' => out.push_str("&#x3D;"),
            other => out.push(other),
        }
    }
    out
}

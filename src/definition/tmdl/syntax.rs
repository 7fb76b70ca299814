//! Indentation-based block syntax of TMDL files.
//!
//! A file is a tree of nodes. Each line is one of:
//!
//! ```text
//! /// description line            (attaches to the next node)
//! keyword Name                    (object)
//! keyword 'Quoted Name' = value   (object with an inline value or expression)
//! property: value                 (property)
//! property = value                (expression property, e.g. `source =`)
//! flag                            (bare flag, e.g. `isHidden`)
//! ```
//!
//! Children are indented one level (a tab, or four spaces) deeper than
//! their parent. An object or expression property ending in `=` takes the
//! following deeper lines as a multi-line expression; ```` ``` ```` fences
//! are also accepted.

use crate::error::{ParseError, ParseResult};

/// One parsed line plus everything nested under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// 1-based line number of the declaration.
    pub line: usize,
    pub kind: NodeKind,
    /// Text of preceding `///` lines, joined with newlines.
    pub description: String,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// `keyword name [= value]`; `value` holds the full (possibly multi-line)
    /// text after `=`.
    Object {
        keyword: String,
        name: String,
        value: Option<String>,
    },
    /// `key: value` or `key = value`.
    Property { key: String, value: String },
    /// A bare word.
    Flag(String),
}

impl Node {
    /// Object keyword, if this node is an object.
    pub fn keyword(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Object { keyword, .. } => Some(keyword),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Object { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Object { value, .. } => value.as_deref(),
            NodeKind::Property { value, .. } => Some(value),
            NodeKind::Flag(_) => None,
        }
    }

    /// Child objects with the given keyword.
    pub fn objects<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children
            .iter()
            .filter(move |child| child.keyword() == Some(keyword))
    }

    /// Value of a child property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.children.iter().find_map(|child| match &child.kind {
            NodeKind::Property { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// A flag is set by a bare word or by `flag: true`.
    pub fn flag(&self, name: &str) -> bool {
        self.children.iter().any(|child| match &child.kind {
            NodeKind::Flag(flag) => flag == name,
            NodeKind::Property { key, value } => key == name && value.eq_ignore_ascii_case("true"),
            NodeKind::Object { .. } => false,
        })
    }
}

/// Parse a whole file into top-level nodes.
pub fn parse(file: &str, text: &str) -> ParseResult<Vec<Node>> {
    let lines: Vec<Line<'_>> = text
        .trim_start_matches('\u{feff}')
        .lines()
        .enumerate()
        .map(|(idx, raw)| Line::new(idx + 1, raw))
        .collect();

    let mut parser = Parser {
        file,
        lines: &lines,
        pos: 0,
    };
    parser.block(None)
}

struct Line<'a> {
    number: usize,
    raw: &'a str,
    indent: usize,
    text: &'a str,
}

impl<'a> Line<'a> {
    fn new(number: usize, raw: &'a str) -> Self {
        let raw = raw.trim_end_matches('\r');
        Self {
            number,
            raw,
            indent: indent_level(raw),
            text: raw.trim(),
        }
    }

    fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}

/// Indentation depth: tabs count one level each, spaces four to a level.
pub fn indent_level(line: &str) -> usize {
    let mut tabs = 0;
    let mut spaces = 0;
    for c in line.chars() {
        match c {
            '\t' => tabs += 1,
            ' ' => spaces += 1,
            _ => break,
        }
    }
    tabs + spaces / 4
}

struct Parser<'a> {
    file: &'a str,
    lines: &'a [Line<'a>],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, line: usize, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            file: self.file.to_string(),
            line,
            message: message.into(),
        }
    }

    fn skip_blank(&mut self) {
        while self.pos < self.lines.len() && self.lines[self.pos].is_blank() {
            self.pos += 1;
        }
    }

    /// Parse sibling nodes deeper than `parent`.
    fn block(&mut self, parent: Option<usize>) -> ParseResult<Vec<Node>> {
        let mut nodes = Vec::new();
        let mut description: Vec<&str> = Vec::new();

        let lines = self.lines;
        loop {
            self.skip_blank();
            let Some(line) = lines.get(self.pos) else {
                break;
            };
            if parent.is_some_and(|p| line.indent <= p) {
                break;
            }

            if let Some(doc) = line.text.strip_prefix("///") {
                description.push(doc.trim());
                self.pos += 1;
                continue;
            }
            if line.text.starts_with("//") {
                self.pos += 1;
                continue;
            }

            let mut node = self.node()?;
            node.description = description.join("\n");
            description.clear();
            nodes.push(node);
        }

        Ok(nodes)
    }

    fn node(&mut self) -> ParseResult<Node> {
        let lines = self.lines;
        let line = &lines[self.pos];
        self.pos += 1;

        let (mut kind, open_expression) = classify(line.text).map_err(|m| self.error(line.number, m))?;

        if let Some(first) = open_expression {
            let is_property = matches!(kind, NodeKind::Property { .. });
            let text = self.expression(line.indent, first, line.number, is_property)?;
            match &mut kind {
                NodeKind::Object { value, .. } => *value = Some(text),
                NodeKind::Property { value, .. } => *value = text,
                NodeKind::Flag(_) => {}
            }
        }

        let children = self.block(Some(line.indent))?;
        Ok(Node {
            line: line.number,
            kind,
            description: String::new(),
            children,
        })
    }

    /// Collect a (possibly multi-line) expression that starts with `first`
    /// on a declaration at depth `indent`. Properties have no members, so
    /// every deeper line belongs to their expression.
    fn expression(
        &mut self,
        indent: usize,
        first: &str,
        line: usize,
        is_property: bool,
    ) -> ParseResult<String> {
        if first.starts_with("```") {
            return self.fenced(first, line);
        }

        let mut parts: Vec<&str> = Vec::new();
        if !first.is_empty() {
            parts.push(first);
        }

        let mut end = self.pos;
        let mut scan = self.pos;
        while let Some(next) = self.lines.get(scan) {
            if next.is_blank() {
                scan += 1;
                continue;
            }
            let continues = next.indent > indent + 1
                || (is_property && next.indent > indent)
                || (first.is_empty()
                    && next.indent == indent + 1
                    && !looks_like_member(next.text));
            if !continues {
                break;
            }
            scan += 1;
            end = scan;
        }

        parts.extend(self.lines[self.pos..end].iter().map(|l| l.raw));
        self.pos = end;
        Ok(parts.join("\n"))
    }

    fn fenced(&mut self, first: &str, line: usize) -> ParseResult<String> {
        let after = first.trim_start_matches('`').trim();
        let mut parts: Vec<&str> = Vec::new();
        if !after.is_empty() {
            parts.push(after);
        }
        let lines = self.lines;
        while let Some(next) = lines.get(self.pos) {
            self.pos += 1;
            if next.text.starts_with("```") {
                return Ok(parts.join("\n"));
            }
            parts.push(next.raw);
        }
        Err(self.error(line, "unterminated ``` expression"))
    }
}

/// Split a declaration line. The second element is `Some(first_line)` when
/// the line opens an expression (`... = value`).
fn classify(text: &str) -> Result<(NodeKind, Option<&str>), String> {
    let word_end = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    let (word, rest) = text.split_at(word_end);
    if word.is_empty() {
        return Err(format!("expected a keyword or property, found '{text}'"));
    }
    let rest_trimmed = rest.trim_start();

    if rest_trimmed.is_empty() {
        return Ok((NodeKind::Flag(word.to_string()), None));
    }
    if let Some(value) = rest_trimmed.strip_prefix(':') {
        return Ok((
            NodeKind::Property {
                key: word.to_string(),
                value: value.trim().to_string(),
            },
            None,
        ));
    }
    if let Some(value) = rest_trimmed.strip_prefix('=') {
        return Ok((
            NodeKind::Property {
                key: word.to_string(),
                value: String::new(),
            },
            Some(value.trim()),
        ));
    }
    if !rest.starts_with(char::is_whitespace) {
        return Err(format!("unexpected '{rest_trimmed}' after '{word}'"));
    }

    // `ref table Sales`: the name is everything after the keyword.
    if word == "ref" {
        return Ok((
            NodeKind::Object {
                keyword: word.to_string(),
                name: rest_trimmed.to_string(),
                value: None,
            },
            None,
        ));
    }

    let (name, after) = split_name(rest_trimmed)?;
    let after = after.trim_start();
    let keyword = word.to_string();

    if after.is_empty() {
        return Ok((NodeKind::Object { keyword, name, value: None }, None));
    }
    match after.strip_prefix('=') {
        Some(value) => Ok((
            NodeKind::Object {
                keyword,
                name,
                value: Some(String::new()),
            },
            Some(value.trim()),
        )),
        None => Err(format!("unexpected '{after}' after name '{name}'")),
    }
}

/// Read one name (quoted or bare) from the front of `text`.
pub fn split_name(text: &str) -> Result<(String, &str), String> {
    if let Some(body) = text.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = body.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            if c == '\'' {
                if chars.peek().map(|(_, n)| *n) == Some('\'') {
                    chars.next();
                    name.push('\'');
                    continue;
                }
                return Ok((name, &body[idx + 1..]));
            }
            name.push(c);
        }
        return Err(format!("unterminated quoted name in '{text}'"));
    }
    if let Some(body) = text.strip_prefix('"') {
        return match body.find('"') {
            Some(end) => Ok((body[..end].to_string(), &body[end + 1..])),
            None => Err(format!("unterminated quoted name in '{text}'")),
        };
    }

    let end = text
        .find(|c: char| c.is_whitespace() || c == '=' || c == '.')
        .unwrap_or(text.len());
    if end == 0 {
        return Err(format!("expected a name in '{text}'"));
    }
    Ok((text[..end].to_string(), &text[end..]))
}

/// Remove quoting from a name, if present.
pub fn unquote(text: &str) -> String {
    let text = text.trim();
    match split_name(text) {
        Ok((name, rest)) if rest.trim().is_empty() => name,
        _ => text.to_string(),
    }
}

/// Split a `Table.Column` reference (either part may be quoted).
pub fn split_column_ref(text: &str) -> Option<(String, String)> {
    let (table, rest) = split_name(text.trim()).ok()?;
    let column = rest.strip_prefix('.')?;
    let (column, tail) = split_name(column).ok()?;
    tail.trim().is_empty().then_some((table, column))
}

/// A line at property depth that ends a multi-line expression: a property,
/// a bare flag, an annotation or a nested object declaration.
fn looks_like_member(text: &str) -> bool {
    let word_end = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    if word_end == 0 {
        return false;
    }
    let word = &text[..word_end];
    let rest = text[word_end..].trim_start();
    (rest.is_empty() && is_flag_word(word))
        || rest.starts_with(':')
        || MEMBER_KEYWORDS.contains(&word)
}

/// `isHidden`, `isKey` and similar; keeps `RETURN` or `in` inside expressions.
fn is_flag_word(word: &str) -> bool {
    word.strip_prefix("is")
        .and_then(|rest| rest.chars().next())
        .is_some_and(char::is_uppercase)
        || FLAG_WORDS.contains(&word)
}

const FLAG_WORDS: &[&str] = &["keepUniqueRows", "summarizeBy"];

const MEMBER_KEYWORDS: &[&str] = &[
    "annotation",
    "changedProperty",
    "extendedProperty",
    "formatStringDefinition",
    "detailRowsDefinition",
];

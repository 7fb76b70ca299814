//! Restricted parser for container-literal text.
//!
//! Some extractor tools print their result as the repr of a native list
//! (`<StringArray>\n['Sales', 'Customer']\nLength: 2`) instead of JSON.
//! This module accepts only data literals: strings, numbers, booleans,
//! `None`, lists and tuples. Names, calls, operators and dicts are rejected.

use serde_json::Value;

use crate::error::{ParseError, ParseResult};

/// Deepest nesting accepted before giving up.
const MAX_DEPTH: usize = 64;

/// A decoded literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
}

impl Literal {
    /// Convert to JSON. Tuples become arrays; non-finite floats become null.
    pub fn into_json(self) -> Value {
        match self {
            Literal::Str(s) => Value::String(s),
            Literal::Int(i) => Value::from(i),
            Literal::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Literal::Bool(b) => Value::Bool(b),
            Literal::None => Value::Null,
            Literal::List(items) | Literal::Tuple(items) => {
                Value::Array(items.into_iter().map(Literal::into_json).collect())
            }
        }
    }
}

/// Parse a complete literal; trailing non-whitespace is an error.
pub fn parse_literal(text: &str) -> ParseResult<Literal> {
    let mut parser = Parser::new(text);
    parser.skip_ws();
    let value = parser.value(0)?;
    parser.skip_ws();
    if parser.pos < text.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}

/// Decode the first list literal embedded in free text.
///
/// Each `[` is tried in turn and parsing stops where that list closes, so
/// prose before or after the list is ignored. Offsets in errors are relative
/// to `raw`.
pub fn parse_embedded_list(raw: &str) -> ParseResult<Literal> {
    let mut first_error = None;
    for (start, _) in raw.match_indices('[') {
        let mut parser = Parser { src: raw, pos: start };
        match parser.value(0) {
            Ok(list) => return Ok(list),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    Err(first_error.unwrap_or_else(|| ParseError::MalformedLiteral {
        offset: 0,
        message: "no list literal found".to_string(),
    }))
}

/// Decode a list of strings from free text containing a list literal.
pub fn parse_string_list(raw: &str) -> ParseResult<Vec<String>> {
    match parse_embedded_list(raw)? {
        Literal::List(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Literal::Str(s) => Ok(s),
                other => Err(ParseError::MalformedLiteral {
                    offset: 0,
                    message: format!("element {idx} is not a string: {other:?}"),
                }),
            })
            .collect(),
        _ => Err(ParseError::MalformedLiteral {
            offset: 0,
            message: "expected a list".to_string(),
        }),
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::MalformedLiteral {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn value(&mut self, depth: usize) -> ParseResult<Literal> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }

        match self.peek() {
            Some('[') => {
                self.bump();
                self.sequence(']', depth).map(Literal::List)
            }
            Some('(') => {
                self.bump();
                self.parenthesized(depth)
            }
            Some(q @ ('\'' | '"')) => self.string(q).map(Literal::Str),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.keyword(),
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// Comma-separated values up to `close`; a trailing comma is allowed.
    fn sequence(&mut self, close: char, depth: usize) -> ParseResult<Vec<Literal>> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(items);
            }
            items.push(self.value(depth + 1)?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(c) if c == close => {
                    self.bump();
                    return Ok(items);
                }
                Some(c) => return Err(self.error(format!("expected ',' or '{close}', found '{c}'"))),
                None => return Err(self.error(format!("unterminated sequence, expected '{close}'"))),
            }
        }
    }

    /// `()` and `(x,)` are tuples; `(x)` is just `x`.
    fn parenthesized(&mut self, depth: usize) -> ParseResult<Literal> {
        self.skip_ws();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(Literal::Tuple(Vec::new()));
        }
        let first = self.value(depth + 1)?;
        self.skip_ws();
        match self.bump() {
            Some(')') => Ok(first),
            Some(',') => {
                let mut items = vec![first];
                items.extend(self.sequence(')', depth)?);
                Ok(Literal::Tuple(items))
            }
            Some(c) => Err(self.error(format!("expected ',' or ')', found '{c}'"))),
            None => Err(self.error("unterminated tuple")),
        }
    }

    fn string(&mut self, quote: char) -> ParseResult<String> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    self.pos = start;
                    return Err(self.error("unterminated string"));
                }
                Some(c) if c == quote => return Ok(out),
                Some('\\') => out.push(self.escape()?),
                Some(c) => out.push(c),
            }
        }
    }

    fn escape(&mut self) -> ParseResult<char> {
        let c = self.bump().ok_or_else(|| self.error("unterminated escape"))?;
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' | '\'' | '"' => c,
            'x' => self.hex_escape(2)?,
            'u' => self.hex_escape(4)?,
            'U' => self.hex_escape(8)?,
            other => return Err(self.error(format!("unsupported escape '\\{other}'"))),
        })
    }

    fn hex_escape(&mut self, len: usize) -> ParseResult<char> {
        let digits = self
            .src
            .get(self.pos..self.pos + len)
            .ok_or_else(|| self.error("truncated escape"))?;
        let code = u32::from_str_radix(digits, 16).map_err(|_| self.error("invalid hex escape"))?;
        let c = char::from_u32(code).ok_or_else(|| self.error("invalid code point"))?;
        self.pos += len;
        Ok(c)
    }

    fn number(&mut self) -> ParseResult<Literal> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some('-' | '+')) {
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }

        let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
        let parsed = if is_float {
            text.parse::<f64>().ok().map(Literal::Float)
        } else {
            text.parse::<i64>().ok().map(Literal::Int)
        };
        parsed.ok_or_else(|| ParseError::MalformedLiteral {
            offset: start,
            message: format!("invalid number '{text}'"),
        })
    }

    fn keyword(&mut self) -> ParseResult<Literal> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        match &self.src[start..self.pos] {
            "True" => Ok(Literal::Bool(true)),
            "False" => Ok(Literal::Bool(false)),
            "None" => Ok(Literal::None),
            word => Err(ParseError::MalformedLiteral {
                offset: start,
                message: format!("names are not literals: '{word}'"),
            }),
        }
    }
}

//! Reference scanner for DAX formula text.
//!
//! Only object references are produced; everything else (operators,
//! function names, literals) is skipped. String literals and comments are
//! never scanned for references.

/// A `[Name]`, `Table[Name]` or `'Table'[Name]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Qualifying table, if any.
    pub table: Option<String>,
    /// Bracketed name with `]]` unescaped.
    pub name: String,
}

impl Reference {
    fn bare(name: String) -> Self {
        Self { table: None, name }
    }

    fn qualified(table: String, name: String) -> Self {
        Self {
            table: Some(table),
            name,
        }
    }
}

/// Scan `expression` for references, in order of appearance.
///
/// Unterminated brackets, quotes and comments end the scan quietly: the
/// text is formula source, not something this crate validates.
pub fn references(expression: &str) -> Vec<Reference> {
    let chars: Vec<char> = expression.chars().collect();
    let mut refs = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            '"' => pos = skip_string(&chars, pos + 1),
            '/' if chars.get(pos + 1) == Some(&'/') => pos = skip_line(&chars, pos),
            '-' if chars.get(pos + 1) == Some(&'-') => pos = skip_line(&chars, pos),
            '/' if chars.get(pos + 1) == Some(&'*') => pos = skip_block_comment(&chars, pos + 2),
            '[' => {
                let Some((name, next)) = bracketed(&chars, pos + 1) else {
                    break;
                };
                refs.push(Reference::bare(name));
                pos = next;
            }
            '\'' => {
                let Some((table, next)) = quoted_table(&chars, pos + 1) else {
                    break;
                };
                pos = next;
                if let Some((name, next)) = qualifier_target(&chars, pos) {
                    refs.push(Reference::qualified(table, name));
                    pos = next;
                }
            }
            c if is_ident_start(c) => {
                let start = pos;
                while pos < chars.len() && is_ident_char(chars[pos]) {
                    pos += 1;
                }
                let table: String = chars[start..pos].iter().collect();
                // Identifiers glued to a digit run (e.g. `1e5`) are not tables.
                let preceded_by_digit = start > 0 && chars[start - 1].is_ascii_digit();
                let mut bracket = pos;
                while bracket < chars.len() && chars[bracket].is_whitespace() {
                    bracket += 1;
                }
                // `RETURN [Total]` is a keyword before a bare reference, not a table.
                let spaced_keyword = bracket > pos && is_keyword(&table);
                if !preceded_by_digit && !spaced_keyword && chars.get(bracket) == Some(&'[') {
                    if let Some((name, next)) = bracketed(&chars, bracket + 1) {
                        refs.push(Reference::qualified(table, name));
                        pos = next;
                    } else {
                        break;
                    }
                }
            }
            _ => pos += 1,
        }
    }

    refs
}

/// DAX keywords that may be followed by a bracketed reference.
const KEYWORDS: &[&str] = &["RETURN", "VAR", "IN", "NOT", "AND", "OR", "ASC", "DESC", "EVALUATE"];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Read up to the closing `]`; returns the name and the position after it.
fn bracketed(chars: &[char], mut pos: usize) -> Option<(String, usize)> {
    let mut name = String::new();
    while pos < chars.len() {
        if chars[pos] == ']' {
            if chars.get(pos + 1) == Some(&']') {
                name.push(']');
                pos += 2;
                continue;
            }
            return Some((name, pos + 1));
        }
        name.push(chars[pos]);
        pos += 1;
    }
    None
}

fn quoted_table(chars: &[char], mut pos: usize) -> Option<(String, usize)> {
    let mut name = String::new();
    while pos < chars.len() {
        if chars[pos] == '\'' {
            if chars.get(pos + 1) == Some(&'\'') {
                name.push('\'');
                pos += 2;
                continue;
            }
            return Some((name, pos + 1));
        }
        name.push(chars[pos]);
        pos += 1;
    }
    None
}

/// `[Name]` right after a quoted table, allowing whitespace in between.
fn qualifier_target(chars: &[char], mut pos: usize) -> Option<(String, usize)> {
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    if chars.get(pos) != Some(&'[') {
        return None;
    }
    bracketed(chars, pos + 1)
}

fn skip_string(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() {
        if chars[pos] == '"' {
            if chars.get(pos + 1) == Some(&'"') {
                pos += 2;
                continue;
            }
            return pos + 1;
        }
        pos += 1;
    }
    chars.len()
}

fn skip_line(chars: &[char], pos: usize) -> usize {
    chars[pos..]
        .iter()
        .position(|&c| c == '\n')
        .map_or(chars.len(), |offset| pos + offset + 1)
}

fn skip_block_comment(chars: &[char], mut pos: usize) -> usize {
    while pos + 1 < chars.len() {
        if chars[pos] == '*' && chars[pos + 1] == '/' {
            return pos + 2;
        }
        pos += 1;
    }
    chars.len()
}

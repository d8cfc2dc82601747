//! Named-parameter SQL
//!
//! Statements are written with `:name` placeholders and rewritten into the
//! positional form the backend understands. Every occurrence gets its own
//! positional slot, so a name used twice binds its value twice.

use std::collections::HashMap;

use crate::backends::{BackendKind, DatabaseValue};
use crate::error::{TxError, TxResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Param(String),
}

/// SQL text split into literal text and named placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSql {
    segments: Vec<Segment>,
}

impl ParsedSql {
    pub fn parse(sql: &str) -> Self {
        let chars: Vec<char> = sql.chars().collect();
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '\'' | '"' => {
                    let end = skip_quoted(&chars, i, c);
                    text.extend(&chars[i..end]);
                    i = end;
                }
                '-' if chars.get(i + 1) == Some(&'-') => {
                    let end = chars[i..]
                        .iter()
                        .position(|&ch| ch == '\n')
                        .map_or(chars.len(), |offset| i + offset);
                    text.extend(&chars[i..end]);
                    i = end;
                }
                '/' if chars.get(i + 1) == Some(&'*') => {
                    let end = find_block_comment_end(&chars, i + 2);
                    text.extend(&chars[i..end]);
                    i = end;
                }
                ':' if chars.get(i + 1) == Some(&':') => {
                    text.push_str("::");
                    i += 2;
                }
                ':' if chars.get(i + 1).is_some_and(|&ch| is_name_start(ch)) => {
                    let start = i + 1;
                    let end = chars[start..]
                        .iter()
                        .position(|&ch| !is_name_part(ch))
                        .map_or(chars.len(), |offset| start + offset);
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Param(chars[start..end].iter().collect()));
                    i = end;
                }
                _ => {
                    text.push(c);
                    i += 1;
                }
            }
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Self { segments }
    }

    /// Placeholder names in order of appearance, repeats included
    pub fn parameter_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param(name) => Some(name.as_str()),
                Segment::Text(_) => None,
            })
            .collect()
    }

    /// Rewrite into positional SQL for `backend` with the matching argument list
    pub fn expand(
        &self,
        backend: BackendKind,
        values: &HashMap<String, DatabaseValue>,
    ) -> TxResult<(String, Vec<DatabaseValue>)> {
        let mut sql = String::new();
        let mut params = Vec::new();

        for segment in &self.segments {
            match segment {
                Segment::Text(text) => sql.push_str(text),
                Segment::Param(name) => {
                    let value = values
                        .get(name)
                        .ok_or_else(|| TxError::MissingParameter(name.clone()))?;
                    params.push(value.clone());
                    sql.push_str(&backend.placeholder(params.len()));
                }
            }
        }

        Ok((sql, params))
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Index just past the closing quote; a doubled quote is an escape
fn skip_quoted(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn find_block_comment_end(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}

//! JSONC parsing: comment stripping + depth-limited JSON.
//!
//! The stripper replaces comment bytes with spaces (and keeps every newline)
//! so the downstream parser's line/column numbers point at the original
//! source. Insertion order of object keys is preserved by serde_json's
//! `preserve_order` feature, which the expanded-manifest hash depends on.

use camino::Utf8Path;

use crate::errors::{OutfitterError, OutfitterResult};

/// Default maximum nesting depth for parsed documents
pub const DEFAULT_DEPTH_LIMIT: usize = 100;

/// Strip `//` and `/* ... */` comments outside of string literals.
///
/// Escape sequences (`\"`, `\\`) inside strings are respected, so a `//`
/// inside a string survives. Stripped characters become spaces; newlines are
/// always preserved.
pub fn strip_comments(src: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Normal,
        InString,
        InStringEscape,
        InLineComment,
        InBlockComment,
    }

    let mut out = String::with_capacity(src.len());
    let mut state = State::Normal;
    let mut chars = src.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                '"' => {
                    state = State::InString;
                    out.push(c);
                }
                '/' => match chars.peek() {
                    Some('/') => {
                        chars.next();
                        state = State::InLineComment;
                        out.push_str("  ");
                    }
                    Some('*') => {
                        chars.next();
                        state = State::InBlockComment;
                        out.push_str("  ");
                    }
                    _ => out.push(c),
                },
                _ => out.push(c),
            },
            State::InString => match c {
                '\\' => {
                    state = State::InStringEscape;
                    out.push(c);
                }
                '"' => {
                    state = State::Normal;
                    out.push(c);
                }
                _ => out.push(c),
            },
            State::InStringEscape => {
                state = State::InString;
                out.push(c);
            }
            State::InLineComment => {
                if c == '\n' {
                    state = State::Normal;
                    out.push(c);
                } else if c == '\r' {
                    out.push(c);
                } else {
                    out.push(' ');
                }
            }
            State::InBlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Normal;
                    out.push_str("  ");
                } else if c == '\n' || c == '\r' {
                    out.push(c);
                } else {
                    out.push(' ');
                }
            }
        }
    }
    out
}

/// Parse a JSONC document with the default depth limit
pub fn parse_str(src: &str, origin: &Utf8Path) -> OutfitterResult<serde_json::Value> {
    parse_with_depth(src, origin, DEFAULT_DEPTH_LIMIT)
}

/// Parse a JSONC document, rejecting documents nested deeper than `limit`
pub fn parse_with_depth(
    src: &str,
    origin: &Utf8Path,
    limit: usize,
) -> OutfitterResult<serde_json::Value> {
    let stripped = strip_comments(src);
    let value: serde_json::Value =
        serde_json::from_str(&stripped).map_err(|e| OutfitterError::ManifestParse {
            path: origin.to_owned(),
            details: e.to_string(),
        })?;
    let depth = depth_of(&value);
    if depth > limit {
        return Err(OutfitterError::ManifestParse {
            path: origin.to_owned(),
            details: format!("document nests {depth} levels deep (limit {limit})"),
        });
    }
    Ok(value)
}

fn depth_of(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Object(map) => {
            1 + map.values().map(depth_of).max().unwrap_or(0)
        }
        serde_json::Value::Array(items) => {
            1 + items.iter().map(depth_of).max().unwrap_or(0)
        }
        _ => 1,
    }
}

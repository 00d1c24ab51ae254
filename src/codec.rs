//! Reading and writing of the `key=value` properties text used for persisted state.
//!
//! The format follows the classic Java properties rules, so state files written by other
//! tooling in the same format load unchanged:
//! - `#` or `!` starts a comment line, blank lines are skipped
//! - key and value are separated by `=`, `:` or whitespace
//! - `\t`, `\n`, `\r`, `\f`, `\uXXXX` and `\<char>` escapes
//! - a line ending in an odd number of backslashes continues on the next line

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError {
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

impl std::error::Error for CodecError {}

/// Encode pairs as properties text, in the given order.
pub fn properties_encode<'a, I>(comment: Option<&str>, pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    if let Some(c) = comment {
        for line in c.lines() {
            out.push('#');
            out.push_str(line);
            out.push('\n');
        }
    }

    for (k, v) in pairs {
        escape_into(&mut out, k, true);
        out.push('=');
        escape_into(&mut out, v, false);
        out.push('\n');
    }
    out
}

/// Decode properties text. Later duplicates of a key win.
pub fn properties_decode(text: &str) -> Result<BTreeMap<String, String>, CodecError> {
    let mut out = BTreeMap::new();
    let mut lines = text.lines().enumerate();

    while let Some((idx, raw)) = lines.next() {
        let line_no = idx + 1;
        let first = raw.trim_start_matches(is_blank);
        if first.is_empty() || first.starts_with('#') || first.starts_with('!') {
            continue;
        }

        let mut logical = String::from(first);
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start_matches(is_blank)),
                None => break,
            }
        }

        let (key, value) = split_key_value(&logical);
        let key = unescape(key).map_err(|reason| CodecError { line: line_no, reason })?;
        let value = unescape(value).map_err(|reason| CodecError { line: line_no, reason })?;
        out.insert(key, value);
    }

    Ok(out)
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\x0c'
}

fn ends_with_continuation(s: &str) -> bool {
    let trailing = s.bytes().rev().take_while(|&b| b == b'\\').count();
    trailing % 2 == 1
}

/// Split a logical line at the first unescaped separator.
fn split_key_value(line: &str) -> (&str, &str) {
    let bytes = line.as_bytes();
    let mut i = 0;
    let mut key_end = bytes.len();
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'=' | b':' | b' ' | b'\t' | b'\x0c' => {
                key_end = i;
                break;
            }
            _ => i += 1,
        }
    }

    let key_end = key_end.min(bytes.len());
    let key = &line[..key_end];
    let mut rest = line[key_end..].trim_start_matches(is_blank);
    if let Some(r) = rest.strip_prefix(['=', ':']) {
        rest = r.trim_start_matches(is_blank);
    }
    (key, rest)
}

fn unescape(s: &str) -> Result<String, String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return Err(format!("truncated \\u escape: \\u{hex}"));
                }
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| format!("malformed \\u escape: \\u{hex}"))?;
                let ch = char::from_u32(code)
                    .ok_or_else(|| format!("\\u{hex} is not a valid character"))?;
                out.push(ch);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}

fn escape_into(out: &mut String, s: &str, is_key: bool) {
    for (i, c) in s.chars().enumerate() {
        match c {
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
}

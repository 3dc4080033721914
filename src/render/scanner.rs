use std::borrow::Cow;

use crate::error::SqlPoolError;

/// A placeholder found outside literals, quoted identifiers and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Placeholder<'a> {
    /// `$N`, one-based.
    Positional(usize),
    /// `:name`
    Named(&'a str),
}

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    /// `E'...'`, where a backslash escapes the next byte.
    EscapeQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// Walk `sql` and let `replace` substitute each placeholder.
///
/// Returning `Ok(None)` keeps the placeholder text. Borrows when nothing changed.
pub(super) fn rewrite<'s, F>(sql: &'s str, mut replace: F) -> Result<Cow<'s, str>, SqlPoolError>
where
    F: FnMut(Placeholder<'_>) -> Result<Option<String>, SqlPoolError>,
{
    let bytes = sql.as_bytes();
    let mut out: Option<String> = None;
    let mut copied_upto = 0;
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' if opens_escape_string(bytes, idx) => state = State::EscapeQuoted,
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => state = State::LineComment,
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((end, digits)) = scan_digits(bytes, idx + 1) {
                        let number = digits.parse::<usize>().map_err(|e| {
                            SqlPoolError::ParameterError(format!("bad placeholder ${digits}: {e}"))
                        })?;
                        if let Some(text) = replace(Placeholder::Positional(number))? {
                            let buf = out.get_or_insert_with(String::new);
                            buf.push_str(&sql[copied_upto..idx]);
                            buf.push_str(&text);
                            copied_upto = end;
                        }
                        idx = end;
                        continue;
                    } else if let Some((tag, tag_end)) = dollar_quote_tag(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = tag_end;
                    }
                }
                b':' => {
                    // `::type` casts are not placeholders.
                    if bytes.get(idx + 1) == Some(&b':') {
                        idx += 2;
                        continue;
                    }
                    if let Some(end) = scan_ident(bytes, idx + 1) {
                        let name = &sql[idx + 1..end];
                        if let Some(text) = replace(Placeholder::Named(name))? {
                            let buf = out.get_or_insert_with(String::new);
                            buf.push_str(&sql[copied_upto..idx]);
                            buf.push_str(&text);
                            copied_upto = end;
                        }
                        idx = end;
                        continue;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::EscapeQuoted => match b {
                b'\\' => idx += 1,
                b'\'' if bytes.get(idx + 1) == Some(&b'\'') => idx += 1,
                b'\'' => state = State::Normal,
                _ => {}
            },
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && closes_dollar_quote(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied_upto..]);
            Ok(Cow::Owned(buf))
        }
        None => Ok(Cow::Borrowed(sql)),
    }
}

/// A quote directly after a standalone `E` or `e`.
fn opens_escape_string(bytes: &[u8], quote: usize) -> bool {
    let Some(prefix) = quote.checked_sub(1) else {
        return false;
    };
    matches!(bytes[prefix], b'E' | b'e')
        && prefix
            .checked_sub(1)
            .is_none_or(|before| !(bytes[before].is_ascii_alphanumeric() || bytes[before] == b'_'))
}

fn scan_digits(bytes: &[u8], start: usize) -> Option<(usize, &str)> {
    let mut idx = start;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx == start {
        None
    } else {
        std::str::from_utf8(&bytes[start..idx])
            .ok()
            .map(|digits| (idx, digits))
    }
}

fn scan_ident(bytes: &[u8], start: usize) -> Option<usize> {
    match bytes.get(start) {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return None,
    }
    let mut idx = start + 1;
    while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
        idx += 1;
    }
    Some(idx)
}

/// `$tag$` opening at `start`; returns the tag and the index of the closing `$`.
fn dollar_quote_tag(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            return None;
        }
        idx += 1;
    }
    if idx < bytes.len() {
        let tag = String::from_utf8(bytes[start + 1..idx].to_vec()).ok()?;
        Some((tag, idx))
    } else {
        None
    }
}

fn closes_dollar_quote(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    end < bytes.len() && &bytes[idx + 1..end] == tag.as_bytes() && bytes[end] == b'$'
}

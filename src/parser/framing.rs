//! Splitting a raw server response into FETCH blocks
//!
//! Bodies travel as counted literals: `{n}\r\n` followed by exactly n
//! bytes. The framer pulls the message body literal out of each FETCH
//! line, inlines any other literal as a quoted string, and hands the
//! remaining attribute text to [`parse_attributes`].
//!
//! [`parse_attributes`]: super::parse_attributes

use crate::error::{Error, Result};

/// One untagged FETCH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFetch {
    /// The attribute line, envelope included, literal bytes removed.
    pub attributes: String,
    /// The `BODY[...]` or `RFC822` literal, if the response had one.
    pub body: Option<Vec<u8>>,
}

/// Split raw response bytes into FETCH blocks, in server order.
///
/// Tagged status lines and untagged responses other than FETCH are
/// skipped.
///
/// # Errors
///
/// [`Error::Parse`] for a truncated literal or an unterminated
/// FETCH response.
pub fn split_fetch_responses(raw: &[u8]) -> Result<Vec<RawFetch>> {
    let mut blocks = Vec::new();
    let mut pos = 0;

    while pos < raw.len() {
        let (response, next) = read_response(raw, pos)?;
        pos = next;
        if is_fetch(&response.attributes) {
            blocks.push(response);
        }
    }

    Ok(blocks)
}

fn is_fetch(line: &str) -> bool {
    let mut words = line.split_ascii_whitespace();
    words.next() == Some("*")
        && words.next().is_some_and(|w| w.parse::<u32>().is_ok())
        && words.next().is_some_and(|w| w.eq_ignore_ascii_case("FETCH"))
}

/// Read one logical response starting at `pos`, following literals
/// across line breaks. Returns the response and the offset after it.
fn read_response(raw: &[u8], mut pos: usize) -> Result<(RawFetch, usize)> {
    let mut text = String::new();
    let mut body = None;

    loop {
        let (line, next) = next_line(raw, pos);
        let line = String::from_utf8_lossy(line);
        pos = next;

        let Some((before, size)) = literal_marker(&line) else {
            text.push_str(&line);
            return Ok((RawFetch { attributes: text, body }, pos));
        };

        let end = pos
            .checked_add(size)
            .filter(|&end| end <= raw.len())
            .ok_or_else(|| {
                Error::Parse(format!(
                    "literal of {size} bytes truncated at offset {pos}"
                ))
            })?;
        let literal = &raw[pos..end];
        pos = end;

        text.push_str(before);
        if body.is_none() && names_message_body(before) {
            text.push_str(&format!("{{{size}}}"));
            body = Some(literal.to_vec());
        } else {
            text.push_str(&quote(&String::from_utf8_lossy(literal)));
        }
    }
}

/// The next line without its terminator, and the offset after it.
fn next_line(raw: &[u8], pos: usize) -> (&[u8], usize) {
    let rest = &raw[pos..];
    match rest.iter().position(|&b| b == b'\n') {
        Some(i) => {
            let line = &rest[..i];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            (line, pos + i + 1)
        }
        None => (rest, raw.len()),
    }
}

/// `"... {123}"` splits into `("... ", 123)`.
fn literal_marker(line: &str) -> Option<(&str, usize)> {
    let inner = line.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    let digits = &inner[open + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((&line[..open], digits.parse().ok()?))
}

fn names_message_body(before: &str) -> bool {
    before
        .split_ascii_whitespace()
        .next_back()
        .is_some_and(|name| {
            let name = name.to_ascii_uppercase();
            name.starts_with("BODY[") || name.starts_with("RFC822")
        })
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

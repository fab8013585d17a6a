//! Encoded header words and address lists
//!
//! Header text may contain RFC 2047 encoded words such as
//! `=?UTF-8?B?SGVsbG8=?=`. Decoding never fails outright: a word that
//! cannot be decoded is replaced by a lossy rendering and the problem
//! is logged, so a bad subject line cannot sink an otherwise valid
//! message.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use encoding_rs::{Encoding, UTF_8};
use tracing::warn;

/// Result of [`decode_header_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHeader {
    pub text: String,
    /// At least one word fell back to a lossy rendering.
    pub lossy: bool,
}

/// Decode every encoded word in `raw`.
#[must_use]
pub fn decode_header_text(raw: &str) -> DecodedHeader {
    let mut text = String::with_capacity(raw.len());
    let mut lossy = false;
    let mut rest = raw;
    // Whitespace between two encoded words is dropped (RFC 2047 6.2).
    let mut pending_space = "";
    let mut after_word = false;

    while !rest.is_empty() {
        let Some(start) = rest.find("=?") else {
            text.push_str(pending_space);
            text.push_str(rest);
            break;
        };

        let (plain, candidate) = rest.split_at(start);
        match parse_encoded_word(candidate) {
            Some((word, consumed)) => {
                if !(after_word && plain.trim().is_empty()) {
                    text.push_str(pending_space);
                    text.push_str(plain);
                }
                pending_space = "";

                let (decoded, ok) = decode_word(&word);
                if !ok {
                    lossy = true;
                    warn!(word = &candidate[..consumed], "Undecodable header word, kept lossy");
                }
                text.push_str(&decoded);
                after_word = true;
                rest = &candidate[consumed..];

                let ws_len = rest.len() - rest.trim_start().len();
                pending_space = &rest[..ws_len];
                rest = &rest[ws_len..];
            }
            None => {
                text.push_str(pending_space);
                pending_space = "";
                text.push_str(plain);
                text.push_str("=?");
                after_word = false;
                rest = &candidate[2..];
            }
        }
    }

    DecodedHeader { text, lossy }
}

struct EncodedWord<'a> {
    charset: &'a str,
    encoding: char,
    payload: &'a str,
}

/// Parse `=?charset?E?payload?=` at the start of `s`.
fn parse_encoded_word(s: &str) -> Option<(EncodedWord<'_>, usize)> {
    let body = s.strip_prefix("=?")?;
    let (charset, body) = body.split_once('?')?;
    let (encoding, body) = body.split_once('?')?;
    let end = body.find("?=")?;
    let payload = &body[..end];

    let mut enc = encoding.chars();
    let encoding = enc.next()?.to_ascii_uppercase();
    if enc.next().is_some() || !matches!(encoding, 'B' | 'Q') || payload.contains(' ') {
        return None;
    }

    let consumed = 2 + charset.len() + 1 + 1 + 1 + end + 2;
    Some((
        EncodedWord {
            charset,
            encoding,
            payload,
        },
        consumed,
    ))
}

/// Returns the text and whether decoding was clean.
fn decode_word(word: &EncodedWord<'_>) -> (String, bool) {
    let bytes = match word.encoding {
        'B' => STANDARD
            .decode(word.payload)
            .or_else(|_| STANDARD_NO_PAD.decode(word.payload.trim_end_matches('=')))
            .ok(),
        _ => Some(decode_q(word.payload)),
    };
    let Some(bytes) = bytes else {
        return (word.payload.to_string(), false);
    };

    // RFC 2231 language suffix: `utf-8*en`.
    let label = word.charset.split('*').next().unwrap_or_default().trim();
    let encoding = if label.is_empty() {
        Some(UTF_8)
    } else {
        Encoding::for_label(label.as_bytes())
    };

    match encoding {
        Some(encoding) => {
            let (text, _, had_errors) = encoding.decode(&bytes);
            (text.into_owned(), !had_errors)
        }
        None => (String::from_utf8_lossy(&bytes).into_owned(), false),
    }
}

fn decode_q(payload: &str) -> Vec<u8> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                if let Some(b) = hex {
                    out.push(b);
                    i += 3;
                    continue;
                }
                out.push(b'=');
            }
            other => out.push(other),
        }
        i += 1;
    }
    out
}

/// Split an address list on commas outside quotes and angle brackets.
#[must_use]
pub fn split_addresses(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut escaped = false;

    for c in raw.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                escaped = true;
                current.push(c);
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '<' if !in_quotes => {
                in_angle = true;
                current.push(c);
            }
            '>' if !in_quotes => {
                in_angle = false;
                current.push(c);
            }
            ',' if !in_quotes && !in_angle => {
                push_trimmed(&mut out, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_trimmed(&mut out, &current);
    out
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let s = s.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
}

/// A single address split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    /// The address exactly as written; the canonical key.
    pub raw: String,
    pub name: Option<String>,
    pub email: String,
    /// The display name could only be decoded lossily.
    pub lossy: bool,
}

/// Parse `Name <email>` or a bare `email`. The display name is decoded.
#[must_use]
pub fn parse_address(raw: &str) -> ParsedAddress {
    let raw = raw.trim();
    let (name, email) = match (raw.find('<'), raw.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let name = raw[..open].trim().trim_matches('"').trim();
            let email = raw[open + 1..close].trim();
            let name = (!name.is_empty()).then(|| decode_header_text(name));
            (name, email.to_string())
        }
        _ => (None, raw.to_string()),
    };

    ParsedAddress {
        raw: raw.to_string(),
        lossy: name.as_ref().is_some_and(|n| n.lossy),
        name: name.map(|n| n.text),
        email,
    }
}

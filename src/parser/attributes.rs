//! Attribute-list grammar of FETCH responses
//!
//! A FETCH line is a flat sequence of `NAME value` pairs where the
//! value takes one of three shapes:
//!
//! ```text
//! NAME (a "b c" \D)     list, elements bare or quoted
//! NAME "quoted text"    quoted scalar
//! NAME token            bare scalar
//! ```
//!
//! The line may still carry its `* 3 FETCH ( ... )` envelope; it is
//! stripped before tokenizing.

use crate::error::{Error, Result};
use crate::flag::Flag;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub const UID: &str = "UID";
pub const GM_MSGID: &str = "X-GM-MSGID";
pub const GM_THRID: &str = "X-GM-THRID";
pub const GM_LABELS: &str = "X-GM-LABELS";
pub const FLAGS: &str = "FLAGS";
pub const INTERNALDATE: &str = "INTERNALDATE";

/// Keys every message header response must carry.
pub const REQUIRED_KEYS: [&str; 5] = [UID, GM_MSGID, GM_THRID, GM_LABELS, FLAGS];

/// One attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Scalar(String),
    List(Vec<String>),
}

/// Attribute name (upper-cased) to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(HashMap<String, AttrValue>);

impl Attributes {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.get(&name.to_ascii_uppercase())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A scalar value. A list under this name is a parse error.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] when the value is a list.
    pub fn scalar(&self, name: &str) -> Result<Option<&str>> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::Scalar(s)) => Ok(Some(s)),
            Some(AttrValue::List(_)) => Err(Error::Parse(format!("{name} should be a scalar"))),
        }
    }

    /// A list value. A scalar under this name is a parse error.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] when the value is a scalar.
    pub fn list(&self, name: &str) -> Result<Option<&[String]>> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::List(l)) => Ok(Some(l)),
            Some(AttrValue::Scalar(_)) => Err(Error::Parse(format!("{name} should be a list"))),
        }
    }

    fn number<T: std::str::FromStr>(&self, name: &str) -> Result<T> {
        let raw = self
            .scalar(name)?
            .ok_or_else(|| Error::Parse(format!("missing {name}")))?;
        raw.parse()
            .map_err(|_| Error::Parse(format!("{name} is not a number: {raw}")))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Atom(String),
    Quoted(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        None => return Err(Error::Parse(format!("unterminated quote in: {input}"))),
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => text.push(escaped),
                            None => {
                                return Err(Error::Parse(format!("dangling escape in: {input}")));
                            }
                        },
                        Some(other) => text.push(other),
                    }
                }
                tokens.push(Token::Quoted(text));
            }
            _ => {
                // Section specs like BODY[HEADER.FIELDS (A B)] are one atom.
                let mut atom = String::new();
                let mut depth = 0usize;
                while let Some(&c) = chars.peek() {
                    if depth == 0 && (c.is_whitespace() || c == '(' || c == ')' || c == '"') {
                        break;
                    }
                    match c {
                        '[' => depth += 1,
                        ']' => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    atom.push(c);
                    chars.next();
                }
                if depth != 0 {
                    return Err(Error::Parse(format!("unbalanced '[' in: {input}")));
                }
                tokens.push(Token::Atom(atom));
            }
        }
    }

    Ok(tokens)
}

/// Strip `* n FETCH (` ... `)` or a bare outer `( ... )`.
fn strip_envelope(raw: &str) -> Result<&str> {
    let trimmed = raw.trim();
    let body = if let Some(rest) = trimmed.strip_prefix('*') {
        let mut words = rest.trim_start().splitn(3, ' ');
        let seq = words.next().unwrap_or_default();
        let kind = words.next().unwrap_or_default();
        let tail = words.next().unwrap_or_default();
        if seq.parse::<u32>().is_err() || !kind.eq_ignore_ascii_case("FETCH") {
            return Err(Error::Parse(format!("not a FETCH response: {raw}")));
        }
        tail.trim()
    } else {
        trimmed
    };

    if body.starts_with('(') {
        body.strip_prefix('(')
            .and_then(|b| b.strip_suffix(')'))
            .ok_or_else(|| Error::Parse(format!("unbalanced parentheses in: {raw}")))
    } else {
        Ok(body)
    }
}

/// Parse one attribute line into a name to value mapping.
///
/// # Errors
///
/// [`Error::Parse`] for unbalanced parentheses, an unterminated
/// string or a name without a value.
pub fn parse_attributes(raw: &str) -> Result<Attributes> {
    let tokens = tokenize(strip_envelope(raw)?)?;
    let mut map = HashMap::new();
    let mut iter = tokens.into_iter();

    while let Some(token) = iter.next() {
        let Token::Atom(name) = token else {
            return Err(Error::Parse(format!("expected attribute name in: {raw}")));
        };
        let value = match iter.next() {
            Some(Token::Atom(v) | Token::Quoted(v)) => AttrValue::Scalar(v),
            Some(Token::Open) => AttrValue::List(read_list(&mut iter, raw)?),
            Some(Token::Close) => {
                return Err(Error::Parse(format!("unbalanced parentheses in: {raw}")));
            }
            None => return Err(Error::Parse(format!("{name} has no value in: {raw}"))),
        };
        map.insert(name.to_ascii_uppercase(), value);
    }

    Ok(Attributes(map))
}

fn read_list(iter: &mut impl Iterator<Item = Token>, raw: &str) -> Result<Vec<String>> {
    let mut items = Vec::new();
    loop {
        match iter.next() {
            Some(Token::Close) => return Ok(items),
            Some(Token::Atom(v) | Token::Quoted(v)) => items.push(v),
            // Nested lists are kept as their text form.
            Some(Token::Open) => {
                let inner = read_list(iter, raw)?;
                items.push(format!("({})", inner.join(" ")));
            }
            None => return Err(Error::Parse(format!("unterminated list in: {raw}"))),
        }
    }
}

/// Fail with a parse error naming every missing key.
///
/// # Errors
///
/// [`Error::Parse`] listing the missing keys.
pub fn require_keys(parsed: &Attributes, keys: &[&str]) -> Result<()> {
    let missing: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|k| !parsed.contains(k))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Parse(format!(
            "response is missing {}",
            missing.join(", ")
        )))
    }
}

/// Parse an `INTERNALDATE` value (`17-Jul-1996 02:44:25 -0700`).
///
/// # Errors
///
/// [`Error::Parse`] when `text` is not in that format.
pub fn parse_protocol_date(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_str(text.trim(), "%d-%b-%Y %H:%M:%S %z")
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("invalid internal date '{text}': {e}")))
}

/// Typed view over a message header response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttributes {
    pub uid: u32,
    pub global_id: u64,
    pub thread_id: u64,
    pub labels: Vec<String>,
    pub flags: Vec<Flag>,
    pub internal_date: Option<DateTime<Utc>>,
}

impl FetchAttributes {
    /// Build from a parsed block. All of [`REQUIRED_KEYS`] must be
    /// present.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] for a missing key or a malformed number or date.
    pub fn from_block(parsed: &Attributes) -> Result<Self> {
        require_keys(parsed, &REQUIRED_KEYS)?;

        let labels = parsed.list(GM_LABELS)?.unwrap_or_default().to_vec();
        let flags = parsed
            .list(FLAGS)?
            .unwrap_or_default()
            .iter()
            .map(|f| Flag::from_imap_str(f))
            .collect();
        let internal_date = parsed
            .scalar(INTERNALDATE)?
            .map(parse_protocol_date)
            .transpose()?;

        Ok(Self {
            uid: parsed.number(UID)?,
            global_id: parsed.number(GM_MSGID)?,
            thread_id: parsed.number(GM_THRID)?,
            labels,
            flags,
            internal_date,
        })
    }

    /// Parse a raw line straight into the typed view.
    ///
    /// # Errors
    ///
    /// As [`parse_attributes`] and [`FetchAttributes::from_block`].
    pub fn parse(raw: &str) -> Result<Self> {
        Self::from_block(&parse_attributes(raw)?)
    }

    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.flags.contains(&Flag::Seen)
    }
}

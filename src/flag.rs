//! IMAP message flags
//!
//! Flags arrive as raw tokens in the `FLAGS (...)` attribute. They are
//! mapped onto a small enum so the engine can ask for `\Seen` without
//! string comparisons, while the store keeps the wire spelling as the
//! canonical key.

use std::fmt;

/// An IMAP message flag.
///
/// System flags (prefixed with `\` in the IMAP protocol) have
/// dedicated variants. Anything else, including `$`-keywords and
/// unknown backslash flags, is a [`Flag::Keyword`].
///
/// # Examples
///
/// ```
/// use gmail_mirror::Flag;
///
/// assert_eq!(Flag::from_imap_str("\\seen"), Flag::Seen);
/// assert_eq!(Flag::Seen.as_imap_str(), "\\Seen");
///
/// let kw = Flag::from_imap_str("$Phishing");
/// assert_eq!(kw.as_imap_str(), "$Phishing");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message has been answered (`\Answered`).
    Answered,
    /// Message is flagged for attention (`\Flagged`).
    Flagged,
    /// Message is marked for deletion (`\Deleted`).
    Deleted,
    /// Message is a draft (`\Draft`).
    Draft,
    /// Message arrived in this session (`\Recent`).
    Recent,
    /// Any other flag, kept verbatim.
    Keyword(String),
}

impl Flag {
    /// Parse a raw wire token. System flags match case-insensitively.
    #[must_use]
    pub fn from_imap_str(raw: &str) -> Self {
        let Some(name) = raw.strip_prefix('\\') else {
            return Self::Keyword(raw.to_string());
        };
        match name.to_ascii_lowercase().as_str() {
            "seen" => Self::Seen,
            "answered" => Self::Answered,
            "flagged" => Self::Flagged,
            "deleted" => Self::Deleted,
            "draft" => Self::Draft,
            "recent" => Self::Recent,
            _ => Self::Keyword(raw.to_string()),
        }
    }

    /// The IMAP wire representation of this flag.
    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(kw) => kw,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}

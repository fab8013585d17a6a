//! Mailbox folders
//!
//! Two views of a folder live here. [`Folder`] names the remote
//! mailboxes a mirror cares about and maps each one to a filesystem
//! friendly local directory. [`Mailbox`] is what the server reported
//! for a folder during discovery.

use serde::Serialize;
use std::fmt;

/// A remote mailbox to mirror.
///
/// The Gmail system folders have dedicated variants. Anything else is
/// [`Folder::Custom`].
///
/// # Examples
///
/// ```
/// use gmail_mirror::Folder;
///
/// assert_eq!(Folder::AllMail.as_str(), "[Gmail]/All Mail");
/// assert_eq!(Folder::AllMail.local_name(), "archive");
///
/// let custom = Folder::custom("Work/Projects");
/// assert_eq!(custom.local_name(), "work_projects");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Folder {
    /// Every message in the account.
    AllMail,
    /// Sent messages.
    SentMail,
    /// Draft messages.
    Drafts,
    /// The INBOX (RFC 3501 required, case-insensitive).
    Inbox,
    /// A user label or any other server folder.
    Custom(String),
}

impl Folder {
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// The remote IMAP name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::AllMail => "[Gmail]/All Mail",
            Self::SentMail => "[Gmail]/Sent Mail",
            Self::Drafts => "[Gmail]/Drafts",
            Self::Inbox => "INBOX",
            Self::Custom(name) => name,
        }
    }

    /// The directory name used under the account root.
    #[must_use]
    pub fn local_name(&self) -> String {
        match self {
            Self::AllMail => "archive".to_string(),
            Self::SentMail => "sent".to_string(),
            Self::Drafts => "drafts".to_string(),
            Self::Inbox => "inbox".to_string(),
            Self::Custom(name) => sanitize(name),
        }
    }

    /// The folders mirrored when nothing else is configured.
    #[must_use]
    pub fn defaults() -> Vec<SyncTarget> {
        [Self::AllMail, Self::SentMail, Self::Drafts]
            .iter()
            .map(SyncTarget::from)
            .collect()
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Folder {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("inbox") {
            Self::Inbox
        } else {
            match s {
                "[Gmail]/All Mail" => Self::AllMail,
                "[Gmail]/Sent Mail" => Self::SentMail,
                "[Gmail]/Drafts" => Self::Drafts,
                other => Self::Custom(other.to_string()),
            }
        }
    }
}

impl From<String> for Folder {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// A remote mailbox paired with the local directory it mirrors into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SyncTarget {
    pub remote: String,
    pub local: String,
}

impl SyncTarget {
    #[must_use]
    pub fn new(remote: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            local: local.into(),
        }
    }
}

impl From<&Folder> for SyncTarget {
    fn from(folder: &Folder) -> Self {
        Self::new(folder.as_str(), folder.local_name())
    }
}

/// A folder as reported by `LIST`. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mailbox {
    pub name: String,
    pub delimiter: Option<String>,
    pub attributes: Vec<String>,
}

impl Mailbox {
    /// `false` for `\Noselect` containers such as `[Gmail]` itself.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self
            .attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case("\\Noselect"))
    }
}

//! Test data model for the fake IMAP server
//!
//! Provides a builder-style API for constructing account state:
//!
//! ```ignore
//! let mailbox = MailboxBuilder::new()
//!     .credentials("me@example.com", "secret")
//!     .noselect("[Gmail]")
//!     .folder("[Gmail]/All Mail")
//!         .email(1, 1001, false, raw_rfc2822_bytes)
//!         .labels(&["\\Inbox", "Work"])
//!         .email(2, 1002, true, raw_rfc2822_bytes)
//!     .build();
//! ```
//!
//! Every email carries the Gmail extension attributes: a message id
//! (`X-GM-MSGID`) that is stable across folders, a thread id
//! (`X-GM-THRID`) and a label list (`X-GM-LABELS`). The same message
//! can be added to several folders under different UIDs by reusing its
//! message id, which is how Gmail exposes a labelled message in both
//! its label folder and All Mail.

/// Internal date given to emails that don't set one.
pub const DEFAULT_DATE: &str = "01-May-2024 10:00:00 +0000";

/// A complete account: named folders plus the credentials LOGIN
/// accepts.
#[derive(Debug, Clone)]
pub struct Mailbox {
    pub folders: Vec<Folder>,
    /// `None` accepts any credentials.
    pub credentials: Option<(String, String)>,
}

impl Mailbox {
    /// Look up a folder by name (case-sensitive, matching real IMAP).
    pub fn get_folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.name == name)
    }

    pub fn get_folder_mut(&mut self, name: &str) -> Option<&mut Folder> {
        self.folders.iter_mut().find(|f| f.name == name)
    }

    pub fn accepts(&self, user: &str, pass: &str) -> bool {
        self.credentials
            .as_ref()
            .is_none_or(|(u, p)| u == user && p == pass)
    }
}

/// A single IMAP folder (e.g. "INBOX", "[Gmail]/All Mail").
#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    /// LIST attributes, e.g. `\Noselect` for `[Gmail]`.
    pub attributes: Vec<String>,
    pub emails: Vec<TestEmail>,
}

impl Folder {
    pub fn max_uid(&self) -> u32 {
        self.emails.iter().map(|e| e.uid).max().unwrap_or(0)
    }

    pub fn is_selectable(&self) -> bool {
        !self.attributes.iter().any(|a| a == "\\Noselect")
    }
}

/// A test email stored in a folder.
///
/// - `uid`: unique within the folder, never reused.
/// - `msgid` / `thrid`: the Gmail message and thread ids.
/// - `flags`: raw flag tokens such as `\Seen`.
/// - `raw`: the complete RFC 2822 message, returned for `BODY[]`.
#[derive(Debug, Clone)]
pub struct TestEmail {
    pub uid: u32,
    pub msgid: u64,
    pub thrid: u64,
    pub labels: Vec<String>,
    pub flags: Vec<String>,
    pub internal_date: String,
    pub raw: Vec<u8>,
}

impl TestEmail {
    pub fn new(uid: u32, msgid: u64, seen: bool, raw: &[u8]) -> Self {
        Self {
            uid,
            msgid,
            thrid: msgid,
            labels: Vec::new(),
            flags: if seen {
                vec!["\\Seen".to_string()]
            } else {
                Vec::new()
            },
            internal_date: DEFAULT_DATE.to_string(),
            raw: raw.to_vec(),
        }
    }

    pub fn is_seen(&self) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case("\\Seen"))
    }
}

/// Builder for constructing a `Mailbox` step by step.
///
/// Call `.folder(name)` to start a new folder, then chain
/// `.email(uid, msgid, seen, raw)` calls to add messages to it.
/// `.labels()`, `.flags()`, `.thread()` and `.date()` adjust the most
/// recently added email. Finish with `.build()`.
pub struct MailboxBuilder {
    folders: Vec<Folder>,
    credentials: Option<(String, String)>,
}

impl MailboxBuilder {
    pub fn new() -> Self {
        Self {
            folders: Vec::new(),
            credentials: None,
        }
    }

    /// Only accept this user and password at LOGIN.
    pub fn credentials(mut self, user: &str, pass: &str) -> Self {
        self.credentials = Some((user.to_string(), pass.to_string()));
        self
    }

    /// Add a new folder. Subsequent `.email()` calls add to this folder.
    pub fn folder(mut self, name: &str) -> Self {
        self.folders.push(Folder {
            name: name.to_string(),
            attributes: vec!["\\HasNoChildren".to_string()],
            emails: Vec::new(),
        });
        self
    }

    /// Add a container folder that cannot be selected.
    pub fn noselect(mut self, name: &str) -> Self {
        self.folders.push(Folder {
            name: name.to_string(),
            attributes: vec!["\\HasChildren".to_string(), "\\Noselect".to_string()],
            emails: Vec::new(),
        });
        self
    }

    /// Add an email to the most recently added folder.
    ///
    /// # Panics
    ///
    /// Panics if called before any `.folder()` call.
    pub fn email(mut self, uid: u32, msgid: u64, seen: bool, raw: &[u8]) -> Self {
        self.current_folder()
            .emails
            .push(TestEmail::new(uid, msgid, seen, raw));
        self
    }

    pub fn labels(mut self, labels: &[&str]) -> Self {
        self.last_email().labels = labels.iter().map(ToString::to_string).collect();
        self
    }

    /// Replace the flags of the last email.
    pub fn flags(mut self, flags: &[&str]) -> Self {
        self.last_email().flags = flags.iter().map(ToString::to_string).collect();
        self
    }

    pub fn thread(mut self, thrid: u64) -> Self {
        self.last_email().thrid = thrid;
        self
    }

    pub fn date(mut self, internal_date: &str) -> Self {
        self.last_email().internal_date = internal_date.to_string();
        self
    }

    /// Consume the builder and return the finished `Mailbox`.
    pub fn build(self) -> Mailbox {
        Mailbox {
            folders: self.folders,
            credentials: self.credentials,
        }
    }

    fn current_folder(&mut self) -> &mut Folder {
        self.folders
            .last_mut()
            .expect("call .folder() before .email()")
    }

    fn last_email(&mut self) -> &mut TestEmail {
        self.current_folder()
            .emails
            .last_mut()
            .expect("call .email() first")
    }
}

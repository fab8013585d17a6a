//! Row types going into and coming out of the store

use crate::flag::Flag;
use crate::parser::{FetchAttributes, MessageContent};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Row id of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId(pub(crate) i64);

/// A mailbox row of one account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MailboxRef {
    pub(crate) id: i64,
    pub account: AccountId,
    pub name: String,
}

/// Canonical address row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRef(pub(crate) i64);

/// Canonical flag row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlagRef(pub(crate) i64);

/// Canonical label row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelRef(pub(crate) i64);

/// A freshly fetched message, ready to persist.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub uid: u32,
    pub global_id: u64,
    pub thread_id: u64,
    pub internal_date: Option<DateTime<Utc>>,
    pub flags: Vec<Flag>,
    pub labels: Vec<String>,
    pub content: MessageContent,
}

impl NewMessage {
    #[must_use]
    pub fn new(attributes: FetchAttributes, content: MessageContent) -> Self {
        Self {
            uid: attributes.uid,
            global_id: attributes.global_id,
            thread_id: attributes.thread_id,
            internal_date: attributes.internal_date,
            flags: attributes.flags,
            labels: attributes.labels,
            content,
        }
    }
}

/// What [`upsert_message`](super::MirrorStore::upsert_message) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// First time this global id was seen.
    Created,
    /// Known from another placement; only the placement, flags and
    /// labels were written.
    Placed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredAddress {
    pub raw: String,
    pub name: Option<String>,
    pub email: String,
}

/// Where a message is visible remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub mailbox: String,
    pub uid: u32,
}

/// A message with every reference resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMessage {
    pub global_id: u64,
    pub thread_id: u64,
    /// The mailbox that first persisted the message.
    pub mailbox: String,
    pub internal_date: Option<DateTime<Utc>>,
    pub subject: String,
    pub body: String,
    pub from: Option<StoredAddress>,
    pub to: Vec<StoredAddress>,
    pub cc: Vec<StoredAddress>,
    pub bcc: Vec<StoredAddress>,
    pub flags: Vec<String>,
    pub labels: Vec<String>,
    pub placements: Vec<Placement>,
}

impl StoredMessage {
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.flags.iter().any(|f| Flag::from_imap_str(f) == Flag::Seen)
    }
}

/// One full-text search result, best match first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub global_id: u64,
    pub thread_id: u64,
    pub mailbox: String,
    pub internal_date: Option<DateTime<Utc>>,
    pub sender: String,
    pub subject: String,
    pub snippet: String,
}

/// Row counts of the main tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub messages: u64,
    pub placements: u64,
    pub addresses: u64,
    pub flags: u64,
    pub labels: u64,
}

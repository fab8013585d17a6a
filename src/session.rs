//! The protocol session seam
//!
//! [`MailSession`] is everything the sync engine needs from a server
//! connection; [`Connector`] opens authenticated sessions. The real
//! implementations live in [`crate::connection`]. Tests substitute
//! scripted ones.
//!
//! Commands are awaited one at a time. A session is never shared, so
//! at most one command is in flight per connection.

use crate::error::Error;
use crate::folder::Mailbox;
use std::fmt;
use tracing::warn;

/// Attributes fetched when refreshing flags and labels.
pub const REFRESH_SPEC: &str = "(UID X-GM-MSGID X-GM-THRID X-GM-LABELS FLAGS)";

/// Attributes fetched for a new message. `BODY.PEEK` leaves `\Seen`
/// untouched on the server.
pub const FULL_SPEC: &str =
    "(UID X-GM-MSGID X-GM-THRID X-GM-LABELS FLAGS INTERNALDATE BODY.PEEK[])";

/// An inclusive UID range. `end: None` is the open range `start:*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UidRange {
    pub start: u32,
    pub end: Option<u32>,
}

impl UidRange {
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    #[must_use]
    pub const fn open(start: u32) -> Self {
        Self { start, end: None }
    }

    /// `1:uid`, the range already mirrored below a checkpoint.
    #[must_use]
    pub const fn up_to(uid: u32) -> Self {
        Self::new(1, uid)
    }

    #[must_use]
    pub fn contains(&self, uid: u32) -> bool {
        uid >= self.start && self.end.is_none_or(|end| uid <= end)
    }
}

impl fmt::Display for UidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}:{end}", self.start),
            None => write!(f, "{}:*", self.start),
        }
    }
}

/// Attribute text and raw message bytes of one fully fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullFetch {
    pub attributes: String,
    pub body: Vec<u8>,
}

/// An authenticated protocol session.
#[allow(async_fn_in_trait)]
pub trait MailSession {
    /// Select `name`, read-only when asked. Returns the message count.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] when the server refuses the mailbox.
    async fn select_mailbox(&mut self, name: &str, read_only: bool) -> Result<u32, Error>;

    /// UIDs strictly greater than `uid`, ascending.
    ///
    /// # Errors
    ///
    /// Fails on any session error.
    async fn search_uids_above(&mut self, uid: u32) -> Result<Vec<u32>, Error>;

    /// UIDs matching a vendor raw query (`X-GM-RAW`), ascending. The
    /// query is passed through verbatim.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] when the server rejects the query.
    async fn search_by_query(&mut self, criteria: &str) -> Result<Vec<u32>, Error>;

    /// Raw attribute lines for `range`, in server order. No bodies.
    ///
    /// # Errors
    ///
    /// Fails on any session error.
    async fn fetch_attributes(&mut self, range: UidRange, spec: &str)
    -> Result<Vec<String>, Error>;

    /// The attributes and raw body of one message.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] when the server answers without a body.
    async fn fetch_full(&mut self, uid: u32) -> Result<FullFetch, Error>;

    /// Every mailbox on the server.
    ///
    /// # Errors
    ///
    /// Fails on any session error.
    async fn list_mailboxes(&mut self) -> Result<Vec<Mailbox>, Error>;

    /// End the session.
    ///
    /// # Errors
    ///
    /// Fails when the server cannot be reached.
    async fn logout(&mut self) -> Result<(), Error>;
}

/// Opens authenticated sessions.
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Session: MailSession;

    /// Connect and log in.
    ///
    /// # Errors
    ///
    /// Rejected credentials are [`Error::Authentication`]; everything
    /// below the protocol is [`Error::Transport`].
    async fn connect(&self) -> Result<Self::Session, Error>;
}

/// Run `body` on a fresh session and log out afterwards, whether or
/// not `body` succeeded.
///
/// A logout failure is logged and otherwise ignored: by then the
/// outcome of `body` is already decided.
///
/// # Errors
///
/// Whatever `connect` or `body` returned.
pub async fn with_session<C, F, T, E>(connector: &C, body: F) -> Result<T, E>
where
    C: Connector,
    F: AsyncFnOnce(&mut C::Session) -> Result<T, E>,
    E: From<Error>,
{
    let mut session = connector.connect().await?;
    let result = body(&mut session).await;

    if let Err(e) = session.logout().await {
        warn!(error = %e, "Logout failed");
    }

    result
}

/// Sort ascending and drop duplicates and anything `<= floor`.
pub(crate) fn normalize_uids(uids: impl IntoIterator<Item = u32>, floor: u32) -> Vec<u32> {
    let mut uids: Vec<u32> = uids.into_iter().filter(|&u| u > floor).collect();
    uids.sort_unstable();
    uids.dedup();
    uids
}

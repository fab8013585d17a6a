//! Gmail mailbox mirror
//!
//! Keeps a resumable, idempotent local copy of a Gmail account over
//! IMAP. Every message is stored once as a raw file, named after its
//! stable Gmail message id (`X-GM-MSGID`), in a `new`/`cur`/`tmp`
//! mailbox directory. Its metadata, canonical addresses, flags and
//! labels plus a full-text index live in one SQLite file per account.
//!
//! A sync run never re-downloads a body it already has. The checkpoint
//! it resumes from is the highest UID persisted for the mailbox, so an
//! interrupted run picks up exactly where it stopped.
//!
//! ```no_run
//! use gmail_mirror::{EnvCredentials, ImapConfig, Mirror, MirrorConfig};
//!
//! # async fn run() -> gmail_mirror::Result<()> {
//! let mirror = Mirror::open(&MirrorConfig::from_env()?, ImapConfig::from_env()?, EnvCredentials)?;
//! for result in mirror.sync().await {
//!     match result {
//!         Ok(report) => println!("{}: {} new", report.mailbox, report.fetched),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Sessions are driven on one task at a time; their futures need not be `Send`.
#![allow(clippy::future_not_send)]

mod client;
mod config;
mod connection;
mod error;
mod flag;
mod folder;
pub mod parser;
mod session;
mod store;
mod sync;
mod writer;

pub use client::{Mirror, RemoteHit, STORE_FILE};
pub use config::{
    CredentialProvider, Credentials, EnvCredentials, ImapConfig, MirrorConfig, Security,
    StaticCredentials, parse_target, parse_targets,
};
pub use connection::{ImapConnector, ImapSession};
pub use error::{Error, Result, SyncError};
pub use flag::Flag;
pub use folder::{Folder, Mailbox, SyncTarget};
pub use session::{
    Connector, FULL_SPEC, FullFetch, MailSession, REFRESH_SPEC, UidRange, with_session,
};
pub use store::{
    AccountId, AddressRef, Counts, FlagRef, LabelRef, MailboxRef, MirrorStore, NewMessage,
    Placement, SearchHit, StoredAddress, StoredMessage, Upserted,
};
pub use sync::{Progress, ProgressSink, StopHandle, SyncEngine, SyncReport, SyncState};
pub use writer::{Bucket, MessageWriter, StorageHandle};

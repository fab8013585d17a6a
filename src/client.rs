//! Account-level mirror client

use crate::config::{CredentialProvider, ImapConfig, MirrorConfig};
use crate::connection::ImapConnector;
use crate::error::{Error, Result, SyncError};
use crate::flag::Flag;
use crate::folder::{Mailbox, SyncTarget};
use crate::parser::FetchAttributes;
use crate::session::{Connector, MailSession, REFRESH_SPEC, UidRange, with_session};
use crate::store::{AccountId, MirrorStore, SearchHit, StoredMessage};
use crate::sync::{Progress, StopHandle, SyncEngine, SyncReport};
use crate::writer::MessageWriter;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the per-account metadata store.
pub const STORE_FILE: &str = "mirror.sqlite3";

/// A server-side search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteHit {
    pub uid: u32,
    pub global_id: u64,
    pub thread_id: u64,
    pub labels: Vec<String>,
    pub flags: Vec<String>,
    /// Whether the message is already in the local mirror.
    pub mirrored: bool,
}

/// The local mirror of one account.
///
/// Owns the account's metadata store and its sync engine. Everything
/// lives under `<root>/<identity>`.
pub struct Mirror<C> {
    engine: SyncEngine<C>,
    account: AccountId,
    identity: String,
    account_dir: PathBuf,
    targets: Vec<SyncTarget>,
}

impl Mirror<ImapConnector> {
    /// Open the mirror for the account the credentials belong to.
    ///
    /// # Errors
    ///
    /// Fails when the credentials cannot be read, or the account
    /// directory or its database cannot be opened.
    pub fn open(
        config: &MirrorConfig,
        imap: ImapConfig,
        credentials: impl CredentialProvider + 'static,
    ) -> Result<Self> {
        let identity = credentials.credentials()?.identity;
        let connector = ImapConnector::new(imap, credentials);
        Self::with_connector(connector, config, &identity)
    }
}

impl<C: Connector> Mirror<C> {
    /// Open the mirror for `identity` using any session source.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an identity that is not a plain directory
    /// name; otherwise fails when the account directory or its
    /// database cannot be opened.
    pub fn with_connector(connector: C, config: &MirrorConfig, identity: &str) -> Result<Self> {
        if identity.is_empty() || identity.starts_with('.') || identity.contains(['/', '\\']) {
            return Err(Error::Config(format!("Unusable account identity: {identity}")));
        }

        let account_dir = config.account_dir(identity);
        let store = MirrorStore::open(&account_dir.join(STORE_FILE))?;
        let account = store.ensure_account(identity)?;
        info!(account = identity, dir = %account_dir.display(), "Mirror opened");

        Ok(Self {
            engine: SyncEngine::new(connector, store, account, account_dir.clone()),
            account,
            identity: identity.to_string(),
            account_dir,
            targets: config.targets.clone(),
        })
    }

    #[must_use]
    pub fn with_progress(mut self, sink: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
        self.engine = self.engine.with_progress(sink);
        self
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn account_dir(&self) -> &Path {
        &self.account_dir
    }

    #[must_use]
    pub const fn store(&self) -> &MirrorStore {
        self.engine.store()
    }

    #[must_use]
    pub fn targets(&self) -> &[SyncTarget] {
        &self.targets
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.engine.stop_handle()
    }

    /// Sync every configured mailbox.
    pub async fn sync(&self) -> Vec<std::result::Result<SyncReport, SyncError>> {
        self.engine.sync_all(&self.targets).await
    }

    /// Sync the given mailboxes instead of the configured ones.
    pub async fn sync_targets(
        &self,
        targets: &[SyncTarget],
    ) -> Vec<std::result::Result<SyncReport, SyncError>> {
        self.engine.sync_all(targets).await
    }

    /// List the server's mailboxes and record them locally.
    ///
    /// # Errors
    ///
    /// Fails on any session error, or when the listing cannot be
    /// recorded.
    pub async fn list_folders(&self) -> Result<Vec<Mailbox>> {
        let mailboxes = with_session(self.engine.connector(), async |session: &mut C::Session| {
            session.list_mailboxes().await
        })
        .await?;

        let recorded = self.store().record_mailboxes(self.account, &mailboxes)?;
        debug!(listed = mailboxes.len(), recorded, "Mailboxes recorded");
        Ok(mailboxes)
    }

    /// Mailboxes recorded by earlier listings.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be read.
    pub fn known_folders(&self) -> Result<Vec<Mailbox>> {
        self.store().mailboxes(self.account)
    }

    /// Run a vendor raw query (`X-GM-RAW`) against `mailbox` on the
    /// server. Hits come back in ascending UID order.
    ///
    /// # Errors
    ///
    /// Fails on any session error, including an unknown mailbox
    /// ([`Error::Protocol`]).
    pub async fn remote_search(&self, mailbox: &str, query: &str) -> Result<Vec<RemoteHit>> {
        let found = with_session(self.engine.connector(), async |session: &mut C::Session| {
            session.select_mailbox(mailbox, true).await?;
            let uids = session.search_by_query(query).await?;
            let (Some(&first), Some(&last)) = (uids.first(), uids.last()) else {
                return Ok(Vec::new());
            };

            let mut found = Vec::with_capacity(uids.len());
            for block in session
                .fetch_attributes(UidRange::new(first, last), REFRESH_SPEC)
                .await?
            {
                let attrs = FetchAttributes::parse(&block)?;
                if uids.binary_search(&attrs.uid).is_ok() {
                    found.push(attrs);
                }
            }
            Ok::<_, Error>(found)
        })
        .await?;

        info!(mailbox, query, hits = found.len(), "Remote search finished");

        let mut hits = Vec::with_capacity(found.len());
        for attrs in found {
            hits.push(RemoteHit {
                uid: attrs.uid,
                global_id: attrs.global_id,
                thread_id: attrs.thread_id,
                mirrored: self.store().message(attrs.global_id)?.is_some(),
                flags: attrs.flags.iter().map(|f| f.as_imap_str().to_string()).collect(),
                labels: attrs.labels,
            });
        }
        hits.sort_by_key(|h| h.uid);
        Ok(hits)
    }

    /// Full-text search over the local mirror.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] for a malformed query or an unreadable database.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        self.store().search(query, limit)
    }

    /// A mirrored message by its global id.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be read.
    pub fn message(&self, global_id: u64) -> Result<Option<StoredMessage>> {
        self.store().message(global_id)
    }

    /// Raw bytes of a mirrored message, from whichever mailbox
    /// directory holds it.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] when no mailbox directory holds the file.
    pub fn raw_message(&self, global_id: u64) -> Result<Vec<u8>> {
        for writer in self.writers()? {
            if writer.locate(global_id).is_some() {
                return writer.read(global_id);
            }
        }
        Err(Error::Storage(format!("no stored file for message {global_id}")))
    }

    /// Writers for every mailbox directory present on disk.
    fn writers(&self) -> Result<Vec<MessageWriter>> {
        let entries = fs::read_dir(&self.account_dir)
            .map_err(|e| Error::storage(&self.account_dir.display().to_string(), e))?;

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.join("cur").is_dir() && path.join("new").is_dir())
            .collect();
        dirs.sort();
        dirs.into_iter().map(MessageWriter::open).collect()
    }
}

impl RemoteHit {
    /// Whether the server reports the message as read.
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.flags
            .iter()
            .any(|f| Flag::from_imap_str(f) == Flag::Seen)
    }
}

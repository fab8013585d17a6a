//! Incremental mailbox synchronization
//!
//! One run over a mailbox walks these states:
//!
//! ```text
//! Idle -> ResolvingCheckpoint -> RefreshingKnownRange -> DiscoveringNewMessages
//!      -> FetchingMessage* -> Idle
//! ```
//!
//! with `Aborted` reachable from anywhere on error. The checkpoint is
//! the highest UID persisted for the mailbox, derived from the store
//! each run. New messages are persisted strictly in ascending UID
//! order, one transaction each, so a run that dies at UID `K` resumes
//! at `K` next time and never leaves a gap behind.
//!
//! Independent mailboxes can be synced concurrently with
//! [`SyncEngine::sync_all`]; each gets its own session.

use crate::error::{Error, SyncError};
use crate::folder::SyncTarget;
use crate::parser::{FetchAttributes, MessageContent, parse_attributes};
use crate::session::{Connector, MailSession, REFRESH_SPEC, UidRange, with_session};
use crate::store::{AccountId, MailboxRef, MirrorStore, NewMessage, Upserted};
use crate::writer::MessageWriter;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where a sync run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyncState {
    Idle,
    ResolvingCheckpoint,
    RefreshingKnownRange,
    DiscoveringNewMessages,
    FetchingMessage,
    Aborted,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ResolvingCheckpoint => "resolving-checkpoint",
            Self::RefreshingKnownRange => "refreshing-known-range",
            Self::DiscoveringNewMessages => "discovering-new-messages",
            Self::FetchingMessage => "fetching-message",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed (or cleanly stopped) run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub mailbox: String,
    pub local: String,
    pub state: SyncState,
    pub checkpoint_before: u32,
    pub checkpoint_after: u32,
    /// Known messages whose flags and labels were rewritten.
    pub refreshed: usize,
    /// New messages persisted.
    pub fetched: usize,
    /// Messages whose global id was already mirrored from another
    /// mailbox.
    pub placed: usize,
    /// The run ended early on a stop request.
    pub stopped: bool,
    pub elapsed: Duration,
}

/// Emitted after each persisted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub mailbox: String,
    /// 1-based position in this run.
    pub index: usize,
    pub total: usize,
    pub uid: u32,
    pub global_id: u64,
    pub elapsed: Duration,
}

/// Receives [`Progress`] notifications. Purely observational.
pub type ProgressSink = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Asks running syncs to stop before their next message.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives sync runs for one account.
pub struct SyncEngine<C> {
    connector: C,
    store: MirrorStore,
    account: AccountId,
    account_dir: PathBuf,
    progress: Option<ProgressSink>,
    stop: StopHandle,
}

/// A failure inside a run, before it is tagged with the mailbox.
struct Failure {
    uid: Option<u32>,
    error: Error,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self { uid: None, error }
    }
}

/// Per-run bookkeeping.
struct Run<'a> {
    target: &'a SyncTarget,
    /// Unset until the server has accepted the mailbox.
    mailbox: Option<MailboxRef>,
    writer: MessageWriter,
    checkpoint: u32,
    started: Instant,
    state: SyncState,
    refreshed: usize,
    fetched: usize,
    placed: usize,
    stopped: bool,
}

impl Run<'_> {
    fn enter(&mut self, next: SyncState) {
        debug!(mailbox = %self.target.remote, from = %self.state, to = %next, "Sync state");
        self.state = next;
    }
}

impl<C: Connector> SyncEngine<C> {
    /// Message files go under `account_dir/<local name>`.
    pub fn new(
        connector: C,
        store: MirrorStore,
        account: AccountId,
        account_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            connector,
            store,
            account,
            account_dir: account_dir.into(),
            progress: None,
            stop: StopHandle::default(),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, sink: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(sink));
        self
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    #[must_use]
    pub const fn store(&self) -> &MirrorStore {
        &self.store
    }

    pub(crate) const fn connector(&self) -> &C {
        &self.connector
    }

    /// Sync every target concurrently. One failing mailbox does not
    /// cancel the others; results come back in target order.
    pub async fn sync_all(&self, targets: &[SyncTarget]) -> Vec<Result<SyncReport, SyncError>> {
        join_all(targets.iter().map(|target| self.sync_mailbox(target))).await
    }

    /// Run one sync cycle over `target`.
    ///
    /// # Errors
    ///
    /// A [`SyncError`] naming the mailbox and, when a message was
    /// being persisted, its UID. The checkpoint stays at the last
    /// committed message.
    pub async fn sync_mailbox(&self, target: &SyncTarget) -> Result<SyncReport, SyncError> {
        let fail = |f: Failure| SyncError::new(&target.remote, f.uid, f.error);

        let mut run = self.prepare(target).map_err(|e| fail(e.into()))?;
        info!(
            mailbox = %target.remote,
            local = %target.local,
            checkpoint = run.checkpoint,
            "Sync started"
        );

        let result = with_session(&self.connector, async |session: &mut C::Session| {
            self.drive(session, &mut run).await
        })
        .await;

        if let Err(failure) = result {
            run.enter(SyncState::Aborted);
            warn!(
                mailbox = %target.remote,
                uid = ?failure.uid,
                error = %failure.error,
                fetched = run.fetched,
                "Sync aborted"
            );
            return Err(fail(failure));
        }

        run.enter(SyncState::Idle);
        let finish = || -> Result<SyncReport, Error> {
            self.store.touch_account(self.account, Utc::now())?;
            let checkpoint_after = match &run.mailbox {
                Some(mailbox) => self.store.checkpoint(mailbox)?.unwrap_or(0),
                None => run.checkpoint,
            };
            Ok(SyncReport {
                mailbox: target.remote.clone(),
                local: target.local.clone(),
                state: run.state,
                checkpoint_before: run.checkpoint,
                checkpoint_after,
                refreshed: run.refreshed,
                fetched: run.fetched,
                placed: run.placed,
                stopped: run.stopped,
                elapsed: run.started.elapsed(),
            })
        };
        let report = finish().map_err(|e| fail(e.into()))?;

        info!(
            mailbox = %report.mailbox,
            fetched = report.fetched,
            refreshed = report.refreshed,
            checkpoint = report.checkpoint_after,
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Sync finished"
        );
        Ok(report)
    }

    fn prepare<'a>(&self, target: &'a SyncTarget) -> Result<Run<'a>, Error> {
        let mailbox = self.store.find_mailbox(self.account, &target.remote)?;
        let writer = MessageWriter::open(self.account_dir.join(&target.local))?;

        let mut run = Run {
            target,
            mailbox,
            writer,
            checkpoint: 0,
            started: Instant::now(),
            state: SyncState::Idle,
            refreshed: 0,
            fetched: 0,
            placed: 0,
            stopped: false,
        };
        run.enter(SyncState::ResolvingCheckpoint);
        if let Some(mailbox) = &run.mailbox {
            run.checkpoint = self.store.checkpoint(mailbox)?.unwrap_or(0);
        }
        Ok(run)
    }

    async fn drive(&self, session: &mut C::Session, run: &mut Run<'_>) -> Result<(), Failure> {
        let exists = session.select_mailbox(&run.target.remote, true).await?;
        info!(mailbox = %run.target.remote, exists, "Mailbox selected");
        let mailbox = self.store.ensure_mailbox(self.account, &run.target.remote)?;
        run.mailbox = Some(mailbox.clone());

        if run.checkpoint > 0 {
            run.enter(SyncState::RefreshingKnownRange);
            self.refresh(session, run).await?;
        }

        run.enter(SyncState::DiscoveringNewMessages);
        let uids = session.search_uids_above(run.checkpoint).await?;
        if uids.is_empty() {
            debug!(mailbox = %run.target.remote, "No new messages");
            return Ok(());
        }
        info!(mailbox = %run.target.remote, count = uids.len(), "New messages found");

        let total = uids.len();
        for (index, uid) in (1..).zip(uids) {
            if self.stop.is_stopped() {
                info!(mailbox = %run.target.remote, uid, "Stop requested");
                run.stopped = true;
                break;
            }

            run.enter(SyncState::FetchingMessage);
            let (global_id, outcome) = self
                .persist(session, run, &mailbox, uid)
                .await
                .map_err(|error| Failure {
                    uid: Some(uid),
                    error,
                })?;
            run.fetched += 1;
            if outcome == Upserted::Placed {
                run.placed += 1;
            }

            if let Some(sink) = &self.progress {
                sink(&Progress {
                    mailbox: run.target.remote.clone(),
                    index,
                    total,
                    uid,
                    global_id,
                    elapsed: run.started.elapsed(),
                });
            }
        }
        Ok(())
    }

    /// Rewrite flags and labels for everything up to the checkpoint.
    async fn refresh(&self, session: &mut C::Session, run: &mut Run<'_>) -> Result<(), Failure> {
        let blocks = session
            .fetch_attributes(UidRange::up_to(run.checkpoint), REFRESH_SPEC)
            .await?;

        for block in blocks {
            let attrs = FetchAttributes::parse(&block)?;
            if self
                .store
                .replace_flags_and_labels(attrs.global_id, &attrs.flags, &attrs.labels)
                .map_err(|error| Failure {
                    uid: Some(attrs.uid),
                    error,
                })?
            {
                run.refreshed += 1;
            } else {
                debug!(uid = attrs.uid, global_id = attrs.global_id, "Refresh of unknown message skipped");
            }
        }
        Ok(())
    }

    /// Fetch, parse, store and index one message as a unit.
    async fn persist(
        &self,
        session: &mut C::Session,
        run: &Run<'_>,
        mailbox: &MailboxRef,
        uid: u32,
    ) -> Result<(u64, Upserted), Error> {
        let fetched = session.fetch_full(uid).await?;
        let attrs = FetchAttributes::from_block(&parse_attributes(&fetched.attributes)?)?;
        if attrs.uid != uid {
            return Err(Error::Parse(format!(
                "asked for UID {uid}, server answered UID {}",
                attrs.uid
            )));
        }

        let content = MessageContent::parse(&fetched.body);
        if content.lossy {
            warn!(uid, global_id = attrs.global_id, "Header decoded lossily");
        }

        let global_id = attrs.global_id;
        let handle = run.writer.write(global_id, &fetched.body, attrs.is_seen())?;
        let message = NewMessage::new(attrs, content);

        match self.store.upsert_message(mailbox, &message) {
            Ok(outcome) => {
                debug!(uid, global_id, bucket = handle.bucket.as_str(), "Message persisted");
                Ok((global_id, outcome))
            }
            Err(e) => {
                if let Err(cleanup) = run.writer.remove(global_id) {
                    warn!(uid, global_id, error = %cleanup, "Could not remove orphaned file");
                }
                Err(e)
            }
        }
    }
}

//! The local metadata store
//!
//! One SQLite file per account holds the message index, the canonical
//! address, flag and label tables, the full-text index and the
//! placements the sync checkpoints are derived from.
//!
//! [`MirrorStore`] is a cheap-to-clone handle around a single
//! connection behind a mutex. Every mutating operation runs in one
//! transaction, so a reader never sees a message row without its
//! references. The lock is only ever held inside synchronous code.

mod canonical;
mod messages;
mod migrations;
mod model;

pub use model::{
    AccountId, AddressRef, Counts, FlagRef, LabelRef, MailboxRef, NewMessage, Placement,
    SearchHit, StoredAddress, StoredMessage, Upserted,
};

use crate::error::{Error, Result};
use crate::folder::Mailbox;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

/// Handle to an account's metadata database.
#[derive(Clone)]
pub struct MirrorStore {
    conn: Arc<Mutex<Connection>>,
}

impl MirrorStore {
    /// Open (or create) the database at `path` and run pending
    /// migrations. WAL mode lets external readers run alongside the
    /// writer.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened or a migration fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::storage(&parent.display().to_string(), e))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let store = Self::init(conn)?;
        info!("Mirror store opened at {}", path.display());
        Ok(store)
    }

    /// A private in-memory database, for tests and dry runs.
    ///
    /// # Errors
    ///
    /// Fails when a migration fails.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        migrations::run_all(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("store lock poisoned".into()))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` in one transaction. Nothing is written unless `f`
    /// succeeds.
    fn with_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// The account row for `email`, created on first use.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be written.
    pub fn ensure_account(&self, email: &str) -> Result<AccountId> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT OR IGNORE INTO accounts (email) VALUES (?1)",
                params![email],
            )?;
            let id = tx.query_row(
                "SELECT id FROM accounts WHERE email = ?1",
                params![email],
                |r| r.get(0),
            )?;
            Ok(AccountId(id))
        })
    }

    /// Record `now` as the account's last successful check.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be written.
    pub fn touch_account(&self, account: AccountId, now: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE accounts SET last_checked = ?1 WHERE id = ?2",
                params![now, account.0],
            )?;
            Ok(())
        })
    }

    /// When the account last finished a sync run.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be read.
    pub fn last_checked(&self, account: AccountId) -> Result<Option<DateTime<Utc>>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT last_checked FROM accounts WHERE id = ?1",
                    params![account.0],
                    |r| r.get::<_, Option<DateTime<Utc>>>(0),
                )
                .optional()?
                .flatten())
        })
    }

    /// The mailbox row for `name`, if it has been seen before.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be read.
    pub fn find_mailbox(&self, account: AccountId, name: &str) -> Result<Option<MailboxRef>> {
        self.with_conn(|conn| {
            let id = conn
                .query_row(
                    "SELECT id FROM mailboxes WHERE account_id = ?1 AND name = ?2",
                    params![account.0, name],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(id.map(|id| MailboxRef {
                id,
                account,
                name: name.to_string(),
            }))
        })
    }

    /// The mailbox row for `name`, created on first use.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be written.
    pub fn ensure_mailbox(&self, account: AccountId, name: &str) -> Result<MailboxRef> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT OR IGNORE INTO mailboxes (account_id, name) VALUES (?1, ?2)",
                params![account.0, name],
            )?;
            let id = tx.query_row(
                "SELECT id FROM mailboxes WHERE account_id = ?1 AND name = ?2",
                params![account.0, name],
                |r| r.get(0),
            )?;
            Ok(MailboxRef {
                id,
                account,
                name: name.to_string(),
            })
        })
    }

    /// Record mailboxes reported by the server. A mailbox keeps the
    /// delimiter and attributes it was first discovered with. Returns
    /// how many rows were new or filled in.
    ///
    /// # Errors
    ///
    /// Fails when the transaction cannot commit.
    pub fn record_mailboxes(&self, account: AccountId, mailboxes: &[Mailbox]) -> Result<usize> {
        self.with_tx(|tx| {
            let mut stmt = tx.prepare(
                "INSERT INTO mailboxes (account_id, name, delimiter, attributes)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (account_id, name) DO UPDATE
                 SET delimiter = excluded.delimiter, attributes = excluded.attributes
                 WHERE mailboxes.delimiter IS NULL AND mailboxes.attributes = ''",
            )?;
            let mut recorded = 0;
            for mailbox in mailboxes {
                recorded += stmt.execute(params![
                    account.0,
                    mailbox.name,
                    mailbox.delimiter,
                    mailbox.attributes.join(" "),
                ])?;
            }
            Ok(recorded)
        })
    }

    /// Known mailboxes of `account`, by name.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be read.
    pub fn mailboxes(&self, account: AccountId) -> Result<Vec<Mailbox>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, delimiter, attributes FROM mailboxes
                 WHERE account_id = ?1 ORDER BY name",
            )?;
            let rows = stmt.query_map(params![account.0], |row| {
                let attributes: String = row.get(2)?;
                Ok(Mailbox {
                    name: row.get(0)?,
                    delimiter: row.get(1)?,
                    attributes: attributes.split_whitespace().map(String::from).collect(),
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
    }

    /// Row counts of the main tables.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be read.
    pub fn counts(&self) -> Result<Counts> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64> {
                Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?)
            };
            Ok(Counts {
                messages: count("messages")?,
                placements: count("mailbox_messages")?,
                addresses: count("addresses")?,
                flags: count("flags")?,
                labels: count("labels")?,
            })
        })
    }
}

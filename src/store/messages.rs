//! Message rows, placements, the full-text index and the checkpoint

use super::MirrorStore;
use super::canonical::{resolve_addresses, resolve_flags, resolve_labels};
use super::model::{
    MailboxRef, NewMessage, Placement, SearchHit, StoredAddress, StoredMessage, Upserted,
};
use crate::error::Result;
use crate::flag::Flag;
use crate::parser::ParsedAddress;
use crate::session::UidRange;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;

const ROLES: [&str; 3] = ["to", "cc", "bcc"];

impl MirrorStore {
    /// Highest persisted UID in `mailbox`. This is the sync checkpoint;
    /// it is never stored on its own.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be read.
    pub fn checkpoint(&self, mailbox: &MailboxRef) -> Result<Option<u32>> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT MAX(uid) FROM mailbox_messages WHERE mailbox_id = ?1",
                params![mailbox.id],
                |r| r.get(0),
            )?)
        })
    }

    /// Persist a fetched message and its placement in one transaction.
    ///
    /// A global id seen for the first time gets its message row,
    /// address references and search entry. A known one only gains the
    /// placement; its content is never rewritten. Flags and labels are
    /// replaced either way.
    ///
    /// # Errors
    ///
    /// Fails when the transaction cannot commit. Nothing is written
    /// then.
    pub fn upsert_message(&self, mailbox: &MailboxRef, message: &NewMessage) -> Result<Upserted> {
        self.with_tx(|tx| {
            let outcome = if message_exists(tx, message.global_id)? {
                Upserted::Placed
            } else {
                insert_message(tx, mailbox, message)?;
                Upserted::Created
            };

            write_flags_and_labels(tx, message.global_id, &message.flags, &message.labels)?;
            tx.execute(
                "INSERT OR REPLACE INTO mailbox_messages (mailbox_id, uid, global_id)
                 VALUES (?1, ?2, ?3)",
                params![mailbox.id, message.uid, message.global_id],
            )?;
            Ok(outcome)
        })
    }

    /// Replace the flag and label sets of a known message. Returns
    /// `false` when the global id is unknown.
    ///
    /// # Errors
    ///
    /// Fails when the transaction cannot commit.
    pub fn replace_flags_and_labels(
        &self,
        global_id: u64,
        flags: &[Flag],
        labels: &[String],
    ) -> Result<bool> {
        self.with_tx(|tx| {
            if !message_exists(tx, global_id)? {
                return Ok(false);
            }
            write_flags_and_labels(tx, global_id, flags, labels)?;
            Ok(true)
        })
    }

    /// UID to global id for the placements of `mailbox` within `range`.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be read.
    pub fn global_ids_in(
        &self,
        mailbox: &MailboxRef,
        range: UidRange,
    ) -> Result<HashMap<u32, u64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT uid, global_id FROM mailbox_messages
                 WHERE mailbox_id = ?1 AND uid BETWEEN ?2 AND ?3",
            )?;
            let rows = stmt.query_map(
                params![mailbox.id, range.start, range.end.unwrap_or(u32::MAX)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
    }

    /// A message with its addresses, flags, labels and placements.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be read.
    pub fn message(&self, global_id: u64) -> Result<Option<StoredMessage>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT m.thread_id, m.mailbox, m.internal_date, m.subject, m.body,
                            a.raw, a.name, a.email
                     FROM messages m LEFT JOIN addresses a ON a.id = m.from_address_id
                     WHERE m.global_id = ?1",
                    params![global_id],
                    |row| {
                        let from = row
                            .get::<_, Option<String>>(5)?
                            .map(|raw| -> rusqlite::Result<StoredAddress> {
                                Ok(StoredAddress {
                                    raw,
                                    name: row.get(6)?,
                                    email: row.get(7)?,
                                })
                            })
                            .transpose()?;
                        Ok(StoredMessage {
                            global_id,
                            thread_id: row.get(0)?,
                            mailbox: row.get(1)?,
                            internal_date: row.get(2)?,
                            subject: row.get(3)?,
                            body: row.get(4)?,
                            from,
                            to: Vec::new(),
                            cc: Vec::new(),
                            bcc: Vec::new(),
                            flags: Vec::new(),
                            labels: Vec::new(),
                            placements: Vec::new(),
                        })
                    },
                )
                .optional()?;

            let Some(mut message) = row else {
                return Ok(None);
            };
            message.to = recipients(conn, global_id, "to")?;
            message.cc = recipients(conn, global_id, "cc")?;
            message.bcc = recipients(conn, global_id, "bcc")?;
            message.flags = names(
                conn,
                "SELECT f.name FROM message_flags mf JOIN flags f ON f.id = mf.flag_id
                 WHERE mf.global_id = ?1 ORDER BY f.name",
                global_id,
            )?;
            message.labels = names(
                conn,
                "SELECT l.name FROM message_labels ml JOIN labels l ON l.id = ml.label_id
                 WHERE ml.global_id = ?1 ORDER BY l.name",
                global_id,
            )?;
            message.placements = placements(conn, global_id)?;
            Ok(Some(message))
        })
    }

    /// Full-text search over sender, recipients, subject and body.
    /// `query` uses FTS5 syntax; a malformed query is a storage error.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] for a malformed query.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.global_id, m.thread_id, m.mailbox, m.internal_date,
                        messages_fts.sender, m.subject,
                        snippet(messages_fts, 3, '[', ']', '...', 12)
                 FROM messages_fts JOIN messages m ON m.global_id = messages_fts.rowid
                 WHERE messages_fts MATCH ?1
                 ORDER BY messages_fts.rank
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![query, limit], |row| {
                Ok(SearchHit {
                    global_id: row.get(0)?,
                    thread_id: row.get(1)?,
                    mailbox: row.get(2)?,
                    internal_date: row.get(3)?,
                    sender: row.get(4)?,
                    subject: row.get(5)?,
                    snippet: row.get(6)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
    }
}

fn message_exists(conn: &Connection, global_id: u64) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM messages WHERE global_id = ?1",
            params![global_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn insert_message(conn: &Connection, mailbox: &MailboxRef, message: &NewMessage) -> Result<()> {
    let content = &message.content;
    let from = match &content.from {
        Some(address) => resolve_addresses(conn, std::slice::from_ref(address))?
            .first()
            .map(|r| r.0),
        None => None,
    };

    conn.execute(
        "INSERT INTO messages
            (global_id, thread_id, account_id, mailbox, internal_date, subject, body, from_address_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            message.global_id,
            message.thread_id,
            mailbox.account.0,
            mailbox.name,
            message.internal_date,
            content.subject,
            content.body,
            from,
        ],
    )?;

    for (role, list) in ROLES.into_iter().zip([&content.to, &content.cc, &content.bcc]) {
        let refs = resolve_addresses(conn, list)?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO message_addresses (global_id, address_id, role, position)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (position, address) in (0_i64..).zip(refs) {
            stmt.execute(params![message.global_id, address.0, role, position])?;
        }
    }

    conn.execute(
        "INSERT OR REPLACE INTO messages_fts (rowid, sender, recipients, subject, body)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            message.global_id,
            content.from.as_ref().map(display).unwrap_or_default(),
            content.recipients().map(display).collect::<Vec<_>>().join(", "),
            content.subject,
            content.body,
        ],
    )?;
    Ok(())
}

fn display(address: &ParsedAddress) -> String {
    match &address.name {
        Some(name) => format!("{name} <{}>", address.email),
        None => address.email.clone(),
    }
}

fn write_flags_and_labels(
    conn: &Connection,
    global_id: u64,
    flags: &[Flag],
    labels: &[String],
) -> Result<()> {
    let flag_refs = resolve_flags(conn, flags)?;
    let label_refs = resolve_labels(conn, labels)?;

    conn.execute(
        "DELETE FROM message_flags WHERE global_id = ?1",
        params![global_id],
    )?;
    conn.execute(
        "DELETE FROM message_labels WHERE global_id = ?1",
        params![global_id],
    )?;

    let mut stmt =
        conn.prepare_cached("INSERT OR IGNORE INTO message_flags (global_id, flag_id) VALUES (?1, ?2)")?;
    for flag in flag_refs {
        stmt.execute(params![global_id, flag.0])?;
    }
    let mut stmt = conn
        .prepare_cached("INSERT OR IGNORE INTO message_labels (global_id, label_id) VALUES (?1, ?2)")?;
    for label in label_refs {
        stmt.execute(params![global_id, label.0])?;
    }
    Ok(())
}

fn recipients(conn: &Connection, global_id: u64, role: &str) -> Result<Vec<StoredAddress>> {
    let mut stmt = conn.prepare_cached(
        "SELECT a.raw, a.name, a.email
         FROM message_addresses ma JOIN addresses a ON a.id = ma.address_id
         WHERE ma.global_id = ?1 AND ma.role = ?2
         ORDER BY ma.position",
    )?;
    let rows = stmt.query_map(params![global_id, role], |row| {
        Ok(StoredAddress {
            raw: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

fn names(conn: &Connection, sql: &str, global_id: u64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params![global_id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

fn placements(conn: &Connection, global_id: u64) -> Result<Vec<Placement>> {
    let mut stmt = conn.prepare_cached(
        "SELECT mb.name, mm.uid
         FROM mailbox_messages mm JOIN mailboxes mb ON mb.id = mm.mailbox_id
         WHERE mm.global_id = ?1
         ORDER BY mb.name, mm.uid",
    )?;
    let rows = stmt.query_map(params![global_id], |row| {
        Ok(Placement {
            mailbox: row.get(0)?,
            uid: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

//! Schema migrations
//!
//! Applied versions are tracked in `_migrations`; pending ones run in
//! order, each inside its own transaction.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::info;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_mirror_tables",
        sql: include_str!("sql/001_create_mirror.sql"),
    },
    Migration {
        version: 2,
        description: "create_messages_fts",
        sql: include_str!("sql/002_create_messages_fts.sql"),
    },
];

/// Run every migration newer than the recorded version.
pub(super) fn run_all(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        info!(
            version = migration.version,
            description = migration.description,
            "Running migration"
        );

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql).map_err(|e| {
            Error::storage(&format!("migration v{}", migration.version), e)
        })?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
        tx.commit()?;
    }

    Ok(())
}

//! Batched resolve-or-create of canonical addresses, flags and labels
//!
//! Each batch does one lookup for every key, inserts only the keys
//! that were missing and looks those up once more. The `UNIQUE`
//! constraint on the natural key turns a racing insert into a no-op,
//! so a key never gets two rows.

use super::model::{AddressRef, FlagRef, LabelRef};
use super::MirrorStore;
use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::parser::ParsedAddress;
use rusqlite::{Connection, params, params_from_iter};
use std::collections::HashMap;

/// Keys per `IN (...)` lookup, well under SQLite's variable limit.
const LOOKUP_CHUNK: usize = 500;

#[derive(Clone, Copy)]
struct Table {
    name: &'static str,
    key: &'static str,
}

const ADDRESSES: Table = Table {
    name: "addresses",
    key: "raw",
};
const FLAGS: Table = Table {
    name: "flags",
    key: "name",
};
const LABELS: Table = Table {
    name: "labels",
    key: "name",
};

impl MirrorStore {
    /// Canonical rows for `addresses`, in input order.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be written.
    pub fn resolve_or_create_addresses(
        &self,
        addresses: &[ParsedAddress],
    ) -> Result<Vec<AddressRef>> {
        self.with_tx(|tx| resolve_addresses(tx, addresses))
    }

    /// Canonical rows for `flags`, in input order.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be written.
    pub fn resolve_or_create_flags(&self, flags: &[Flag]) -> Result<Vec<FlagRef>> {
        self.with_tx(|tx| resolve_flags(tx, flags))
    }

    /// Canonical rows for `labels`, in input order.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be written.
    pub fn resolve_or_create_labels(&self, labels: &[String]) -> Result<Vec<LabelRef>> {
        self.with_tx(|tx| resolve_labels(tx, labels))
    }
}

pub(super) fn resolve_addresses(
    conn: &Connection,
    addresses: &[ParsedAddress],
) -> Result<Vec<AddressRef>> {
    let by_raw: HashMap<&str, &ParsedAddress> =
        addresses.iter().map(|a| (a.raw.as_str(), a)).collect();
    let keys: Vec<&str> = addresses.iter().map(|a| a.raw.as_str()).collect();

    let ids = resolve(conn, ADDRESSES, &keys, |conn, raw| {
        let address = by_raw
            .get(raw)
            .ok_or_else(|| Error::Storage(format!("no address for key '{raw}'")))?;
        conn.prepare_cached("INSERT OR IGNORE INTO addresses (raw, name, email) VALUES (?1, ?2, ?3)")?
            .execute(params![address.raw, address.name, address.email])?;
        Ok(())
    })?;
    Ok(ids.into_iter().map(AddressRef).collect())
}

pub(super) fn resolve_flags(conn: &Connection, flags: &[Flag]) -> Result<Vec<FlagRef>> {
    let keys: Vec<&str> = flags.iter().map(Flag::as_imap_str).collect();
    let ids = resolve(conn, FLAGS, &keys, insert_name(FLAGS))?;
    Ok(ids.into_iter().map(FlagRef).collect())
}

pub(super) fn resolve_labels(conn: &Connection, labels: &[String]) -> Result<Vec<LabelRef>> {
    let keys: Vec<&str> = labels.iter().map(String::as_str).collect();
    let ids = resolve(conn, LABELS, &keys, insert_name(LABELS))?;
    Ok(ids.into_iter().map(LabelRef).collect())
}

fn insert_name(table: Table) -> impl FnMut(&Connection, &str) -> Result<()> {
    move |conn, key| {
        conn.prepare_cached(&format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES (?1)",
            table.name, table.key
        ))?
        .execute(params![key])?;
        Ok(())
    }
}

/// Row ids for `keys`, in input order. Duplicate keys share an id.
fn resolve(
    conn: &Connection,
    table: Table,
    keys: &[&str],
    mut insert: impl FnMut(&Connection, &str) -> Result<()>,
) -> Result<Vec<i64>> {
    let mut unique: Vec<&str> = keys.to_vec();
    unique.sort_unstable();
    unique.dedup();

    let mut ids = lookup(conn, table, &unique)?;

    let missing: Vec<&str> = unique
        .into_iter()
        .filter(|k| !ids.contains_key(*k))
        .collect();
    if !missing.is_empty() {
        for key in &missing {
            insert(conn, key)?;
        }
        ids.extend(lookup(conn, table, &missing)?);
    }

    keys.iter()
        .map(|k| {
            ids.get(*k).copied().ok_or_else(|| {
                Error::Storage(format!("{} row for '{k}' was not created", table.name))
            })
        })
        .collect()
}

fn lookup(conn: &Connection, table: Table, keys: &[&str]) -> Result<HashMap<String, i64>> {
    let mut ids = HashMap::with_capacity(keys.len());

    for chunk in keys.chunks(LOOKUP_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {key}, id FROM {name} WHERE {key} IN ({placeholders})",
            key = table.key,
            name = table.name,
        ))?;
        let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (key, id) = row?;
            ids.insert(key, id);
        }
    }

    Ok(ids)
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded escrow database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: id → Identity
//! - `user_names`: username → users.id
//! - `pending_users`: id → PendingIdentity
//! - `pending_user_names`: username → pending_users.id
//! - `pending_game_accounts`: id → PendingCredential
//! - `game_accounts`: id → Credential
//! - `access_requests`: id → AccessRequest
//! - `pending_access`: request id → deadline (unix seconds), Pending requests only
//! - `access_grants`: id → AccessGrant (append-only)
//! - `grants_by_request`: request id → grant id
//! - `sessions`: token → Session
//! - `audit_log`: sequence → AuditEvent (append-only)
//! - `sequences`: table name → last issued id
//!
//! redb admits one write transaction at a time, so every read-check-write
//! done inside [`EscrowDb::write`] is indivisible with respect to other
//! writers. Returning `Err` from the closure aborts the transaction.

use std::path::Path;

use redb::{
    backends::InMemoryBackend, Database, ReadTransaction, ReadableDatabase, ReadableTable, Table,
    TableDefinition, WriteTransaction,
};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");
pub(crate) const USER_NAMES: TableDefinition<&str, u64> = TableDefinition::new("user_names");
pub(crate) const PENDING_USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("pending_users");
pub(crate) const PENDING_USER_NAMES: TableDefinition<&str, u64> =
    TableDefinition::new("pending_user_names");
pub(crate) const PENDING_GAME_ACCOUNTS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("pending_game_accounts");
pub(crate) const GAME_ACCOUNTS: TableDefinition<u64, &[u8]> = TableDefinition::new("game_accounts");
pub(crate) const ACCESS_REQUESTS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("access_requests");
pub(crate) const PENDING_ACCESS: TableDefinition<u64, i64> = TableDefinition::new("pending_access");
pub(crate) const ACCESS_GRANTS: TableDefinition<u64, &[u8]> = TableDefinition::new("access_grants");
pub(crate) const GRANTS_BY_REQUEST: TableDefinition<u64, u64> =
    TableDefinition::new("grants_by_request");
pub(crate) const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");
/// Keyed by (UTC day as days since CE, sequence) so a day is one range scan.
pub(crate) const AUDIT_LOG: TableDefinition<(i32, u64), &[u8]> =
    TableDefinition::new("audit_log");
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// EscrowDb
// =============================================================================

/// Durable store shared by every escrow component.
pub struct EscrowDb {
    db: Database,
}

impl EscrowDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;
        Self::with_tables(db)
    }

    /// Volatile database, used by tests and dry runs.
    pub fn in_memory() -> StoreResult<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::with_tables(db)
    }

    // Pre-create all tables so later read transactions don't fail
    fn with_tables(db: Database) -> StoreResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_NAMES)?;
            let _ = write_txn.open_table(PENDING_USERS)?;
            let _ = write_txn.open_table(PENDING_USER_NAMES)?;
            let _ = write_txn.open_table(PENDING_GAME_ACCOUNTS)?;
            let _ = write_txn.open_table(GAME_ACCOUNTS)?;
            let _ = write_txn.open_table(ACCESS_REQUESTS)?;
            let _ = write_txn.open_table(PENDING_ACCESS)?;
            let _ = write_txn.open_table(ACCESS_GRANTS)?;
            let _ = write_txn.open_table(GRANTS_BY_REQUEST)?;
            let _ = write_txn.open_table(SESSIONS)?;
            let _ = write_txn.open_table(AUDIT_LOG)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    /// Run `f` inside one write transaction.
    ///
    /// Commits when `f` returns `Ok`; aborts (leaving the store untouched)
    /// when it returns `Err`.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&WriteTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let txn = self.db.begin_write().map_err(StoreError::from)?;
        match f(&txn) {
            Ok(value) => {
                txn.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = txn.abort() {
                    tracing::warn!(error = %abort_err, "failed to abort write transaction");
                }
                Err(err)
            }
        }
    }

    /// Run `f` against a consistent read snapshot.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let txn = self.db.begin_read().map_err(StoreError::from)?;
        f(&txn)
    }

    /// Opens a read transaction to confirm the storage engine answers.
    pub fn health_check(&self) -> StoreResult<()> {
        let txn = self.db.begin_read()?;
        let _ = txn.open_table(SEQUENCES)?;
        Ok(())
    }
}

// =============================================================================
// Row Helpers
// =============================================================================

/// Allocate the next id for `sequence`. Must not be called while the
/// sequences table is already open in `txn`.
pub(crate) fn next_id(txn: &WriteTransaction, sequence: &str) -> StoreResult<u64> {
    let mut table = txn.open_table(SEQUENCES)?;
    let current = table.get(sequence)?.map(|v| v.value()).unwrap_or(0);
    let next = current + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

/// Load and deserialize one JSON row.
pub(crate) fn get_row<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> StoreResult<Option<T>> {
    match table.get(id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

/// Serialize and store one JSON row, replacing any previous value.
pub(crate) fn put_row<T: Serialize>(
    table: &mut Table<'_, u64, &'static [u8]>,
    id: u64,
    row: &T,
) -> StoreResult<()> {
    let json = serde_json::to_vec(row)?;
    table.insert(id, json.as_slice())?;
    Ok(())
}

/// Remove one JSON row, returning what was stored.
pub(crate) fn take_row<T: DeserializeOwned>(
    table: &mut Table<'_, u64, &'static [u8]>,
    id: u64,
) -> StoreResult<Option<T>> {
    match table.remove(id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

/// Deserialize every row of a table in id order.
pub(crate) fn all_rows<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
) -> StoreResult<Vec<T>> {
    let mut rows = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        rows.push(serde_json::from_slice(value.value())?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        name: String,
    }

    fn temp_db() -> (EscrowDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = EscrowDb::open(&dir.path().join("escrow.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn sequences_are_per_table_and_monotonic() {
        let db = EscrowDb::in_memory().unwrap();
        let ids: (u64, u64, u64) = db
            .write(|txn| -> StoreResult<_> {
                Ok((
                    next_id(txn, "users")?,
                    next_id(txn, "users")?,
                    next_id(txn, "game_accounts")?,
                ))
            })
            .unwrap();
        assert_eq!(ids, (1, 2, 1));
    }

    #[test]
    fn failed_closure_aborts_transaction() {
        let db = EscrowDb::in_memory().unwrap();
        let result: Result<(), StoreError> = db.write(|txn| {
            let mut table = txn.open_table(USERS)?;
            put_row(&mut table, 1, &Row { name: "ghost".into() })?;
            Err(StoreError::Io(std::io::Error::other("boom")))
        });
        assert!(result.is_err());

        let row: Option<Row> = db
            .read(|txn| -> StoreResult<_> { get_row(&txn.open_table(USERS)?, 1) })
            .unwrap();
        assert!(row.is_none());
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("escrow.redb");
        {
            let db = EscrowDb::open(&path).unwrap();
            db.write(|txn| -> StoreResult<()> {
                let mut table = txn.open_table(USERS)?;
                put_row(&mut table, 7, &Row { name: "alice".into() })
            })
            .unwrap();
        }

        let db = EscrowDb::open(&path).unwrap();
        let rows: Vec<Row> = db
            .read(|txn| -> StoreResult<_> { all_rows(&txn.open_table(USERS)?) })
            .unwrap();
        assert_eq!(rows, vec![Row { name: "alice".into() }]);
    }

    #[test]
    fn take_row_removes() {
        let (db, _dir) = temp_db();
        let taken: Option<Row> = db
            .write(|txn| -> StoreResult<_> {
                let mut table = txn.open_table(PENDING_USERS)?;
                put_row(&mut table, 3, &Row { name: "bob".into() })?;
                take_row(&mut table, 3)
            })
            .unwrap();
        assert_eq!(taken, Some(Row { name: "bob".into() }));
        assert!(db.health_check().is_ok());
    }
}

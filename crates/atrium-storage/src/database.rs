// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database handle: PRAGMA setup, migrations and the single writer.
//!
//! All statements run on tokio-rusqlite's one background thread. Do not open
//! additional connections for writes.

use std::path::Path;

use atrium_core::AtriumError;
use rusqlite::TransactionBehavior;
use tracing::debug;

use crate::migrations;

const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON;
     PRAGMA synchronous = NORMAL;
     PRAGMA busy_timeout = 5000;";

/// Error raised inside a storage closure: either SQLite failed or a domain
/// rule rejected the operation. Both roll back the transaction.
#[derive(Debug)]
pub(crate) enum TxError {
    Sql(rusqlite::Error),
    Domain(AtriumError),
}

impl From<rusqlite::Error> for TxError {
    fn from(e: rusqlite::Error) -> Self {
        TxError::Sql(e)
    }
}

impl From<AtriumError> for TxError {
    fn from(e: AtriumError) -> Self {
        TxError::Domain(e)
    }
}

pub(crate) type TxResult<T> = Result<T, TxError>;

/// Converts a tokio-rusqlite error into the storage variant.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> AtriumError {
    AtriumError::Storage {
        source: Box::new(e),
    }
}

/// SQLite database behind a single serialized connection.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Opens (creating if needed) the database at `path`, applies PRAGMAs and
    /// runs pending migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, AtriumError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| AtriumError::Storage {
                    source: Box::new(e),
                })?;
            }
        }

        let owned = path.to_string();
        tokio::task::spawn_blocking(move || prepare(&owned, wal_mode))
            .await
            .map_err(|e| AtriumError::Internal(format!("migration task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| AtriumError::Storage {
                source: Box::new(e),
            })?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(CONNECTION_PRAGMAS)
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Runs `f` inside an IMMEDIATE transaction. Commits on `Ok`; any error
    /// rolls back.
    pub(crate) async fn transact<T, F>(&self, f: F) -> Result<T, AtriumError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Transaction<'_>) -> TxResult<T> + Send + 'static,
    {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                match f(&tx) {
                    Ok(value) => {
                        tx.commit()?;
                        Ok(Ok(value))
                    }
                    Err(TxError::Sql(e)) => Err(e),
                    Err(TxError::Domain(e)) => Ok(Err(e)),
                }
            })
            .await
            .map_err(map_tr_err)?
    }

    /// Runs a read-only closure outside any explicit transaction.
    pub(crate) async fn read<T, F>(&self, f: F) -> Result<T, AtriumError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> TxResult<T> + Send + 'static,
    {
        self.conn
            .call(move |conn| match f(conn) {
                Ok(value) => Ok(Ok(value)),
                Err(TxError::Sql(e)) => Err(e),
                Err(TxError::Domain(e)) => Ok(Err(e)),
            })
            .await
            .map_err(map_tr_err)?
    }

    /// Checkpoints the WAL so the database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), AtriumError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)
    }
}

fn prepare(path: &str, wal_mode: bool) -> Result<(), AtriumError> {
    let storage = |e: rusqlite::Error| AtriumError::Storage {
        source: Box::new(e),
    };
    let mut conn = rusqlite::Connection::open(path).map_err(storage)?;
    if wal_mode {
        conn.pragma_update(None, "journal_mode", "WAL").map_err(storage)?;
    }
    conn.execute_batch(CONNECTION_PRAGMAS).map_err(storage)?;
    migrations::run_migrations(&mut conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("atrium.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();

        let tables: Vec<String> = db
            .read(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let rows = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(rows)
            })
            .await
            .unwrap();
        for expected in [
            "attendance_items",
            "channels",
            "contact_identities",
            "contacts",
            "conversation_transitions",
            "conversations",
            "inbound_queue",
            "messages",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atrium.db");
        let path = path.to_str().unwrap();
        drop(Database::open(path, true).await.unwrap());
        let db = Database::open(path, true).await.unwrap();
        db.checkpoint().await.unwrap();
    }

    #[tokio::test]
    async fn domain_error_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("a.db").to_str().unwrap(), false)
            .await
            .unwrap();
        let result: Result<(), AtriumError> = db
            .transact(|tx| {
                tx.execute(
                    "INSERT INTO contacts (id, tenant_id, created_at, updated_at)
                     VALUES ('c1', 't1', 'x', 'x')",
                    [],
                )?;
                Err(AtriumError::Internal("abort".into()).into())
            })
            .await;
        assert!(matches!(result, Err(AtriumError::Internal(_))));

        let count: i64 = db
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM contacts", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}

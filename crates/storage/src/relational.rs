//! Relational chunk storage backed by SQLite
//!
//! Each chunk payload is one row of `trace_chunk_payloads`, keyed by
//! `(owner, chunk_index)`. Appends run inside a transaction so the read of
//! the current payload and the write of the spliced one cannot interleave
//! with another connection.
//!
//! The connection is not `Sync`, so it sits behind a mutex. Per-chunk
//! serialization is still the lease's job; the mutex only protects the
//! connection itself.

use crate::payload;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracestore_core::{BackendKind, ChunkKey, ChunkStore, Error, OwnerId, Result};
use tracing::debug;

/// How long a statement waits on a locked database file
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS trace_chunk_payloads (
        owner       TEXT    NOT NULL,
        chunk_index INTEGER NOT NULL,
        raw_data    BLOB    NOT NULL,
        PRIMARY KEY (owner, chunk_index)
    )";

fn storage_err(err: rusqlite::Error) -> Error {
    Error::storage(BackendKind::Relational, err)
}

fn index_param(index: u64) -> Result<i64> {
    i64::try_from(index).map_err(|_| Error::InvalidKey(format!("chunk index {} out of range", index)))
}

/// SQLite-backed chunk store
pub struct RelationalStore {
    conn: Mutex<Connection>,
}

impl RelationalStore {
    /// Open (or create) a database file
    ///
    /// The file is switched to WAL journaling and the payload table is
    /// created if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(storage_err)?;
        conn.pragma_update_and_check(None, "journal_mode", "wal", |row| row.get::<_, String>(0))
            .map_err(storage_err)?;
        debug!(path = %path.display(), "opened relational chunk store");
        Self::bootstrap(conn)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(storage_err)?;
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of payload rows
    pub fn row_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM trace_chunk_payloads", [], |row| {
                row.get(0)
            })
            .map_err(storage_err)?;
        Ok(count as usize)
    }

    fn read_row(conn: &Connection, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
        conn.query_row(
            "SELECT raw_data FROM trace_chunk_payloads WHERE owner = ?1 AND chunk_index = ?2",
            params![key.owner.as_str(), index_param(key.index)?],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_err)
    }

    fn upsert_row(conn: &Connection, key: &ChunkKey, data: &[u8]) -> Result<()> {
        conn.execute(
            "INSERT INTO trace_chunk_payloads (owner, chunk_index, raw_data) VALUES (?1, ?2, ?3)
             ON CONFLICT (owner, chunk_index) DO UPDATE SET raw_data = excluded.raw_data",
            params![key.owner.as_str(), index_param(key.index)?, data],
        )
        .map_err(storage_err)?;
        Ok(())
    }
}

impl std::fmt::Debug for RelationalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalStore").finish_non_exhaustive()
    }
}

impl ChunkStore for RelationalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn available(&self) -> bool {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    fn read(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        Self::read_row(&conn, key)
    }

    fn write(&self, key: &ChunkKey, data: &[u8]) -> Result<()> {
        payload::check_capacity(data.len())?;
        let conn = self.conn.lock();
        Self::upsert_row(&conn, key, data)
    }

    fn append_at(&self, key: &ChunkKey, data: &[u8], offset: usize) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(storage_err)?;

        let mut current = Self::read_row(&tx, key)?.unwrap_or_default();
        let new_size = payload::splice(&mut current, data, offset)?;
        Self::upsert_row(&tx, key, &current)?;

        tx.commit().map_err(storage_err)?;
        Ok(new_size)
    }

    fn size(&self, key: &ChunkKey) -> Result<Option<usize>> {
        let conn = self.conn.lock();
        let len: Option<i64> = conn
            .query_row(
                "SELECT length(raw_data) FROM trace_chunk_payloads WHERE owner = ?1 AND chunk_index = ?2",
                params![key.owner.as_str(), index_param(key.index)?],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        Ok(len.map(|len| len as usize))
    }

    fn delete(&self, key: &ChunkKey) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM trace_chunk_payloads WHERE owner = ?1 AND chunk_index = ?2",
            params![key.owner.as_str(), index_param(key.index)?],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn list_keys(&self, owner: &OwnerId) -> Result<BTreeSet<ChunkKey>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT chunk_index FROM trace_chunk_payloads WHERE owner = ?1")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![owner.as_str()], |row| row.get::<_, i64>(0))
            .map_err(storage_err)?;

        let mut keys = BTreeSet::new();
        for index in rows {
            let index = index.map_err(storage_err)?;
            keys.insert(ChunkKey::new(owner.clone(), index as u64));
        }
        Ok(keys)
    }

    fn delete_keys(&self, keys: &[ChunkKey]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(storage_err)?;
        {
            let mut stmt = tx
                .prepare("DELETE FROM trace_chunk_payloads WHERE owner = ?1 AND chunk_index = ?2")
                .map_err(storage_err)?;
            for key in keys {
                stmt.execute(params![key.owner.as_str(), index_param(key.index)?])
                    .map_err(storage_err)?;
            }
        }
        tx.commit().map_err(storage_err)
    }
}

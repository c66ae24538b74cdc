//! SQLite-backed application state.
//!
//! Persists every applied operation. `INSERT OR IGNORE` on the `(origin, seq)`
//! primary key makes repeated application a no-op.

use std::path::Path;

use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use tsae_core::{Operation, ReplicaId};

use crate::error::Result;
use crate::migration::{self, now_millis};
use crate::traits::Applier;

/// Applier that records applied operations in a SQLite database.
///
/// The connection is owned directly: the replica lock already serializes
/// every call.
pub struct SqliteApplier {
    conn: Connection,
}

impl SqliteApplier {
    /// Open a SQLite database at the given path, running migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    /// Number of applied operations.
    pub fn count(&self) -> Result<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM applied_operations", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Payload of the applied operation `(origin, seq)`, if any.
    pub fn payload(&self, origin: &ReplicaId, seq: u64) -> Result<Option<Bytes>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM applied_operations WHERE origin = ?1 AND seq = ?2",
                params![origin.as_str(), seq as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload.map(Bytes::from))
    }

    /// Highest applied sequence number from `origin`.
    pub fn max_seq(&self, origin: &ReplicaId) -> Result<Option<u64>> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(seq) FROM applied_operations WHERE origin = ?1",
            params![origin.as_str()],
            |row| row.get(0),
        )?;
        Ok(max.map(|seq| seq as u64))
    }
}

impl Applier for SqliteApplier {
    fn apply(&mut self, ops: &[Operation]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO applied_operations (origin, seq, payload, applied_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let now = now_millis();
            for op in ops {
                inserted += stmt.execute(params![
                    op.origin().as_str(),
                    op.seq() as i64,
                    &op.payload[..],
                    now
                ])?;
            }
        }
        tx.commit()?;

        tracing::trace!(batch = ops.len(), inserted, "applied operations");
        Ok(())
    }
}

//! SQLite database handle
//!
//! `Database` owns one connection and is constructed explicitly by the
//! caller; no global state, no implicit paths. Concurrent writers for the
//! same key are the caller's responsibility to avoid.

use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::schema;

/// Handle over the time-series ledger database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the ledger at `path` and apply the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(schema::create_schema())?;
        tracing::debug!(path = %path.as_ref().display(), "ledger database opened");
        Ok(Self { conn })
    }

    /// In-memory database, used in tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::create_schema())?;
        Ok(Self { conn })
    }

    /// Close the connection, surfacing any pending error.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        assert!(Database::open_in_memory().is_ok());
    }

    #[test]
    fn test_open_creates_file_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let db = Database::open(&path).unwrap();
        db.close().unwrap();
        assert!(path.exists());

        // reopening applies the schema idempotently
        let db = Database::open(&path).unwrap();
        db.close().unwrap();
    }
}

//! SQLite-backed identity store.
//!
//! Each record is one row: the id key, the name and creation time as indexed
//! columns, and the full record as a JSON document. Documents written by
//! older versions (single `descriptor` field) are normalized on read and
//! rewritten in list form the first time the record changes.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crowdface_core::schema::{CurrentRecord, StoredRecord};
use crowdface_core::{Error, IdentityDraft, IdentityId, IdentityRecord, IdentityStore};
use rusqlite::{params, Connection, OptionalExtension};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS faces (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT    NOT NULL,
    created_at INTEGER NOT NULL,
    body       TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS faces_name ON faces(name);
CREATE INDEX IF NOT EXISTS faces_created_at ON faces(created_at);
";

/// [`IdentityStore`] over a single SQLite connection.
///
/// `AUTOINCREMENT` keeps ids from being reused after `delete` or `clear`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, Error> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(unavailable)?;
        }
        let conn = Connection::open(path).map_err(unavailable)?;
        let journal: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(unavailable)?;
        tracing::info!(path = %path.display(), journal, "identity store opened");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        Self::init(Connection::open_in_memory().map_err(unavailable)?)
    }

    fn init(conn: Connection) -> Result<Self, Error> {
        conn.execute_batch(SCHEMA).map_err(unavailable)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.conn
            .lock()
            .map_err(|_| Error::StoreUnavailable("sqlite connection lock poisoned".into()))
    }

    /// Store a raw JSON document as-is, bypassing normalization.
    #[cfg(test)]
    fn insert_raw(&self, name: &str, body: &str) -> Result<IdentityId, Error> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO faces (name, created_at, body) VALUES (?1, 0, ?2)",
            params![name, body],
        )
        .map_err(unavailable)?;
        Ok(conn.last_insert_rowid() as IdentityId)
    }
}

fn unavailable(e: impl std::fmt::Display) -> Error {
    Error::StoreUnavailable(e.to_string())
}

fn encode(record: &CurrentRecord) -> Result<String, Error> {
    serde_json::to_string(record).map_err(unavailable)
}

fn decode(id: IdentityId, body: &str) -> Result<IdentityRecord, Error> {
    StoredRecord::from_json(body)
        .and_then(StoredRecord::normalize)
        .map(|draft| draft.into_record(id))
        .map_err(|e| Error::StoreUnavailable(format!("record {id} is corrupt: {e}")))
}

impl IdentityStore for SqliteStore {
    fn insert(&self, draft: IdentityDraft) -> Result<IdentityId, Error> {
        draft.validate()?;
        let body = encode(&CurrentRecord::from(&draft))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO faces (name, created_at, body) VALUES (?1, ?2, ?3)",
            params![draft.name.as_str(), draft.created_at.timestamp_millis(), body],
        )
        .map_err(unavailable)?;
        Ok(conn.last_insert_rowid() as IdentityId)
    }

    fn list(&self) -> Result<Vec<IdentityRecord>, Error> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, body FROM faces ORDER BY id")
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .map_err(unavailable)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(unavailable)?;
        // An undecodable row is left out of listings; `get` still reports it.
        Ok(rows
            .into_iter()
            .filter_map(|(id, body)| match decode(id as IdentityId, &body) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(id, error = %e, "skipping unreadable record");
                    None
                }
            })
            .collect())
    }

    fn get(&self, id: IdentityId) -> Result<IdentityRecord, Error> {
        let body: Option<String> = self
            .lock()?
            .query_row(
                "SELECT body FROM faces WHERE id = ?1",
                params![id as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(unavailable)?;
        decode(id, &body.ok_or(Error::NotFound(id))?)
    }

    fn replace(&self, record: &IdentityRecord) -> Result<(), Error> {
        let body = encode(&CurrentRecord::from(record))?;
        let changed = self
            .lock()?
            .execute(
                "UPDATE faces SET name = ?1, body = ?2 WHERE id = ?3",
                params![record.name.as_str(), body, record.id as i64],
            )
            .map_err(unavailable)?;
        if changed == 0 {
            return Err(Error::NotFound(record.id));
        }
        Ok(())
    }

    fn delete(&self, id: IdentityId) -> Result<bool, Error> {
        let changed = self
            .lock()?
            .execute("DELETE FROM faces WHERE id = ?1", params![id as i64])
            .map_err(unavailable)?;
        Ok(changed > 0)
    }

    fn clear(&self) -> Result<(), Error> {
        self.lock()?
            .execute("DELETE FROM faces", [])
            .map_err(unavailable)?;
        Ok(())
    }

    fn len(&self) -> Result<usize, Error> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM faces", [], |row| row.get(0))
            .map_err(unavailable)?;
        Ok(count as usize)
    }
}

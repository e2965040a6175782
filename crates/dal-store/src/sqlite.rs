//! SQLite-backed store
//!
//! All three payload kinds share one table. Scalars use an empty field and
//! position 0, map entries use `field`, sequence entries use `position`.

use crate::error::StoreResult;
use crate::store::{KeyValueStore, StoredValue, ValueKind};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt;
use std::path::Path;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_entries (
    key TEXT NOT NULL,
    kind INTEGER NOT NULL,
    field TEXT NOT NULL DEFAULT '',
    position INTEGER NOT NULL DEFAULT 0,
    data BLOB NOT NULL,
    PRIMARY KEY (key, field, position)
)";

fn kind_code(kind: ValueKind) -> i64 {
    match kind {
        ValueKind::Scalar => 0,
        ValueKind::Map => 1,
        ValueKind::Sequence => 2,
    }
}

fn kind_from_code(code: i64) -> ValueKind {
    match code {
        1 => ValueKind::Map,
        2 => ValueKind::Sequence,
        _ => ValueKind::Scalar,
    }
}

/// Durable key-value store in a single SQLite file
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or the table cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Private in-memory database
    ///
    /// # Errors
    /// Returns error if SQLite cannot allocate the database.
    pub fn in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn kind_of(conn: &Connection, key: &str) -> StoreResult<Option<ValueKind>> {
        Ok(conn
            .query_row(
                "SELECT kind FROM kv_entries WHERE key = ?1 LIMIT 1",
                params![key],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .map(kind_from_code))
    }

    fn expect_kind(conn: &Connection, key: &str, expected: ValueKind) -> StoreResult<bool> {
        match Self::kind_of(conn, key)? {
            None => Ok(false),
            Some(found) if found == expected => Ok(true),
            Some(found) => Err(placeholder(found).mismatch(key, expected)),
        }
    }
}

/// Empty payload of a kind, used to build mismatch errors
fn placeholder(kind: ValueKind) -> StoredValue {
    match kind {
        ValueKind::Scalar => StoredValue::Scalar(Vec::new()),
        ValueKind::Map => StoredValue::Map(IndexMap::new()),
        ValueKind::Sequence => StoredValue::Sequence(Vec::new()),
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn scan(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT key FROM kv_entries \
             WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    async fn kind(&self, key: &str) -> StoreResult<Option<ValueKind>> {
        Self::kind_of(&self.conn.lock(), key)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        if !Self::expect_kind(&conn, key, ValueKind::Scalar)? {
            return Ok(None);
        }
        Ok(conn
            .query_row(
                "SELECT data FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
        tx.execute(
            "INSERT INTO kv_entries (key, kind, data) VALUES (?1, ?2, ?3)",
            params![key, kind_code(ValueKind::Scalar), value],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let mut removed = 0;
        for key in keys {
            if conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])? > 0 {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn get_map(&self, key: &str) -> StoreResult<IndexMap<String, Vec<u8>>> {
        let conn = self.conn.lock();
        if !Self::expect_kind(&conn, key, ValueKind::Map)? {
            return Ok(IndexMap::new());
        }
        let mut stmt =
            conn.prepare("SELECT field, data FROM kv_entries WHERE key = ?1 ORDER BY rowid")?;
        let map = stmt
            .query_map(params![key], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<IndexMap<_, _>, _>>()?;
        Ok(map)
    }

    async fn set_map_field(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<()> {
        let conn = self.conn.lock();
        Self::expect_kind(&conn, key, ValueKind::Map)?;
        conn.execute(
            "INSERT OR REPLACE INTO kv_entries (key, kind, field, data) VALUES (?1, ?2, ?3, ?4)",
            params![key, kind_code(ValueKind::Map), field, value],
        )?;
        Ok(())
    }

    async fn get_sequence(&self, key: &str) -> StoreResult<Vec<Vec<u8>>> {
        let conn = self.conn.lock();
        if !Self::expect_kind(&conn, key, ValueKind::Sequence)? {
            return Ok(Vec::new());
        }
        let mut stmt =
            conn.prepare("SELECT data FROM kv_entries WHERE key = ?1 ORDER BY position")?;
        let items = stmt
            .query_map(params![key], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    async fn append_sequence(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let conn = self.conn.lock();
        Self::expect_kind(&conn, key, ValueKind::Sequence)?;
        let next: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM kv_entries WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO kv_entries (key, kind, position, data) VALUES (?1, ?2, ?3, ?4)",
            params![key, kind_code(ValueKind::Sequence), next, value],
        )?;
        Ok(())
    }
}

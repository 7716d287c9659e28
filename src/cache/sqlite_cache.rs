use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{Result, TaqueroError};

pub const CACHE_DB: &str = "cache.db";

/// Persisted client state: one bucket per store plus an outbox of writes
/// that could not reach the endpoint.
pub struct SqliteCache {
    conn: Connection,
}

/// Last-known-good records for one store
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub name: String,
    pub records: Vec<Value>,
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub fetch_error: Option<String>,
}

impl Bucket {
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Vec::new(),
            last_fetch_time: None,
            fetch_error: None,
        }
    }
}

/// A write waiting in the outbox
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub seq: i64,
    pub bucket: String,
    pub url: String,
    pub body: Value,
    pub queued_at: String,
}

impl SqliteCache {
    /// Open or create the cache database
    pub fn open(data_dir: &Path) -> Result<Self> {
        let conn = Connection::open(data_dir.join(CACHE_DB))?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS buckets (
                name TEXT PRIMARY KEY,
                records TEXT NOT NULL,
                last_fetch_time TEXT,
                fetch_error TEXT
            );

            CREATE TABLE IF NOT EXISTS pending_writes (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                bucket TEXT NOT NULL,
                url TEXT NOT NULL,
                body TEXT NOT NULL,
                queued_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_pending_bucket ON pending_writes(bucket);
            ",
        )?;
        Ok(())
    }

    pub fn load_bucket(&self, name: &str) -> Result<Option<Bucket>> {
        let row: Option<(String, Option<String>, Option<String>)> = self
            .conn
            .query_row(
                "SELECT records, last_fetch_time, fetch_error FROM buckets WHERE name = ?1",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((records, last_fetch_time, fetch_error)) = row else {
            return Ok(None);
        };

        let last_fetch_time = last_fetch_time
            .as_deref()
            .map(DateTime::parse_from_rfc3339)
            .transpose()
            .map_err(|e| TaqueroError::Storage(format!("bad fetch time in cache: {}", e)))?
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Some(Bucket {
            name: name.to_string(),
            records: serde_json::from_str(&records)?,
            last_fetch_time,
            fetch_error,
        }))
    }

    pub fn save_bucket(&self, bucket: &Bucket) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO buckets (name, records, last_fetch_time, fetch_error)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                bucket.name,
                serde_json::to_string(&bucket.records)?,
                bucket.last_fetch_time.map(|t| t.to_rfc3339()),
                bucket.fetch_error,
            ],
        )?;
        Ok(())
    }

    pub fn bucket_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM buckets ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Append a write to the outbox, returning its sequence number
    pub fn queue_write(&self, bucket: &str, url: &str, body: &Value) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO pending_writes (bucket, url, body, queued_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                bucket,
                url,
                serde_json::to_string(body)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Outbox entries for a bucket, oldest first
    pub fn pending_writes(&self, bucket: &str) -> Result<Vec<PendingWrite>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, bucket, url, body, queued_at FROM pending_writes
             WHERE bucket = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map([bucket], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq, bucket, url, body, queued_at)| {
                Ok(PendingWrite {
                    seq,
                    bucket,
                    url,
                    body: serde_json::from_str(&body)?,
                    queued_at,
                })
            })
            .collect()
    }

    pub fn remove_pending(&self, seq: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM pending_writes WHERE seq = ?1", [seq])?;
        Ok(())
    }

    pub fn pending_count(&self, bucket: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pending_writes WHERE bucket = ?1",
            [bucket],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl From<rusqlite::Error> for TaqueroError {
    fn from(e: rusqlite::Error) -> Self {
        TaqueroError::Storage(format!("SQLite error: {}", e))
    }
}

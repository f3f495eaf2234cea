//! SQLite record sink
//!
//! Articles are upserted by URL so a page re-fetched by a later run replaces its row.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordSink, StorageResult};
use crate::storage::{FailureRecord, PageRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn count_articles(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn count_failures(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM crawl_failures", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Title of the stored article at `url`, if any
    pub fn article_title(&self, url: &str) -> StorageResult<Option<Option<String>>> {
        let title = self
            .conn
            .query_row(
                "SELECT title FROM articles WHERE url = ?1",
                params![url],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(title)
    }
}

impl RecordSink for SqliteSink {
    fn store(&mut self, record: &PageRecord) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO articles (url, title, content, content_hash, word_count, language, version,
                                   depth, discovered_from, fetched_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                content_hash = excluded.content_hash,
                word_count = excluded.word_count,
                version = excluded.version,
                fetched_at = excluded.fetched_at,
                updated_at = excluded.updated_at",
            params![
                record.url,
                record.title,
                record.content,
                record.content_hash,
                record.word_count,
                record.language.as_str(),
                record.version.map(|v| v.as_str()),
                record.depth,
                record.discovered_from,
                record.fetched_at.to_rfc3339(),
                now,
            ],
        )?;
        Ok(())
    }

    fn record_failure(&mut self, failure: &FailureRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO crawl_failures (url, state, kind, status_code, detail, attempts, failed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                failure.url,
                failure.state.to_db_string(),
                failure.kind.map(|k| k.to_string()),
                failure.status_code,
                failure.detail,
                failure.attempts,
                failure.failed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

//! Database schema definitions
//!
//! This module contains the SQL schema of the harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Parsed articles, one row per URL
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    word_count INTEGER NOT NULL DEFAULT 0,
    language TEXT NOT NULL,
    version TEXT,
    depth INTEGER NOT NULL,
    discovered_from TEXT,
    fetched_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_version ON articles(version, language);
CREATE INDEX IF NOT EXISTS idx_articles_hash ON articles(content_hash);

-- Tasks that ended without a page
CREATE TABLE IF NOT EXISTS crawl_failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    state TEXT NOT NULL,
    kind TEXT,
    status_code INTEGER,
    detail TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    failed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_failures_url ON crawl_failures(url);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

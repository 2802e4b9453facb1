//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Serp-Harvester database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per harvested result URL
CREATE TABLE IF NOT EXISTS sites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    domain TEXT NOT NULL,
    title TEXT NOT NULL,
    snippet TEXT NOT NULL,
    query TEXT NOT NULL,
    source_page INTEGER NOT NULL,
    discovered_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sites_domain ON sites(domain);
CREATE INDEX IF NOT EXISTS idx_sites_updated ON sites(updated_at);

-- Many-to-many link between queries and result URLs
CREATE TABLE IF NOT EXISTS query_to_url (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    url TEXT NOT NULL REFERENCES sites(url),
    created_at TEXT NOT NULL,
    UNIQUE(query, url)
);

CREATE INDEX IF NOT EXISTS idx_query_to_url_query ON query_to_url(query);
CREATE INDEX IF NOT EXISTS idx_query_to_url_url ON query_to_url(url);

-- Ledger of harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL,
    pages_requested INTEGER NOT NULL,
    records_found INTEGER NOT NULL DEFAULT 0,
    unique_count INTEGER NOT NULL DEFAULT 0,
    failures INTEGER NOT NULL DEFAULT 0
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

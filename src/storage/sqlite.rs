//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Store trait.
//! Every call opens its own connection so workers never share one, and
//! multi-statement writes run inside a single transaction.

use crate::crawler::ResultRecord;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageResult, Store, UpsertOutcome};
use crate::storage::{QueryStats, RunRecord, RunStatus, RunTotals, SiteRecord};
use crate::url::{extract_domain, strip_www};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SITE_COLUMNS: &str =
    "id, url, domain, title, snippet, query, source_page, discovered_at, updated_at";

const RUN_COLUMNS: &str = "id, query, config_hash, started_at, finished_at, status, \
     pages_requested, records_found, unique_count, failures";

/// SQLite store backend
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Opens or creates the database and applies the schema
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        initialize_schema(&conn)?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> StorageResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<SiteRecord> {
    Ok(SiteRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        domain: row.get(2)?,
        title: row.get(3)?,
        snippet: row.get(4)?,
        query: row.get(5)?,
        source_page: row.get(6)?,
        discovered_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        query: row.get(1)?,
        config_hash: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?).unwrap_or(RunStatus::Failed),
        pages_requested: row.get(6)?,
        records_found: row.get::<_, i64>(7)? as u64,
        unique_count: row.get::<_, i64>(8)? as u64,
        failures: row.get::<_, i64>(9)? as u64,
    })
}

impl Store for SqliteStore {
    // ===== Run Ledger =====

    fn create_run(
        &self,
        query: &str,
        config_hash: &str,
        pages_requested: u32,
    ) -> StorageResult<i64> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (query, config_hash, started_at, status, pages_requested)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                query,
                config_hash,
                now,
                RunStatus::Running.to_db_string(),
                pages_requested
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn complete_run(
        &self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, records_found = ?3,
             unique_count = ?4, failures = ?5 WHERE id = ?6",
            params![
                status.to_db_string(),
                now,
                totals.records_found as i64,
                totals.unique_count as i64,
                totals.failures as i64,
                run_id
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let conn = self.connect()?;
        conn.query_row(
            &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
            params![run_id],
            run_from_row,
        )
        .optional()?
        .ok_or(StorageError::RunNotFound(run_id))
    }

    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    // ===== Results =====

    fn load_query_urls(&self, query: &str) -> StorageResult<HashSet<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT url FROM query_to_url WHERE query = ?1")?;
        let urls = stmt
            .query_map(params![query], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(urls)
    }

    fn save_result(&self, query: &str, record: &ResultRecord) -> StorageResult<UpsertOutcome> {
        let domain = ::url::Url::parse(&record.url)
            .ok()
            .as_ref()
            .and_then(extract_domain)
            .map(|host| strip_www(&host).to_string())
            .ok_or_else(|| StorageError::InvalidRecord(record.url.clone()))?;

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        let existed = tx
            .query_row(
                "SELECT 1 FROM sites WHERE url = ?1",
                params![record.url],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        tx.execute(
            "INSERT INTO sites (url, domain, title, snippet, query, source_page, discovered_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                snippet = excluded.snippet,
                source_page = excluded.source_page,
                updated_at = excluded.updated_at",
            params![
                record.url,
                domain,
                record.title,
                record.snippet,
                query,
                record.source_page,
                record.discovered_at.to_rfc3339(),
                now
            ],
        )?;

        tx.execute(
            "INSERT OR IGNORE INTO query_to_url (query, url, created_at) VALUES (?1, ?2, ?3)",
            params![query, record.url, now],
        )?;

        tx.commit()?;

        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn get_site(&self, url: &str) -> StorageResult<Option<SiteRecord>> {
        let conn = self.connect()?;
        let site = conn
            .query_row(
                &format!("SELECT {} FROM sites WHERE url = ?1", SITE_COLUMNS),
                params![url],
                site_from_row,
            )
            .optional()?;
        Ok(site)
    }

    fn recent_sites(&self, limit: usize) -> StorageResult<Vec<SiteRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sites ORDER BY updated_at DESC, id DESC LIMIT ?1",
            SITE_COLUMNS
        ))?;
        let sites = stmt
            .query_map(params![limit as i64], site_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    fn sites_by_query(&self, query: &str, limit: usize) -> StorageResult<Vec<SiteRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.url, s.domain, s.title, s.snippet, s.query, s.source_page,
                    s.discovered_at, s.updated_at
             FROM sites s
             JOIN query_to_url q ON q.url = s.url
             WHERE q.query = ?1
             ORDER BY s.updated_at DESC, s.id DESC
             LIMIT ?2",
        )?;
        let sites = stmt
            .query_map(params![query, limit as i64], site_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    fn queries_for_url(&self, url: &str) -> StorageResult<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT query FROM query_to_url WHERE url = ?1 ORDER BY query")?;
        let queries = stmt
            .query_map(params![url], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(queries)
    }

    // ===== Statistics =====

    fn count_sites(&self) -> StorageResult<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sites", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_associations(&self) -> StorageResult<u64> {
        let conn = self.connect()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM query_to_url", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn query_stats(&self) -> StorageResult<Vec<QueryStats>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT query, COUNT(*), MAX(created_at) FROM query_to_url
             GROUP BY query ORDER BY COUNT(*) DESC, query",
        )?;
        let stats = stmt
            .query_map([], |row| {
                Ok(QueryStats {
                    query: row.get(0)?,
                    url_count: row.get::<_, i64>(1)? as u64,
                    last_seen: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn create_store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("results.db")).unwrap();
        (dir, store)
    }

    fn record(url: &str, title: &str, page: u32) -> ResultRecord {
        ResultRecord {
            url: url.to_string(),
            title: title.to_string(),
            snippet: "A snippet long enough".to_string(),
            source_page: page,
            discovered_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("results.db");
        let store = SqliteStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn test_run_ledger() {
        let (_dir, store) = create_store();
        let run_id = store.create_run("rust", "hash", 10).unwrap();

        let run = store.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
        assert_eq!(run.pages_requested, 10);

        let totals = RunTotals {
            records_found: 12,
            unique_count: 9,
            failures: 1,
        };
        store
            .complete_run(run_id, RunStatus::Completed, &totals)
            .unwrap();

        let run = store.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
        assert_eq!(run.records_found, 12);
        assert_eq!(run.unique_count, 9);
        assert_eq!(run.failures, 1);
    }

    #[test]
    fn test_complete_unknown_run() {
        let (_dir, store) = create_store();
        let err = store
            .complete_run(42, RunStatus::Completed, &RunTotals::default())
            .unwrap_err();
        assert!(matches!(err, StorageError::RunNotFound(42)));
    }

    #[test]
    fn test_recent_runs_newest_first() {
        let (_dir, store) = create_store();
        let first = store.create_run("a", "hash", 1).unwrap();
        let second = store.create_run("b", "hash", 1).unwrap();

        let runs = store.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second);
        assert_eq!(runs[1].id, first);
    }

    #[test]
    fn test_save_result_inserts_then_updates() {
        let (_dir, store) = create_store();
        let first = record("https://www.example.org/a", "Original title", 1);

        assert_eq!(
            store.save_result("rust", &first).unwrap(),
            UpsertOutcome::Inserted
        );

        let mut second = record("https://www.example.org/a", "Fresh title", 3);
        second.discovered_at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(
            store.save_result("rust crawler", &second).unwrap(),
            UpsertOutcome::Updated
        );

        let site = store.get_site("https://www.example.org/a").unwrap().unwrap();
        assert_eq!(site.title, "Fresh title");
        assert_eq!(site.source_page, 3);
        assert_eq!(site.query, "rust");
        assert_eq!(site.domain, "example.org");
        assert!(site.discovered_at.starts_with("2024-01-01"));
        assert_eq!(store.count_sites().unwrap(), 1);
        assert_eq!(
            store.queries_for_url("https://www.example.org/a").unwrap(),
            vec!["rust".to_string(), "rust crawler".to_string()]
        );
    }

    #[test]
    fn test_association_is_insert_or_ignore() {
        let (_dir, store) = create_store();
        let rec = record("https://a.example.org/", "Title", 1);

        store.save_result("rust", &rec).unwrap();
        store.save_result("rust", &rec).unwrap();

        assert_eq!(store.count_associations().unwrap(), 1);
    }

    #[test]
    fn test_save_result_rejects_url_without_host() {
        let (_dir, store) = create_store();
        let rec = record("not a url", "Title", 1);
        let err = store.save_result("rust", &rec).unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(_)));
        assert_eq!(store.count_sites().unwrap(), 0);
    }

    #[test]
    fn test_load_query_urls_is_per_query() {
        let (_dir, store) = create_store();
        store
            .save_result("rust", &record("https://a.example.org/", "A", 1))
            .unwrap();
        store
            .save_result("go", &record("https://b.example.org/", "B", 1))
            .unwrap();

        let urls = store.load_query_urls("rust").unwrap();
        assert_eq!(urls.len(), 1);
        assert!(urls.contains("https://a.example.org/"));
        assert!(store.load_query_urls("python").unwrap().is_empty());
    }

    #[test]
    fn test_sites_by_query_and_stats() {
        let (_dir, store) = create_store();
        store
            .save_result("rust", &record("https://a.example.org/", "A", 1))
            .unwrap();
        store
            .save_result("rust", &record("https://b.example.org/", "B", 1))
            .unwrap();
        store
            .save_result("go", &record("https://a.example.org/", "A", 2))
            .unwrap();

        let rust_sites = store.sites_by_query("rust", 10).unwrap();
        assert_eq!(rust_sites.len(), 2);
        assert_eq!(store.sites_by_query("go", 10).unwrap().len(), 1);
        assert_eq!(store.recent_sites(1).unwrap().len(), 1);

        let stats = store.query_stats().unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].query, "rust");
        assert_eq!(stats[0].url_count, 2);
        assert_eq!(stats[1].query, "go");
        assert_eq!(stats[1].url_count, 1);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .save_result("rust", &record("https://a.example.org/", "A", 1))
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.count_sites().unwrap(), 1);
    }
}

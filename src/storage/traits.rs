//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::ResultRecord;
use crate::storage::{QueryStats, RunRecord, RunStatus, RunTotals, SiteRecord};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// What an upsert did to the `sites` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The URL was new
    Inserted,
    /// The URL existed; mutable fields were refreshed
    Updated,
}

/// Trait for result store implementations
///
/// Implementations must be shareable across workers; every call is
/// self-contained and holds no transaction open between calls.
pub trait Store: Send + Sync {
    // ===== Run Ledger =====

    /// Records the start of a run and returns its ID
    fn create_run(&self, query: &str, config_hash: &str, pages_requested: u32)
        -> StorageResult<i64>;

    /// Stamps the run's finish time, status and totals
    fn complete_run(&self, run_id: i64, status: RunStatus, totals: &RunTotals)
        -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent runs, newest first
    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;

    // ===== Results =====

    /// Loads every URL already associated with the query
    fn load_query_urls(&self, query: &str) -> StorageResult<HashSet<String>>;

    /// Upserts the record by URL and links it to the query, atomically
    ///
    /// An existing row keeps its discovery time and originating query; its
    /// title, snippet, source page and update time are overwritten. The
    /// association row is insert-or-ignore.
    fn save_result(&self, query: &str, record: &ResultRecord) -> StorageResult<UpsertOutcome>;

    /// Gets a site by URL
    fn get_site(&self, url: &str) -> StorageResult<Option<SiteRecord>>;

    /// Gets the most recently updated sites
    fn recent_sites(&self, limit: usize) -> StorageResult<Vec<SiteRecord>>;

    /// Gets the sites associated with a query, most recent first
    fn sites_by_query(&self, query: &str, limit: usize) -> StorageResult<Vec<SiteRecord>>;

    /// Gets every query a URL was found for, alphabetically
    fn queries_for_url(&self, url: &str) -> StorageResult<Vec<String>>;

    // ===== Statistics =====

    /// Gets total site count
    fn count_sites(&self) -> StorageResult<u64>;

    /// Gets total query/URL association count
    fn count_associations(&self) -> StorageResult<u64>;

    /// Gets per-query URL counts, largest first
    fn query_stats(&self) -> StorageResult<Vec<QueryStats>>;
}

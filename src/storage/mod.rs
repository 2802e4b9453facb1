//! Storage module for persisting harvest results
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Upsert of result sites keyed by URL
//! - Query-to-URL association tracking
//! - Run ledger and statistics queries
//! - The per-run dedup index

mod dedup;
mod schema;
mod sqlite;
mod traits;

pub use dedup::{Admission, DedupIndex};
pub use sqlite::SqliteStore;
pub use traits::{StorageError, StorageResult, Store, UpsertOutcome};

use crate::HarvestError;

use std::path::Path;

/// Opens or creates a store database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_store(path: &Path) -> Result<SqliteStore, HarvestError> {
    Ok(SqliteStore::open(path)?)
}

/// Represents a row of the `sites` table
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    pub id: i64,
    pub url: String,
    pub domain: String,
    pub title: String,
    pub snippet: String,
    /// Query that first discovered the URL
    pub query: String,
    pub source_page: u32,
    pub discovered_at: String,
    pub updated_at: String,
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub query: String,
    pub config_hash: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: RunStatus,
    pub pages_requested: u32,
    pub records_found: u64,
    pub unique_count: u64,
    pub failures: u64,
}

/// Totals written to the ledger when a run finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub records_found: u64,
    pub unique_count: u64,
    pub failures: u64,
}

/// URL count for one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStats {
    pub query: String,
    pub url_count: u64,
    pub last_seen: String,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

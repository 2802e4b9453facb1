//! Statistics generation from the results database
//!
//! This module provides functionality for extracting and displaying
//! store statistics and per-run summaries.

use crate::crawler::CrawlSummary;
use crate::storage::{QueryStats, RunRecord, SiteRecord, Store};
use crate::HarvestError;

/// Store statistics summary
#[derive(Debug, Clone)]
pub struct StoreStatistics {
    /// Number of distinct result URLs
    pub total_sites: u64,

    /// Number of query/URL pairs
    pub total_associations: u64,

    /// URL counts per query, largest first
    pub queries: Vec<QueryStats>,

    /// Latest runs, newest first
    pub recent_runs: Vec<RunRecord>,

    /// Most recently updated sites
    pub recent_sites: Vec<SiteRecord>,
}

/// Loads statistics from the store
pub fn load_statistics(store: &dyn Store, limit: usize) -> Result<StoreStatistics, HarvestError> {
    Ok(StoreStatistics {
        total_sites: store.count_sites()?,
        total_associations: store.count_associations()?,
        queries: store.query_stats()?,
        recent_runs: store.recent_runs(limit)?,
        recent_sites: store.recent_sites(limit)?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Store Statistics ===\n");

    println!("Overview:");
    println!("  Unique sites: {}", stats.total_sites);
    println!("  Query/URL associations: {}", stats.total_associations);
    println!("  Queries: {}", stats.queries.len());
    println!();

    if !stats.queries.is_empty() {
        println!("Sites by Query:");
        for query in &stats.queries {
            println!(
                "  {}: {} (last seen {})",
                query.query, query.url_count, query.last_seen
            );
        }
        println!();
    }

    if !stats.recent_runs.is_empty() {
        println!("Recent Runs:");
        for run in &stats.recent_runs {
            println!(
                "  #{} [{}] '{}' pages={} found={} unique={} failures={} started {}",
                run.id,
                run.status.to_db_string(),
                run.query,
                run.pages_requested,
                run.records_found,
                run.unique_count,
                run.failures,
                run.started_at
            );
        }
        println!();
    }

    if !stats.recent_sites.is_empty() {
        println!("Recently Updated Sites:");
        for site in &stats.recent_sites {
            println!("  {} ({})", site.url, site.title);
        }
    }
}

/// Prints the summary of one run to stdout
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Harvest Summary ===\n");
    println!("Query: {}", summary.query);
    if let Some(run_id) = summary.run_id {
        println!("Run ID: {}", run_id);
    }
    if summary.interrupted {
        println!("Status: interrupted");
    }
    println!(
        "Workers: {} launched / {} requested",
        summary.workers_launched, summary.workers_requested
    );
    println!(
        "Pages: {} requested, {} succeeded ({} empty), {} failed",
        summary.pages_requested, summary.pages_succeeded, summary.pages_empty, summary.pages_failed
    );
    println!("Records found: {}", summary.records_found);
    if summary.known_urls_loaded {
        println!("Unique new records: {}", summary.unique_count);
    } else {
        println!(
            "Unique new records: at most {} (earlier results unavailable)",
            summary.unique_count
        );
    }
    if summary.store_failures > 0 {
        println!("Store failures: {}", summary.store_failures);
    }
    println!(
        "Elapsed: {:.1}s ({:.2} records/s)",
        summary.duration.as_secs_f64(),
        summary.throughput()
    );
    if let Some(path) = &summary.export_path {
        println!("Exported to: {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::ResultRecord;
    use crate::storage::SqliteStore;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_load_statistics() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("stats.db")).unwrap();
        store.create_run("rust", "hash", 5).unwrap();
        let record = ResultRecord {
            url: "https://a.example.org/".to_string(),
            title: "Title".to_string(),
            snippet: "Snippet text".to_string(),
            source_page: 1,
            discovered_at: Utc::now(),
        };
        store.save_result("rust", &record).unwrap();
        store.save_result("go", &record).unwrap();

        let stats = load_statistics(&store, 10).unwrap();

        assert_eq!(stats.total_sites, 1);
        assert_eq!(stats.total_associations, 2);
        assert_eq!(stats.queries.len(), 2);
        assert_eq!(stats.recent_runs.len(), 1);
        assert_eq!(stats.recent_sites.len(), 1);
    }
}

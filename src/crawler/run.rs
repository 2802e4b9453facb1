//! Top-level harvest run
//!
//! A [`CrawlRun`] drives the coordinator for one query, deduplicates what
//! comes back against the store and the run itself, persists it, exports
//! it, and reports the totals. Store failures are counted, never fatal.

use crate::browser::BrowserEngine;
use crate::config::Config;
use crate::crawler::coordinator::WorkerCoordinator;
use crate::crawler::extractor::ResultRecord;
use crate::crawler::pacing::Sleeper;
use crate::output::export_json;
use crate::storage::{Admission, DedupIndex, RunStatus, RunTotals, Store, UpsertOutcome};
use crate::HarvestError;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Totals of one finished run
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    /// Ledger row, if the ledger could be written
    pub run_id: Option<i64>,
    pub query: String,
    /// Final records, unique by URL, in arrival order
    pub records: Vec<ResultRecord>,
    /// Records returned by workers before deduplication
    pub records_found: usize,
    /// Records whose URL was new for this query
    pub unique_count: usize,
    /// The query's stored URLs were loaded; when false `unique_count` is
    /// an upper bound
    pub known_urls_loaded: bool,
    /// Pages after clamping to the configured ceilings
    pub pages_requested: u32,
    pub pages_succeeded: u32,
    pub pages_empty: u32,
    pub pages_failed: u32,
    pub pages_skipped: u32,
    pub workers_requested: usize,
    pub workers_launched: usize,
    pub store_failures: usize,
    pub duration: Duration,
    pub interrupted: bool,
    pub export_path: Option<PathBuf>,
}

impl CrawlSummary {
    /// Failed pages plus failed store writes
    pub fn failures(&self) -> usize {
        self.pages_failed as usize + self.store_failures
    }

    /// Records found per second of wall time
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.records_found as f64 / secs
        } else {
            0.0
        }
    }
}

/// Harvests one query at a time into a store
pub struct CrawlRun {
    config: Arc<Config>,
    config_hash: String,
    store: Arc<dyn Store>,
    coordinator: WorkerCoordinator,
}

impl CrawlRun {
    pub fn new(
        config: Arc<Config>,
        config_hash: impl Into<String>,
        store: Arc<dyn Store>,
        engine: Arc<dyn BrowserEngine>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, HarvestError> {
        let coordinator = WorkerCoordinator::new(config.clone(), engine, sleeper)?;
        Ok(Self {
            config,
            config_hash: config_hash.into(),
            store,
            coordinator,
        })
    }

    /// Token that interrupts the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.coordinator.cancellation_token()
    }

    /// Harvests `total_pages` result pages of `query` with `worker_count` workers
    ///
    /// Always returns a summary unless not a single browser could be
    /// launched, which is reported as [`HarvestError::NoWorkersLaunched`].
    pub async fn execute(
        &self,
        query: &str,
        total_pages: u32,
        worker_count: usize,
    ) -> Result<CrawlSummary, HarvestError> {
        let started = Instant::now();
        let started_at = Utc::now();
        let plan = self.coordinator.plan(total_pages, worker_count);
        let mut store_failures = 0;

        let run_id = match self
            .store
            .create_run(query, &self.config_hash, plan.total_pages)
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Could not record run in ledger: {}", e);
                store_failures += 1;
                None
            }
        };

        let (stored, known_urls_loaded) = match self.store.load_query_urls(query) {
            Ok(urls) => (urls, true),
            Err(e) => {
                tracing::warn!(
                    "Could not load known URLs for '{}', unique count will be an upper bound: {}",
                    query,
                    e
                );
                store_failures += 1;
                (Default::default(), false)
            }
        };
        let mut index = DedupIndex::new(stored);
        tracing::info!(
            "Run {} for '{}': {} URLs already known",
            run_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            query,
            index.stored_len()
        );

        let attempted = plan.workers;
        let outcome = self.coordinator.run_plan(query, plan).await;

        if attempted > 0 && outcome.workers_launched() == 0 && !outcome.interrupted {
            if let Some(id) = run_id {
                if let Err(e) = self.store.complete_run(
                    id,
                    RunStatus::Failed,
                    &RunTotals {
                        failures: outcome.plan.total_pages as u64,
                        ..Default::default()
                    },
                ) {
                    tracing::warn!("Could not close run {}: {}", id, e);
                }
            }
            return Err(HarvestError::NoWorkersLaunched { attempted });
        }

        let records_found = outcome.records.len();
        let mut records = Vec::with_capacity(records_found);
        let mut unique_count = 0;
        let mut updated = 0;

        for record in outcome.records.iter() {
            match index.admit(&record.url) {
                Admission::DuplicateInRun => continue,
                Admission::New => unique_count += 1,
                Admission::KnownFromStore => {}
            }

            match self.store.save_result(query, record) {
                Ok(UpsertOutcome::Updated) => updated += 1,
                Ok(UpsertOutcome::Inserted) => {}
                Err(e) => {
                    tracing::warn!("Failed to persist {}: {}", record.url, e);
                    store_failures += 1;
                }
            }
            records.push(record.clone());
        }

        tracing::info!(
            "Persisted {} records ({} new for query, {} refreshed, {} in-run duplicates dropped)",
            records.len(),
            unique_count,
            updated,
            records_found - records.len()
        );
        if !known_urls_loaded {
            tracing::warn!(
                "Unique count {} is an upper bound, earlier results were not consulted",
                unique_count
            );
        }

        let export_path =
            match export_json(&self.config.output.results_dir, query, started_at, &records) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::error!("Failed to export results: {}", e);
                    None
                }
            };

        let summary = CrawlSummary {
            run_id,
            query: query.to_string(),
            records_found,
            unique_count,
            known_urls_loaded,
            pages_requested: outcome.plan.total_pages,
            pages_succeeded: outcome.pages_succeeded(),
            pages_empty: outcome.pages_empty(),
            pages_failed: outcome.pages_failed(),
            pages_skipped: outcome.pages_skipped(),
            workers_requested: worker_count,
            workers_launched: outcome.workers_launched(),
            store_failures,
            duration: started.elapsed(),
            interrupted: outcome.interrupted,
            export_path,
            records,
        };

        if let Some(id) = summary.run_id {
            let status = if summary.interrupted {
                RunStatus::Interrupted
            } else {
                RunStatus::Completed
            };
            let totals = RunTotals {
                records_found: summary.records_found as u64,
                unique_count: summary.unique_count as u64,
                failures: summary.failures() as u64,
            };
            if let Err(e) = self.store.complete_run(id, status, &totals) {
                tracing::warn!("Could not close run {}: {}", id, e);
            }
        }

        tracing::info!(
            "Run finished in {:.1}s: {} found, {} unique, {} failures",
            summary.duration.as_secs_f64(),
            summary.records_found,
            summary.unique_count,
            summary.failures()
        );

        Ok(summary)
    }
}

//! Worker coordinator - parallel page orchestration
//!
//! This module splits a query's page budget into contiguous ranges and runs
//! one worker per range, including:
//! - Clamping requests to the configured worker and page ceilings
//! - Bounding concurrently open browsers with a semaphore
//! - Collecting records into a shared, lock-protected results list
//! - Closing every browser on completion, failure or cancellation

use crate::browser::{BrowserEngine, BrowserSession};
use crate::config::{Config, LimitsConfig};
use crate::crawler::extractor::{Extractor, ResultRecord};
use crate::crawler::fetcher::{FetchOutcome, FetchPolicy, PageFetcher, PageTask};
use crate::crawler::pacing::Sleeper;
use crate::ConfigError;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Splits pages `1..=total_pages` into contiguous ranges for `workers`
///
/// Every range but the last holds `ceil(total / workers)` pages; the last
/// takes what remains. Fewer ranges than workers are returned when the
/// budget runs out early, and none for an empty budget.
///
/// # Examples
///
/// ```
/// use serp_harvester::crawler::partition_pages;
///
/// assert_eq!(partition_pages(10, 3), vec![1..=4, 5..=8, 9..=10]);
/// ```
pub fn partition_pages(total_pages: u32, workers: usize) -> Vec<RangeInclusive<u32>> {
    if total_pages == 0 || workers == 0 {
        return Vec::new();
    }

    let workers = workers.min(total_pages as usize) as u32;
    let chunk = total_pages.div_ceil(workers);

    (0..workers)
        .map(|i| i * chunk + 1)
        .take_while(|start| *start <= total_pages)
        .map(|start| start..=(start + chunk - 1).min(total_pages))
        .collect()
}

/// A request after applying the configured ceilings
///
/// `workers` is the number of ranges actually produced, which can be below
/// the requested count: ranges are `ceil(total / workers)` pages long, so
/// 4 pages over 3 workers plan two workers (`1-2`, `3-4`). Only planned
/// workers launch a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlPlan {
    pub total_pages: u32,
    pub workers: usize,
    pub ranges: Vec<RangeInclusive<u32>>,
}

impl CrawlPlan {
    /// Clamps the request to the limits and partitions it
    ///
    /// Requests above a ceiling are reduced, never rejected; every
    /// reduction is logged.
    pub fn new(limits: &LimitsConfig, total_pages: u32, worker_count: usize) -> Self {
        let mut workers = worker_count.max(1);
        if workers > limits.max_workers {
            tracing::warn!(
                "Requested {} workers, clamping to ceiling of {}",
                workers,
                limits.max_workers
            );
            workers = limits.max_workers;
        }

        let mut total = total_pages;
        if total > limits.max_total_pages {
            tracing::warn!(
                "Requested {} pages, clamping to ceiling of {}",
                total,
                limits.max_total_pages
            );
            total = limits.max_total_pages;
        }

        let per_worker_cap = limits.max_pages_per_worker.saturating_mul(workers as u32);
        if total > per_worker_cap {
            tracing::warn!(
                "{} pages exceed {} per worker across {} workers, clamping to {}",
                total,
                limits.max_pages_per_worker,
                workers,
                per_worker_cap
            );
            total = per_worker_cap;
        }

        let ranges = partition_pages(total, workers);
        if ranges.len() < workers && total > 0 {
            tracing::info!(
                "{} pages fill {} of {} requested workers",
                total,
                ranges.len(),
                workers
            );
        }
        Self {
            total_pages: total,
            workers: ranges.len(),
            ranges,
        }
    }
}

/// Records collected from every worker
///
/// The lock is held only for the append itself.
#[derive(Debug, Clone, Default)]
pub struct SharedResults {
    inner: Arc<Mutex<Vec<ResultRecord>>>,
}

impl SharedResults {
    pub fn extend(&self, records: Vec<ResultRecord>) {
        if records.is_empty() {
            return;
        }
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(records);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns everything collected so far
    pub fn drain(&self) -> Vec<ResultRecord> {
        std::mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// What one worker did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub pages: RangeInclusive<u32>,
    /// The browser came up at least once
    pub launched: bool,
    pub pages_succeeded: u32,
    /// Succeeded pages the engine reported as having no matches
    pub pages_empty: u32,
    pub pages_failed: u32,
    /// Pages never attempted because the run was cancelled
    pub pages_skipped: u32,
    pub records: usize,
    pub cancelled: bool,
}

impl WorkerReport {
    fn new(worker_id: usize, pages: RangeInclusive<u32>) -> Self {
        Self {
            worker_id,
            pages,
            launched: false,
            pages_succeeded: 0,
            pages_empty: 0,
            pages_failed: 0,
            pages_skipped: 0,
            records: 0,
            cancelled: false,
        }
    }

    fn page_count(&self) -> u32 {
        self.pages.end() - self.pages.start() + 1
    }

    fn remaining(&self) -> u32 {
        self.page_count() - self.pages_succeeded - self.pages_failed - self.pages_skipped
    }
}

/// Result of one coordinated crawl
#[derive(Debug, Clone)]
pub struct CoordinatorOutcome {
    pub plan: CrawlPlan,
    pub records: Vec<ResultRecord>,
    /// Reports of workers that ran to completion, in worker order
    pub reports: Vec<WorkerReport>,
    pub interrupted: bool,
}

impl CoordinatorOutcome {
    pub fn workers_launched(&self) -> usize {
        self.reports.iter().filter(|r| r.launched).count()
    }

    pub fn pages_succeeded(&self) -> u32 {
        self.reports.iter().map(|r| r.pages_succeeded).sum()
    }

    pub fn pages_empty(&self) -> u32 {
        self.reports.iter().map(|r| r.pages_empty).sum()
    }

    pub fn pages_skipped(&self) -> u32 {
        self.reports.iter().map(|r| r.pages_skipped).sum()
    }

    /// Failed pages, including those of workers that died without a report
    pub fn pages_failed(&self) -> u32 {
        self.plan
            .total_pages
            .saturating_sub(self.pages_succeeded() + self.pages_skipped())
    }
}

/// Everything a worker task needs, shared by reference count
#[derive(Clone)]
struct WorkerContext {
    config: Arc<Config>,
    engine: Arc<dyn BrowserEngine>,
    sleeper: Arc<dyn Sleeper>,
    extractor: Arc<Extractor>,
    policy: Arc<FetchPolicy>,
    browser: Arc<crate::config::BrowserConfig>,
    geolocations: Arc<Vec<crate::config::GeoPoint>>,
    search: Arc<crate::config::SearchConfig>,
}

/// Runs workers over a query's pages
pub struct WorkerCoordinator {
    context: WorkerContext,
    sessions: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl WorkerCoordinator {
    /// Creates a coordinator
    ///
    /// Fails if the configured selectors cannot be compiled.
    pub fn new(
        config: Arc<Config>,
        engine: Arc<dyn BrowserEngine>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, ConfigError> {
        let extractor = Extractor::new(&config.selectors, &config.extraction, &config.search)?;
        let policy = FetchPolicy::from_config(&config);
        let sessions = Arc::new(Semaphore::new(config.limits.max_workers.max(1)));

        Ok(Self {
            context: WorkerContext {
                browser: Arc::new(config.browser.clone()),
                geolocations: Arc::new(config.geolocations.clone()),
                search: Arc::new(config.search.clone()),
                extractor: Arc::new(extractor),
                policy: Arc::new(policy),
                config,
                engine,
                sleeper,
            },
            sessions,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that interrupts the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Plans the request against the configured ceilings
    pub fn plan(&self, total_pages: u32, worker_count: usize) -> CrawlPlan {
        CrawlPlan::new(&self.context.config.limits, total_pages, worker_count)
    }

    /// Fetches every planned page and returns whatever succeeded
    ///
    /// One worker's failure never stops the others. On cancellation the
    /// in-flight fetches are abandoned but every browser is still closed
    /// before this returns.
    pub async fn run(&self, query: &str, total_pages: u32, worker_count: usize) -> CoordinatorOutcome {
        self.run_plan(query, self.plan(total_pages, worker_count))
            .await
    }

    /// Runs an already clamped plan
    pub async fn run_plan(&self, query: &str, plan: CrawlPlan) -> CoordinatorOutcome {
        let results = SharedResults::default();

        tracing::info!(
            "Harvesting '{}': {} pages across {} workers",
            query,
            plan.total_pages,
            plan.workers
        );

        let mut workers = JoinSet::new();
        for (index, range) in plan.ranges.iter().enumerate() {
            let worker_id = index + 1;
            let context = self.context.clone();
            let results = results.clone();
            let cancel = self.cancel.clone();
            let sessions = self.sessions.clone();
            let query = query.to_string();
            let range = range.clone();

            workers.spawn(
                async move {
                    let _permit = tokio::select! {
                        _ = cancel.cancelled() => None,
                        permit = sessions.acquire_owned() => permit.ok(),
                    };
                    run_worker(context, worker_id, query, range, results, cancel).await
                }
                .instrument(tracing::info_span!("worker", id = worker_id)),
            );
        }

        let mut reports = Vec::with_capacity(plan.workers);
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!("Worker task ended abnormally: {}", e),
            }
        }
        reports.sort_by_key(|r| r.worker_id);

        let outcome = CoordinatorOutcome {
            records: results.drain(),
            interrupted: self.cancel.is_cancelled(),
            plan,
            reports,
        };

        tracing::info!(
            "Workers finished: {}/{} launched, {} pages succeeded, {} failed, {} records",
            outcome.workers_launched(),
            outcome.plan.workers,
            outcome.pages_succeeded(),
            outcome.pages_failed(),
            outcome.records.len()
        );

        outcome
    }
}

async fn run_worker(
    context: WorkerContext,
    worker_id: usize,
    query: String,
    pages: RangeInclusive<u32>,
    results: SharedResults,
    cancel: CancellationToken,
) -> WorkerReport {
    let mut report = WorkerReport::new(worker_id, pages.clone());

    let session = BrowserSession::new(
        worker_id,
        context.engine.clone(),
        context.browser.clone(),
        context.geolocations.clone(),
        context.sleeper.clone(),
    );
    let mut fetcher = PageFetcher::new(
        session,
        context.extractor.clone(),
        context.search.clone(),
        context.policy.clone(),
        context.sleeper.clone(),
    );

    tracing::info!("Worker {} assigned pages {}-{}", worker_id, pages.start(), pages.end());

    let opened = tokio::select! {
        _ = cancel.cancelled() => None,
        opened = fetcher.open() => Some(opened),
    };

    match opened {
        None => {
            report.cancelled = true;
            report.pages_skipped = report.remaining();
            fetcher.close().await;
            return report;
        }
        Some(Err(e)) => {
            tracing::error!("Worker {} gave up, browser never launched: {}", worker_id, e);
            report.pages_failed = report.page_count();
            fetcher.close().await;
            return report;
        }
        Some(Ok(())) => report.launched = true,
    }

    for (position, page_index) in pages.clone().enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        if position > 0 {
            let delay = context.config.fetch.request_delay.sample();
            tokio::select! {
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                _ = context.sleeper.sleep(delay) => {}
            }
        }

        let task = PageTask {
            query: query.clone(),
            page_index,
            worker_id,
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                report.cancelled = true;
                break;
            }
            outcome = fetcher.fetch(&task) => outcome,
        };

        match outcome {
            FetchOutcome::Succeeded {
                records,
                confirmed_empty,
                ..
            } => {
                report.pages_succeeded += 1;
                if confirmed_empty {
                    report.pages_empty += 1;
                }
                report.records += records.len();
                results.extend(records);
            }
            FetchOutcome::Failed { session_lost, .. } => {
                report.pages_failed += 1;
                if session_lost {
                    let abandoned = report.remaining();
                    tracing::error!(
                        "Worker {} lost its browser, abandoning {} remaining pages",
                        worker_id,
                        abandoned
                    );
                    report.pages_failed += abandoned;
                    break;
                }
            }
        }
    }

    if report.cancelled {
        report.pages_skipped = report.remaining();
        tracing::warn!(
            "Worker {} interrupted, {} pages not attempted",
            worker_id,
            report.pages_skipped
        );
    }

    fetcher.close().await;

    tracing::info!(
        "Worker {} done: {} succeeded, {} failed, {} records",
        worker_id,
        report.pages_succeeded,
        report.pages_failed,
        report.records
    );
    report
}

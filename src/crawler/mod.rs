//! Crawler module for search result harvesting
//!
//! This module contains the core harvesting logic, including:
//! - Result extraction with per-field selector fallbacks
//! - The per-page fetch and retry state machine
//! - Parallel worker coordination
//! - The top-level run with deduplication and persistence

mod coordinator;
mod extractor;
mod fetcher;
pub(crate) mod pacing;
mod run;

pub use coordinator::{
    partition_pages, CoordinatorOutcome, CrawlPlan, SharedResults, WorkerCoordinator,
    WorkerReport,
};
pub use extractor::{
    read_href, read_text, ExtractionOutcome, Extractor, FieldCandidate, FieldReader,
    ResultRecord, SkipReason, SkippedBlock,
};
pub use fetcher::{FetchOutcome, FetchPolicy, PageFetcher, PageTask};
pub use pacing::{NoDelay, Sleeper, TokioSleeper};
pub use run::{CrawlRun, CrawlSummary};

//! Page fetcher with retry state machine
//!
//! A [`PageFetcher`] owns one worker's [`BrowserSession`] and drives it
//! through `Pending -> Fetching -> {Succeeded, Retrying, Failed}` for each
//! result page. Timeouts reuse the live browser; crashes and bot walls tear
//! it down and relaunch before the next attempt.

use crate::browser::{BrowserSession, DomSnapshot};
use crate::config::{Config, DelayRange, SearchConfig};
use crate::crawler::extractor::{ExtractionOutcome, Extractor, ResultRecord};
use crate::crawler::pacing::Sleeper;
use crate::output::diagnostics_stem;
use crate::state::{ErrorKind, FetchState, RetryContext, RetryDecision};
use crate::url::search_url;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// One result page assigned to one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTask {
    pub query: String,
    /// 1-based result page
    pub page_index: u32,
    pub worker_id: usize,
}

/// Timing and retry rules for page fetches
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub page_timeout: Duration,
    /// Total attempts per page
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub pacing_delay: DelayRange,
    pub settle_delay: DelayRange,
    pub poll_interval: Duration,
    /// Selector list that marks the page as rendered (results or empty marker)
    pub readiness_probe: String,
    pub blocked_markers: Vec<String>,
    /// Where screenshots of never-rendered pages go; `None` disables capture
    pub diagnostics_dir: Option<PathBuf>,
}

impl FetchPolicy {
    pub fn from_config(config: &Config) -> Self {
        let readiness_probe = std::iter::once(config.selectors.readiness.as_str())
            .chain(config.selectors.empty_page.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            page_timeout: Duration::from_secs(config.fetch.page_timeout_secs),
            max_retries: config.fetch.max_retries,
            retry_delay: Duration::from_secs(config.fetch.retry_delay_secs),
            pacing_delay: config.fetch.pacing_delay,
            settle_delay: config.fetch.settle_delay,
            poll_interval: Duration::from_millis(config.fetch.poll_interval_ms),
            readiness_probe,
            blocked_markers: config.fetch.blocked_markers.clone(),
            diagnostics_dir: Some(config.output.diagnostics_dir.clone()),
        }
    }

    /// Returns true if the URL is a bot wall
    pub fn is_blocked(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        self.blocked_markers
            .iter()
            .any(|marker| url.contains(&marker.to_lowercase()))
    }
}

/// Final result of one page task
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Succeeded {
        records: Vec<ResultRecord>,
        /// The engine reported no matches
        confirmed_empty: bool,
        /// Result blocks that produced no record
        skipped_blocks: usize,
        attempts: u32,
    },
    Failed {
        attempts: u32,
        last_error: ErrorKind,
        /// The browser could not be relaunched; the worker cannot continue
        session_lost: bool,
    },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

struct AttemptYield {
    records: Vec<ResultRecord>,
    confirmed_empty: bool,
    skipped_blocks: usize,
}

/// Fetches result pages through one browser session
pub struct PageFetcher {
    session: BrowserSession,
    extractor: Arc<Extractor>,
    search: Arc<SearchConfig>,
    policy: Arc<FetchPolicy>,
    sleeper: Arc<dyn Sleeper>,
    /// The last page ended on a crash or bot wall with no retry left
    relaunch_pending: bool,
}

impl PageFetcher {
    pub fn new(
        session: BrowserSession,
        extractor: Arc<Extractor>,
        search: Arc<SearchConfig>,
        policy: Arc<FetchPolicy>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            session,
            extractor,
            search,
            policy,
            sleeper,
            relaunch_pending: false,
        }
    }

    pub fn session(&self) -> &BrowserSession {
        &self.session
    }

    /// Fetches one page, retrying up to the policy's budget
    ///
    /// Never returns an error: a page that cannot be fetched ends `Failed`
    /// and yields nothing.
    pub async fn fetch(&mut self, task: &PageTask) -> FetchOutcome {
        let url = match search_url(&self.search, &task.query, task.page_index) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Cannot build search URL for page {}: {}", task.page_index, e);
                return FetchOutcome::Failed {
                    attempts: 0,
                    last_error: ErrorKind::NavigationError,
                    session_lost: false,
                };
            }
        };

        // A fresh browser for this page does not count against its attempts.
        if self.relaunch_pending || !self.session.state().is_live() {
            tracing::info!(
                "Relaunching browser before page {} (session {})",
                task.page_index,
                self.session.state()
            );
            if let Err(e) = self.session.relaunch().await {
                tracing::error!(
                    "Page {} abandoned, browser could not be relaunched: {}",
                    task.page_index,
                    e
                );
                return FetchOutcome::Failed {
                    attempts: 0,
                    last_error: ErrorKind::Launch,
                    session_lost: true,
                };
            }
            self.relaunch_pending = false;
        }

        let mut state = FetchState::Pending;
        let mut retry = RetryContext::new(self.policy.max_retries, self.policy.retry_delay);
        let mut readiness_matched = false;

        loop {
            state = advance(state, FetchState::Fetching);
            let attempt = retry.begin_attempt();
            tracing::debug!(
                "Page {} attempt {}/{}",
                task.page_index,
                attempt,
                retry.max_attempts()
            );

            let kind = match self
                .attempt(url.as_str(), task.page_index, &mut readiness_matched)
                .await
            {
                Ok(found) => {
                    advance(state, FetchState::Succeeded);
                    if found.confirmed_empty {
                        tracing::info!("Page {}: no results for query", task.page_index);
                    } else {
                        tracing::info!(
                            "Page {}: {} records ({} blocks skipped, attempt {})",
                            task.page_index,
                            found.records.len(),
                            found.skipped_blocks,
                            attempt
                        );
                    }
                    return FetchOutcome::Succeeded {
                        records: found.records,
                        confirmed_empty: found.confirmed_empty,
                        skipped_blocks: found.skipped_blocks,
                        attempts: attempt,
                    };
                }
                Err(kind) => kind,
            };

            match retry.record_failure(kind) {
                RetryDecision::Retry { delay } => {
                    state = advance(state, FetchState::Retrying);
                    tracing::warn!(
                        "Page {} attempt {} failed ({}), retrying in {:?}",
                        task.page_index,
                        attempt,
                        kind,
                        delay
                    );

                    if kind.requires_relaunch() {
                        if let Err(e) = self.session.relaunch().await {
                            advance(state, FetchState::Failed);
                            tracing::error!(
                                "Page {} abandoned, browser could not be relaunched: {}",
                                task.page_index,
                                e
                            );
                            return FetchOutcome::Failed {
                                attempts: attempt,
                                last_error: ErrorKind::Launch,
                                session_lost: true,
                            };
                        }
                    }

                    self.sleeper.sleep(delay).await;
                }
                RetryDecision::Exhausted => {
                    advance(state, FetchState::Failed);
                    tracing::error!(
                        "Page {} failed after {} attempts (last error: {})",
                        task.page_index,
                        attempt,
                        kind
                    );
                    if !readiness_matched || kind == ErrorKind::Unrecognized {
                        self.capture_diagnostics(task).await;
                    }
                    if kind.requires_relaunch() {
                        self.relaunch_pending = true;
                    }
                    return FetchOutcome::Failed {
                        attempts: attempt,
                        last_error: kind,
                        session_lost: false,
                    };
                }
            }
        }
    }

    async fn attempt(
        &mut self,
        url: &str,
        page_index: u32,
        readiness_matched: &mut bool,
    ) -> Result<AttemptYield, ErrorKind> {
        self.sleeper.sleep(self.policy.pacing_delay.sample()).await;

        let landed = self
            .session
            .navigate(url, self.policy.page_timeout)
            .await
            .map_err(|e| {
                tracing::debug!("Navigation failed: {}", e);
                e.kind()
            })?;
        self.check_blocked(&landed)?;

        self.session
            .wait_for_selector(
                &self.policy.readiness_probe,
                self.policy.page_timeout,
                self.policy.poll_interval,
            )
            .await
            .map_err(|e| {
                tracing::debug!("Readiness wait failed: {}", e);
                e.kind()
            })?;
        *readiness_matched = true;

        self.sleeper.sleep(self.policy.settle_delay.sample()).await;

        let snapshot = self.session.snapshot().await.map_err(|e| e.kind())?;
        self.check_blocked(&snapshot)?;

        match self.extractor.extract(&snapshot, page_index) {
            ExtractionOutcome::Found { records, skipped } => {
                for block in &skipped {
                    tracing::debug!(
                        "Page {} block {} skipped: {:?}",
                        page_index,
                        block.position,
                        block.reason
                    );
                }
                Ok(AttemptYield {
                    records,
                    confirmed_empty: false,
                    skipped_blocks: skipped.len(),
                })
            }
            ExtractionOutcome::ConfirmedEmpty => Ok(AttemptYield {
                records: Vec::new(),
                confirmed_empty: true,
                skipped_blocks: 0,
            }),
            ExtractionOutcome::Unrecognized { blocks } => {
                tracing::warn!(
                    "Page {}: no usable result among {} blocks",
                    page_index,
                    blocks
                );
                Err(ErrorKind::Unrecognized)
            }
        }
    }

    fn check_blocked(&self, snapshot: &DomSnapshot) -> Result<(), ErrorKind> {
        if self.policy.is_blocked(&snapshot.url) {
            tracing::warn!("Bot wall detected at {}", snapshot.url);
            return Err(ErrorKind::Blocked);
        }
        Ok(())
    }

    async fn capture_diagnostics(&mut self, task: &PageTask) {
        let Some(dir) = self.policy.diagnostics_dir.clone() else {
            return;
        };
        let stem = diagnostics_stem(&task.query, task.page_index);
        match self.session.capture_diagnostics(&dir, &stem).await {
            Ok(paths) => {
                for path in paths {
                    tracing::info!("Saved diagnostic capture {}", path.display());
                }
            }
            Err(e) => tracing::warn!("Diagnostic capture for page {} failed: {}", task.page_index, e),
        }
    }

    /// Opens the underlying session
    pub async fn open(&mut self) -> Result<(), crate::browser::SessionError> {
        self.session.open().await
    }

    /// Closes the underlying session
    pub async fn close(&mut self) {
        self.session.close().await;
    }
}

fn advance(state: FetchState, next: FetchState) -> FetchState {
    match state.transition(next) {
        Ok(next) => next,
        Err(e) => {
            tracing::warn!("{}", e);
            next
        }
    }
}

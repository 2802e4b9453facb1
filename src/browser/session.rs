//! Browser session lifecycle
//!
//! A [`BrowserSession`] owns one browser process and its disposable profile
//! directory for one worker. It launches with linear backoff, applies the
//! fingerprint profile, classifies navigation failures, and releases every
//! resource on `close()` or, as a fallback, on drop.

use crate::browser::profile::{choose_geolocation, request_headers, stealth_script, LaunchProfile};
use crate::browser::{BrowserEngine, BrowserError, BrowserPage, DomSnapshot};
use crate::config::{BrowserConfig, GeoPoint};
use crate::crawler::Sleeper;
use crate::state::{BrowserSessionState, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised by a browser session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Browser failed to launch after {attempts} attempts: {message}")]
    Launch { attempts: u32, message: String },

    #[error("Navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Selector '{selector}' did not appear within {timeout:?}")]
    ReadinessTimeout { selector: String, timeout: Duration },

    #[error("Browser crashed: {0}")]
    Crashed(String),

    #[error("Session is not ready (state: {0})")]
    NotReady(BrowserSessionState),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Maps the error onto the retry classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Launch { .. } => ErrorKind::Launch,
            Self::NavigationTimeout { .. } => ErrorKind::NavigationTimeout,
            Self::Navigation { .. } | Self::Io(_) => ErrorKind::NavigationError,
            Self::ReadinessTimeout { .. } => ErrorKind::ReadinessTimeout,
            Self::Crashed(_) | Self::NotReady(_) => ErrorKind::Crashed,
        }
    }
}

/// One worker's browser
pub struct BrowserSession {
    worker_id: usize,
    engine: Arc<dyn BrowserEngine>,
    config: Arc<BrowserConfig>,
    geolocations: Arc<Vec<GeoPoint>>,
    sleeper: Arc<dyn Sleeper>,
    state: BrowserSessionState,
    page: Option<Box<dyn BrowserPage>>,
    profile_dir: Option<TempDir>,
    geolocation: Option<GeoPoint>,
    launches: u32,
}

impl BrowserSession {
    pub fn new(
        worker_id: usize,
        engine: Arc<dyn BrowserEngine>,
        config: Arc<BrowserConfig>,
        geolocations: Arc<Vec<GeoPoint>>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            worker_id,
            engine,
            config,
            geolocations,
            sleeper,
            state: BrowserSessionState::Uninitialized,
            page: None,
            profile_dir: None,
            geolocation: None,
            launches: 0,
        }
    }

    pub fn state(&self) -> BrowserSessionState {
        self.state
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Geolocation applied to the current browser, if any
    pub fn geolocation(&self) -> Option<&GeoPoint> {
        self.geolocation.as_ref()
    }

    /// Profile directory of the current browser, if any
    pub fn profile_dir(&self) -> Option<&Path> {
        self.profile_dir.as_ref().map(TempDir::path)
    }

    /// Number of successful launches over the session's lifetime
    pub fn launches(&self) -> u32 {
        self.launches
    }

    /// Launches the browser, retrying with linear backoff
    ///
    /// The wait before attempt `n + 1` is `launch_backoff_secs * n`. Calling
    /// `open()` on a live session is a no-op.
    pub async fn open(&mut self) -> Result<(), SessionError> {
        if self.state.is_live() {
            return Ok(());
        }

        let attempts = self.config.launch_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            self.state = BrowserSessionState::Launching;
            info!(worker = self.worker_id, attempt, attempts, "Launching browser");

            match self.launch_once().await {
                Ok(()) => {
                    self.state = BrowserSessionState::Ready;
                    self.launches += 1;
                    info!(
                        worker = self.worker_id,
                        location = self.geolocation.as_ref().map(|g| g.name.as_str()),
                        "Browser ready"
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        worker = self.worker_id,
                        attempt,
                        attempts,
                        "Browser launch failed: {}",
                        e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        let backoff =
                            Duration::from_secs(self.config.launch_backoff_secs * attempt as u64);
                        self.sleeper.sleep(backoff).await;
                    }
                }
            }
        }

        self.state = BrowserSessionState::Faulted;
        Err(SessionError::Launch {
            attempts,
            message: last_error,
        })
    }

    async fn launch_once(&mut self) -> Result<(), SessionError> {
        let profile_dir = tempfile::Builder::new()
            .prefix(&format!("serp-harvester-w{}-", self.worker_id))
            .tempdir()?;
        let geolocation = choose_geolocation(&self.geolocations).cloned();
        let profile = LaunchProfile::from_config(
            format!("worker-{}", self.worker_id),
            profile_dir.path().to_path_buf(),
            &self.config,
        );

        let mut page = self
            .engine
            .launch(&profile)
            .await
            .map_err(|e| launch_error(&e))?;

        if let Err(e) = apply_profile(page.as_mut(), &self.config, geolocation.as_ref()).await {
            if let Err(shutdown_err) = page.shutdown().await {
                debug!("Shutdown after failed profile setup: {}", shutdown_err);
            }
            return Err(launch_error(&e));
        }

        self.page = Some(page);
        self.profile_dir = Some(profile_dir);
        self.geolocation = geolocation;
        Ok(())
    }

    /// Navigates and captures the page as first committed
    ///
    /// A timeout leaves the session usable; a lost connection faults it.
    pub async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<DomSnapshot, SessionError> {
        self.live_page()?;
        self.state = BrowserSessionState::Navigating;
        let page = self
            .page
            .as_mut()
            .ok_or(SessionError::NotReady(self.state))?;

        let result = match tokio::time::timeout(timeout, page.navigate(url)).await {
            Err(_) => Err(SessionError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            }),
            Ok(Err(BrowserError::Timeout(_))) => Err(SessionError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            }),
            Ok(Err(BrowserError::Crashed(message))) => Err(SessionError::Crashed(message)),
            Ok(Err(e)) => Err(SessionError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Ok(Ok(())) => Ok(()),
        };

        let result = match result {
            Ok(()) => self.snapshot().await,
            Err(e) => Err(e),
        };

        self.settle_state(&result);
        result
    }

    /// Polls until the selector matches or the timeout elapses
    pub async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<(), SessionError> {
        let polls = (timeout.as_millis() / poll_interval.as_millis().max(1)).max(1);

        for poll in 0..polls {
            let page = self.live_page()?;
            match page.has_selector(selector).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(BrowserError::Crashed(message)) => {
                    self.state = BrowserSessionState::Faulted;
                    return Err(SessionError::Crashed(message));
                }
                Err(e) => debug!(selector, "Readiness probe failed: {}", e),
            }
            if poll + 1 < polls {
                self.sleeper.sleep(poll_interval).await;
            }
        }

        Err(SessionError::ReadinessTimeout {
            selector: selector.to_string(),
            timeout,
        })
    }

    /// Captures the current URL and DOM
    pub async fn snapshot(&mut self) -> Result<DomSnapshot, SessionError> {
        let page = self.live_page()?;
        let url = page.current_url().await.map_err(capture_error)?;
        let html = page.content().await.map_err(capture_error)?;
        Ok(DomSnapshot::new(url, html))
    }

    /// Writes a screenshot and the raw HTML of the current page
    ///
    /// Returns the paths written. Best effort: a failed capture of one
    /// artifact does not prevent the other.
    pub async fn capture_diagnostics(
        &mut self,
        dir: &Path,
        stem: &str,
    ) -> Result<Vec<PathBuf>, SessionError> {
        tokio::fs::create_dir_all(dir).await?;
        let page = self.live_page()?;
        let mut written = Vec::new();

        match page.screenshot().await {
            Ok(png) => {
                let path = dir.join(format!("{}.png", stem));
                tokio::fs::write(&path, png).await?;
                written.push(path);
            }
            Err(e) => warn!("Screenshot capture failed: {}", e),
        }

        match page.content().await {
            Ok(html) => {
                let path = dir.join(format!("{}.html", stem));
                tokio::fs::write(&path, html).await?;
                written.push(path);
            }
            Err(e) => warn!("HTML capture failed: {}", e),
        }

        Ok(written)
    }

    /// Tears the browser down so the next `open()` starts fresh
    pub async fn relaunch(&mut self) -> Result<(), SessionError> {
        self.close().await;
        self.open().await
    }

    /// Releases the browser process and profile directory
    ///
    /// Idempotent and safe from any state.
    pub async fn close(&mut self) {
        if let Some(mut page) = self.page.take() {
            if let Err(e) = page.shutdown().await {
                debug!(worker = self.worker_id, "Browser shutdown reported: {}", e);
            }
        }
        self.release_profile_dir();
        self.geolocation = None;
        if self.state != BrowserSessionState::Closed {
            debug!(worker = self.worker_id, "Browser session closed");
        }
        self.state = BrowserSessionState::Closed;
    }

    fn release_profile_dir(&mut self) {
        if let Some(dir) = self.profile_dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(
                    "Failed to remove profile directory {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }

    fn live_page(&mut self) -> Result<&mut Box<dyn BrowserPage>, SessionError> {
        if !self.state.is_live() {
            return Err(SessionError::NotReady(self.state));
        }
        self.page
            .as_mut()
            .ok_or(SessionError::NotReady(self.state))
    }

    fn settle_state<T>(&mut self, result: &Result<T, SessionError>) {
        self.state = match result {
            Err(SessionError::Crashed(_)) => BrowserSessionState::Faulted,
            _ => BrowserSessionState::Ready,
        };
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if self.page.is_some() {
            warn!(
                worker = self.worker_id,
                "Browser session dropped without close; killing browser"
            );
            // Engine pages kill their process on drop.
            self.page = None;
        }
        self.release_profile_dir();
    }
}

async fn apply_profile(
    page: &mut dyn BrowserPage,
    config: &BrowserConfig,
    geolocation: Option<&GeoPoint>,
) -> Result<(), BrowserError> {
    page.add_init_script(&stealth_script(config)).await?;
    page.set_user_agent(&config.user_agent, &config.accept_language, &config.platform)
        .await?;
    page.set_extra_headers(&request_headers(config)).await?;
    if let Some(point) = geolocation {
        page.set_geolocation(point).await?;
    }
    Ok(())
}

fn launch_error(e: &BrowserError) -> SessionError {
    SessionError::Launch {
        attempts: 1,
        message: e.to_string(),
    }
}

fn capture_error(e: BrowserError) -> SessionError {
    match e {
        BrowserError::Crashed(message) => SessionError::Crashed(message),
        other => SessionError::Navigation {
            url: String::new(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{PageBehavior, ScriptedEngine};
    use crate::config::Config;
    use crate::crawler::pacing::recording::RecordingSleeper;
    use crate::crawler::NoDelay;

    fn create_session(engine: Arc<ScriptedEngine>, sleeper: Arc<dyn Sleeper>) -> BrowserSession {
        let config = Config::default();
        BrowserSession::new(
            1,
            engine,
            Arc::new(config.browser),
            Arc::new(config.geolocations),
            sleeper,
        )
    }

    #[tokio::test]
    async fn test_open_applies_profile() {
        let engine = Arc::new(ScriptedEngine::new());
        let mut session = create_session(engine.clone(), Arc::new(NoDelay));

        session.open().await.unwrap();

        assert_eq!(session.state(), BrowserSessionState::Ready);
        assert!(session.geolocation().is_some());
        assert!(session.profile_dir().unwrap().exists());
        assert_eq!(engine.launch_count(), 1);
        assert_eq!(engine.init_scripts(), 1);
        session.close().await;
    }

    #[tokio::test]
    async fn test_open_retries_with_linear_backoff() {
        let engine = Arc::new(ScriptedEngine::new().fail_launches("worker-1", 2));
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut session = create_session(engine.clone(), sleeper.clone());

        session.open().await.unwrap();

        assert_eq!(engine.launch_count(), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
        session.close().await;
    }

    #[tokio::test]
    async fn test_open_gives_up_after_ceiling() {
        let engine = Arc::new(ScriptedEngine::new().fail_launches("worker-1", u32::MAX));
        let mut session = create_session(engine.clone(), Arc::new(NoDelay));

        let err = session.open().await.unwrap_err();

        assert!(matches!(err, SessionError::Launch { attempts: 3, .. }));
        assert_eq!(err.kind(), ErrorKind::Launch);
        assert_eq!(session.state(), BrowserSessionState::Faulted);
        assert_eq!(engine.launch_count(), 3);
        assert!(session.profile_dir().is_none());
    }

    #[tokio::test]
    async fn test_navigate_timeout_keeps_session() {
        let engine = Arc::new(ScriptedEngine::new().page(1, vec![PageBehavior::Timeout]));
        let mut session = create_session(engine, Arc::new(NoDelay));
        session.open().await.unwrap();

        let err = session
            .navigate(
                "https://www.google.com/search?q=x&start=0&hl=ru",
                Duration::from_secs(10),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NavigationTimeout);
        assert_eq!(session.state(), BrowserSessionState::Ready);
        session.close().await;
    }

    #[tokio::test]
    async fn test_navigate_crash_faults_session() {
        let engine = Arc::new(ScriptedEngine::new().page(1, vec![PageBehavior::Crash]));
        let mut session = create_session(engine, Arc::new(NoDelay));
        session.open().await.unwrap();

        let err = session
            .navigate(
                "https://www.google.com/search?q=x&start=0&hl=ru",
                Duration::from_secs(10),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Crashed);
        assert_eq!(session.state(), BrowserSessionState::Faulted);
        session.close().await;
    }

    #[tokio::test]
    async fn test_wait_for_selector_times_out() {
        let engine = Arc::new(ScriptedEngine::new().page(1, vec![PageBehavior::NeverReady]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut session = create_session(engine, sleeper.clone());
        session.open().await.unwrap();
        session
            .navigate(
                "https://www.google.com/search?q=x&start=0&hl=ru",
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        let err = session
            .wait_for_selector("div#search", Duration::from_secs(1), Duration::from_millis(200))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ReadinessTimeout);
        assert_eq!(sleeper.delays().len(), 4);
        session.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let engine = Arc::new(ScriptedEngine::new());
        let mut session = create_session(engine.clone(), Arc::new(NoDelay));
        session.open().await.unwrap();
        let dir = session.profile_dir().unwrap().to_path_buf();

        session.close().await;
        session.close().await;

        assert_eq!(session.state(), BrowserSessionState::Closed);
        assert!(!dir.exists());
        assert_eq!(engine.shutdown_count(), 1);
    }

    #[tokio::test]
    async fn test_close_before_open() {
        let engine = Arc::new(ScriptedEngine::new());
        let mut session = create_session(engine, Arc::new(NoDelay));
        session.close().await;
        assert_eq!(session.state(), BrowserSessionState::Closed);
    }

    #[tokio::test]
    async fn test_drop_removes_profile_dir() {
        let engine = Arc::new(ScriptedEngine::new());
        let mut session = create_session(engine, Arc::new(NoDelay));
        session.open().await.unwrap();
        let dir = session.profile_dir().unwrap().to_path_buf();

        drop(session);

        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_navigate_requires_open() {
        let engine = Arc::new(ScriptedEngine::new());
        let mut session = create_session(engine, Arc::new(NoDelay));
        let err = session
            .navigate("https://example.com/", Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_relaunch_starts_fresh_profile() {
        let engine = Arc::new(ScriptedEngine::new());
        let mut session = create_session(engine.clone(), Arc::new(NoDelay));
        session.open().await.unwrap();
        let first = session.profile_dir().unwrap().to_path_buf();

        session.relaunch().await.unwrap();

        assert_ne!(session.profile_dir().unwrap(), first.as_path());
        assert!(!first.exists());
        assert_eq!(session.launches(), 2);
        session.close().await;
    }

    #[tokio::test]
    async fn test_capture_diagnostics_writes_files() {
        let engine = Arc::new(ScriptedEngine::new().page(1, vec![PageBehavior::NeverReady]));
        let mut session = create_session(engine, Arc::new(NoDelay));
        session.open().await.unwrap();
        session
            .navigate(
                "https://www.google.com/search?q=x&start=0&hl=ru",
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        let out = tempfile::tempdir().unwrap();

        let written = session
            .capture_diagnostics(out.path(), "x_page1")
            .await
            .unwrap();

        assert_eq!(written.len(), 2);
        assert!(out.path().join("x_page1.png").exists());
        assert!(out.path().join("x_page1.html").exists());
        session.close().await;
    }
}

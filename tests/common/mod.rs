//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serp_harvester::browser::{BrowserEngine, BrowserError, BrowserPage, LaunchProfile};
use serp_harvester::config::{Config, GeoPoint};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Builds a results page with one block per `(title, href, snippet)`
pub fn results_page(results: &[(&str, &str, &str)]) -> String {
    let blocks: String = results
        .iter()
        .map(|(title, href, snippet)| {
            format!(
                "<div class=\"g\"><div class=\"yuRUbf\"><a href=\"{}\"><h3>{}</h3></a></div>\
                 <div class=\"VwiC3b\">{}</div></div>",
                href, title, snippet
            )
        })
        .collect();
    format!(
        "<html><body><div id=\"search\"><div id=\"rso\">{}</div></div></body></html>",
        blocks
    )
}

/// Default page `n`: three results unique to the page
pub fn numbered_page(page_index: u32) -> String {
    let entries: Vec<(String, String)> = (1..=3)
        .map(|i| {
            (
                format!("Result {} of page {}", i, page_index),
                format!("https://site{}-{}.example.net/", page_index, i),
            )
        })
        .collect();
    let results: Vec<(&str, &str, &str)> = entries
        .iter()
        .map(|(t, h)| (t.as_str(), h.as_str(), "Snippet describing this result"))
        .collect();
    results_page(&results)
}

/// In-process search engine that serves canned result pages
#[derive(Clone, Default)]
pub struct FakeSearchEngine {
    pages: Arc<Mutex<HashMap<u32, String>>>,
    broken_workers: Arc<Mutex<HashSet<String>>>,
    launches: Arc<AtomicUsize>,
    open_browsers: Arc<AtomicUsize>,
    visited: Arc<Mutex<Vec<u32>>>,
}

impl FakeSearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `html` for page `page_index` instead of the numbered default
    pub fn with_page(self, page_index: u32, html: String) -> Self {
        self.pages.lock().unwrap().insert(page_index, html);
        self
    }

    /// Makes every launch for the worker fail
    pub fn with_broken_worker(self, worker_id: usize) -> Self {
        self.broken_workers
            .lock()
            .unwrap()
            .insert(format!("worker-{}", worker_id));
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Browsers launched and not yet shut down
    pub fn open_browsers(&self) -> usize {
        self.open_browsers.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<u32> {
        self.visited.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserEngine for FakeSearchEngine {
    async fn launch(&self, profile: &LaunchProfile) -> Result<Box<dyn BrowserPage>, BrowserError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.broken_workers.lock().unwrap().contains(&profile.label) {
            return Err(BrowserError::Launch("chrome exited with status 1".to_string()));
        }
        self.open_browsers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTab {
            engine: self.clone(),
            url: "about:blank".to_string(),
            html: String::new(),
            closed: false,
        }))
    }
}

struct FakeTab {
    engine: FakeSearchEngine,
    url: String,
    html: String,
    closed: bool,
}

impl FakeTab {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.engine.open_browsers.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeTab {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl BrowserPage for FakeTab {
    async fn add_init_script(&mut self, _source: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn set_user_agent(
        &mut self,
        _user_agent: &str,
        _accept_language: &str,
        _platform: &str,
    ) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn set_extra_headers(
        &mut self,
        _headers: &BTreeMap<String, String>,
    ) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn set_geolocation(&mut self, _point: &GeoPoint) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let start: u32 = url::Url::parse(url)
            .map_err(|e| BrowserError::Protocol(e.to_string()))?
            .query_pairs()
            .find(|(k, _)| k == "start")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0);
        let page_index = start / 10 + 1;
        self.engine.visited.lock().unwrap().push(page_index);

        self.url = url.to_string();
        self.html = self
            .engine
            .pages
            .lock()
            .unwrap()
            .get(&page_index)
            .cloned()
            .unwrap_or_else(|| numbered_page(page_index));
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        Ok(self.url.clone())
    }

    async fn has_selector(&mut self, selector: &str) -> Result<bool, BrowserError> {
        let selector = scraper::Selector::parse(selector)
            .map_err(|e| BrowserError::Protocol(format!("{:?}", e)))?;
        Ok(scraper::Html::parse_document(&self.html)
            .select(&selector)
            .next()
            .is_some())
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        Ok(self.html.clone())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        Ok(Vec::new())
    }

    async fn shutdown(&mut self) -> Result<(), BrowserError> {
        self.release();
        Ok(())
    }
}

/// Creates a test configuration whose outputs all live under `dir`
pub fn create_test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.output.database_path = dir.join("results.db");
    config.output.results_dir = dir.join("results");
    config.output.diagnostics_dir = dir.join("diagnostics");
    config
}

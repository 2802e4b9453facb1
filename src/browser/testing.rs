//! Scripted in-process browser for unit tests

use crate::browser::{BrowserEngine, BrowserError, BrowserPage, LaunchProfile};
use crate::config::GeoPoint;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

/// What the fake browser does when a result page is requested
#[derive(Debug, Clone)]
pub enum PageBehavior {
    /// Renders the given HTML
    Serve(String),
    /// Navigation times out
    Timeout,
    /// The browser connection drops during navigation
    Crash,
    /// Renders a page that never shows the results container
    NeverReady,
    /// Redirects to a bot wall
    Blocked,
}

/// One result block in generated markup; `None` omits the element
#[derive(Debug, Clone)]
pub struct FakeResult {
    pub title: Option<String>,
    pub href: Option<String>,
    pub snippet: Option<String>,
}

impl FakeResult {
    pub fn new(title: &str, href: &str, snippet: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            href: Some(href.to_string()),
            snippet: Some(snippet.to_string()),
        }
    }
}

/// Builds search-results markup shaped like the live engine's
pub fn serp_html(results: &[FakeResult]) -> String {
    let blocks: String = results
        .iter()
        .map(|r| {
            let title = r
                .title
                .as_ref()
                .map(|t| format!("<h3>{}</h3>", t))
                .unwrap_or_default();
            let heading = match &r.href {
                Some(href) => format!("<div class=\"yuRUbf\"><a href=\"{}\">{}</a></div>", href, title),
                None => format!("<div class=\"yuRUbf\">{}</div>", title),
            };
            let snippet = r
                .snippet
                .as_ref()
                .map(|s| format!("<div class=\"VwiC3b\">{}</div>", s))
                .unwrap_or_default();
            format!("<div class=\"g\">{}{}</div>", heading, snippet)
        })
        .collect();

    format!(
        "<html><body><div id=\"search\"><div id=\"rso\">{}</div></div></body></html>",
        blocks
    )
}

/// Markup for a page the engine reports as having no matches
pub fn empty_serp_html() -> String {
    "<html><body><div id=\"search\"></div>\
     <div id=\"topstuff\"><div class=\"card-section\">No results found</div></div>\
     </body></html>"
        .to_string()
}

/// Default markup for page `n`: two valid results with page-unique URLs
pub fn default_page_html(page_index: u32) -> String {
    serp_html(&[
        FakeResult::new(
            &format!("Result A on page {}", page_index),
            &format!("https://a{}.example.org/", page_index),
            "A long enough snippet for page results",
        ),
        FakeResult::new(
            &format!("Result B on page {}", page_index),
            &format!("https://b{}.example.org/", page_index),
            "Another long enough snippet for page results",
        ),
    ])
}

#[derive(Default)]
struct Shared {
    behaviors: Mutex<HashMap<u32, VecDeque<PageBehavior>>>,
    launch_failures: Mutex<HashMap<String, u32>>,
    launches: AtomicU32,
    navigations: AtomicU32,
    shutdowns: AtomicU32,
    init_scripts: AtomicU32,
    visited: Mutex<Vec<u32>>,
    profile_dirs: Mutex<Vec<PathBuf>>,
}

impl Shared {
    fn next_behavior(&self, page_index: u32) -> PageBehavior {
        let mut behaviors = self.behaviors.lock().unwrap();
        match behaviors.get_mut(&page_index) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => PageBehavior::Serve(default_page_html(page_index)),
        }
    }
}

/// Engine whose pages follow a per-page script
///
/// Each page index maps to a queue of behaviors, one per attempt; the last
/// behavior repeats. Unscripted pages serve [`default_page_html`].
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    shared: Arc<Shared>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, page_index: u32, behaviors: Vec<PageBehavior>) -> Self {
        self.shared
            .behaviors
            .lock()
            .unwrap()
            .insert(page_index, behaviors.into());
        self
    }

    /// Makes the next `count` launches for `label` fail; `u32::MAX` fails forever
    pub fn fail_launches(self, label: &str, count: u32) -> Self {
        self.shared
            .launch_failures
            .lock()
            .unwrap()
            .insert(label.to_string(), count);
        self
    }

    pub fn launch_count(&self) -> u32 {
        self.shared.launches.load(Ordering::SeqCst)
    }

    pub fn navigation_count(&self) -> u32 {
        self.shared.navigations.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> u32 {
        self.shared.shutdowns.load(Ordering::SeqCst)
    }

    pub fn init_scripts(&self) -> u32 {
        self.shared.init_scripts.load(Ordering::SeqCst)
    }

    /// Page indices in navigation order
    pub fn visited(&self) -> Vec<u32> {
        self.shared.visited.lock().unwrap().clone()
    }

    /// Profile directories handed to successful launches
    pub fn profile_dirs(&self) -> Vec<PathBuf> {
        self.shared.profile_dirs.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserEngine for ScriptedEngine {
    async fn launch(&self, profile: &LaunchProfile) -> Result<Box<dyn BrowserPage>, BrowserError> {
        self.shared.launches.fetch_add(1, Ordering::SeqCst);

        {
            let mut failures = self.shared.launch_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&profile.label) {
                if *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    return Err(BrowserError::Launch(format!(
                        "scripted launch failure for {}",
                        profile.label
                    )));
                }
            }
        }

        self.shared
            .profile_dirs
            .lock()
            .unwrap()
            .push(profile.profile_dir.clone());

        Ok(Box::new(FakePage {
            shared: self.shared.clone(),
            url: "about:blank".to_string(),
            html: "<html><body></body></html>".to_string(),
        }))
    }
}

struct FakePage {
    shared: Arc<Shared>,
    url: String,
    html: String,
}

fn page_index_of(url: &str) -> u32 {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "start")
                .and_then(|(_, v)| v.parse::<u32>().ok())
        })
        .map(|start| start / 10 + 1)
        .unwrap_or(0)
}

fn count_matches(html: &str, selector: &str) -> Result<usize, BrowserError> {
    let selector =
        Selector::parse(selector).map_err(|e| BrowserError::Protocol(format!("{:?}", e)))?;
    Ok(Html::parse_document(html).select(&selector).count())
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn add_init_script(&mut self, _source: &str) -> Result<(), BrowserError> {
        self.shared.init_scripts.fetch_add(1, Ordering::SeqCst);
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
        self.shared.navigations.fetch_add(1, Ordering::SeqCst);
        let page_index = page_index_of(url);
        self.shared.visited.lock().unwrap().push(page_index);

        match self.shared.next_behavior(page_index) {
            PageBehavior::Serve(html) => {
                self.url = url.to_string();
                self.html = html;
                Ok(())
            }
            PageBehavior::NeverReady => {
                self.url = url.to_string();
                self.html = "<html><body><div id=\"main\">Loading</div></body></html>".to_string();
                Ok(())
            }
            PageBehavior::Blocked => {
                self.url = "https://www.google.com/sorry/index?continue=x".to_string();
                self.html = "<html><body><form id=\"captcha-form\"></form></body></html>".to_string();
                Ok(())
            }
            PageBehavior::Timeout => Err(BrowserError::Timeout(url.to_string())),
            PageBehavior::Crash => Err(BrowserError::Crashed("websocket closed".to_string())),
        }
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        Ok(self.url.clone())
    }

    async fn has_selector(&mut self, selector: &str) -> Result<bool, BrowserError> {
        Ok(count_matches(&self.html, selector)? > 0)
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        Ok(self.html.clone())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        Ok(b"\x89PNG scripted".to_vec())
    }

    async fn shutdown(&mut self) -> Result<(), BrowserError> {
        self.shared.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

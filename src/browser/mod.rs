//! Browser module
//!
//! The crawler talks to browsers only through the [`BrowserEngine`] and
//! [`BrowserPage`] traits. [`ChromiumEngine`] drives Chrome over the
//! DevTools protocol; [`BrowserSession`] layers lifecycle, fingerprint
//! setup and failure classification on top of any engine.

mod chromium;
mod profile;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use chromium::ChromiumEngine;
pub use profile::{choose_geolocation, request_headers, stealth_script, LaunchProfile};
pub use session::{BrowserSession, SessionError};

use crate::config::GeoPoint;
use async_trait::async_trait;
use scraper::Html;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors reported by a browser engine
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Browser request timed out: {0}")]
    Timeout(String),

    #[error("Browser connection lost: {0}")]
    Crashed(String),

    #[error("Browser protocol error: {0}")]
    Protocol(String),
}

/// A rendered page captured at one instant
#[derive(Debug, Clone)]
pub struct DomSnapshot {
    /// URL the browser ended up on (after redirects)
    pub url: String,
    pub html: String,
}

impl DomSnapshot {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    /// Parses the captured HTML
    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

/// Launches browser instances
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Starts a browser for the profile and returns its single page
    async fn launch(&self, profile: &LaunchProfile) -> Result<Box<dyn BrowserPage>, BrowserError>;
}

/// The one page a session drives
#[async_trait]
pub trait BrowserPage: Send {
    /// Registers a script that runs before any page script on every document
    async fn add_init_script(&mut self, source: &str) -> Result<(), BrowserError>;

    async fn set_user_agent(
        &mut self,
        user_agent: &str,
        accept_language: &str,
        platform: &str,
    ) -> Result<(), BrowserError>;

    async fn set_extra_headers(
        &mut self,
        headers: &BTreeMap<String, String>,
    ) -> Result<(), BrowserError>;

    async fn set_geolocation(&mut self, point: &GeoPoint) -> Result<(), BrowserError>;

    /// Navigates and waits for the load to commit
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    async fn current_url(&mut self) -> Result<String, BrowserError>;

    /// Returns true if at least one element matches the CSS selector
    async fn has_selector(&mut self, selector: &str) -> Result<bool, BrowserError>;

    /// Serialized DOM of the current document
    async fn content(&mut self) -> Result<String, BrowserError>;

    /// Full-page PNG capture
    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError>;

    /// Closes the browser and waits for the process to exit
    async fn shutdown(&mut self) -> Result<(), BrowserError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Selector;

    #[test]
    fn test_snapshot_document_parses() {
        let snapshot = DomSnapshot::new(
            "https://www.google.com/search?q=x",
            "<html><body><div id=\"search\"><h3>Hi</h3></div></body></html>",
        );
        let document = snapshot.document();
        let selector = Selector::parse("div#search h3").unwrap();
        assert_eq!(document.select(&selector).count(), 1);
    }
}

//! Result extraction with selector fallbacks
//!
//! Each field (title, link, snippet) is resolved through an ordered list of
//! candidates. A candidate is a CSS selector paired with a reader function;
//! the first candidate that matches an element and reads a non-empty value
//! wins. Blocks that cannot produce a valid record are skipped, never fatal.

use crate::browser::DomSnapshot;
use crate::config::{ExtractionConfig, SearchConfig, SelectorConfig};
use crate::url::{classify_link, normalize_url, unwrap_redirect, LinkClass};
use crate::ConfigError;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::fmt;
use url::Url;

/// One search result
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    /// Normalized target URL; the unique key
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// 1-based result page the record came from
    pub source_page: u32,
    pub discovered_at: DateTime<Utc>,
}

/// Reads a field value out of a matched element
pub type FieldReader = for<'a> fn(ElementRef<'a>) -> Option<String>;

/// A selector and how to read the element it matches
#[derive(Clone)]
pub struct FieldCandidate {
    pub source: String,
    pub selector: Selector,
    pub read: FieldReader,
}

impl fmt::Debug for FieldCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCandidate")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl FieldCandidate {
    pub fn new(source: &str, read: FieldReader) -> Result<Self, ConfigError> {
        Ok(Self {
            source: source.to_string(),
            selector: parse_selector(source)?,
            read,
        })
    }

    fn resolve(&self, block: ElementRef<'_>) -> Option<String> {
        block
            .select(&self.selector)
            .find_map(|element| (self.read)(element).filter(|v| !v.is_empty()))
    }
}

/// Visible text with whitespace collapsed
pub fn read_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed)
}

/// Raw `href` attribute
pub fn read_href(element: ElementRef<'_>) -> Option<String> {
    element.value().attr("href").map(|h| h.trim().to_string())
}

/// Why a result block produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    MissingTitle,
    MissingLink,
    /// The link is not an absolute HTTP(S) URL
    InvalidLink,
    /// The link points back into the search engine
    SearchEngineLink,
    ExcludedDomain,
    TitleTooShort,
    SnippetTooShort,
    /// An earlier block on the same page already yielded this URL
    DuplicateUrl,
}

/// A skipped block and its position on the page (0-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBlock {
    pub position: usize,
    pub reason: SkipReason,
}

/// What a page yielded
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// At least one record
    Found {
        records: Vec<ResultRecord>,
        skipped: Vec<SkippedBlock>,
    },
    /// The engine explicitly reports no matches for the query
    ConfirmedEmpty,
    /// No usable result block; the markup is not understood
    Unrecognized { blocks: usize },
}

/// Compiled extraction rules
#[derive(Debug, Clone)]
pub struct Extractor {
    blocks: Vec<Selector>,
    title: Vec<FieldCandidate>,
    link: Vec<FieldCandidate>,
    snippet: Vec<FieldCandidate>,
    empty_markers: Vec<Selector>,
    rules: ExtractionConfig,
    search_host: String,
}

impl Extractor {
    /// Compiles the configured selector lists
    pub fn new(
        selectors: &SelectorConfig,
        rules: &ExtractionConfig,
        search: &SearchConfig,
    ) -> Result<Self, ConfigError> {
        let search_host = Url::parse(&search.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .ok_or_else(|| ConfigError::InvalidUrl(search.base_url.clone()))?;

        Ok(Self {
            blocks: parse_all(&selectors.result_blocks)?,
            title: candidates(&selectors.title, read_text)?,
            link: candidates(&selectors.link, read_href)?,
            snippet: candidates(&selectors.snippet, read_text)?,
            empty_markers: parse_all(&selectors.empty_page)?,
            rules: rules.clone(),
            search_host,
        })
    }

    /// Extracts records from a rendered result page
    pub fn extract(&self, snapshot: &DomSnapshot, page_index: u32) -> ExtractionOutcome {
        let document = snapshot.document();
        let base = Url::parse(&snapshot.url).ok();

        let blocks: Vec<ElementRef<'_>> = self
            .blocks
            .iter()
            .map(|selector| document.select(selector).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
            .unwrap_or_default();

        let mut records = Vec::new();
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();

        for (position, block) in blocks.iter().enumerate() {
            match self.extract_block(*block, base.as_ref(), page_index) {
                Ok(record) => {
                    if seen.insert(record.url.clone()) {
                        records.push(record);
                    } else {
                        skipped.push(SkippedBlock {
                            position,
                            reason: SkipReason::DuplicateUrl,
                        });
                    }
                }
                Err(reason) => skipped.push(SkippedBlock { position, reason }),
            }
        }

        if !records.is_empty() {
            ExtractionOutcome::Found { records, skipped }
        } else if self.is_confirmed_empty(&document) {
            ExtractionOutcome::ConfirmedEmpty
        } else {
            ExtractionOutcome::Unrecognized {
                blocks: blocks.len(),
            }
        }
    }

    fn extract_block(
        &self,
        block: ElementRef<'_>,
        base: Option<&Url>,
        page_index: u32,
    ) -> Result<ResultRecord, SkipReason> {
        let title = first_match(&self.title, block).ok_or(SkipReason::MissingTitle)?;
        let href = first_match(&self.link, block).ok_or(SkipReason::MissingLink)?;
        let url = self.resolve_link(&href, base)?;

        if title.chars().count() < self.rules.min_title_length {
            return Err(SkipReason::TitleTooShort);
        }

        let snippet = first_match(&self.snippet, block).unwrap_or_default();
        if snippet.chars().count() < self.rules.min_snippet_length {
            return Err(SkipReason::SnippetTooShort);
        }

        Ok(ResultRecord {
            url,
            title,
            snippet,
            source_page: page_index,
            discovered_at: Utc::now(),
        })
    }

    fn resolve_link(&self, href: &str, base: Option<&Url>) -> Result<String, SkipReason> {
        let joined = match base {
            Some(base) => base.join(href),
            None => Url::parse(href),
        }
        .map_err(|_| SkipReason::InvalidLink)?;

        let target = unwrap_redirect(joined, &self.search_host);
        let url = normalize_url(target.as_str()).map_err(|_| SkipReason::InvalidLink)?;

        match classify_link(&url, &self.search_host, &self.rules) {
            LinkClass::External => Ok(url.to_string()),
            LinkClass::SearchEngine => Err(SkipReason::SearchEngineLink),
            LinkClass::Excluded => Err(SkipReason::ExcludedDomain),
        }
    }

    fn is_confirmed_empty(&self, document: &Html) -> bool {
        self.empty_markers
            .iter()
            .any(|marker| document.select(marker).next().is_some())
    }
}

fn first_match(candidates: &[FieldCandidate], block: ElementRef<'_>) -> Option<String> {
    candidates.iter().find_map(|c| c.resolve(block))
}

fn parse_selector(source: &str) -> Result<Selector, ConfigError> {
    Selector::parse(source)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", source, e)))
}

fn parse_all(sources: &[String]) -> Result<Vec<Selector>, ConfigError> {
    sources.iter().map(|s| parse_selector(s)).collect()
}

fn candidates(sources: &[String], read: FieldReader) -> Result<Vec<FieldCandidate>, ConfigError> {
    sources.iter().map(|s| FieldCandidate::new(s, read)).collect()
}

//! URL handling module for Serp-Harvester
//!
//! This module provides search URL construction, result link normalization,
//! redirect unwrapping, and link classification.

mod domain;
mod matcher;
mod normalize;

use crate::config::{ExtractionConfig, SearchConfig};
use crate::UrlError;
use url::Url;

// Re-export main functions
pub use domain::{extract_domain, strip_www};
pub use matcher::{matches_any, matches_domain};
pub use normalize::{normalize_url, unwrap_redirect};

/// Builds the search URL for one result page (1-based)
///
/// # Examples
///
/// ```
/// use serp_harvester::config::SearchConfig;
/// use serp_harvester::url::search_url;
///
/// let url = search_url(&SearchConfig::default(), "rust crawler", 3).unwrap();
/// assert_eq!(
///     url.as_str(),
///     "https://www.google.com/search?q=rust+crawler&start=20&hl=ru"
/// );
/// ```
pub fn search_url(config: &SearchConfig, query: &str, page_index: u32) -> Result<Url, UrlError> {
    let mut url = Url::parse(&config.base_url).map_err(|e| UrlError::Parse(e.to_string()))?;
    let start = page_index.saturating_sub(1) * config.results_per_page;

    url.query_pairs_mut()
        .append_pair("q", query)
        .append_pair("start", &start.to_string())
        .append_pair("hl", &config.language);

    Ok(url)
}

/// Classification of a link found in a result block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkClass {
    /// An external page; eligible for recording
    External,
    /// A link back into the search engine itself
    SearchEngine,
    /// A domain from the exclusion list
    Excluded,
}

/// Classifies a (redirect-unwrapped) result link
///
/// The search engine's own host, with any `www.` stripped, is checked first
/// and covers its subdomains. The exclusion list is checked next.
pub fn classify_link(url: &Url, search_host: &str, rules: &ExtractionConfig) -> LinkClass {
    let Some(domain) = extract_domain(url) else {
        return LinkClass::SearchEngine;
    };

    if matches_domain(strip_www(search_host), &domain) {
        return LinkClass::SearchEngine;
    }

    if matches_any(&rules.exclude_domains, &domain) {
        return LinkClass::Excluded;
    }

    LinkClass::External
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_rules() -> ExtractionConfig {
        ExtractionConfig {
            min_title_length: 3,
            min_snippet_length: 10,
            exclude_domains: vec!["youtube.com".to_string(), "*.wikipedia.org".to_string()],
        }
    }

    fn classify(link: &str) -> LinkClass {
        classify_link(&Url::parse(link).unwrap(), "www.google.com", &create_test_rules())
    }

    #[test]
    fn test_search_url_first_page() {
        let url = search_url(&SearchConfig::default(), "кофе", 1).unwrap();
        assert_eq!(url.host_str(), Some("www.google.com"));
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("q".to_string(), "кофе".to_string()),
                ("start".to_string(), "0".to_string()),
                ("hl".to_string(), "ru".to_string()),
            ]
        );
    }

    #[test]
    fn test_search_url_offset() {
        let config = SearchConfig {
            results_per_page: 20,
            ..SearchConfig::default()
        };
        let url = search_url(&config, "q", 4).unwrap();
        assert!(url.as_str().contains("start=60"));
    }

    #[test]
    fn test_classify_external() {
        assert_eq!(classify("https://example.com/page"), LinkClass::External);
    }

    #[test]
    fn test_classify_search_engine() {
        assert_eq!(classify("https://www.google.com/search?q=x"), LinkClass::SearchEngine);
        assert_eq!(classify("https://maps.google.com/"), LinkClass::SearchEngine);
    }

    #[test]
    fn test_classify_excluded() {
        assert_eq!(classify("https://www.youtube.com/watch?v=1"), LinkClass::Excluded);
        assert_eq!(classify("https://ru.wikipedia.org/wiki/X"), LinkClass::Excluded);
    }
}

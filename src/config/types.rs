use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for Serp-Harvester
///
/// Every section is optional in the TOML file; missing keys fall back to the
/// built-in rule set.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,

    /// City coordinates a session picks its geolocation override from
    #[serde(rename = "geolocation")]
    pub geolocations: Vec<GeoPoint>,

    pub search: SearchConfig,
    pub selectors: SelectorConfig,
    pub fetch: FetchConfig,
    pub extraction: ExtractionConfig,
    pub limits: LimitsConfig,
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            geolocations: default_geolocations(),
            search: SearchConfig::default(),
            selectors: SelectorConfig::default(),
            fetch: FetchConfig::default(),
            extraction: ExtractionConfig::default(),
            limits: LimitsConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Browser launch and fingerprint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BrowserConfig {
    /// Run without a visible window
    pub headless: bool,

    /// Explicit Chrome/Chromium binary; autodetected when absent
    pub executable: Option<PathBuf>,

    /// Extra command-line flags passed to the browser process
    pub args: Vec<String>,

    pub user_agent: String,
    pub accept_language: String,

    /// Value reported as `navigator.platform`
    pub platform: String,

    /// Values reported as `navigator.languages`
    pub languages: Vec<String>,

    pub window_width: u32,
    pub window_height: u32,

    /// Extra HTTP headers sent with every request
    pub headers: BTreeMap<String, String>,

    /// Launch attempts before a worker slot is given up
    pub launch_attempts: u32,

    /// Base of the linear launch backoff (seconds)
    pub launch_backoff_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        let args = [
            "--no-sandbox",
            "--disable-setuid-sandbox",
            "--disable-dev-shm-usage",
            "--disable-accelerated-2d-canvas",
            "--disable-gpu",
            "--disable-web-security",
            "--disable-features=IsolateOrigins,site-per-process",
            "--disable-blink-features=AutomationControlled",
            "--disable-extensions",
            "--disable-infobars",
            "--no-first-run",
            "--no-default-browser-check",
        ];

        let headers = [
            (
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
            ("Accept-Encoding", "gzip, deflate, br"),
            ("Upgrade-Insecure-Requests", "1"),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-User", "?1"),
            ("Cache-Control", "max-age=0"),
        ];

        Self {
            headless: true,
            executable: None,
            args: args.iter().map(|a| a.to_string()).collect(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            accept_language: "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            platform: "Win32".to_string(),
            languages: ["ru-RU", "ru", "en-US", "en"]
                .iter()
                .map(|l| l.to_string())
                .collect(),
            window_width: 1920,
            window_height: 1080,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            launch_attempts: 3,
            launch_backoff_secs: 5,
        }
    }
}

/// A geolocation override target
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeoPoint {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,
}

fn default_accuracy() -> f64 {
    100.0
}

fn default_geolocations() -> Vec<GeoPoint> {
    [
        ("Moscow", 55.7558, 37.6173),
        ("Saint Petersburg", 59.9343, 30.3351),
        ("Yekaterinburg", 56.8389, 60.6057),
        ("Novosibirsk", 55.0084, 82.9357),
        ("Vladivostok", 43.1332, 131.9113),
    ]
    .iter()
    .map(|(name, latitude, longitude)| GeoPoint {
        name: name.to_string(),
        latitude: *latitude,
        longitude: *longitude,
        accuracy: default_accuracy(),
    })
    .collect()
}

/// Search endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SearchConfig {
    pub base_url: String,

    /// Results per page; drives the `start` offset
    pub results_per_page: u32,

    /// Interface language passed as `hl`
    pub language: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.google.com/search".to_string(),
            results_per_page: 10,
            language: "ru".to_string(),
        }
    }
}

/// Ordered CSS selector candidates per extracted field
///
/// Candidates are tried in order; the first match wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SelectorConfig {
    /// Selector whose presence marks the page as rendered
    pub readiness: String,

    pub result_blocks: Vec<String>,
    pub title: Vec<String>,
    pub link: Vec<String>,
    pub snippet: Vec<String>,

    /// Selectors that mark a page the engine reports as having no results
    pub empty_page: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        fn owned(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }

        Self {
            readiness: "div#search".to_string(),
            result_blocks: owned(&[
                "div.g",
                "div[data-hveid]",
                "div[data-sokoban-container]",
                "div.yuRUbf",
            ]),
            title: owned(&["h3", "h3.r", "div[role=\"heading\"]"]),
            link: owned(&["a[href^=\"http\"]", "a[href]", "a[ping]"]),
            snippet: owned(&[
                "div.VwiC3b",
                "div[style*='webkit-line-clamp']",
                "div.s",
                "[data-content-feature='1']",
                "div.kb0PBd",
            ]),
            empty_page: owned(&["div#topstuff div.card-section", "div#botstuff div.card-section"]),
        }
    }
}

/// A uniform random delay window, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn zero() -> Self {
        Self::new(0, 0)
    }
}

/// Page fetch timing and retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Navigation and readiness timeout per attempt (seconds)
    pub page_timeout_secs: u64,

    /// Total attempts per page
    pub max_retries: u32,

    /// Fixed delay between attempts (seconds)
    pub retry_delay_secs: u64,

    /// Delay before each navigation
    pub pacing_delay: DelayRange,

    /// Delay between consecutive pages of one worker
    pub request_delay: DelayRange,

    /// Delay after readiness before the DOM is captured
    pub settle_delay: DelayRange,

    /// Readiness polling interval (milliseconds)
    pub poll_interval_ms: u64,

    /// URL fragments that identify a bot wall
    pub blocked_markers: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_timeout_secs: 90,
            max_retries: 3,
            retry_delay_secs: 5,
            pacing_delay: DelayRange::new(1000, 3000),
            request_delay: DelayRange::new(2000, 4000),
            settle_delay: DelayRange::new(2000, 4000),
            poll_interval_ms: 200,
            blocked_markers: vec!["/sorry/".to_string(), "captcha".to_string()],
        }
    }
}

/// Record acceptance rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExtractionConfig {
    pub min_title_length: usize,

    /// Zero accepts records without a snippet
    pub min_snippet_length: usize,

    /// Domains whose links are never recorded (subdomains included)
    pub exclude_domains: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_title_length: 3,
            min_snippet_length: 10,
            exclude_domains: vec!["google.com".to_string(), "youtube.com".to_string()],
        }
    }
}

/// Hard resource ceilings and CLI defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LimitsConfig {
    pub max_workers: usize,
    pub max_pages_per_worker: u32,
    pub max_total_pages: u32,
    pub default_workers: usize,
    pub default_pages_per_worker: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            max_pages_per_worker: 20,
            max_total_pages: 100,
            default_workers: 2,
            default_pages_per_worker: 5,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Directory for per-run JSON exports
    pub results_dir: PathBuf,

    /// Directory for screenshots of pages that never rendered results
    pub diagnostics_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("search_results.db"),
            results_dir: PathBuf::from("results"),
            diagnostics_dir: PathBuf::from("diagnostics"),
        }
    }
}

use crate::config::types::{
    BrowserConfig, Config, DelayRange, ExtractionConfig, FetchConfig, GeoPoint, LimitsConfig,
    OutputConfig, SearchConfig, SelectorConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Shortest page timeout accepted (seconds)
const MIN_PAGE_TIMEOUT_SECS: u64 = 10;

/// Shortest inter-request delay accepted (milliseconds)
const MIN_REQUEST_DELAY_MS: u64 = 1000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_browser_config(&config.browser)?;
    validate_geolocations(&config.geolocations)?;
    validate_search_config(&config.search)?;
    validate_selectors(&config.selectors)?;
    validate_fetch_config(&config.fetch)?;
    validate_extraction_config(&config.extraction)?;
    validate_limits(&config.limits)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if config.launch_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "launch_attempts must be >= 1, got {}",
            config.launch_attempts
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.window_width == 0 || config.window_height == 0 {
        return Err(ConfigError::Validation(format!(
            "window size must be non-zero, got {}x{}",
            config.window_width, config.window_height
        )));
    }

    Ok(())
}

fn validate_geolocations(points: &[GeoPoint]) -> Result<(), ConfigError> {
    if points.is_empty() {
        return Err(ConfigError::Validation(
            "at least one geolocation is required".to_string(),
        ));
    }

    for point in points {
        if !(-90.0..=90.0).contains(&point.latitude) {
            return Err(ConfigError::Validation(format!(
                "latitude of '{}' must be within [-90, 90], got {}",
                point.name, point.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&point.longitude) {
            return Err(ConfigError::Validation(format!(
                "longitude of '{}' must be within [-180, 180], got {}",
                point.name, point.longitude
            )));
        }
        if point.accuracy <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "accuracy of '{}' must be positive, got {}",
                point.name, point.accuracy
            )));
        }
    }

    Ok(())
}

fn validate_search_config(config: &SearchConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' has no host",
            config.base_url
        )));
    }

    if config.results_per_page < 1 {
        return Err(ConfigError::Validation(
            "results_per_page must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_selectors(config: &SelectorConfig) -> Result<(), ConfigError> {
    validate_selector("readiness", &config.readiness)?;
    validate_candidates("result_blocks", &config.result_blocks, true)?;
    validate_candidates("title", &config.title, true)?;
    validate_candidates("link", &config.link, true)?;
    validate_candidates("snippet", &config.snippet, true)?;
    validate_candidates("empty_page", &config.empty_page, false)?;
    Ok(())
}

fn validate_candidates(field: &str, list: &[String], required: bool) -> Result<(), ConfigError> {
    if required && list.is_empty() {
        return Err(ConfigError::Validation(format!(
            "selector list '{}' cannot be empty",
            field
        )));
    }
    for selector in list {
        validate_selector(field, selector)?;
    }
    Ok(())
}

fn validate_selector(field: &str, selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("{} '{}': {:?}", field, selector, e)))
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.page_timeout_secs < MIN_PAGE_TIMEOUT_SECS {
        return Err(ConfigError::Validation(format!(
            "page_timeout must be >= {}s, got {}s",
            MIN_PAGE_TIMEOUT_SECS, config.page_timeout_secs
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.request_delay.min_ms < MIN_REQUEST_DELAY_MS {
        return Err(ConfigError::Validation(format!(
            "request_delay min must be >= {}ms, got {}ms",
            MIN_REQUEST_DELAY_MS, config.request_delay.min_ms
        )));
    }

    validate_range("pacing_delay", &config.pacing_delay)?;
    validate_range("request_delay", &config.request_delay)?;
    validate_range("settle_delay", &config.settle_delay)?;

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "poll_interval_ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_range(name: &str, range: &DelayRange) -> Result<(), ConfigError> {
    if range.min_ms > range.max_ms {
        return Err(ConfigError::Validation(format!(
            "{} min ({}ms) exceeds max ({}ms)",
            name, range.min_ms, range.max_ms
        )));
    }
    Ok(())
}

fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    for domain in &config.exclude_domains {
        if domain.is_empty() || domain.contains('/') || domain.contains(' ') {
            return Err(ConfigError::Validation(format!(
                "Invalid excluded domain '{}'",
                domain
            )));
        }
    }
    Ok(())
}

fn validate_limits(config: &LimitsConfig) -> Result<(), ConfigError> {
    if config.max_workers < 1 || config.max_pages_per_worker < 1 || config.max_total_pages < 1 {
        return Err(ConfigError::Validation(
            "worker and page ceilings must be >= 1".to_string(),
        ));
    }

    if config.default_workers < 1 || config.default_workers > config.max_workers {
        return Err(ConfigError::Validation(format!(
            "default_workers must be between 1 and max_workers ({}), got {}",
            config.max_workers, config.default_workers
        )));
    }

    if config.default_pages_per_worker < 1
        || config.default_pages_per_worker > config.max_pages_per_worker
    {
        return Err(ConfigError::Validation(format!(
            "default_pages_per_worker must be between 1 and max_pages_per_worker ({}), got {}",
            config.max_pages_per_worker, config.default_pages_per_worker
        )));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.results_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "results_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

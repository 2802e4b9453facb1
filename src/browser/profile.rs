use crate::config::{BrowserConfig, GeoPoint};
use rand::seq::IndexedRandom;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything an engine needs to start one browser process
#[derive(Debug, Clone)]
pub struct LaunchProfile {
    /// Identifies the owning worker in logs
    pub label: String,

    /// Fresh, disposable user data directory
    pub profile_dir: PathBuf,

    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub args: Vec<String>,
    pub window: (u32, u32),
}

impl LaunchProfile {
    pub fn from_config(label: impl Into<String>, profile_dir: PathBuf, config: &BrowserConfig) -> Self {
        Self {
            label: label.into(),
            profile_dir,
            headless: config.headless,
            executable: config.executable.clone(),
            args: config.args.clone(),
            window: (config.window_width, config.window_height),
        }
    }
}

/// Picks a geolocation uniformly at random
pub fn choose_geolocation(points: &[GeoPoint]) -> Option<&GeoPoint> {
    points.choose(&mut rand::rng())
}

/// Headers sent with every request of a session
pub fn request_headers(config: &BrowserConfig) -> BTreeMap<String, String> {
    let mut headers = config.headers.clone();
    headers.insert("Accept-Language".to_string(), config.accept_language.clone());
    headers
}

/// Script injected before any page script runs
///
/// Hides `navigator.webdriver` and makes plugins, languages and platform
/// look like a stock desktop browser.
pub fn stealth_script(config: &BrowserConfig) -> String {
    let languages = serde_json::Value::from(config.languages.clone());
    let platform = serde_json::Value::from(config.platform.clone());

    format!(
        r#"(() => {{
    Object.defineProperty(navigator, 'webdriver', {{ get: () => undefined }});
    Object.defineProperty(navigator, 'plugins', {{ get: () => [1, 2, 3, 4, 5] }});
    Object.defineProperty(navigator, 'languages', {{ get: () => {languages} }});
    Object.defineProperty(navigator, 'platform', {{ get: () => {platform} }});
    window.chrome = {{ runtime: {{}} }};
}})();"#
    )
}

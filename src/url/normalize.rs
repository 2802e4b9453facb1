use crate::url::domain::strip_www;
use crate::UrlError;
use url::Url;

/// Query parameters dropped during normalization
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "yclid", "mc_eid", "ved", "usg", "sa", "ei",
];

/// Normalizes a result URL into its deduplication key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Lowercase the host (done by the parser)
/// 3. Remove the fragment
/// 4. Remove tracking query parameters (`utm_*` and the click ids)
/// 5. Remove an empty query string
///
/// Scheme, `www.` and path are preserved: they can address different pages.
///
/// # Examples
///
/// ```
/// use serp_harvester::url::normalize_url;
///
/// let url = normalize_url("https://Example.COM/page?utm_source=x&id=7#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/page?id=7");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    Ok(url)
}

/// Resolves a search engine redirect link to its target
///
/// Links shaped like `https://<search-host>/url?q=<target>` (or `url=`) are
/// replaced with the target. Any other link is returned unchanged.
pub fn unwrap_redirect(url: Url, search_host: &str) -> Url {
    let on_search_host = url
        .host_str()
        .map(|h| strip_www(h).eq_ignore_ascii_case(strip_www(search_host)))
        .unwrap_or(false);

    if !on_search_host || url.path() != "/url" {
        return url;
    }

    url.query_pairs()
        .find(|(key, _)| key == "q" || key == "url")
        .and_then(|(_, target)| Url::parse(&target).ok())
        .unwrap_or(url)
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

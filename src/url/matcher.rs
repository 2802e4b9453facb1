/// Checks if a domain is covered by a domain pattern
///
/// Patterns cover the domain itself and all of its subdomains. A leading
/// `*.` is accepted and means the same thing.
///
/// # Examples
///
/// ```
/// use serp_harvester::url::matches_domain;
///
/// assert!(matches_domain("google.com", "google.com"));
/// assert!(matches_domain("google.com", "maps.google.com"));
/// assert!(matches_domain("*.youtube.com", "m.youtube.com"));
/// assert!(!matches_domain("google.com", "notgoogle.com"));
/// ```
pub fn matches_domain(pattern: &str, candidate: &str) -> bool {
    let base = pattern
        .strip_prefix("*.")
        .unwrap_or(pattern)
        .trim_end_matches('.')
        .to_ascii_lowercase();
    if base.is_empty() {
        return false;
    }

    let candidate = candidate.to_ascii_lowercase();
    candidate == base || candidate.ends_with(&format!(".{}", base))
}

/// Returns true if the domain is covered by any of the patterns
pub fn matches_any(patterns: &[String], candidate: &str) -> bool {
    patterns.iter().any(|p| matches_domain(p, candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches_domain("example.com", "example.com"));
        assert!(matches_domain("Example.com", "example.COM"));
    }

    #[test]
    fn test_subdomains_covered() {
        assert!(matches_domain("example.com", "blog.example.com"));
        assert!(matches_domain("example.com", "api.v2.example.com"));
    }

    #[test]
    fn test_wildcard_prefix_equivalent() {
        assert!(matches_domain("*.example.com", "example.com"));
        assert!(matches_domain("*.example.com", "blog.example.com"));
    }

    #[test]
    fn test_suffix_without_dot_boundary() {
        assert!(!matches_domain("example.com", "myexample.com"));
        assert!(!matches_domain("example.com", "example.com.evil.org"));
    }

    #[test]
    fn test_empty_pattern_matches_nothing() {
        assert!(!matches_domain("", "example.com"));
        assert!(!matches_domain("*.", "example.com"));
    }

    #[test]
    fn test_matches_any() {
        let patterns = vec!["google.com".to_string(), "youtube.com".to_string()];
        assert!(matches_any(&patterns, "www.youtube.com"));
        assert!(!matches_any(&patterns, "example.org"));
        assert!(!matches_any(&[], "example.org"));
    }
}

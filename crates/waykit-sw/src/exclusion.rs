//! Paths that must always go to the network.

use regex::Regex;
use tracing::trace;

use crate::{OfflineError, RequestIdentity};

/// Dynamic endpoints: archive submission, playback, health, version, metrics.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    r"/w$",
    r"/wayback$",
    r"/playback$",
    r"/healthcheck$",
    r"/version$",
    r"/metrics$",
];

/// Path predicate for requests that bypass the cache entirely.
///
/// Only the path component is matched; host and query string are ignored.
#[derive(Debug, Clone)]
pub struct ExclusionMatcher {
    patterns: Vec<Regex>,
}

impl ExclusionMatcher {
    /// Compile a set of path patterns.
    pub fn new<I, S>(patterns: I) -> Result<Self, OfflineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    OfflineError::Config(format!("invalid exclusion pattern {:?}: {e}", p.as_ref()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Matcher that excludes nothing.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// The first pattern matching `path`.
    pub fn matching_pattern(&self, path: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|re| re.is_match(path))
            .map(Regex::as_str)
    }

    pub fn matches_path(&self, path: &str) -> bool {
        self.matching_pattern(path).is_some()
    }

    /// Whether the request must bypass the cache. Opaque identities never do.
    pub fn is_excluded(&self, identity: &RequestIdentity) -> bool {
        let Some(path) = identity.path() else {
            return false;
        };
        match self.matching_pattern(path) {
            Some(pattern) => {
                trace!(url = %identity, pattern, "Request excluded from cache");
                true
            }
            None => false,
        }
    }
}

impl Default for ExclusionMatcher {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_EXCLUSIONS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn id(raw: &str) -> RequestIdentity {
        let origin = Url::parse("https://archive.example/").unwrap();
        RequestIdentity::parse(&origin, raw).unwrap()
    }

    #[test]
    fn test_default_endpoints_excluded() {
        let matcher = ExclusionMatcher::default();
        for path in ["/w", "/wayback", "/playback", "/healthcheck", "/version", "/metrics"] {
            assert!(matcher.matches_path(path), "{path} should be excluded");
        }
    }

    #[test]
    fn test_static_assets_not_excluded() {
        let matcher = ExclusionMatcher::default();
        for path in ["/", "/index.js", "/offline.html", "/icon/icon-192.png", "/versions.txt"] {
            assert!(!matcher.matches_path(path), "{path} should be cached");
        }
    }

    #[test]
    fn test_host_and_query_are_ignored() {
        let matcher = ExclusionMatcher::default();
        assert!(matcher.is_excluded(&id("https://other.example/metrics?format=json")));
        assert!(!matcher.is_excluded(&id("/?next=/metrics")));
    }

    #[test]
    fn test_opaque_identity_is_not_excluded() {
        let matcher = ExclusionMatcher::default();
        assert!(!matcher.is_excluded(&RequestIdentity::opaque("::/metrics")));
    }

    #[test]
    fn test_custom_patterns() {
        let matcher = ExclusionMatcher::new(["^/api/"]).unwrap();
        assert_eq!(matcher.matching_pattern("/api/items"), Some("^/api/"));
        assert!(!matcher.matches_path("/metrics"));
        assert!(!ExclusionMatcher::empty().matches_path("/metrics"));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = ExclusionMatcher::new(["(unclosed"]).unwrap_err();
        assert!(matches!(err, OfflineError::Config(_)));
    }
}

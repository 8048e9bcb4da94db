//! Error types for the offline cache.

use thiserror::Error;

/// Errors raised by a [`CacheStorage`](crate::CacheStorage) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("Entry rejected: {0}")]
    Rejected(String),

    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// Errors that can occur in offline cache operations.
#[derive(Error, Debug, Clone)]
pub enum OfflineError {
    /// One manifest entry could not be precached.
    #[error("Precache of {url} failed: {reason}")]
    PrecacheFetch { url: String, reason: String },

    /// A stale namespace could not be deleted during activation.
    #[error("Eviction of cache {namespace} failed: {source}")]
    Eviction {
        namespace: String,
        #[source]
        source: CacheError,
    },

    /// A runtime fetch failed or returned a non-ok status.
    #[error("Network error: {0}")]
    Network(String),

    /// A request URL could not be parsed.
    #[error("Malformed request URL {url:?}: {reason}")]
    MalformedIdentity { url: String, reason: String },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("State error: {0}")]
    State(String),
}

impl OfflineError {
    /// Short category name for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            OfflineError::PrecacheFetch { .. } => "precache",
            OfflineError::Eviction { .. } => "eviction",
            OfflineError::Network(_) => "network",
            OfflineError::MalformedIdentity { .. } => "malformed_identity",
            OfflineError::Cache(_) => "cache",
            OfflineError::Config(_) => "config",
            OfflineError::State(_) => "state",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_error_keeps_source() {
        let err = OfflineError::Eviction {
            namespace: "v0".into(),
            source: CacheError::Backend("locked".into()),
        };
        assert_eq!(err.category(), "eviction");
        assert!(err.to_string().contains("v0"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_cache_error_converts() {
        let err: OfflineError = CacheError::NamespaceNotFound("v1".into()).into();
        assert_eq!(err.category(), "cache");
        assert_eq!(err.to_string(), "Cache namespace not found: v1");
    }
}

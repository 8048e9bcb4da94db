//! Offline cache configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use waykit_common::RetryConfig;

use crate::exclusion::DEFAULT_EXCLUSIONS;
use crate::{ExclusionMatcher, OfflineError, PrecacheManifest, RequestIdentity};

/// Offline cache configuration.
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Origin that root-relative paths resolve against.
    pub origin: String,

    /// Current cache version, also the namespace name.
    pub version: String,

    /// Assets fetched at install time.
    pub precache: PrecacheManifest,

    /// Document served when the network fails and nothing is cached.
    pub offline_page: String,

    /// Path patterns that always go to the network.
    pub exclude: Vec<String>,

    /// Activate a freshly installed worker without waiting for old pages.
    pub skip_waiting: bool,

    /// Per-asset precache timeout in milliseconds.
    pub precache_timeout_ms: u64,

    /// Attempts per precache asset (1 = no retries).
    pub precache_attempts: u32,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost/".to_string(),
            version: "v1".to_string(),
            precache: PrecacheManifest::default(),
            offline_page: "/offline.html".to_string(),
            exclude: DEFAULT_EXCLUSIONS.iter().map(|p| p.to_string()).collect(),
            skip_waiting: true,
            precache_timeout_ms: 30_000,
            precache_attempts: 1,
        }
    }
}

impl OfflineConfig {
    /// Default configuration for another origin.
    pub fn for_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }

    /// Set the cache version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Replace the precache manifest.
    pub fn with_precache(mut self, manifest: PrecacheManifest) -> Self {
        self.precache = manifest;
        self
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, OfflineError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| OfflineError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OfflineError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| OfflineError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Check every field that can be wrong.
    pub fn validate(&self) -> Result<(), OfflineError> {
        if self.version.trim().is_empty() {
            return Err(OfflineError::Config("version must not be empty".into()));
        }

        let origin = self.origin_url()?;
        self.exclusion_matcher()?;
        self.retry_config()?;

        let offline = self.offline_identity()?;
        if !self.precache.contains(&origin, &offline) {
            return Err(OfflineError::Config(format!(
                "offline page {} is not in the precache list",
                self.offline_page
            )));
        }
        self.precache.resolve(&origin)?;

        Ok(())
    }

    /// The origin as a URL; must be http or https.
    pub fn origin_url(&self) -> Result<Url, OfflineError> {
        let url = Url::parse(&self.origin)
            .map_err(|e| OfflineError::Config(format!("invalid origin {:?}: {e}", self.origin)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(OfflineError::Config(format!(
                "origin scheme must be http or https, got {other}"
            ))),
        }
    }

    pub fn offline_identity(&self) -> Result<RequestIdentity, OfflineError> {
        RequestIdentity::parse(&self.origin_url()?, &self.offline_page)
    }

    pub fn exclusion_matcher(&self) -> Result<ExclusionMatcher, OfflineError> {
        ExclusionMatcher::new(&self.exclude)
    }

    pub fn precache_timeout(&self) -> Duration {
        Duration::from_millis(self.precache_timeout_ms)
    }

    pub fn retry_config(&self) -> Result<RetryConfig, OfflineError> {
        RetryConfig::with_attempts(self.precache_attempts)
            .map_err(|e| OfflineError::Config(format!("precache_attempts: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = OfflineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.version, "v1");
        assert!(config.skip_waiting);
        assert_eq!(config.retry_config().unwrap().max_attempts, 1);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = OfflineConfig::from_json(
            r#"{ "origin": "https://archive.example", "version": "v7" }"#,
        )
        .unwrap();
        assert_eq!(config.version, "v7");
        assert_eq!(config.offline_page, "/offline.html");
        assert_eq!(config.precache, PrecacheManifest::default());
        assert_eq!(
            config.offline_identity().unwrap().as_str(),
            "https://archive.example/offline.html"
        );
    }

    #[test]
    fn test_offline_page_must_be_precached() {
        let err = OfflineConfig::from_json(r#"{ "precache": ["/", "/index.js"] }"#).unwrap_err();
        assert!(err.to_string().contains("offline page"));
    }

    #[test]
    fn test_rejects_bad_fields() {
        let cases = [
            r#"{ "version": " " }"#,
            r#"{ "origin": "ftp://archive.example/" }"#,
            r#"{ "origin": "not a url" }"#,
            r#"{ "exclude": ["(oops"] }"#,
            r#"{ "precache_attempts": 0 }"#,
            r#"{ "skip_waiting": "yes" }"#,
        ];
        for json in cases {
            let err = OfflineConfig::from_json(json).unwrap_err();
            assert!(matches!(err, OfflineError::Config(_)), "{json}: {err}");
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "version": "v2", "precache": ["/", "/offline.html"], "skip_waiting": false }}"#
        )
        .unwrap();

        let config = OfflineConfig::load(file.path()).unwrap();
        assert_eq!(config.version, "v2");
        assert_eq!(config.precache.len(), 2);
        assert!(!config.skip_waiting);
    }

    #[test]
    fn test_load_missing_file() {
        let err = OfflineConfig::load("/nonexistent/waykit.json").unwrap_err();
        assert!(matches!(err, OfflineError::Config(_)));
    }
}

//! Canonical cache keys.

use std::fmt;

use url::Url;

use crate::OfflineError;

/// The key a response is stored under.
///
/// Parsed identities hold the absolute URL without its fragment. A request
/// whose URL does not parse gets an opaque identity keyed by the raw text; it
/// can be looked up but is never storable or excluded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestIdentity {
    key: String,
    url: Option<Url>,
}

impl RequestIdentity {
    /// Resolve `raw` (absolute or root-relative) against `origin`.
    pub fn parse(origin: &Url, raw: &str) -> Result<Self, OfflineError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(OfflineError::MalformedIdentity {
                url: raw.to_string(),
                reason: "empty URL".to_string(),
            });
        }

        let mut url = origin
            .join(trimmed)
            .map_err(|e| OfflineError::MalformedIdentity {
                url: raw.to_string(),
                reason: e.to_string(),
            })?;
        url.set_fragment(None);

        Ok(Self::from_url(url))
    }

    /// Identity for an already parsed URL.
    pub fn from_url(mut url: Url) -> Self {
        url.set_fragment(None);
        Self {
            key: url.to_string(),
            url: Some(url),
        }
    }

    /// Identity for a URL that could not be parsed.
    pub fn opaque(raw: &str) -> Self {
        Self {
            key: raw.to_string(),
            url: None,
        }
    }

    /// The cache key.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The parsed URL, `None` for opaque identities.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Path component, `None` for opaque identities.
    pub fn path(&self) -> Option<&str> {
        self.url.as_ref().map(Url::path)
    }

    /// Whether the scheme can be fetched and stored (http or https).
    pub fn is_network(&self) -> bool {
        matches!(
            self.url.as_ref().map(Url::scheme),
            Some("http") | Some("https")
        )
    }
}

impl fmt::Display for RequestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

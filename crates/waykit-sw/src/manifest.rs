//! The list of assets that must be available offline right after install.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{OfflineError, RequestIdentity};

/// Assets precached by default: the app shell, its script, the offline page
/// and the icon set.
pub const DEFAULT_PRECACHE: &[&str] = &[
    "/",
    "/index.js",
    "/offline.html",
    "/icon/favicon-16.png",
    "/icon/favicon-32.png",
    "/icon/icon-120.png",
    "/icon/icon-128.png",
    "/icon/icon-152.png",
    "/icon/icon-167.png",
    "/icon/icon-180.png",
    "/icon/icon-192.png",
];

/// Ordered list of absolute or root-relative asset URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrecacheManifest {
    entries: Vec<String>,
}

impl PrecacheManifest {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every entry against `origin`, dropping duplicate identities.
    ///
    /// Fails on the first entry that does not parse, since the list is
    /// fixed at build time.
    pub fn resolve(&self, origin: &Url) -> Result<Vec<RequestIdentity>, OfflineError> {
        let mut resolved: Vec<RequestIdentity> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let identity = RequestIdentity::parse(origin, entry)?;
            if !resolved.contains(&identity) {
                resolved.push(identity);
            }
        }
        Ok(resolved)
    }

    /// Whether `identity` is listed once resolved against `origin`.
    pub fn contains(&self, origin: &Url, identity: &RequestIdentity) -> bool {
        self.entries
            .iter()
            .filter_map(|entry| RequestIdentity::parse(origin, entry).ok())
            .any(|listed| &listed == identity)
    }
}

impl Default for PrecacheManifest {
    fn default() -> Self {
        Self::new(DEFAULT_PRECACHE.iter().copied())
    }
}

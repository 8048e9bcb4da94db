//! Activation-time eviction of stale namespaces.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{CacheStorage, OfflineError};

/// Outcome of one activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    /// The namespace kept.
    pub current: String,
    /// Namespaces deleted, in the order they were deleted.
    pub evicted: Vec<String>,
}

/// Deletes every namespace except the current version's.
pub struct ActivateController {
    storage: Arc<dyn CacheStorage>,
    version: String,
}

impl ActivateController {
    pub fn new(storage: Arc<dyn CacheStorage>, version: impl Into<String>) -> Self {
        Self {
            storage,
            version: version.into(),
        }
    }

    /// Evict stale namespaces by exact name.
    ///
    /// Every stale namespace is attempted; the first deletion failure is
    /// returned once all have been tried.
    pub async fn activate(&self) -> Result<ActivationReport, OfflineError> {
        let names = self.storage.keys().await?;
        let mut evicted = Vec::new();
        let mut first_error = None;

        for name in names.into_iter().filter(|name| *name != self.version) {
            match self.storage.delete(&name).await {
                Ok(true) => {
                    info!(namespace = %name, current = %self.version, "Evicted stale cache");
                    evicted.push(name);
                }
                Ok(false) => debug!(namespace = %name, "Stale cache already gone"),
                Err(source) => {
                    warn!(namespace = %name, error = %source, "Failed to evict stale cache");
                    first_error.get_or_insert(OfflineError::Eviction {
                        namespace: name,
                        source,
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(ActivationReport {
                current: self.version.clone(),
                evicted,
            }),
        }
    }
}

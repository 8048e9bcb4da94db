//! The offline fallback document.

use tracing::{debug, warn};

use crate::fetch::{FetchResponse, ResponseSource};
use crate::{CacheNamespace, RequestIdentity};

/// Serves the one precached document used when the network fails.
#[derive(Debug, Clone)]
pub struct OfflineFallback {
    identity: RequestIdentity,
}

impl OfflineFallback {
    pub fn new(identity: RequestIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &RequestIdentity {
        &self.identity
    }

    /// Look the document up in `namespace`.
    ///
    /// If it is missing (its precache failed) the page gets a network error.
    pub async fn serve(&self, namespace: &CacheNamespace) -> FetchResponse {
        match namespace.lookup(&self.identity).await {
            Ok(Some(stored)) => {
                debug!(url = %self.identity, namespace = namespace.name(), "Serving offline fallback");
                FetchResponse::from_stored(&stored, ResponseSource::Fallback)
            }
            Ok(None) => {
                warn!(
                    url = %self.identity,
                    namespace = namespace.name(),
                    "Offline fallback missing from cache"
                );
                FetchResponse::network_error()
            }
            Err(e) => {
                warn!(url = %self.identity, error = %e, "Offline fallback lookup failed");
                FetchResponse::network_error()
            }
        }
    }
}

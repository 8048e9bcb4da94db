//! Install-time precaching.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};
use waykit_common::{retry_with_backoff, with_timeout, RetryConfig};
use waykit_net::{Fetcher, NetError, Request, Response};

use crate::{CacheNamespace, CacheStorage, OfflineError, RequestIdentity, StoredResponse};

/// Outcome of one install.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Namespace that was populated.
    pub namespace: String,
    /// Identities stored.
    pub cached: Vec<String>,
    /// Entries that could not be precached.
    pub failed: Vec<OfflineError>,
}

impl InstallReport {
    /// Whether every manifest entry was stored.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fills the namespace of a new version from the manifest.
pub struct InstallController {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    version: String,
    assets: Vec<RequestIdentity>,
    timeout: Duration,
    retry: RetryConfig,
}

impl InstallController {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        version: impl Into<String>,
        assets: Vec<RequestIdentity>,
    ) -> Self {
        Self {
            storage,
            fetcher,
            version: version.into(),
            assets,
            timeout: Duration::from_secs(30),
            retry: RetryConfig::none(),
        }
    }

    /// Bound each asset fetch.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry policy per asset.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Open the namespace and precache every asset.
    ///
    /// Individual asset failures are recorded in the report; only failing to
    /// open the namespace is an error.
    pub async fn install(&self) -> Result<InstallReport, OfflineError> {
        let namespace = CacheNamespace::open(Arc::clone(&self.storage), &self.version).await?;
        info!(
            namespace = namespace.name(),
            assets = self.assets.len(),
            "Precaching assets"
        );

        let results = join_all(
            self.assets
                .iter()
                .map(|identity| self.precache_one(&namespace, identity)),
        )
        .await;

        let mut report = InstallReport {
            namespace: namespace.name().to_string(),
            cached: Vec::new(),
            failed: Vec::new(),
        };
        for (identity, result) in self.assets.iter().zip(results) {
            match result {
                Ok(()) => report.cached.push(identity.to_string()),
                Err(e) => {
                    warn!(url = %identity, error = %e, "Precache failed, continuing install");
                    report.failed.push(e);
                }
            }
        }

        info!(
            namespace = %report.namespace,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "Install finished"
        );
        Ok(report)
    }

    async fn precache_one(
        &self,
        namespace: &CacheNamespace,
        identity: &RequestIdentity,
    ) -> Result<(), OfflineError> {
        let failure = |reason: String| OfflineError::PrecacheFetch {
            url: identity.to_string(),
            reason,
        };

        let url = identity
            .url()
            .filter(|_| identity.is_network())
            .ok_or_else(|| failure("not a network URL".to_string()))?;

        let response = retry_with_backoff(&self.retry, || {
            let fetcher = Arc::clone(&self.fetcher);
            let request = Request::get(url.clone());
            let timeout = self.timeout;
            async move { fetch_ok(fetcher.as_ref(), request, timeout).await }
        })
        .await
        .map_err(|e| failure(e.to_string()))?;

        namespace
            .store(identity, StoredResponse::from_response(&response))
            .await
            .map_err(|e| failure(e.to_string()))
    }
}

/// One bounded fetch; a non-ok status is an error.
async fn fetch_ok(
    fetcher: &dyn Fetcher,
    request: Request,
    timeout: Duration,
) -> Result<Response, NetError> {
    let response = with_timeout(timeout, || fetcher.fetch(request))
        .await
        .map_err(|_| NetError::Timeout(timeout))??;

    if !response.ok() {
        return Err(NetError::Status(response.status));
    }
    Ok(response)
}

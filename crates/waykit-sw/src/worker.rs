//! One worker generation and its lifecycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;
use waykit_net::Fetcher;

use crate::fetch::pass_through;
use crate::{
    ActivateController, ActivationReport, CacheNamespace, CacheStorage, FetchEvent,
    FetchInterceptor, FetchResponse, InstallController, InstallReport, OfflineConfig,
    OfflineError, OfflineFallback, RequestIdentity,
};

/// Unique identifier for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Created, nothing run yet.
    #[default]
    Parsed,
    /// Installing (precaching).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (evicting stale caches).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}

/// Lifecycle notifications.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// State changed.
    StateChange {
        worker_id: WorkerId,
        version: String,
        new_state: WorkerState,
    },
    /// A new worker started installing for a scope.
    UpdateFound { scope: String },
    /// A stale namespace was deleted.
    CacheEvicted { namespace: String },
    /// The active worker of a scope changed.
    ControllerChange { worker_id: WorkerId },
}

/// A worker generation bound to one cache version.
pub struct OfflineWorker {
    id: WorkerId,
    config: OfflineConfig,
    origin: Url,
    state: RwLock<WorkerState>,
    installer: InstallController,
    activator: ActivateController,
    interceptor: FetchInterceptor,
    fetcher: Arc<dyn Fetcher>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl OfflineWorker {
    /// Build a worker from a validated configuration.
    pub fn new(
        config: OfflineConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        event_tx: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<Self, OfflineError> {
        config.validate()?;

        let origin = config.origin_url()?;
        let assets = config.precache.resolve(&origin)?;
        let installer = InstallController::new(
            Arc::clone(&storage),
            Arc::clone(&fetcher),
            config.version.clone(),
            assets,
        )
        .with_timeout(config.precache_timeout())
        .with_retry(config.retry_config()?);
        let activator = ActivateController::new(Arc::clone(&storage), config.version.clone());
        let interceptor = FetchInterceptor::new(
            origin.clone(),
            CacheNamespace::bind(storage, &config.version),
            config.exclusion_matcher()?,
            Arc::clone(&fetcher),
            OfflineFallback::new(config.offline_identity()?),
        );

        Ok(Self {
            id: WorkerId::new(),
            config,
            origin,
            state: RwLock::new(WorkerState::Parsed),
            installer,
            activator,
            interceptor,
            fetcher,
            event_tx,
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Cache version (and namespace name) of this generation.
    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub async fn is_active(&self) -> bool {
        self.state().await == WorkerState::Activated
    }

    /// Run the install handler: precache the manifest into this version's
    /// namespace. The worker ends `Installed`, or `Redundant` if the namespace
    /// could not be opened.
    pub async fn install(&self) -> Result<InstallReport, OfflineError> {
        self.transition(&[WorkerState::Parsed], WorkerState::Installing)
            .await?;

        match self.installer.install().await {
            Ok(report) => {
                self.set_state(WorkerState::Installed).await;
                Ok(report)
            }
            Err(e) => {
                warn!(version = self.version(), error = %e, "Install failed");
                self.set_state(WorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    /// Run the activate handler: evict stale namespaces. On failure the worker
    /// stays `Activating` and may be activated again.
    pub async fn activate(&self) -> Result<ActivationReport, OfflineError> {
        self.transition(
            &[WorkerState::Installed, WorkerState::Activating],
            WorkerState::Activating,
        )
        .await?;

        let report = self.activator.activate().await?;
        for namespace in &report.evicted {
            let _ = self.event_tx.send(WorkerEvent::CacheEvicted {
                namespace: namespace.clone(),
            });
        }
        self.set_state(WorkerState::Activated).await;
        Ok(report)
    }

    /// Route one request. Workers that are not active do not intercept.
    pub async fn handle_fetch(&self, event: FetchEvent) -> FetchResponse {
        if self.is_active().await {
            return self.interceptor.handle(event).await;
        }

        debug!(url = %event.url, version = self.version(), "Worker not active, passing through");
        let identity = RequestIdentity::parse(&self.origin, &event.url)
            .unwrap_or_else(|_| RequestIdentity::opaque(&event.url));
        pass_through(self.fetcher.as_ref(), &event, &identity).await
    }

    /// Mark as replaced.
    pub async fn mark_redundant(&self) {
        self.set_state(WorkerState::Redundant).await;
    }

    async fn transition(&self, from: &[WorkerState], to: WorkerState) -> Result<(), OfflineError> {
        let current = self.state().await;
        if !from.contains(&current) {
            return Err(OfflineError::State(format!(
                "cannot move worker {} from {current:?} to {to:?}",
                self.id.raw()
            )));
        }
        self.set_state(to).await;
        Ok(())
    }

    async fn set_state(&self, new_state: WorkerState) {
        {
            let mut state = self.state.write().await;
            if *state == new_state {
                return;
            }
            *state = new_state;
        }
        info!(worker = self.id.raw(), version = self.version(), state = ?new_state, "Worker state changed");
        let _ = self.event_tx.send(WorkerEvent::StateChange {
            worker_id: self.id,
            version: self.config.version.clone(),
            new_state,
        });
    }
}

impl std::fmt::Debug for OfflineWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineWorker")
            .field("id", &self.id)
            .field("version", &self.config.version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_storage, ScriptedFetcher, ORIGIN};
    use crate::{PrecacheManifest, ResponseSource};

    fn config(version: &str) -> OfflineConfig {
        OfflineConfig::for_origin(ORIGIN)
            .with_version(version)
            .with_precache(PrecacheManifest::new(["/", "/offline.html"]))
    }

    fn network() -> Arc<ScriptedFetcher> {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond("/", 200, "home");
        fetcher.respond("/offline.html", 200, "offline");
        fetcher
    }

    #[tokio::test]
    async fn test_lifecycle_states_and_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = OfflineWorker::new(config("v1"), memory_storage(), network(), tx).unwrap();
        assert_eq!(worker.state().await, WorkerState::Parsed);

        worker.install().await.unwrap();
        assert_eq!(worker.state().await, WorkerState::Installed);
        worker.activate().await.unwrap();
        assert!(worker.is_active().await);

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let WorkerEvent::StateChange { new_state, .. } = event {
                states.push(new_state);
            }
        }
        assert_eq!(
            states,
            vec![
                WorkerState::Installing,
                WorkerState::Installed,
                WorkerState::Activating,
                WorkerState::Activated
            ]
        );
    }

    #[tokio::test]
    async fn test_activate_before_install_is_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let worker = OfflineWorker::new(config("v1"), memory_storage(), network(), tx).unwrap();

        let err = worker.activate().await.unwrap_err();
        assert!(matches!(err, OfflineError::State(_)));

        worker.install().await.unwrap();
        assert!(matches!(worker.install().await, Err(OfflineError::State(_))));
    }

    #[tokio::test]
    async fn test_inactive_worker_passes_through() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let storage = memory_storage();
        let fetcher = network();
        let worker = OfflineWorker::new(config("v1"), storage.clone(), fetcher.clone(), tx).unwrap();
        worker.install().await.unwrap();

        fetcher.respond("/", 200, "fresh home");
        let response = worker.handle_fetch(FetchEvent::get("/")).await;

        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.text(), "fresh home");
        assert!(response.trace.is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let bad = config("v1").with_precache(PrecacheManifest::new(["/"]));
        let err = OfflineWorker::new(bad, memory_storage(), network(), tx).unwrap_err();
        assert!(matches!(err, OfflineError::Config(_)));
    }

    #[test]
    fn test_worker_ids_are_unique() {
        assert_ne!(WorkerId::new(), WorkerId::new());
    }
}

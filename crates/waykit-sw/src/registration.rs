//! Installing / waiting / active slots for successive worker generations.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;
use waykit_net::Fetcher;

use crate::fetch::pass_through;
use crate::{
    ActivationReport, CacheStorage, FetchEvent, FetchResponse, InstallReport, OfflineConfig,
    OfflineError, OfflineWorker, RequestIdentity, WorkerEvent, WorkerId,
};

/// Result of registering a new worker generation.
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub worker_id: WorkerId,
    pub install: InstallReport,
    /// Present when the worker was activated right away.
    pub activation: Option<ActivationReport>,
}

#[derive(Default)]
struct Slots {
    installing: Option<Arc<OfflineWorker>>,
    waiting: Option<Arc<OfflineWorker>>,
    active: Option<Arc<OfflineWorker>>,
}

/// The registration of one scope.
///
/// A new generation installs, waits, and becomes active only once its
/// activation has finished. Fetches and activation are serialized through
/// `activation_gate`: a fetch that arrives while stale namespaces are being
/// evicted waits and is then routed to the new generation.
pub struct Registration {
    scope: Url,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    slots: RwLock<Slots>,
    /// Held shared by fetches, exclusively by activation.
    activation_gate: RwLock<()>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl Registration {
    /// Create a registration and its event stream.
    pub fn new(
        scope: Url,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                scope,
                storage,
                fetcher,
                slots: RwLock::new(Slots::default()),
                activation_gate: RwLock::new(()),
                event_tx,
            },
            event_rx,
        )
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub async fn active_worker(&self) -> Option<Arc<OfflineWorker>> {
        self.slots.read().await.active.clone()
    }

    pub async fn waiting_worker(&self) -> Option<Arc<OfflineWorker>> {
        self.slots.read().await.waiting.clone()
    }

    pub async fn installing_worker(&self) -> Option<Arc<OfflineWorker>> {
        self.slots.read().await.installing.clone()
    }

    /// Install a new generation and, with `skip_waiting`, activate it.
    pub async fn register(&self, config: OfflineConfig) -> Result<RegisterOutcome, OfflineError> {
        let origin = config.origin_url()?;
        if origin.origin() != self.scope.origin() {
            return Err(OfflineError::Config(format!(
                "origin {origin} is outside scope {}",
                self.scope
            )));
        }

        let worker = Arc::new(OfflineWorker::new(
            config,
            Arc::clone(&self.storage),
            Arc::clone(&self.fetcher),
            self.event_tx.clone(),
        )?);
        info!(scope = %self.scope, version = worker.version(), "Registering worker");
        let _ = self.event_tx.send(WorkerEvent::UpdateFound {
            scope: self.scope.to_string(),
        });

        let replaced = self
            .slots
            .write()
            .await
            .installing
            .replace(Arc::clone(&worker));
        if let Some(old) = replaced {
            old.mark_redundant().await;
        }

        let install = match worker.install().await {
            Ok(report) => report,
            Err(e) => {
                self.clear_installing(&worker).await;
                return Err(e);
            }
        };

        let replaced = {
            let mut slots = self.slots.write().await;
            if slots
                .installing
                .as_ref()
                .is_some_and(|w| Arc::ptr_eq(w, &worker))
            {
                slots.installing = None;
            }
            slots.waiting.replace(Arc::clone(&worker))
        };
        if let Some(old) = replaced {
            old.mark_redundant().await;
        }

        let activation = if worker.config().skip_waiting {
            Some(self.activate_waiting().await?)
        } else {
            debug!(version = worker.version(), "Worker waiting for activation");
            None
        };

        Ok(RegisterOutcome {
            worker_id: worker.id(),
            install,
            activation,
        })
    }

    /// Promote the waiting worker, evicting stale namespaces.
    ///
    /// No fetch is routed while eviction runs. If activation fails the worker
    /// goes back to the waiting slot.
    pub async fn activate_waiting(&self) -> Result<ActivationReport, OfflineError> {
        let _gate = self.activation_gate.write().await;
        let worker = self
            .slots
            .write()
            .await
            .waiting
            .take()
            .ok_or_else(|| OfflineError::State("no waiting worker".to_string()))?;

        let report = match worker.activate().await {
            Ok(report) => report,
            Err(e) => {
                warn!(version = worker.version(), error = %e, "Activation failed");
                let mut slots = self.slots.write().await;
                if slots.waiting.is_none() {
                    slots.waiting = Some(worker);
                } else {
                    // A newer generation installed meanwhile
                    drop(slots);
                    worker.mark_redundant().await;
                }
                return Err(e);
            }
        };

        let previous = self.slots.write().await.active.replace(Arc::clone(&worker));
        if let Some(previous) = previous {
            previous.mark_redundant().await;
        }
        let _ = self.event_tx.send(WorkerEvent::ControllerChange {
            worker_id: worker.id(),
        });

        Ok(report)
    }

    /// Route a request to the active worker, or to the network if none.
    ///
    /// Waits for an activation in progress to finish first.
    pub async fn handle_fetch(&self, event: FetchEvent) -> FetchResponse {
        let _gate = self.activation_gate.read().await;
        match self.active_worker().await {
            Some(worker) => worker.handle_fetch(event).await,
            None => {
                let identity = RequestIdentity::parse(&self.scope, &event.url)
                    .unwrap_or_else(|_| RequestIdentity::opaque(&event.url));
                pass_through(self.fetcher.as_ref(), &event, &identity).await
            }
        }
    }

    /// Drop every worker. Cached namespaces are left in place.
    pub async fn unregister(&self) {
        let slots = std::mem::take(&mut *self.slots.write().await);
        for worker in [slots.installing, slots.waiting, slots.active]
            .into_iter()
            .flatten()
        {
            worker.mark_redundant().await;
        }
        info!(scope = %self.scope, "Registration removed");
    }

    async fn clear_installing(&self, worker: &Arc<OfflineWorker>) {
        let mut slots = self.slots.write().await;
        if slots
            .installing
            .as_ref()
            .is_some_and(|w| Arc::ptr_eq(w, worker))
        {
            slots.installing = None;
        }
    }
}

//! Scripted network for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hashbrown::HashMap;
use http::StatusCode;
use url::Url;
use waykit_net::{Fetcher, NetError, Request, Response};

use crate::{CacheStorage, MemoryCacheStorage};

pub(crate) const ORIGIN: &str = "https://archive.example/";

pub(crate) fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub(crate) fn abs(path: &str) -> String {
    origin().join(path).unwrap().to_string()
}

pub(crate) fn memory_storage() -> Arc<dyn CacheStorage> {
    Arc::new(MemoryCacheStorage::new())
}

#[derive(Clone)]
enum Route {
    Respond(StatusCode, String),
    Fail,
}

/// Answers from a fixed route table; unknown URLs get a 404.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, path: &str, status: u16, body: &str) {
        let status = StatusCode::from_u16(status).unwrap();
        self.routes
            .lock()
            .unwrap()
            .insert(abs(path), Route::Respond(status, body.to_string()));
    }

    pub(crate) fn fail(&self, path: &str) {
        self.routes.lock().unwrap().insert(abs(path), Route::Fail);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Hold every response for `delay` before answering.
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self, path: &str) -> usize {
        let url = abs(path);
        self.calls.lock().unwrap().iter().filter(|c| **c == url).count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        let key = request.url.to_string();
        self.calls.lock().unwrap().push(key.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::RequestFailed("network unreachable".into()));
        }

        let route = self.routes.lock().unwrap().get(&key).cloned();
        match route {
            Some(Route::Respond(status, body)) => Ok(Response::with_body(request.url, status, body)),
            Some(Route::Fail) => Err(NetError::RequestFailed(format!("connection reset: {key}"))),
            None => Ok(Response::with_body(request.url, StatusCode::NOT_FOUND, "")),
        }
    }
}

//! Shared helpers for the lifecycle tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hashbrown::HashMap;
use http::StatusCode;
use url::Url;
use waykit_common::{init_logging, LogConfig};
use waykit_net::{Fetcher, NetError, Request, Response};
use waykit_sw::{CacheStorage, MemoryCacheStorage, OfflineConfig, PrecacheManifest};

pub const ORIGIN: &str = "https://wayback.example/";

pub fn scope() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub fn url(path: &str) -> String {
    scope().join(path).unwrap().to_string()
}

pub fn setup() {
    init_logging(LogConfig::debug().with_filter("waykit_sw=debug"));
}

pub fn storage() -> Arc<dyn CacheStorage> {
    Arc::new(MemoryCacheStorage::new())
}

pub fn config(version: &str, precache: &[&str]) -> OfflineConfig {
    OfflineConfig::for_origin(ORIGIN)
        .with_version(version)
        .with_precache(PrecacheManifest::new(precache.iter().copied()))
}

/// In-memory network with a switch to go offline.
#[derive(Default)]
pub struct FakeNetwork {
    pages: Mutex<HashMap<String, (u16, String)>>,
    offline: AtomicBool,
    requests: AtomicUsize,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, path: &str, status: u16, body: &str) {
        self.serve_url(&url(path), status, body);
    }

    pub fn serve_url(&self, full_url: &str, status: u16, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(full_url.to_string(), (status, body.to_string()));
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeNetwork {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::RequestFailed("offline".into()));
        }

        let page = self.pages.lock().unwrap().get(request.url.as_str()).cloned();
        let (status, body) = page.unwrap_or((404, String::new()));
        Ok(Response::with_body(
            request.url,
            StatusCode::from_u16(status).unwrap(),
            body,
        ))
    }
}

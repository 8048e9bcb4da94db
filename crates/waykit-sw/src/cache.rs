//! Cache storage: named namespaces of request → response snapshots.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hashbrown::HashMap;
use http::HeaderMap;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use waykit_net::Response;

use crate::{CacheError, RequestIdentity};

/// Immutable snapshot of a network response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    /// Final response URL.
    pub url: String,
    pub status: u16,
    pub status_text: String,
    /// Headers exactly as received, including repeated and non-ASCII values.
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl StoredResponse {
    /// Snapshot a live response.
    pub fn from_response(response: &Response) -> Self {
        Self {
            url: response.url.to_string(),
            status: response.status.as_u16(),
            status_text: response.status_text().to_string(),
            headers: response.headers.clone(),
            body: response.body.to_vec(),
            cached_at: now_millis(),
        }
    }

    /// Body as UTF-8 text, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// One namespace.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    entries: HashMap<String, StoredResponse>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, key: &str) -> Option<&StoredResponse> {
        self.entries.get(key)
    }

    /// Insert or replace an entry.
    pub fn put(&mut self, key: &str, entry: StoredResponse) {
        self.entries.insert(key.to_string(), entry);
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Backend holding every namespace of one origin.
///
/// Each call is atomic for the key it touches. There are no cross-key
/// transactions.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a namespace, creating it if absent.
    async fn open(&self, name: &str) -> Result<(), CacheError>;

    /// Check if a namespace exists.
    async fn has(&self, name: &str) -> Result<bool, CacheError>;

    /// Delete a namespace by exact name. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// Names of all namespaces, sorted.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Look up an identity in one namespace. A missing namespace is a miss.
    async fn match_request(
        &self,
        name: &str,
        identity: &RequestIdentity,
    ) -> Result<Option<StoredResponse>, CacheError>;

    /// Store a snapshot, replacing any previous one for the identity.
    async fn put(
        &self,
        name: &str,
        identity: &RequestIdentity,
        response: StoredResponse,
    ) -> Result<(), CacheError>;

    /// Identities stored in one namespace, sorted.
    async fn entries(&self, name: &str) -> Result<Vec<String>, CacheError>;
}

/// In-process [`CacheStorage`].
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<HashMap<String, Cache>>,
}

impl MemoryCacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        let mut caches = self.caches.write().await;
        if !caches.contains_key(name) {
            debug!(namespace = name, "Creating cache namespace");
            caches.insert(name.to_string(), Cache::new(name));
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn match_request(
        &self,
        name: &str,
        identity: &RequestIdentity,
    ) -> Result<Option<StoredResponse>, CacheError> {
        let caches = self.caches.read().await;
        Ok(caches
            .get(name)
            .and_then(|cache| cache.match_request(identity.as_str()))
            .cloned())
    }

    async fn put(
        &self,
        name: &str,
        identity: &RequestIdentity,
        response: StoredResponse,
    ) -> Result<(), CacheError> {
        if !identity.is_network() {
            return Err(CacheError::Rejected(format!(
                "non-network request {identity}"
            )));
        }

        let mut caches = self.caches.write().await;
        let cache = caches
            .get_mut(name)
            .ok_or_else(|| CacheError::NamespaceNotFound(name.to_string()))?;
        trace!(namespace = name, key = %identity, status = response.status, "Storing response");
        cache.put(identity.as_str(), response);
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<String>, CacheError> {
        self.caches
            .read()
            .await
            .get(name)
            .map(Cache::keys)
            .ok_or_else(|| CacheError::NamespaceNotFound(name.to_string()))
    }
}

/// An opened namespace bound to its backend.
#[derive(Clone)]
pub struct CacheNamespace {
    storage: Arc<dyn CacheStorage>,
    name: String,
}

impl CacheNamespace {
    /// Open (or create) `name` in `storage`.
    pub async fn open(storage: Arc<dyn CacheStorage>, name: &str) -> Result<Self, CacheError> {
        storage.open(name).await?;
        Ok(Self {
            storage,
            name: name.to_string(),
        })
    }

    /// Bind to `name` without creating it. Lookups on a missing namespace miss.
    pub fn bind(storage: Arc<dyn CacheStorage>, name: &str) -> Self {
        Self {
            storage,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn lookup(
        &self,
        identity: &RequestIdentity,
    ) -> Result<Option<StoredResponse>, CacheError> {
        self.storage.match_request(&self.name, identity).await
    }

    pub async fn store(
        &self,
        identity: &RequestIdentity,
        response: StoredResponse,
    ) -> Result<(), CacheError> {
        self.storage.put(&self.name, identity, response).await
    }

    pub async fn identities(&self) -> Result<Vec<String>, CacheError> {
        self.storage.entries(&self.name).await
    }
}

impl std::fmt::Debug for CacheNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheNamespace")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

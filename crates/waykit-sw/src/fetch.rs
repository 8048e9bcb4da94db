//! Per-request routing: pass-through, cache-first, write-through, fallback.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method};
use tracing::{debug, trace, warn};
use url::Url;
use waykit_net::{Fetcher, Request, Response};

use crate::{
    CacheNamespace, ExclusionMatcher, OfflineError, OfflineFallback, RequestIdentity,
    StoredResponse,
};

/// A request intercepted from a controlled page.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    /// Request URL as the page sent it.
    pub url: String,

    /// HTTP method.
    pub method: Method,

    /// Request headers.
    pub headers: HeaderMap,

    /// Request body, if any.
    pub body: Option<Bytes>,
}

impl FetchEvent {
    /// A GET request for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// A POST request for `url` with a body.
    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::POST,
            body: Some(body.into()),
            ..Self::get(url)
        }
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Live network response.
    Network,
    /// Stored snapshot for the requested identity.
    Cache,
    /// The offline fallback document.
    Fallback,
    /// Nothing could be served.
    NetworkError,
}

/// States a request passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Excluded,
    CacheCheck,
    CacheHit,
    CacheMiss,
    NetworkFetch,
    ServedFresh,
    Fallback,
}

/// Response handed back to the page.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Status code, 0 for a network error.
    pub status: u16,

    /// Status text.
    pub status_text: String,

    /// Response headers, repeated headers kept as separate values.
    pub headers: HeaderMap,

    /// Response body.
    pub body: Vec<u8>,

    /// Where the response came from.
    pub source: ResponseSource,

    /// States visited while handling the request.
    pub trace: Vec<FetchState>,
}

impl FetchResponse {
    /// Create a network error response.
    pub fn network_error() -> Self {
        Self {
            status: 0,
            status_text: "Network Error".to_string(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            source: ResponseSource::NetworkError,
            trace: Vec::new(),
        }
    }

    /// Create a response from a stored snapshot.
    pub fn from_stored(entry: &StoredResponse, source: ResponseSource) -> Self {
        Self {
            status: entry.status,
            status_text: entry.status_text.clone(),
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            source,
            trace: Vec::new(),
        }
    }

    /// Create a response from a live network response.
    pub fn from_network(response: Response) -> Self {
        Self {
            status: response.status.as_u16(),
            status_text: response.status_text().to_string(),
            headers: response.headers,
            body: response.body.to_vec(),
            source: ResponseSource::Network,
            trace: Vec::new(),
        }
    }

    pub fn is_network_error(&self) -> bool {
        self.source == ResponseSource::NetworkError
    }

    /// Body as UTF-8 text, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn with_trace(mut self, trace: Vec<FetchState>) -> Self {
        self.trace = trace;
        self
    }
}

/// State plus the data it carries.
enum Step {
    Excluded,
    CacheCheck,
    CacheHit(StoredResponse),
    CacheMiss,
    NetworkFetch,
    ServedFresh(Response),
    Fallback,
}

impl Step {
    fn state(&self) -> FetchState {
        match self {
            Step::Excluded => FetchState::Excluded,
            Step::CacheCheck => FetchState::CacheCheck,
            Step::CacheHit(_) => FetchState::CacheHit,
            Step::CacheMiss => FetchState::CacheMiss,
            Step::NetworkFetch => FetchState::NetworkFetch,
            Step::ServedFresh(_) => FetchState::ServedFresh,
            Step::Fallback => FetchState::Fallback,
        }
    }
}

/// Routes every request of one worker generation.
pub struct FetchInterceptor {
    origin: Url,
    namespace: CacheNamespace,
    exclusions: ExclusionMatcher,
    fetcher: Arc<dyn Fetcher>,
    fallback: OfflineFallback,
}

impl FetchInterceptor {
    pub fn new(
        origin: Url,
        namespace: CacheNamespace,
        exclusions: ExclusionMatcher,
        fetcher: Arc<dyn Fetcher>,
        fallback: OfflineFallback,
    ) -> Self {
        Self {
            origin,
            namespace,
            exclusions,
            fetcher,
            fallback,
        }
    }

    pub fn namespace(&self) -> &CacheNamespace {
        &self.namespace
    }

    /// Handle one request. Never fails: the page gets the live response, a
    /// stored one, the fallback document, or a network error.
    pub async fn handle(&self, event: FetchEvent) -> FetchResponse {
        let identity = self.identify(&event);
        let mut trace = Vec::new();

        let mut step = if self.exclusions.is_excluded(&identity) {
            Step::Excluded
        } else {
            Step::CacheCheck
        };

        loop {
            trace.push(step.state());
            step = match step {
                Step::Excluded => {
                    return pass_through(self.fetcher.as_ref(), &event, &identity)
                        .await
                        .with_trace(trace);
                }
                Step::CacheCheck => match self.lookup(&event, &identity).await {
                    Some(stored) => Step::CacheHit(stored),
                    None => Step::CacheMiss,
                },
                Step::CacheHit(stored) => {
                    trace!(url = %identity, "Cache hit");
                    return FetchResponse::from_stored(&stored, ResponseSource::Cache)
                        .with_trace(trace);
                }
                Step::CacheMiss => Step::NetworkFetch,
                Step::NetworkFetch => match self.fetch_and_store(&event, &identity).await {
                    Ok(response) => Step::ServedFresh(response),
                    Err(e) => {
                        warn!(url = %identity, error = %e, "Fetch failed, serving offline fallback");
                        Step::Fallback
                    }
                },
                Step::ServedFresh(response) => {
                    return FetchResponse::from_network(response).with_trace(trace);
                }
                Step::Fallback => {
                    return self.fallback.serve(&self.namespace).await.with_trace(trace);
                }
            };
        }
    }

    /// Parse the request URL; an unparsable one continues as an opaque identity.
    fn identify(&self, event: &FetchEvent) -> RequestIdentity {
        match RequestIdentity::parse(&self.origin, &event.url) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(url = %event.url, error = %e, "Malformed request URL, using cache path");
                RequestIdentity::opaque(&event.url)
            }
        }
    }

    async fn lookup(&self, event: &FetchEvent, identity: &RequestIdentity) -> Option<StoredResponse> {
        // The cache only ever matches GET
        if event.method != Method::GET {
            return None;
        }
        match self.namespace.lookup(identity).await {
            Ok(found) => found,
            Err(e) => {
                warn!(url = %identity, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Fetch from the network and write a cacheable response through.
    ///
    /// Both run on a spawned task, so the write still lands if the page
    /// stops waiting for the response. Non-ok statuses count as failures.
    async fn fetch_and_store(
        &self,
        event: &FetchEvent,
        identity: &RequestIdentity,
    ) -> Result<Response, OfflineError> {
        let request = build_request(event, identity)?;
        let cacheable = is_cacheable(event, identity);
        let fetcher = Arc::clone(&self.fetcher);
        let namespace = self.namespace.clone();
        let identity = identity.clone();

        let task = tokio::spawn(async move {
            let response = fetcher
                .fetch(request)
                .await
                .map_err(|e| OfflineError::Network(e.to_string()))?;
            if !response.ok() {
                return Err(OfflineError::Network(format!(
                    "status {} for {identity}",
                    response.status
                )));
            }
            if cacheable {
                write_through(&namespace, &identity, &response).await;
            }
            Ok::<_, OfflineError>(response)
        });

        task.await
            .map_err(|e| OfflineError::Network(format!("fetch task failed: {e}")))?
    }
}

fn is_cacheable(event: &FetchEvent, identity: &RequestIdentity) -> bool {
    if !identity.is_network() {
        debug!(url = %identity, "Non-network scheme, serving without caching");
        return false;
    }
    if event.method != Method::GET {
        debug!(url = %identity, method = %event.method, "Non-GET request, serving without caching");
        return false;
    }
    true
}

async fn write_through(namespace: &CacheNamespace, identity: &RequestIdentity, response: &Response) {
    let snapshot = StoredResponse::from_response(response);
    match namespace.store(identity, snapshot).await {
        Ok(()) => trace!(url = %identity, namespace = namespace.name(), "Stored fresh response"),
        Err(e) => warn!(url = %identity, error = %e, "Failed to store fresh response"),
    }
}

/// Send the request straight to the network and return whatever comes back.
pub(crate) async fn pass_through(
    fetcher: &dyn Fetcher,
    event: &FetchEvent,
    identity: &RequestIdentity,
) -> FetchResponse {
    let request = match build_request(event, identity) {
        Ok(request) => request,
        Err(e) => {
            warn!(url = %identity, error = %e, "Cannot pass request through");
            return FetchResponse::network_error();
        }
    };

    match fetcher.fetch(request).await {
        Ok(response) => FetchResponse::from_network(response),
        Err(e) => {
            debug!(url = %identity, error = %e, "Pass-through fetch failed");
            FetchResponse::network_error()
        }
    }
}

fn build_request(event: &FetchEvent, identity: &RequestIdentity) -> Result<Request, OfflineError> {
    let url = identity
        .url()
        .ok_or_else(|| OfflineError::MalformedIdentity {
            url: event.url.clone(),
            reason: "cannot be fetched".to_string(),
        })?;

    let mut request = Request::new(event.method.clone(), url.clone());
    request.headers = event.headers.clone();
    request.body = event.body.clone();
    Ok(request)
}

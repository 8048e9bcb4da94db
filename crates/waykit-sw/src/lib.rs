//! # Waykit SW
//!
//! Offline resource cache controller: the part of a service worker that
//! precaches an app shell, evicts caches of older deployments and answers
//! intercepted requests cache-first.
//!
//! ## Features
//!
//! - **Precache**: fetch a fixed manifest into a versioned namespace at install
//! - **Eviction**: delete every namespace but the current version at activate
//! - **Interception**: cache-first with write-through of successful responses
//! - **Exclusion**: dynamic endpoints always go to the network
//! - **Fallback**: a precached offline page when the network fails
//!
//! ## Architecture
//!
//! ```text
//! Registration (scope)
//!     ├── installing (OfflineWorker)
//!     ├── waiting    (OfflineWorker)
//!     └── active     (OfflineWorker)
//!             ├── InstallController  → CacheStorage::open/put
//!             ├── ActivateController → CacheStorage::keys/delete
//!             └── FetchInterceptor   → CacheStorage::match/put, Fetcher
//!
//! CacheStorage (one per origin)
//!     └── namespace (= cache version)
//!             └── RequestIdentity → StoredResponse
//! ```

pub mod activate;
pub mod cache;
pub mod config;
pub mod error;
pub mod exclusion;
pub mod fallback;
pub mod fetch;
pub mod identity;
pub mod install;
pub mod manifest;
pub mod registration;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use activate::{ActivateController, ActivationReport};
pub use cache::{Cache, CacheNamespace, CacheStorage, MemoryCacheStorage, StoredResponse};
pub use config::OfflineConfig;
pub use error::{CacheError, OfflineError};
pub use exclusion::{ExclusionMatcher, DEFAULT_EXCLUSIONS};
pub use fallback::OfflineFallback;
pub use fetch::{FetchEvent, FetchInterceptor, FetchResponse, FetchState, ResponseSource};
pub use identity::RequestIdentity;
pub use install::{InstallController, InstallReport};
pub use manifest::{PrecacheManifest, DEFAULT_PRECACHE};
pub use registration::{RegisterOutcome, Registration};
pub use worker::{OfflineWorker, WorkerEvent, WorkerId, WorkerState};

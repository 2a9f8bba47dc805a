//! Offline asset cache and request interception.
//!
//! Models the installable worker as three handlers over explicit storage:
//!
//! - `on_install`: fetch every manifest asset and store them as one cache
//!   generation named by the release version (all or nothing)
//! - `on_activate`: purge every other generation and claim open client views
//! - `on_fetch`: serve GETs cache-first, fall back to the network, and when
//!   the network is down serve the cached root document as an offline shell
//!
//! Hosts own the `CacheStorage`, `ClientRegistry` and `Network` handles and
//! pass them in, so the handlers run without a browser runtime.

pub mod cache;
pub mod http;
pub mod lifecycle;
pub mod manifest;

pub use cache::{CacheError, CacheGeneration, CacheStorage};
pub use http::{HttpNetwork, Method, Network, NetworkError, Request, Response};
pub use lifecycle::{
    on_activate, on_fetch, on_install, ActivateReport, ClientId, ClientRegistry, FetchOutcome,
    InstallReport, LifecycleError, ResponseSource,
};
pub use manifest::{AssetManifest, ManifestError, ROOT_PATH};

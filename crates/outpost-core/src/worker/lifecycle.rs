//! Install, activate and fetch handlers.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::cache::{CacheGeneration, CacheStorage};
use super::http::{Network, NetworkError, Request, Response};
use super::manifest::{AssetManifest, ROOT_PATH};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Failed to fetch {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: NetworkError,
    },

    #[error("Fetching {path} returned status {status}")]
    BadStatus { path: String, status: u16 },

    #[error("Cache generation {0} has not been installed")]
    NotInstalled(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub version: String,
    pub cached: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    pub version: String,
    /// Generations deleted because they were not the current version
    pub purged: Vec<String>,
    /// Client views newly placed under the current version's control
    pub claimed: usize,
}

/// Where an intercepted response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Cached root document served because the network failed
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs the request itself.
    Passthrough,
    Respond {
        response: Response,
        source: ResponseSource,
    },
    /// Network failed and no offline shell is cached.
    NoResponse,
}

// ============================================================================
// Client Views
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

#[derive(Debug, Clone)]
struct ClientView {
    url: String,
    /// Cache version whose handlers serve this view, if any
    controller: Option<String>,
}

/// Open application views within the worker's scope.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<ClientId, ClientView>,
    next_id: u64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened view. It starts uncontrolled until a claim.
    pub fn open(&mut self, url: impl Into<String>) -> ClientId {
        self.next_id += 1;
        let id = ClientId(self.next_id);
        self.clients.insert(
            id,
            ClientView {
                url: url.into(),
                controller: None,
            },
        );
        id
    }

    pub fn close(&mut self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    /// Place every open view under `version`. Returns how many changed hands.
    pub fn claim(&mut self, version: &str) -> usize {
        let mut claimed = 0;
        for view in self.clients.values_mut() {
            if view.controller.as_deref() != Some(version) {
                view.controller = Some(version.to_string());
                claimed += 1;
            }
        }
        claimed
    }

    pub fn controller(&self, id: ClientId) -> Option<&str> {
        self.clients.get(&id).and_then(|v| v.controller.as_deref())
    }

    pub fn url(&self, id: ClientId) -> Option<&str> {
        self.clients.get(&id).map(|v| v.url.as_str())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn fetch_asset(
    network: &dyn Network,
    path: &str,
) -> Result<(Request, Response), LifecycleError> {
    let request = Request::get(path);
    let response = network
        .fetch(&request)
        .await
        .map_err(|source| LifecycleError::Fetch {
            path: path.to_string(),
            source,
        })?;

    if !response.ok() {
        return Err(LifecycleError::BadStatus {
            path: path.to_string(),
            status: response.status,
        });
    }
    Ok((request, response))
}

/// Precache every manifest asset as the generation named `version`.
///
/// Nothing is stored unless every asset fetch succeeds; on failure any
/// previously installed generation keeps serving.
pub async fn on_install(
    storage: &mut CacheStorage,
    network: &dyn Network,
    version: &str,
    manifest: &AssetManifest,
) -> Result<InstallReport, LifecycleError> {
    info!(version = version, assets = manifest.len(), "Installing asset cache");

    let fetched = try_join_all(
        manifest
            .paths()
            .iter()
            .map(|path| fetch_asset(network, path)),
    )
    .await
    .inspect_err(|e| warn!(version = version, error = %e, "Asset cache install failed"))?;

    let cached = fetched.len();
    storage.replace(version, CacheGeneration::from_entries(fetched));

    info!(version = version, cached = cached, "Asset cache installed");
    Ok(InstallReport {
        version: version.to_string(),
        cached,
    })
}

/// Delete every generation except `version` and claim all open views.
pub fn on_activate(
    storage: &mut CacheStorage,
    version: &str,
    clients: &mut ClientRegistry,
) -> Result<ActivateReport, LifecycleError> {
    if !storage.has(version) {
        return Err(LifecycleError::NotInstalled(version.to_string()));
    }

    let mut purged = Vec::new();
    for name in storage.keys() {
        if name != version && storage.delete(&name) {
            debug!(generation = %name, "Purged stale cache generation");
            purged.push(name);
        }
    }

    let claimed = clients.claim(version);
    info!(
        version = version,
        purged = purged.len(),
        claimed = claimed,
        "Asset cache activated"
    );

    Ok(ActivateReport {
        version: version.to_string(),
        purged,
        claimed,
    })
}

/// Intercept one outbound request.
///
/// Non-GET requests pass through. GETs are answered from the current
/// generation when cached, else from the network; a network failure falls
/// back to the cached root document for any kind of asset. Network responses
/// are never written to the cache.
pub async fn on_fetch(
    storage: &CacheStorage,
    version: &str,
    network: &dyn Network,
    request: &Request,
) -> FetchOutcome {
    if !request.is_get() {
        return FetchOutcome::Passthrough;
    }

    // Absolute URLs on the app origin share cache entries with their paths
    let lookup = match network.origin() {
        Some(origin) => request.relative_to(origin),
        None => request.clone(),
    };

    if let Some(response) = storage.match_in(version, &lookup) {
        debug!(url = %request.url, "Served from cache");
        return FetchOutcome::Respond {
            response: response.clone(),
            source: ResponseSource::Cache,
        };
    }

    match network.fetch(request).await {
        Ok(response) => FetchOutcome::Respond {
            response,
            source: ResponseSource::Network,
        },
        Err(e) => {
            warn!(url = %request.url, error = %e, "Network fetch failed, trying offline shell");
            match storage.match_in(version, &Request::get(ROOT_PATH)) {
                Some(shell) => FetchOutcome::Respond {
                    response: shell.clone(),
                    source: ResponseSource::Fallback,
                },
                None => FetchOutcome::NoResponse,
            }
        }
    }
}

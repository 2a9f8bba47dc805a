//! Versioned storage for precached assets.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::http::{Request, Response};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to access cache storage: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache storage: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// One named generation of cached request/response pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheGeneration {
    entries: BTreeMap<String, Response>,
}

impl CacheGeneration {
    pub fn from_entries(entries: impl IntoIterator<Item = (Request, Response)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(req, resp)| (req.cache_key().to_string(), resp))
                .collect(),
        }
    }

    pub fn match_request(&self, request: &Request) -> Option<&Response> {
        self.entries.get(request.cache_key())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All cache generations known to the host, by name.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CacheStorage {
    generations: BTreeMap<String, CacheGeneration>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load persisted storage; a missing file is an empty storage.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Persist to `path`, replacing the previous file in one rename.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, serde_json::to_vec(self)?)?;
        std::fs::rename(&staging, path)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CacheGeneration> {
        self.generations.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.generations.contains_key(name)
    }

    /// Install `generation` under `name`, replacing any previous contents.
    pub fn replace(&mut self, name: &str, generation: CacheGeneration) {
        self.generations.insert(name.to_string(), generation);
    }

    pub fn delete(&mut self, name: &str) -> bool {
        self.generations.remove(name).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.generations.keys().cloned().collect()
    }

    /// Look `request` up in the named generation only.
    pub fn match_in(&self, name: &str, request: &Request) -> Option<&Response> {
        self.get(name).and_then(|g| g.match_request(request))
    }
}

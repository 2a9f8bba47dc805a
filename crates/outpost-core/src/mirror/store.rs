use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::models::{Outing, OutingId, Roster, Snapshot, User};

use super::backend::{FileBackend, MemoryBackend, MirrorBackend};
use super::cached::CachedData;

const USER_KEY: &str = "current_user";
const OUTINGS_KEY: &str = "outings";
const ROSTER_PREFIX: &str = "roster_";

/// Outing ids are arbitrary server strings. Bytes outside `[A-Za-z0-9-]`
/// are written as `_XX` hex so the key stays a safe file name.
fn roster_key(outing_id: &OutingId) -> String {
    let mut key = String::from(ROSTER_PREFIX);
    for byte in outing_id.as_str().bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            key.push(char::from(byte));
        } else {
            key.push_str(&format!("_{:02X}", byte));
        }
    }
    key
}

fn outing_id_from_key(key: &str) -> Option<OutingId> {
    let encoded = key.strip_prefix(ROSTER_PREFIX)?.as_bytes();
    let mut bytes = Vec::with_capacity(encoded.len());
    let mut i = 0;
    while i < encoded.len() {
        if encoded[i] == b'_' {
            let hex = std::str::from_utf8(encoded.get(i + 1..i + 3)?).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            bytes.push(encoded[i]);
            i += 1;
        }
    }
    String::from_utf8(bytes).ok().map(OutingId::new)
}

/// Typed access to the mirror. Clone is cheap; clones share the backend.
#[derive(Clone)]
pub struct MirrorStore {
    backend: Arc<dyn MirrorBackend>,
}

impl MirrorStore {
    pub fn new(backend: Arc<dyn MirrorBackend>) -> Self {
        Self { backend }
    }

    /// Mirror persisted as JSON files under `dir`
    pub fn open(dir: PathBuf) -> Result<Self> {
        Ok(Self::new(Arc::new(FileBackend::new(dir)?)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    fn encode<T: Serialize>(data: &T) -> Result<String> {
        Ok(serde_json::to_string(&CachedData::new(data))?)
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedData<T>>> {
        match self.backend.get(key)? {
            Some(contents) => {
                let cached = serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse mirror entry: {}", key))?;
                Ok(Some(cached))
            }
            None => Ok(None),
        }
    }

    fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<()> {
        self.backend.put(key, &Self::encode(data)?)
    }

    // ===== Current User =====

    pub fn read_user(&self) -> Result<Option<CachedData<User>>> {
        self.load(USER_KEY)
    }

    pub fn write_user(&self, user: &User) -> Result<()> {
        self.save(USER_KEY, user)
    }

    // ===== Outings =====

    pub fn read_outings(&self) -> Result<Option<CachedData<Vec<Outing>>>> {
        self.load(OUTINGS_KEY)
    }

    pub fn write_outings(&self, outings: &[Outing]) -> Result<()> {
        self.save(OUTINGS_KEY, &outings)
    }

    // ===== Rosters =====

    pub fn read_roster(&self, outing_id: &OutingId) -> Result<Option<CachedData<Roster>>> {
        self.load(&roster_key(outing_id))
    }

    pub fn write_roster(&self, outing_id: &OutingId, roster: &Roster) -> Result<()> {
        self.save(&roster_key(outing_id), roster)
    }

    /// Outing ids that currently have a mirrored roster
    pub fn roster_ids(&self) -> Result<Vec<OutingId>> {
        Ok(self
            .backend
            .keys()?
            .iter()
            .filter_map(|k| outing_id_from_key(k))
            .collect())
    }

    // ===== Snapshot =====

    /// Overwrite the user, outing list and every roster in `snapshot`.
    ///
    /// All fragments are encoded first and committed as one batch, so a
    /// failure leaves the mirror as it was. Rosters for outings absent from
    /// the snapshot are kept.
    pub fn apply_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let mut writes = Vec::with_capacity(snapshot.rosters.len() + 2);
        for (outing_id, roster) in &snapshot.rosters {
            writes.push((roster_key(outing_id), Self::encode(roster)?));
        }
        writes.push((OUTINGS_KEY.to_string(), Self::encode(&snapshot.outings)?));
        writes.push((USER_KEY.to_string(), Self::encode(&snapshot.user)?));

        self.backend
            .put_many(&writes)
            .context("Failed to commit snapshot to mirror")?;

        debug!(entries = writes.len(), "Snapshot written to mirror");
        Ok(())
    }

    pub fn summary(&self) -> Result<MirrorSummary> {
        let user = self.read_user()?;
        let outings = self.read_outings()?;
        Ok(MirrorSummary {
            user: user.as_ref().map(|u| u.data.display_name().to_string()),
            outing_count: outings.as_ref().map(|o| o.data.len()),
            roster_count: self.roster_ids()?.len(),
            last_synced: outings
                .as_ref()
                .map(|o| o.age_display())
                .or_else(|| user.as_ref().map(|u| u.age_display())),
        })
    }
}

/// What the mirror currently holds, for status display.
#[derive(Debug, Default, PartialEq)]
pub struct MirrorSummary {
    pub user: Option<String>,
    pub outing_count: Option<usize>,
    pub roster_count: usize,
    pub last_synced: Option<String>,
}

impl MirrorSummary {
    pub fn last_synced(&self) -> &str {
        self.last_synced.as_deref().unwrap_or("never")
    }
}

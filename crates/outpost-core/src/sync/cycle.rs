use anyhow::Result;
use tracing::{info, warn};

use crate::mirror::MirrorStore;
use crate::models::Snapshot;

/// Result of one sync cycle, as reported to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced { outings: usize, rosters: usize },
    Failed { reason: String },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Synced { .. })
    }

    /// Short user-facing text
    pub fn message(&self) -> &'static str {
        match self {
            SyncOutcome::Synced { .. } => "Offline data synced",
            SyncOutcome::Failed { .. } => "Sync failed",
        }
    }
}

/// Receives every completed cycle's outcome.
///
/// Called synchronously from the cycle task after the mirror write, so
/// implementations must return promptly and must not block.
pub trait SyncObserver: Send + Sync {
    fn on_outcome(&self, outcome: &SyncOutcome);
}

/// Write a fetched snapshot into the mirror, or leave the mirror alone if the
/// fetch failed.
pub(crate) fn apply_fetch_result(mirror: &MirrorStore, fetched: Result<Snapshot>) -> SyncOutcome {
    let snapshot = match fetched {
        Ok(snapshot) => snapshot,
        Err(e) => {
            let reason = format!("{:#}", e);
            warn!(error = %reason, "Snapshot fetch failed, keeping previous mirror");
            return SyncOutcome::Failed { reason };
        }
    };

    match mirror.apply_snapshot(&snapshot) {
        Ok(()) => {
            info!(
                outings = snapshot.outings.len(),
                rosters = snapshot.rosters.len(),
                "Mirror updated from snapshot"
            );
            SyncOutcome::Synced {
                outings: snapshot.outings.len(),
                rosters: snapshot.rosters.len(),
            }
        }
        Err(e) => {
            let reason = format!("{:#}", e);
            warn!(error = %reason, "Failed to write snapshot to mirror");
            SyncOutcome::Failed { reason }
        }
    }
}

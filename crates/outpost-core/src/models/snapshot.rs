use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Outing, OutingId, Roster, User};

/// Consolidated server state returned by the bulk data endpoint.
///
/// Pulled and applied as one unit: the outing list and every roster in a
/// mirror write always come from the same `Snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Snapshot {
    pub user: User,
    #[serde(default)]
    pub outings: Vec<Outing>,
    #[serde(default)]
    pub rosters: BTreeMap<OutingId, Roster>,
}

impl Snapshot {
    pub fn roster(&self, outing_id: &OutingId) -> Option<&Roster> {
        self.rosters.get(outing_id)
    }
}

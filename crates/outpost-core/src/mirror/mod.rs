//! Local mirror of server data for offline reads.
//!
//! `MirrorStore` keeps the most recent successfully synced snapshot, one entry
//! per data kind:
//! - `current_user`: the signed-in user
//! - `outings`: the full outing list
//! - `roster_<outing id>`: one entry per outing
//!
//! Entries are plain JSON wrapped in `CachedData` and never expire on their
//! own; readers should treat them as "as of the last successful sync".

pub mod backend;
pub mod cached;
pub mod store;

pub use backend::{FileBackend, MemoryBackend, MirrorBackend};
pub use cached::CachedData;
pub use store::{MirrorStore, MirrorSummary};

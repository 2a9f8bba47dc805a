//! Offline-first caching and background sync for the troop outing client.
//!
//! Two independent halves:
//!
//! - `worker`: a versioned cache of the application shell, installed and
//!   activated per release, that answers GET requests cache-first and falls
//!   back to the cached root document when the network is unreachable.
//! - `sync` + `mirror`: a gated scheduler that pulls one bulk snapshot every
//!   five minutes while an admin is signed in and online, and keeps the most
//!   recent copy in a local key-value mirror for offline reads.
//!
//! `notify` surfaces sync outcomes as short-lived toast messages.

pub mod api;
pub mod auth;
pub mod config;
pub mod mirror;
pub mod models;
pub mod notify;
pub mod sync;
pub mod worker;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthSnapshot, TokenStore};
pub use config::Config;
pub use mirror::{CachedData, MirrorStore};
pub use models::{Outing, OutingId, Role, Roster, RosterMember, Snapshot, User};
pub use notify::Notifier;
pub use sync::{GateInputs, SyncObserver, SyncOutcome, SyncPhase, SyncScheduler};

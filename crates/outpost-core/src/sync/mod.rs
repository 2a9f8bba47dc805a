//! Background synchronization of the local mirror.
//!
//! The scheduler pulls a bulk snapshot once immediately and then every five
//! minutes, but only while the gate is open: auth loaded, signed in, admin
//! role, and network reachable. Results land in the `MirrorStore`; outcomes
//! go to a `SyncObserver` (usually the `Notifier`) which cannot hold up a
//! cycle.
//!
//! At most one cycle runs per session. A tick that fires while a cycle is in
//! flight is skipped, not queued.

pub mod cycle;
pub mod gate;
pub mod scheduler;
pub mod source;

pub use cycle::{SyncObserver, SyncOutcome};
pub use gate::{ClosedReason, GateDecision, GateInputs};
pub use scheduler::{SyncPhase, SyncScheduler, SYNC_INTERVAL};
pub use source::SnapshotSource;

//! REST client for the troop management server.
//!
//! The sync layer only needs one consolidated read, the bulk data endpoint,
//! which returns the current user, every outing, and each outing's roster in
//! a single round trip. `ApiClient` exposes that plus the current-user lookup
//! and a reachability probe the host uses to feed the sync gate.
//!
//! Requests carry a bearer token issued by the server's sign-in flow.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;

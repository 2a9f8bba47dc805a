//! Data models for the troop outing snapshot.
//!
//! The sync layer treats these as opaque fragments of one bulk payload:
//!
//! - `User`, `Role`: the signed-in user; only `role` is inspected (admin gate)
//! - `Outing`, `OutingId`: the outing list; only `id` is inspected (mirror key)
//! - `Roster`, `RosterMember`: per-outing attendee lists
//! - `Snapshot`: the consolidated `{ user, outings, rosters }` payload
//!
//! Fields the server sends that are not modelled here are kept in each
//! struct's `extra` map so mirrored fragments round-trip unchanged.

pub mod outing;
pub mod person;
pub mod snapshot;
pub mod user;

pub use outing::{Outing, OutingId};
pub use person::{age_on, MemberType, Roster, RosterMember};
pub use snapshot::Snapshot;
pub use user::{Role, User};

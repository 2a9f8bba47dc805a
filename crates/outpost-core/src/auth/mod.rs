//! Authentication boundary.
//!
//! Sign-in itself happens elsewhere (the server's SSO flow issues the token).
//! This module provides:
//! - `AuthSnapshot`: the loaded/signed-in/role capability the sync gate reads
//! - `TokenStore`: OS-level storage of the API bearer token via keyring

pub mod state;
pub mod token;

pub use state::AuthSnapshot;
pub use token::TokenStore;

//! # locshare-store
//!
//! Device-local secret storage for the locshare client.
//!
//! Everything the client must keep across restarts (its key pair, the bearer
//! token, the server URL and verified member public keys) is an opaque
//! string under a well-known key. [`SecretStore`] is that contract;
//! [`SqliteSecretStore`] persists it in a small SQLite database and
//! [`MemorySecretStore`] keeps it in process for tests and ephemeral runs.

pub mod database;
pub mod keys;
pub mod memory;
pub mod migrations;
pub mod secrets;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use memory::MemorySecretStore;
pub use secrets::{SecretStore, SqliteSecretStore};

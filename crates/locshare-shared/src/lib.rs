//! # locshare-shared
//!
//! Types and primitives shared by every locshare crate: the domain model
//! exchanged with the location server, the JSON wire protocol, the ASCII
//! armor codec, and the [`engine::CryptoEngine`] that signs, encrypts and
//! decrypts on behalf of the client. The `openpgp` feature adds an engine
//! interoperable with OpenPGP servers.

pub mod armor;
pub mod constants;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod identity;
#[cfg(feature = "openpgp")]
pub mod openpgp;
pub mod protocol;
pub mod types;

pub use engine::{CryptoEngine, NativeEngine};
pub use error::{ArmorError, CryptoError, ProtocolError};
#[cfg(feature = "openpgp")]
pub use openpgp::OpenPgpEngine;

//! Well-known secret store keys.

pub const PUBLIC_KEY: &str = "publicKey";
pub const PRIVATE_KEY: &str = "privateKey";
pub const TOKEN: &str = "token";
pub const SERVER_URL: &str = "serverUrl";

/// Namespace for verified member public keys.
pub const PUBKEY_CACHE_PREFIX: &str = "pubkey-";

/// `pubkey-<keyid>`
pub fn cached_public_key(keyid: &str) -> String {
    format!("{PUBKEY_CACHE_PREFIX}{keyid}")
}

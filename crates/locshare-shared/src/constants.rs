/// Application name
pub const APP_NAME: &str = "locshare";

/// Packet format version written into every armored body
pub const PACKET_VERSION: u8 = 1;

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Number of digest bytes kept for a key id (16 hex chars)
pub const KEY_ID_SIZE: usize = 8;

/// Base64 line width inside armored blocks
pub const ARMOR_LINE_WIDTH: usize = 64;

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_ENCRYPTION_KEY: &str = "locshare-encryption-key-v1";
pub const KDF_CONTEXT_KEY_ID: &str = "locshare-key-id-v1";
pub const KDF_CONTEXT_KEY_WRAP: &str = "locshare-key-wrap-v1";

/// Header line opening a challenge clear-signed by the native engine
pub const SIGNED_MESSAGE_HEADER: &str = "-----BEGIN LOCSHARE SIGNED MESSAGE-----";

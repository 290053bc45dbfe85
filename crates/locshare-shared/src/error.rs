use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Armor error: {0}")]
    Armor(#[from] ArmorError),

    #[error("Packet encoding error: {0}")]
    Encoding(String),

    #[error("Signature does not verify")]
    InvalidSignature,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Message has no recipients")]
    NoRecipients,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArmorError {
    #[error("Missing armor header for {0}")]
    MissingHeader(&'static str),

    #[error("Missing armor footer for {0}")]
    MissingFooter(&'static str),

    #[error("Invalid base64 body: {0}")]
    Base64(String),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("URL must start with http:// or https://, got {0:?}")]
    InvalidServerUrl(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Token envelope contained an empty token")]
    EmptyToken,
}

impl From<bincode::Error> for CryptoError {
    fn from(e: bincode::Error) -> Self {
        CryptoError::Encoding(e.to_string())
    }
}

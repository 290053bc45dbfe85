use chrono::Utc;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::armor::{self, ArmorKind};
use crate::constants::{KDF_CONTEXT_ENCRYPTION_KEY, KDF_CONTEXT_KEY_ID, KEY_ID_SIZE, PACKET_VERSION};
use crate::error::CryptoError;
use crate::types::KeyId;

/// Secret half of an identity: one Ed25519 seed from which the X25519
/// encryption secret is derived with BLAKE3.
#[derive(Clone)]
pub struct SecretKey {
    signing_key: SigningKey,
    user_id: String,
    created_at: i64,
}

/// Public half: verifying key plus X25519 encryption key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    signing_key: [u8; 32],
    encryption_key: [u8; 32],
    user_id: String,
    created_at: i64,
}

#[derive(Serialize, Deserialize)]
struct SecretKeyPacket {
    version: u8,
    user_id: String,
    created_at: i64,
    seed: [u8; 32],
}

#[derive(Serialize, Deserialize)]
struct PublicKeyPacket {
    version: u8,
    user_id: String,
    created_at: i64,
    signing_key: [u8; 32],
    encryption_key: [u8; 32],
}

impl SecretKey {
    /// Generate a new random identity
    pub fn generate(user_id: &str) -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            user_id: user_id.to_string(),
            created_at: Utc::now().timestamp(),
        }
    }

    pub fn from_seed(seed: &[u8; 32], user_id: &str, created_at: i64) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
            user_id: user_id.to_string(),
            created_at,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// X25519 secret used to unwrap message keys
    pub fn encryption_secret(&self) -> StaticSecret {
        let derived = blake3::derive_key(KDF_CONTEXT_ENCRYPTION_KEY, self.signing_key.as_bytes());
        StaticSecret::from(derived)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            signing_key: self.signing_key.verifying_key().to_bytes(),
            encryption_key: X25519Public::from(&self.encryption_secret()).to_bytes(),
            user_id: self.user_id.clone(),
            created_at: self.created_at,
        }
    }

    pub fn key_id(&self) -> KeyId {
        self.public_key().key_id()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    pub fn to_armored(&self) -> Result<String, CryptoError> {
        let packet = SecretKeyPacket {
            version: PACKET_VERSION,
            user_id: self.user_id.clone(),
            created_at: self.created_at,
            seed: *self.signing_key.as_bytes(),
        };
        let body = bincode::serialize(&packet)?;
        Ok(armor::encode(ArmorKind::PrivateKey, &[], &body))
    }

    pub fn from_armored(text: &str) -> Result<Self, CryptoError> {
        let body = armor::decode(ArmorKind::PrivateKey, text)?;
        let packet: SecretKeyPacket = bincode::deserialize(&body)?;
        check_version(packet.version)?;
        Ok(Self::from_seed(&packet.seed, &packet.user_id, packet.created_at))
    }
}

impl PublicKey {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn encryption_key(&self) -> X25519Public {
        X25519Public::from(self.encryption_key)
    }

    /// Upper-case hex of the trailing [`KEY_ID_SIZE`] bytes of a BLAKE3
    /// digest over both key halves. Independent of user id and timestamp.
    pub fn key_id(&self) -> KeyId {
        let mut material = [0u8; 64];
        material[..32].copy_from_slice(&self.signing_key);
        material[32..].copy_from_slice(&self.encryption_key);
        let digest = blake3::derive_key(KDF_CONTEXT_KEY_ID, &material);
        KeyId(hex::encode_upper(&digest[32 - KEY_ID_SIZE..]))
    }

    /// Verify a signature against this key
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let verifying_key = VerifyingKey::from_bytes(&self.signing_key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        verifying_key
            .verify(message, signature)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    pub fn to_armored(&self) -> Result<String, CryptoError> {
        let packet = PublicKeyPacket {
            version: PACKET_VERSION,
            user_id: self.user_id.clone(),
            created_at: self.created_at,
            signing_key: self.signing_key,
            encryption_key: self.encryption_key,
        };
        let body = bincode::serialize(&packet)?;
        let key_id = self.key_id();
        Ok(armor::encode(
            ArmorKind::PublicKey,
            &[("Comment", self.user_id.as_str()), ("KeyId", key_id.as_str())],
            &body,
        ))
    }

    pub fn from_armored(text: &str) -> Result<Self, CryptoError> {
        let body = armor::decode(ArmorKind::PublicKey, text)?;
        let packet: PublicKeyPacket = bincode::deserialize(&body)?;
        check_version(packet.version)?;
        VerifyingKey::from_bytes(&packet.signing_key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self {
            signing_key: packet.signing_key,
            encryption_key: packet.encryption_key,
            user_id: packet.user_id,
            created_at: packet.created_at,
        })
    }
}

pub(crate) fn check_version(version: u8) -> Result<(), CryptoError> {
    if version == PACKET_VERSION {
        Ok(())
    } else {
        Err(CryptoError::Encoding(format!(
            "unsupported packet version {version}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_is_deterministic() {
        let secret = SecretKey::generate("Alice <alice@example.org>");
        let public = secret.public_key();

        assert_eq!(public.key_id(), public.key_id());
        assert_eq!(public.key_id(), secret.key_id());
        assert_eq!(public.key_id().as_str().len(), KEY_ID_SIZE * 2);
    }

    #[test]
    fn test_armored_roundtrip_keeps_key_id() {
        let secret = SecretKey::generate("Alice <alice@example.org>");
        let armored_secret = secret.to_armored().unwrap();
        let armored_public = secret.public_key().to_armored().unwrap();

        let restored = SecretKey::from_armored(&armored_secret).unwrap();
        let public = PublicKey::from_armored(&armored_public).unwrap();

        assert_eq!(restored.key_id(), secret.key_id());
        assert_eq!(public.key_id(), secret.key_id());
        assert_eq!(public.user_id(), "Alice <alice@example.org>");
    }

    #[test]
    fn test_distinct_identities_have_distinct_ids() {
        let a = SecretKey::generate("a");
        let b = SecretKey::generate("b");
        assert_ne!(a.key_id(), b.key_id());
    }

    #[test]
    fn test_sign_verify() {
        let secret = SecretKey::generate("Alice");
        let message = b"challenge-1234";
        let signature = secret.sign(message);

        assert!(secret.public_key().verify(message, &signature).is_ok());
        assert!(secret.public_key().verify(b"wrong", &signature).is_err());
    }

    #[test]
    fn test_encryption_secret_matches_public_half() {
        let secret = SecretKey::generate("Alice");
        let derived = X25519Public::from(&secret.encryption_secret());
        assert_eq!(derived.as_bytes(), secret.public_key().encryption_key().as_bytes());
    }
}

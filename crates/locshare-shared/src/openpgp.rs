//! [`CryptoEngine`] backed by rpgp, for servers that speak real OpenPGP.
//!
//! Keys are RSA with a separate encryption subkey, key ids are the 64-bit
//! OpenPGP key id of the primary key, attestations are RFC 4880 cleartext
//! signed messages and location payloads are SEIPD v1 messages.

use pgp::crypto::hash::HashAlgorithm;
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use pgp::types::PublicKeyTrait;
use pgp::{
    ArmorOptions, CleartextSignedMessage, Deserializable, KeyType, Message,
    SecretKeyParamsBuilder, SignedPublicKey, SignedPublicSubKey, SignedSecretKey,
    StandaloneSignature, SubkeyParamsBuilder,
};
use smallvec::smallvec;

use crate::engine::CryptoEngine;
use crate::error::CryptoError;
use crate::types::{IdentityOptions, KeyId, KeyPair};

const RSA_BITS: u32 = 2048;

/// Keys are stored unprotected; the secret store guards them at rest.
fn no_passphrase() -> String {
    String::new()
}

fn key_generation(e: impl std::fmt::Display) -> CryptoError {
    CryptoError::KeyGeneration(e.to_string())
}

fn secret_key(armored: &str) -> Result<SignedSecretKey, CryptoError> {
    let (key, _) = SignedSecretKey::from_string(armored)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    Ok(key)
}

fn public_key(armored: &str) -> Result<SignedPublicKey, CryptoError> {
    let (key, _) = SignedPublicKey::from_string(armored)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    Ok(key)
}

/// Every public key in `armored`, which may hold several blocks.
fn public_keys(armored: &str) -> Result<Vec<SignedPublicKey>, CryptoError> {
    let (keys, _) = SignedPublicKey::from_string_many(armored)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    keys.map(|key| key.map_err(|e| CryptoError::InvalidKey(e.to_string())))
        .collect()
}

fn format_key_id(key: &impl PublicKeyTrait) -> KeyId {
    KeyId::new(hex::encode_upper(key.key_id()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenPgpEngine;

impl OpenPgpEngine {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoEngine for OpenPgpEngine {
    fn generate_key_pair(&self, options: &IdentityOptions) -> Result<KeyPair, CryptoError> {
        if options.name.trim().is_empty() {
            return Err(CryptoError::KeyGeneration("name must not be empty".into()));
        }
        let mut rng = rand::thread_rng();

        let subkey = SubkeyParamsBuilder::default()
            .key_type(KeyType::Rsa(RSA_BITS))
            .can_encrypt(true)
            .build()
            .map_err(key_generation)?;
        let params = SecretKeyParamsBuilder::default()
            .key_type(KeyType::Rsa(RSA_BITS))
            .can_certify(true)
            .can_sign(true)
            .primary_user_id(options.user_id())
            .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::AES256])
            .preferred_hash_algorithms(smallvec![HashAlgorithm::SHA2_256])
            .preferred_compression_algorithms(smallvec![])
            .subkey(subkey)
            .build()
            .map_err(key_generation)?;

        let secret = params
            .generate(&mut rng)
            .and_then(|key| key.sign(&mut rng, no_passphrase))
            .map_err(key_generation)?;
        let public = secret
            .public_key()
            .sign(&mut rng, &secret, no_passphrase)
            .map_err(key_generation)?;

        Ok(KeyPair {
            public_key_armored: public.to_armored_string(ArmorOptions::default())?,
            private_key_armored: secret.to_armored_string(ArmorOptions::default())?,
        })
    }

    fn key_id(&self, public_key_armored: &str) -> Result<KeyId, CryptoError> {
        Ok(format_key_id(&public_key(public_key_armored)?))
    }

    fn sign(&self, message: &str, private_key_armored: &str) -> Result<String, CryptoError> {
        let key = secret_key(private_key_armored)?;
        let signed = Message::new_literal_bytes("", message.as_bytes()).sign(
            rand::thread_rng(),
            &key,
            no_passphrase,
            HashAlgorithm::SHA2_256,
        )?;
        Ok(signed
            .into_signature()
            .to_armored_string(ArmorOptions::default())?)
    }

    fn verify(
        &self,
        message: &str,
        signature_armored: &str,
        public_key_armored: &str,
    ) -> Result<(), CryptoError> {
        let key = public_key(public_key_armored)?;
        let (signature, _) = StandaloneSignature::from_string(signature_armored)
            .map_err(|_| CryptoError::InvalidSignature)?;
        signature
            .verify(&key, message.as_bytes())
            .map_err(|_| CryptoError::InvalidSignature)
    }

    fn sign_attestation(
        &self,
        challenge: &str,
        private_key_armored: &str,
    ) -> Result<String, CryptoError> {
        let key = secret_key(private_key_armored)?;
        let message =
            CleartextSignedMessage::sign(rand::thread_rng(), challenge, &key, no_passphrase)?;
        Ok(message.to_armored_string(ArmorOptions::default())?)
    }

    fn attestation_text(&self, attestation: &str) -> Result<String, CryptoError> {
        let (message, _) = CleartextSignedMessage::from_string(attestation)
            .map_err(|_| CryptoError::InvalidSignature)?;
        Ok(message.signed_text())
    }

    fn verify_attestation(
        &self,
        attestation: &str,
        public_key_armored: &str,
    ) -> Result<String, CryptoError> {
        let key = public_key(public_key_armored)?;
        let (message, _) = CleartextSignedMessage::from_string(attestation)
            .map_err(|_| CryptoError::InvalidSignature)?;
        message
            .verify(&key)
            .map_err(|_| CryptoError::InvalidSignature)?;
        Ok(message.signed_text())
    }

    fn encrypt(
        &self,
        plaintext: &str,
        recipient_public_keys: &[String],
    ) -> Result<String, CryptoError> {
        let mut keys: Vec<SignedPublicKey> = Vec::new();
        for entry in recipient_public_keys {
            for key in public_keys(entry)? {
                if !keys.iter().any(|k| k.key_id() == key.key_id()) {
                    keys.push(key);
                }
            }
        }
        if keys.is_empty() {
            return Err(CryptoError::NoRecipients);
        }

        let mut subkeys: Vec<&SignedPublicSubKey> = Vec::with_capacity(keys.len());
        for key in &keys {
            let subkey = key
                .public_subkeys
                .iter()
                .find(|sub| sub.is_encryption_key())
                .ok_or_else(|| {
                    CryptoError::InvalidKey(format!(
                        "key {} has no encryption subkey",
                        format_key_id(key)
                    ))
                })?;
            subkeys.push(subkey);
        }

        let encrypted = Message::new_literal("", plaintext)
            .encrypt_to_keys_seipdv1(rand::thread_rng(), SymmetricKeyAlgorithm::AES128, &subkeys[..])
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok(encrypted.to_armored_string(ArmorOptions::default())?)
    }

    fn decrypt(
        &self,
        ciphertext_armored: &str,
        private_key_armored: &str,
    ) -> Result<String, CryptoError> {
        let key = secret_key(private_key_armored)?;
        let (message, _) =
            Message::from_string(ciphertext_armored).map_err(|_| CryptoError::DecryptionFailed)?;
        let (decrypted, _) = message
            .decrypt(no_passphrase, &[&key])
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let content = decrypted
            .get_content()
            .map_err(|_| CryptoError::DecryptionFailed)?
            .ok_or(CryptoError::DecryptionFailed)?;
        String::from_utf8(content).map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl From<pgp::errors::Error> for CryptoError {
    fn from(e: pgp::errors::Error) -> Self {
        CryptoError::Encoding(e.to_string())
    }
}

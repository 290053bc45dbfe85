//! The primitive provider behind identities, handshakes and location
//! payloads.
//!
//! [`CryptoEngine`] is the seam: the client only ever talks to armored
//! strings, so the backend decides every wire format, the clear-signed
//! attestation included. Two implementations exist:
//!
//! - `OpenPgpEngine` (feature `openpgp`): real OpenPGP keys, cleartext
//!   signatures and messages, for servers that verify with an OpenPGP
//!   library
//! - [`NativeEngine`]: self-contained locshare packets. Keys are Ed25519 for
//!   signatures and X25519 (derived from the same seed) for encryption.
//!   Messages carry one XChaCha20-Poly1305 payload key, wrapped once per
//!   recipient with an ephemeral X25519 exchange. Nothing it emits claims
//!   to be OpenPGP.

use ed25519_dalek::Signature;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::armor::{self, ArmorKind};
use crate::constants::{PACKET_VERSION, SIGNED_MESSAGE_HEADER, SYMMETRIC_KEY_SIZE};
use crate::crypto;
use crate::error::CryptoError;
use crate::identity::{check_version, PublicKey, SecretKey};
use crate::types::{IdentityOptions, KeyId, KeyPair};

pub trait CryptoEngine: Send + Sync {
    fn generate_key_pair(&self, options: &IdentityOptions) -> Result<KeyPair, CryptoError>;

    /// Pure and stable for a given key.
    fn key_id(&self, public_key_armored: &str) -> Result<KeyId, CryptoError>;

    /// Detached, armored signature over `message`.
    fn sign(&self, message: &str, private_key_armored: &str) -> Result<String, CryptoError>;

    fn verify(
        &self,
        message: &str,
        signature_armored: &str,
        public_key_armored: &str,
    ) -> Result<(), CryptoError>;

    /// Clear-signed `challenge` as submitted to `/api/submitAttestation`.
    fn sign_attestation(
        &self,
        challenge: &str,
        private_key_armored: &str,
    ) -> Result<String, CryptoError>;

    /// Signed text of an attestation, without checking the signature.
    fn attestation_text(&self, attestation: &str) -> Result<String, CryptoError>;

    /// Verify an attestation against `public_key_armored` and return the
    /// text it signs.
    fn verify_attestation(
        &self,
        attestation: &str,
        public_key_armored: &str,
    ) -> Result<String, CryptoError>;

    /// Encrypt once so that any listed key holder can decrypt. Entries may
    /// themselves hold several concatenated public key blocks.
    fn encrypt(
        &self,
        plaintext: &str,
        recipient_public_keys: &[String],
    ) -> Result<String, CryptoError>;

    fn decrypt(&self, ciphertext_armored: &str, private_key_armored: &str)
        -> Result<String, CryptoError>;
}

#[derive(Serialize, Deserialize)]
struct SignaturePacket {
    version: u8,
    key_id: KeyId,
    signature: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct MessagePacket {
    version: u8,
    ephemeral_key: [u8; 32],
    recipients: Vec<RecipientStanza>,
    /// nonce || ciphertext under the payload key
    payload: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct RecipientStanza {
    key_id: KeyId,
    wrapped_key: Vec<u8>,
}

/// Split a native attestation into `(text, signature block)`.
fn split_signed_message(attestation: &str) -> Result<(&str, &str), CryptoError> {
    let rest = attestation
        .strip_prefix(SIGNED_MESSAGE_HEADER)
        .and_then(|rest| rest.strip_prefix("\n\n"))
        .ok_or(CryptoError::InvalidSignature)?;
    let sig_start = rest
        .find(&ArmorKind::Signature.begin_line())
        .ok_or(CryptoError::InvalidSignature)?;
    let text = rest[..sig_start]
        .strip_suffix('\n')
        .ok_or(CryptoError::InvalidSignature)?;
    Ok((text, &rest[sig_start..]))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoEngine for NativeEngine {
    fn generate_key_pair(&self, options: &IdentityOptions) -> Result<KeyPair, CryptoError> {
        if options.name.trim().is_empty() {
            return Err(CryptoError::KeyGeneration("name must not be empty".into()));
        }

        let secret = SecretKey::generate(&options.user_id());
        Ok(KeyPair {
            public_key_armored: secret.public_key().to_armored()?,
            private_key_armored: secret.to_armored()?,
        })
    }

    fn key_id(&self, public_key_armored: &str) -> Result<KeyId, CryptoError> {
        Ok(PublicKey::from_armored(public_key_armored)?.key_id())
    }

    fn sign(&self, message: &str, private_key_armored: &str) -> Result<String, CryptoError> {
        let secret = SecretKey::from_armored(private_key_armored)?;
        let signature = secret.sign(message.as_bytes());

        let packet = SignaturePacket {
            version: PACKET_VERSION,
            key_id: secret.key_id(),
            signature: signature.to_bytes().to_vec(),
        };
        let body = bincode::serialize(&packet)?;
        Ok(armor::encode(ArmorKind::Signature, &[], &body))
    }

    fn verify(
        &self,
        message: &str,
        signature_armored: &str,
        public_key_armored: &str,
    ) -> Result<(), CryptoError> {
        let public = PublicKey::from_armored(public_key_armored)?;
        let body = armor::decode(ArmorKind::Signature, signature_armored)?;
        let packet: SignaturePacket = bincode::deserialize(&body)?;
        check_version(packet.version)?;

        if packet.key_id != public.key_id() {
            return Err(CryptoError::InvalidSignature);
        }
        let signature =
            Signature::from_slice(&packet.signature).map_err(|_| CryptoError::InvalidSignature)?;
        public.verify(message.as_bytes(), &signature)
    }

    fn sign_attestation(
        &self,
        challenge: &str,
        private_key_armored: &str,
    ) -> Result<String, CryptoError> {
        let signature = self.sign(challenge, private_key_armored)?;
        Ok(format!("{SIGNED_MESSAGE_HEADER}\n\n{challenge}\n{signature}"))
    }

    fn attestation_text(&self, attestation: &str) -> Result<String, CryptoError> {
        let (text, _) = split_signed_message(attestation)?;
        Ok(text.to_string())
    }

    fn verify_attestation(
        &self,
        attestation: &str,
        public_key_armored: &str,
    ) -> Result<String, CryptoError> {
        let (text, signature) = split_signed_message(attestation)?;
        self.verify(text, signature, public_key_armored)?;
        Ok(text.to_string())
    }

    fn encrypt(
        &self,
        plaintext: &str,
        recipient_public_keys: &[String],
    ) -> Result<String, CryptoError> {
        let mut recipients: Vec<PublicKey> = Vec::new();
        for entry in recipient_public_keys {
            let blocks = armor::split_blocks(ArmorKind::PublicKey, entry);
            if blocks.is_empty() {
                return Err(CryptoError::InvalidKey("no public key block found".into()));
            }
            for block in blocks {
                let key = PublicKey::from_armored(&block)?;
                if !recipients.iter().any(|r| r.key_id() == key.key_id()) {
                    recipients.push(key);
                }
            }
        }
        if recipients.is_empty() {
            return Err(CryptoError::NoRecipients);
        }

        let payload_key = crypto::generate_symmetric_key();
        let ephemeral = StaticSecret::random_from_rng(OsRng);
        let ephemeral_public = X25519Public::from(&ephemeral).to_bytes();

        let mut stanzas = Vec::with_capacity(recipients.len());
        for recipient in &recipients {
            let recipient_public = recipient.encryption_key();
            let shared = ephemeral.diffie_hellman(&recipient_public);
            let wrap_key = crypto::derive_wrap_key(
                shared.as_bytes(),
                &ephemeral_public,
                recipient_public.as_bytes(),
            );
            stanzas.push(RecipientStanza {
                key_id: recipient.key_id(),
                wrapped_key: crypto::encrypt(&wrap_key, &payload_key)?,
            });
        }

        let packet = MessagePacket {
            version: PACKET_VERSION,
            ephemeral_key: ephemeral_public,
            recipients: stanzas,
            payload: crypto::encrypt(&payload_key, plaintext.as_bytes())?,
        };
        let body = bincode::serialize(&packet)?;
        Ok(armor::encode(ArmorKind::Message, &[], &body))
    }

    fn decrypt(
        &self,
        ciphertext_armored: &str,
        private_key_armored: &str,
    ) -> Result<String, CryptoError> {
        let secret = SecretKey::from_armored(private_key_armored)?;
        let body = armor::decode(ArmorKind::Message, ciphertext_armored)?;
        let packet: MessagePacket =
            bincode::deserialize(&body).map_err(|_| CryptoError::DecryptionFailed)?;
        check_version(packet.version)?;

        let own_id = secret.key_id();
        let stanza = packet
            .recipients
            .iter()
            .find(|s| s.key_id == own_id)
            .ok_or(CryptoError::DecryptionFailed)?;

        let own_public = secret.public_key().encryption_key();
        let shared = secret
            .encryption_secret()
            .diffie_hellman(&X25519Public::from(packet.ephemeral_key));
        let wrap_key =
            crypto::derive_wrap_key(shared.as_bytes(), &packet.ephemeral_key, own_public.as_bytes());

        let unwrapped = crypto::decrypt(&wrap_key, &stanza.wrapped_key)?;
        let payload_key: [u8; SYMMETRIC_KEY_SIZE] = unwrapped
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let plaintext = crypto::decrypt(&payload_key, &packet.payload)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

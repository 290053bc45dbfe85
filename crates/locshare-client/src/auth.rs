//! Challenge/response login.
//!
//! ```text
//! NoIdentity --load--> AwaitingChallenge --request+sign--> ChallengeSigned
//!     --attest+decrypt--> TokenIssued
//! ```
//!
//! Each arrow is one transition function. Only [`IssuedToken`], which
//! nothing but the last transition can build, is ever written to the
//! store, so a failed login leaves the previous token untouched.

use locshare_shared::protocol::TokenEnvelope;
use locshare_shared::types::{KeyId, KeyPair, ServerUrl, Token};
use locshare_store::keys;

use crate::error::{ClientError, Result};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    LoadIdentity,
    RequestChallenge,
    SubmitAttestation,
}

impl std::fmt::Display for HandshakeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HandshakeStage::LoadIdentity => "loading the identity",
            HandshakeStage::RequestChallenge => "requesting and signing the challenge",
            HandshakeStage::SubmitAttestation => "submitting attestation",
        })
    }
}

/// A token that came out of a completed handshake.
#[derive(Debug)]
pub struct IssuedToken(Token);

impl IssuedToken {
    pub fn token(&self) -> &Token {
        &self.0
    }
}

#[derive(Debug)]
pub enum Handshake {
    NoIdentity,
    AwaitingChallenge {
        server_url: ServerUrl,
        key_pair: KeyPair,
        key_id: KeyId,
    },
    ChallengeSigned {
        server_url: ServerUrl,
        key_pair: KeyPair,
        attestation: String,
    },
    TokenIssued(IssuedToken),
}

impl Handshake {
    /// Stage the next transition runs, `None` once finished.
    pub fn stage(&self) -> Option<HandshakeStage> {
        match self {
            Handshake::NoIdentity => Some(HandshakeStage::LoadIdentity),
            Handshake::AwaitingChallenge { .. } => Some(HandshakeStage::RequestChallenge),
            Handshake::ChallengeSigned { .. } => Some(HandshakeStage::SubmitAttestation),
            Handshake::TokenIssued(_) => None,
        }
    }

    pub async fn advance(self, session: &Session) -> Result<Handshake> {
        match self {
            Handshake::NoIdentity => load_identity(session),
            Handshake::AwaitingChallenge {
                server_url,
                key_pair,
                key_id,
            } => request_and_sign(session, server_url, key_pair, key_id).await,
            Handshake::ChallengeSigned {
                server_url,
                key_pair,
                attestation,
            } => attest(session, server_url, key_pair, attestation).await,
            done @ Handshake::TokenIssued(_) => Ok(done),
        }
    }
}

fn load_identity(session: &Session) -> Result<Handshake> {
    let key_pair = session.load_key_pair()?;
    let server_url = session.server_url()?;
    let key_id = session.engine.key_id(&key_pair.public_key_armored)?;
    Ok(Handshake::AwaitingChallenge {
        server_url,
        key_pair,
        key_id,
    })
}

async fn request_and_sign(
    session: &Session,
    server_url: ServerUrl,
    key_pair: KeyPair,
    key_id: KeyId,
) -> Result<Handshake> {
    let challenge = session.api.request_challenge(&server_url, &key_id).await?;
    tracing::debug!(key_id = %key_id.short(), "Challenge received");

    let attestation = session
        .engine
        .sign_attestation(&challenge, &key_pair.private_key_armored)?;
    Ok(Handshake::ChallengeSigned {
        server_url,
        key_pair,
        attestation,
    })
}

async fn attest(
    session: &Session,
    server_url: ServerUrl,
    key_pair: KeyPair,
    attestation: String,
) -> Result<Handshake> {
    let token_cipher_text = session
        .api
        .submit_attestation(&server_url, &attestation)
        .await?;
    let plaintext = session
        .engine
        .decrypt(&token_cipher_text, &key_pair.private_key_armored)
        .map_err(ClientError::DecryptFailed)?;
    let token = TokenEnvelope::parse(&plaintext)?;
    Ok(Handshake::TokenIssued(IssuedToken(token)))
}

impl Session {
    /// Run the full handshake and persist the issued token.
    ///
    /// Missing identity or server URL surface as themselves; every later
    /// failure is wrapped in [`ClientError::AuthFailed`].
    pub async fn authenticate(&self) -> Result<Token> {
        let _guard = self.identity_lock.read().await;

        let mut state = Handshake::NoIdentity;
        while let Some(stage) = state.stage() {
            state = state.advance(self).await.map_err(|e| match e {
                ClientError::MissingIdentity | ClientError::Configuration(_) => e,
                other => {
                    tracing::warn!(stage = %stage, error = %other, "Handshake failed");
                    ClientError::AuthFailed {
                        stage,
                        source: Box::new(other),
                    }
                }
            })?;
        }

        match state {
            Handshake::TokenIssued(issued) => self.persist_token(issued),
            _ => Err(ClientError::NotAuthenticated("handshake did not complete".into())),
        }
    }

    fn persist_token(&self, issued: IssuedToken) -> Result<Token> {
        self.store.set(keys::TOKEN, issued.token().as_str())?;
        tracing::info!("Authenticated, bearer token stored");
        Ok(issued.0)
    }
}

//! JSON bodies and paths of the location server API.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{KeyId, RemoteId, Token};

pub const PATH_SIGN_UP: &str = "/api/signUp";
pub const PATH_REQUEST_TOKEN: &str = "/api/requestToken";
pub const PATH_SUBMIT_ATTESTATION: &str = "/api/submitAttestation";
pub const PATH_GROUPS: &str = "/api/groups";
pub const PATH_KEYS: &str = "/api/keys";
pub const PATH_LOCATION: &str = "/api/location";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub pubkey: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTokenRequest {
    pub keyid: KeyId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub challenge: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationRequest {
    #[serde(rename = "signedChallenge")]
    pub signed_challenge: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationResponse {
    #[serde(rename = "tokenCipherText")]
    pub token_cipher_text: String,
}

/// Decrypted content of `tokenCipherText`. Extra fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEnvelope {
    pub token: String,
}

impl TokenEnvelope {
    pub fn parse(plaintext: &str) -> Result<Token, ProtocolError> {
        let envelope: TokenEnvelope = serde_json::from_str(plaintext)?;
        if envelope.token.trim().is_empty() {
            return Err(ProtocolError::EmptyToken);
        }
        Ok(Token::new(envelope.token))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    pub member_key_ids: Vec<KeyId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    #[serde(rename = "publicKey", default)]
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostLocationRequest {
    pub group_ids: Vec<RemoteId>,
    pub cipher_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Comma-separated key ids as typed by a user: trimmed, empties dropped.
pub fn parse_member_key_ids(input: &str) -> Vec<KeyId> {
    input
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(KeyId::from)
        .collect()
}

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Stable identifier derived from a public key. Addresses members, server
/// records and cache entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct KeyId(pub String);

impl KeyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last 8 characters, for log lines.
    pub fn short(&self) -> &str {
        let start = self.0.len().saturating_sub(8);
        self.0.get(start..).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque bearer token issued by the server after a successful handshake.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Never print the bearer value.
impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Base URL of the location server. Only the scheme prefix is validated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ServerUrl(String);

impl ServerUrl {
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        if input.starts_with("http://") || input.starts_with("https://") {
            Ok(Self(input.to_string()))
        } else {
            Err(ProtocolError::InvalidServerUrl(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join an absolute endpoint path (`/api/...`) onto the base.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.0.strip_suffix('/').unwrap_or(&self.0);
        format!("{base}{path}")
    }
}

impl std::fmt::Display for ServerUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Armored key pair as produced by the crypto engine.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub public_key_armored: String,
    pub private_key_armored: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key_armored", &self.public_key_armored)
            .field("private_key_armored", &"***")
            .finish()
    }
}

/// Who a freshly generated key belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityOptions {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub comment: Option<String>,
}

impl IdentityOptions {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            comment: None,
        }
    }

    /// `Name (comment) <email>`
    pub fn user_id(&self) -> String {
        let name = self.name.trim();
        let email = self.email.trim();
        match self.comment.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(comment) => format!("{name} ({comment}) <{email}>"),
            None => format!("{name} <{email}>"),
        }
    }
}

/// Server-assigned identifier. Servers hand out either numbers or strings;
/// the original JSON form is preserved so it can be echoed back verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RemoteId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteId::Number(n) => write!(f, "{n}"),
            RemoteId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        RemoteId::Text(s.to_string())
    }
}

impl From<i64> for RemoteId {
    fn from(n: i64) -> Self {
        RemoteId::Number(n)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMember {
    pub keyid: KeyId,
    #[serde(rename = "fullName", default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: RemoteId,
    pub name: String,
    #[serde(default)]
    pub members: Vec<GroupMember>,
    #[serde(rename = "myKeyId")]
    pub my_key_id: KeyId,
}

impl Group {
    /// Members other than the caller.
    pub fn recipients(&self) -> impl Iterator<Item = &GroupMember> {
        self.members.iter().filter(move |m| m.keyid != self.my_key_id)
    }
}

/// Device position, in the shape location providers report it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude_accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
            altitude_accuracy: None,
            heading: None,
            speed: None,
        }
    }
}

/// Plaintext payload of one encrypted location update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub group_id: RemoteId,
    /// ISO-8601, millisecond precision, UTC.
    pub timestamp: String,
    pub coords: Coordinates,
}

impl LocationSample {
    pub fn now(group_id: RemoteId, coords: Coordinates) -> Self {
        Self {
            group_id,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            coords,
        }
    }
}

/// A ciphertext update as stored by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationUpdateRecord {
    pub id: RemoteId,
    #[serde(rename = "cipherText")]
    pub cipher_text: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub user: serde_json::Value,
    #[serde(rename = "groupId", default)]
    pub group_id: Option<RemoteId>,
}

/// A decrypted position ready for the map renderer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionMarker {
    pub record_id: RemoteId,
    pub user: serde_json::Value,
    pub group_id: RemoteId,
    pub timestamp: String,
    pub coords: Coordinates,
}

impl PositionMarker {
    pub fn from_sample(record: &LocationUpdateRecord, sample: LocationSample) -> Self {
        Self {
            record_id: record.id.clone(),
            user: record.user.clone(),
            group_id: sample.group_id,
            timestamp: sample.timestamp,
            coords: sample.coords,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.coords.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.coords.longitude
    }
}

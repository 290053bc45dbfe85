//! The location server as the client sees it.
//!
//! Components never build requests themselves; they go through
//! [`ServerApi`] so tests can script the server.

use async_trait::async_trait;

use locshare_shared::protocol::{CreateGroupRequest, PostLocationRequest};
use locshare_shared::types::{Group, KeyId, LocationUpdateRecord, ServerUrl, Token};

use crate::error::Result;

#[async_trait]
pub trait ServerApi: Send + Sync {
    /// Register a public key. The response body is returned as-is.
    async fn sign_up(&self, base: &ServerUrl, public_key_armored: &str)
        -> Result<serde_json::Value>;

    /// Ask for a challenge bound to `key_id`.
    async fn request_challenge(&self, base: &ServerUrl, key_id: &KeyId) -> Result<String>;

    /// Submit the signed challenge; returns the encrypted token envelope.
    async fn submit_attestation(&self, base: &ServerUrl, signed_challenge: &str)
        -> Result<String>;

    async fn list_groups(&self, base: &ServerUrl, token: &Token) -> Result<Vec<Group>>;

    async fn create_group(
        &self,
        base: &ServerUrl,
        token: &Token,
        request: &CreateGroupRequest,
    ) -> Result<serde_json::Value>;

    /// `None` when the server answers without a key.
    async fn fetch_public_key(
        &self,
        base: &ServerUrl,
        token: &Token,
        key_id: &KeyId,
    ) -> Result<Option<String>>;

    async fn post_location(
        &self,
        base: &ServerUrl,
        token: &Token,
        request: &PostLocationRequest,
    ) -> Result<()>;

    /// Most recent updates addressed to the caller, newest first.
    async fn fetch_locations(
        &self,
        base: &ServerUrl,
        token: &Token,
        limit: u32,
    ) -> Result<Vec<LocationUpdateRecord>>;
}

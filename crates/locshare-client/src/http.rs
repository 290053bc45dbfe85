use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use locshare_shared::protocol::{
    AttestationRequest, AttestationResponse, ChallengeResponse, CreateGroupRequest, ErrorBody,
    PostLocationRequest, PublicKeyResponse, RequestTokenRequest, SignUpRequest, PATH_GROUPS,
    PATH_KEYS, PATH_LOCATION, PATH_REQUEST_TOKEN, PATH_SIGN_UP, PATH_SUBMIT_ATTESTATION,
};
use locshare_shared::types::{Group, KeyId, LocationUpdateRecord, ServerUrl, Token};

use crate::api::ServerApi;
use crate::error::{ClientError, Result};

/// [`ServerApi`] over HTTPS with JSON bodies and bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpServerApi {
    client: Client,
}

impl HttpServerApi {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("locshare/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let resp = check_status(request.send().await?).await?;
        resp.json::<T>()
            .await
            .map_err(|e| ClientError::Network(format!("invalid response body: {e}")))
    }
}

/// 401/403 become [`ClientError::Unauthorized`]; other failures carry the
/// server's `{ "error": ... }` message when it sends one.
async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ClientError::Unauthorized);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or_else(|_| {
            if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            }
        });
    Err(ClientError::Http {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ServerApi for HttpServerApi {
    async fn sign_up(
        &self,
        base: &ServerUrl,
        public_key_armored: &str,
    ) -> Result<serde_json::Value> {
        let body = SignUpRequest {
            pubkey: public_key_armored.to_string(),
        };
        self.send_json(self.client.post(base.endpoint(PATH_SIGN_UP)).json(&body))
            .await
    }

    async fn request_challenge(&self, base: &ServerUrl, key_id: &KeyId) -> Result<String> {
        let body = RequestTokenRequest {
            keyid: key_id.clone(),
        };
        let resp: ChallengeResponse = self
            .send_json(self.client.post(base.endpoint(PATH_REQUEST_TOKEN)).json(&body))
            .await?;
        Ok(resp.challenge)
    }

    async fn submit_attestation(
        &self,
        base: &ServerUrl,
        signed_challenge: &str,
    ) -> Result<String> {
        let body = AttestationRequest {
            signed_challenge: signed_challenge.to_string(),
        };
        let resp: AttestationResponse = self
            .send_json(
                self.client
                    .post(base.endpoint(PATH_SUBMIT_ATTESTATION))
                    .json(&body),
            )
            .await?;
        Ok(resp.token_cipher_text)
    }

    async fn list_groups(&self, base: &ServerUrl, token: &Token) -> Result<Vec<Group>> {
        self.send_json(
            self.client
                .get(base.endpoint(PATH_GROUPS))
                .bearer_auth(token.as_str()),
        )
        .await
    }

    async fn create_group(
        &self,
        base: &ServerUrl,
        token: &Token,
        request: &CreateGroupRequest,
    ) -> Result<serde_json::Value> {
        self.send_json(
            self.client
                .post(base.endpoint(PATH_GROUPS))
                .bearer_auth(token.as_str())
                .json(request),
        )
        .await
    }

    async fn fetch_public_key(
        &self,
        base: &ServerUrl,
        token: &Token,
        key_id: &KeyId,
    ) -> Result<Option<String>> {
        let resp: PublicKeyResponse = self
            .send_json(
                self.client
                    .get(base.endpoint(PATH_KEYS))
                    .query(&[("keyId", key_id.as_str())])
                    .bearer_auth(token.as_str()),
            )
            .await?;
        Ok(resp.public_key.filter(|k| !k.trim().is_empty()))
    }

    async fn post_location(
        &self,
        base: &ServerUrl,
        token: &Token,
        request: &PostLocationRequest,
    ) -> Result<()> {
        let resp = self
            .client
            .post(base.endpoint(PATH_LOCATION))
            .bearer_auth(token.as_str())
            .json(request)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn fetch_locations(
        &self,
        base: &ServerUrl,
        token: &Token,
        limit: u32,
    ) -> Result<Vec<LocationUpdateRecord>> {
        self.send_json(
            self.client
                .get(base.endpoint(PATH_LOCATION))
                .query(&[("limit", limit)])
                .bearer_auth(token.as_str()),
        )
        .await
    }
}

//! Shared context for every client operation.
//!
//! A [`Session`] is cheap to clone; all clones share the same store,
//! engine, server API, identity lock and fan-out gate.

use std::sync::Arc;

use tokio::sync::RwLock;

use locshare_shared::engine::CryptoEngine;
use locshare_shared::types::{ServerUrl, Token};
use locshare_store::{keys, SecretStore};

use crate::api::ServerApi;
use crate::error::{ClientError, Result};
use crate::events::EventBus;
use crate::fanout::FanoutGate;

#[derive(Clone)]
pub struct Session {
    pub(crate) store: Arc<dyn SecretStore>,
    pub(crate) engine: Arc<dyn CryptoEngine>,
    pub(crate) api: Arc<dyn ServerApi>,
    /// Held for writing while an identity is replaced, for reading by
    /// anything that signs, decrypts or sends under the current one.
    pub(crate) identity_lock: Arc<RwLock<()>>,
    pub(crate) fanout_gate: FanoutGate,
    pub(crate) events: EventBus,
}

/// Where to talk and with which bearer token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub server_url: ServerUrl,
    pub token: Token,
}

/// Everything a pipeline cycle needs, read once at the start of the cycle.
#[derive(Clone)]
pub struct Credentials {
    pub auth: AuthContext,
    pub private_key_armored: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("auth", &self.auth)
            .field("private_key_armored", &"***")
            .finish()
    }
}

impl Session {
    pub fn new(
        store: Arc<dyn SecretStore>,
        engine: Arc<dyn CryptoEngine>,
        api: Arc<dyn ServerApi>,
    ) -> Self {
        Self {
            store,
            engine,
            api,
            identity_lock: Arc::new(RwLock::new(())),
            fanout_gate: FanoutGate::default(),
            events: EventBus::new(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    /// Validate and persist the server base URL.
    pub fn save_server_url(&self, input: &str) -> Result<ServerUrl> {
        let url = ServerUrl::parse(input)?;
        self.store.set(keys::SERVER_URL, url.as_str())?;
        tracing::info!(server = %url, "Server URL saved");
        Ok(url)
    }

    pub fn server_url(&self) -> Result<ServerUrl> {
        let raw = self
            .store
            .get(keys::SERVER_URL)?
            .ok_or_else(|| ClientError::Configuration("server URL is not set".into()))?;
        ServerUrl::parse(&raw)
            .map_err(|_| ClientError::Configuration(format!("stored server URL is invalid: {raw}")))
    }

    pub fn token(&self) -> Result<Option<Token>> {
        Ok(self.store.get(keys::TOKEN)?.map(Token::new))
    }

    /// Server URL plus bearer token, or the matching precondition error.
    pub fn auth_context(&self) -> Result<AuthContext> {
        let server_url = self.server_url()?;
        let token = self
            .token()?
            .ok_or_else(|| ClientError::NotAuthenticated("no bearer token; log in first".into()))?;
        Ok(AuthContext { server_url, token })
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let auth = self.auth_context()?;
        let private_key_armored = self
            .store
            .get(keys::PRIVATE_KEY)?
            .ok_or_else(|| ClientError::NotAuthenticated("no private key on this device".into()))?;
        Ok(Credentials {
            auth,
            private_key_armored,
        })
    }

    /// Drop the bearer token. Returns whether one was stored.
    pub fn logout(&self) -> Result<bool> {
        Ok(self.store.delete(keys::TOKEN)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHarness;

    #[test]
    fn test_server_url_roundtrip() {
        let h = TestHarness::new();
        assert!(matches!(h.session.server_url(), Err(ClientError::Configuration(_))));

        h.session.save_server_url("https://loc.example.org/").unwrap();
        assert_eq!(h.session.server_url().unwrap().as_str(), "https://loc.example.org/");
    }

    #[test]
    fn test_server_url_stored_verbatim() {
        let h = TestHarness::new();
        assert!(matches!(
            h.session.save_server_url(" https://loc.example.org"),
            Err(ClientError::Protocol(_))
        ));
        assert!(h.store.get(keys::SERVER_URL).unwrap().is_none());

        h.session.save_server_url("https://loc.example.org/ ").unwrap();
        assert_eq!(
            h.store.get(keys::SERVER_URL).unwrap().as_deref(),
            Some("https://loc.example.org/ ")
        );
    }

    #[test]
    fn test_invalid_server_url_not_saved() {
        let h = TestHarness::new();
        assert!(matches!(
            h.session.save_server_url("loc.example.org"),
            Err(ClientError::Protocol(_))
        ));
        assert!(h.store.get(keys::SERVER_URL).unwrap().is_none());
    }

    #[test]
    fn test_credentials_preconditions() {
        let h = TestHarness::new();
        assert!(matches!(h.session.credentials(), Err(ClientError::Configuration(_))));

        h.session.save_server_url("http://localhost:3000").unwrap();
        assert!(matches!(h.session.credentials(), Err(ClientError::NotAuthenticated(_))));

        h.store.set(keys::TOKEN, "t").unwrap();
        assert!(matches!(h.session.credentials(), Err(ClientError::NotAuthenticated(_))));

        h.store.set(keys::PRIVATE_KEY, "k").unwrap();
        let creds = h.session.credentials().unwrap();
        assert_eq!(creds.auth.token.as_str(), "t");
        assert!(!format!("{creds:?}").contains("\"k\""));
    }

    #[test]
    fn test_logout() {
        let h = TestHarness::new();
        h.store.set(keys::TOKEN, "t").unwrap();
        assert!(h.session.logout().unwrap());
        assert!(!h.session.logout().unwrap());
    }
}

//! Scripted in-process server and a ready-made session for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use locshare_shared::engine::{CryptoEngine, NativeEngine};
use locshare_shared::protocol::{CreateGroupRequest, PostLocationRequest};
use locshare_shared::types::{
    Group, GroupMember, IdentityOptions, KeyId, LocationUpdateRecord, RemoteId, ServerUrl, Token,
};
use locshare_store::MemorySecretStore;

use crate::api::ServerApi;
use crate::error::{ClientError, Result};
use crate::session::Session;

pub(crate) fn alice_options() -> IdentityOptions {
    IdentityOptions::new("Alice", "alice@example.org")
}

/// Another user known to the fake server.
#[derive(Debug, Clone)]
pub(crate) struct Member {
    pub key_id: KeyId,
    pub public_key: String,
    pub private_key: String,
}

/// Knobs a test flips to make the server misbehave.
#[derive(Debug, Default)]
pub(crate) struct Script {
    pub fail_request_token: Option<u16>,
    pub fail_attestation: Option<u16>,
    /// Encrypt the issued token to a key the client does not hold.
    pub token_for_stranger: bool,
    pub fail_groups: Option<u16>,
    pub fail_locations: Option<u16>,
    pub fail_post_for: HashSet<RemoteId>,
    /// Key served in place of the registered one.
    pub key_overrides: HashMap<KeyId, String>,
    /// Answered with no key at all.
    pub unknown_keys: HashSet<KeyId>,
    pub post_delay: Option<Duration>,
}

#[derive(Default)]
struct ServerState {
    script: Script,
    registered: HashMap<KeyId, String>,
    challenges: HashMap<String, KeyId>,
    tokens: HashMap<String, KeyId>,
    groups: Vec<Group>,
    records: Vec<LocationUpdateRecord>,
    posts: Vec<PostLocationRequest>,
    created_groups: Vec<CreateGroupRequest>,
    key_fetches: usize,
    list_groups_calls: usize,
    location_fetches: usize,
    last_limit: Option<u32>,
    counter: u64,
}

#[derive(Default)]
pub(crate) struct FakeServer {
    state: Mutex<ServerState>,
}

fn scripted(status: u16) -> ClientError {
    ClientError::Http {
        status,
        message: "scripted failure".into(),
    }
}

impl FakeServer {
    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().expect("fake server state poisoned")
    }

    pub fn script(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.state().script);
    }

    pub fn add_member(&self, name: &str) -> Member {
        let pair = NativeEngine
            .generate_key_pair(&IdentityOptions::new(name, format!("{name}@example.org")))
            .unwrap();
        let key_id = NativeEngine.key_id(&pair.public_key_armored).unwrap();
        self.state()
            .registered
            .insert(key_id.clone(), pair.public_key_armored.clone());
        Member {
            key_id,
            public_key: pair.public_key_armored,
            private_key: pair.private_key_armored,
        }
    }

    pub fn is_registered(&self, key_id: &KeyId) -> bool {
        self.state().registered.contains_key(key_id)
    }

    pub fn accepts_token(&self, token: &Token) -> bool {
        self.state().tokens.contains_key(token.as_str())
    }

    pub fn set_groups(&self, groups: Vec<Group>) {
        self.state().groups = groups;
    }

    pub fn set_records(&self, records: Vec<LocationUpdateRecord>) {
        self.state().records = records;
    }

    /// Posts the server accepted.
    pub fn posts(&self) -> Vec<PostLocationRequest> {
        self.state().posts.clone()
    }

    pub fn created_groups(&self) -> Vec<CreateGroupRequest> {
        self.state().created_groups.clone()
    }

    pub fn key_fetches(&self) -> usize {
        self.state().key_fetches
    }

    pub fn list_groups_calls(&self) -> usize {
        self.state().list_groups_calls
    }

    pub fn location_fetches(&self) -> usize {
        self.state().location_fetches
    }

    pub fn last_limit(&self) -> Option<u32> {
        self.state().last_limit
    }
}

impl ServerState {
    fn authorize(&self, token: &Token) -> Result<KeyId> {
        self.tokens
            .get(token.as_str())
            .cloned()
            .ok_or(ClientError::Unauthorized)
    }

    fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}

#[async_trait]
impl ServerApi for FakeServer {
    async fn sign_up(&self, _base: &ServerUrl, public_key_armored: &str) -> Result<serde_json::Value> {
        let key_id = NativeEngine.key_id(public_key_armored)?;
        self.state()
            .registered
            .insert(key_id.clone(), public_key_armored.to_string());
        Ok(serde_json::json!({ "keyid": key_id }))
    }

    async fn request_challenge(&self, _base: &ServerUrl, key_id: &KeyId) -> Result<String> {
        let mut state = self.state();
        if let Some(status) = state.script.fail_request_token {
            return Err(scripted(status));
        }
        if !state.registered.contains_key(key_id) {
            return Err(ClientError::Http {
                status: 404,
                message: "unknown key".into(),
            });
        }
        let challenge = format!("challenge-{}", state.next_id());
        state.challenges.insert(challenge.clone(), key_id.clone());
        Ok(challenge)
    }

    async fn submit_attestation(&self, _base: &ServerUrl, signed_challenge: &str) -> Result<String> {
        let mut state = self.state();
        if let Some(status) = state.script.fail_attestation {
            return Err(scripted(status));
        }
        let bad_request = |message: &str| ClientError::Http {
            status: 400,
            message: message.to_string(),
        };

        let challenge = NativeEngine
            .attestation_text(signed_challenge)
            .map_err(|_| bad_request("malformed"))?;
        let key_id = state
            .challenges
            .remove(&challenge)
            .ok_or_else(|| bad_request("unknown challenge"))?;
        let public_key = state.registered[&key_id].clone();
        NativeEngine
            .verify_attestation(signed_challenge, &public_key)
            .map_err(|_| bad_request("bad signature"))?;

        let token = format!("token-{}", state.next_id());
        state.tokens.insert(token.clone(), key_id);

        let recipient = if state.script.token_for_stranger {
            NativeEngine
                .generate_key_pair(&IdentityOptions::new("stranger", "s@example.org"))?
                .public_key_armored
        } else {
            public_key
        };
        let envelope = serde_json::json!({ "token": token }).to_string();
        Ok(NativeEngine.encrypt(&envelope, &[recipient])?)
    }

    async fn list_groups(&self, _base: &ServerUrl, token: &Token) -> Result<Vec<Group>> {
        let mut state = self.state();
        state.list_groups_calls += 1;
        state.authorize(token)?;
        if let Some(status) = state.script.fail_groups {
            return Err(scripted(status));
        }
        Ok(state.groups.clone())
    }

    async fn create_group(
        &self,
        _base: &ServerUrl,
        token: &Token,
        request: &CreateGroupRequest,
    ) -> Result<serde_json::Value> {
        let mut state = self.state();
        state.authorize(token)?;
        state.created_groups.push(request.clone());
        let id = state.next_id();
        Ok(serde_json::json!({ "id": id, "name": request.name }))
    }

    async fn fetch_public_key(
        &self,
        _base: &ServerUrl,
        token: &Token,
        key_id: &KeyId,
    ) -> Result<Option<String>> {
        let mut state = self.state();
        state.authorize(token)?;
        state.key_fetches += 1;
        if state.script.unknown_keys.contains(key_id) {
            return Ok(None);
        }
        if let Some(forged) = state.script.key_overrides.get(key_id) {
            return Ok(Some(forged.clone()));
        }
        Ok(state.registered.get(key_id).cloned())
    }

    async fn post_location(
        &self,
        _base: &ServerUrl,
        token: &Token,
        request: &PostLocationRequest,
    ) -> Result<()> {
        let delay = {
            let state = self.state();
            state.authorize(token)?;
            state.script.post_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if request
            .group_ids
            .iter()
            .any(|id| state.script.fail_post_for.contains(id))
        {
            return Err(scripted(500));
        }
        state.posts.push(request.clone());
        Ok(())
    }

    async fn fetch_locations(
        &self,
        _base: &ServerUrl,
        token: &Token,
        limit: u32,
    ) -> Result<Vec<LocationUpdateRecord>> {
        let mut state = self.state();
        state.location_fetches += 1;
        state.last_limit = Some(limit);
        state.authorize(token)?;
        if let Some(status) = state.script.fail_locations {
            return Err(scripted(status));
        }
        Ok(state.records.iter().take(limit as usize).cloned().collect())
    }
}

pub(crate) struct TestHarness {
    pub session: Session,
    pub store: Arc<MemorySecretStore>,
    pub server: Arc<FakeServer>,
}

impl TestHarness {
    pub fn new() -> Self {
        let store = Arc::new(MemorySecretStore::new());
        let server = Arc::new(FakeServer::default());
        let session = Session::new(store.clone(), Arc::new(NativeEngine), server.clone());
        Self {
            session,
            store,
            server,
        }
    }

    /// Alice, registered and holding a valid token.
    pub async fn logged_in() -> Self {
        let h = Self::new();
        h.session.save_server_url("http://localhost:3000").unwrap();
        h.session
            .generate_and_persist_identity(&alice_options())
            .await
            .unwrap();
        h.session.register_with_server().await.unwrap();
        h.session.authenticate().await.unwrap();
        h
    }

    pub fn key_id(&self) -> KeyId {
        self.session.load_existing_key_id().unwrap()
    }

    pub fn public_key(&self) -> String {
        self.session.export_public_key().unwrap()
    }
}

/// A group containing the harness user and `others`, as the server would
/// list it to that user.
pub(crate) fn group_of(h: &TestHarness, id: &str, others: &[&Member]) -> Group {
    let me = h.key_id();
    let mut members = vec![GroupMember {
        keyid: me.clone(),
        full_name: Some("Alice".into()),
    }];
    members.extend(others.iter().map(|m| GroupMember {
        keyid: m.key_id.clone(),
        full_name: None,
    }));
    Group {
        id: RemoteId::from(id),
        name: format!("group {id}"),
        members,
        my_key_id: me,
    }
}

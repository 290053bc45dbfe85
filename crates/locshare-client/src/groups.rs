//! Group membership and the verified public-key cache.
//!
//! A fetched key is cached only after its key id has been recomputed and
//! matches the id it was requested under. The cache is consulted before
//! the network and never expires on its own.

use futures::future::join_all;

use locshare_shared::protocol::{parse_member_key_ids, CreateGroupRequest};
use locshare_shared::types::{Group, GroupMember, KeyId};
use locshare_store::keys;

use crate::error::{ClientError, Result};
use crate::session::{AuthContext, Session};

/// Resolved public keys of one group's other members.
#[derive(Debug, Default)]
pub struct RecipientSet {
    pub resolved: Vec<KeyId>,
    /// Armored keys in the same order as `resolved`.
    pub keys: Vec<String>,
    pub skipped: Vec<(KeyId, ClientError)>,
}

impl RecipientSet {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Session {
    pub async fn list_groups(&self, auth: &AuthContext) -> Result<Vec<Group>> {
        self.api.list_groups(&auth.server_url, &auth.token).await
    }

    /// Create a group with the given members. Member ids are taken as typed,
    /// comma separated.
    pub async fn create_group(&self, name: &str, member_key_ids: &str) -> Result<serde_json::Value> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::InvalidInput("group name must not be empty".into()));
        }
        let members = parse_member_key_ids(member_key_ids);
        let auth = self.auth_context()?;

        let request = CreateGroupRequest {
            name: name.to_string(),
            member_key_ids: members,
        };
        let resp = self
            .api
            .create_group(&auth.server_url, &auth.token, &request)
            .await?;
        tracing::info!(
            group = %request.name,
            members = request.member_key_ids.len(),
            "Group created"
        );
        Ok(resp)
    }

    /// Look up every member except the caller, concurrently. A member whose
    /// key cannot be fetched or verified is skipped, never fatal.
    pub async fn resolve_recipient_keys(&self, group: &Group, auth: &AuthContext) -> RecipientSet {
        let members: Vec<&GroupMember> = group.recipients().collect();
        let lookups = members.iter().map(|m| self.resolve_member_key(&m.keyid, auth));
        let results = join_all(lookups).await;

        let mut set = RecipientSet::default();
        for (member, result) in members.into_iter().zip(results) {
            match result {
                Ok(key) => {
                    set.resolved.push(member.keyid.clone());
                    set.keys.push(key);
                }
                Err(e) => {
                    tracing::warn!(
                        group = %group.id,
                        member = %member.keyid,
                        error = %e,
                        "Skipping member without a usable key"
                    );
                    set.skipped.push((member.keyid.clone(), e));
                }
            }
        }
        set
    }

    async fn resolve_member_key(&self, key_id: &KeyId, auth: &AuthContext) -> Result<String> {
        let cache_key = keys::cached_public_key(key_id.as_str());
        if let Some(cached) = self.store.get(&cache_key)? {
            return Ok(cached);
        }

        let fetched = self
            .api
            .fetch_public_key(&auth.server_url, &auth.token, key_id)
            .await?
            .ok_or_else(|| ClientError::VerificationFailed {
                requested: key_id.to_string(),
                reason: "server returned no key".into(),
            })?;

        let actual = self
            .engine
            .key_id(&fetched)
            .map_err(|e| ClientError::VerificationFailed {
                requested: key_id.to_string(),
                reason: format!("unreadable key: {e}"),
            })?;
        if actual != *key_id {
            return Err(ClientError::VerificationFailed {
                requested: key_id.to_string(),
                reason: format!("server returned key {actual}"),
            });
        }

        self.store.set(&cache_key, &fetched)?;
        tracing::debug!(member = %key_id, "Cached verified public key");
        Ok(fetched)
    }

    /// Evict a cached member key so the next resolution refetches it.
    pub fn forget_cached_key(&self, key_id: &KeyId) -> Result<bool> {
        Ok(self.store.delete(&keys::cached_public_key(key_id.as_str()))?)
    }
}

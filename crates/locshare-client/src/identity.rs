use locshare_shared::types::{IdentityOptions, KeyId, KeyPair};
use locshare_store::keys;

use crate::error::{ClientError, Result};
use crate::session::Session;

impl Session {
    /// Generate a fresh key pair and persist it, replacing any previous
    /// identity. Runs exclusively with every signing or sending operation.
    pub async fn generate_and_persist_identity(&self, options: &IdentityOptions) -> Result<KeyId> {
        let _guard = self.identity_lock.write().await;

        let pair = self.engine.generate_key_pair(options)?;
        let key_id = self.engine.key_id(&pair.public_key_armored)?;

        // Private half first: a readable public key always has its private half.
        self.store.set(keys::PRIVATE_KEY, &pair.private_key_armored)?;
        self.store.set(keys::PUBLIC_KEY, &pair.public_key_armored)?;

        // The old token was issued to the old key.
        if self.store.delete(keys::TOKEN)? {
            tracing::debug!("Discarded bearer token of the previous identity");
        }

        tracing::info!(key_id = %key_id, user = %options.user_id(), "Identity generated");
        Ok(key_id)
    }

    /// Key id of the stored identity, if any. Never fails: an unreadable or
    /// malformed key reads as "no identity".
    pub fn load_existing_key_id(&self) -> Option<KeyId> {
        let public = match self.store.get(keys::PUBLIC_KEY) {
            Ok(Some(public)) => public,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read stored public key");
                return None;
            }
        };
        match self.engine.key_id(&public) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "Stored public key is unusable");
                None
            }
        }
    }

    pub fn load_key_pair(&self) -> Result<KeyPair> {
        let public_key_armored = self.store.get(keys::PUBLIC_KEY)?;
        let private_key_armored = self.store.get(keys::PRIVATE_KEY)?;
        match (public_key_armored, private_key_armored) {
            (Some(public_key_armored), Some(private_key_armored)) => Ok(KeyPair {
                public_key_armored,
                private_key_armored,
            }),
            _ => Err(ClientError::MissingIdentity),
        }
    }

    /// Armored public key, for sharing out of band.
    pub fn export_public_key(&self) -> Result<String> {
        self.store
            .get(keys::PUBLIC_KEY)?
            .ok_or(ClientError::MissingIdentity)
    }

    /// Announce the stored public key to the configured server.
    pub async fn register_with_server(&self) -> Result<serde_json::Value> {
        let _guard = self.identity_lock.read().await;
        let server_url = self.server_url()?;
        let public = self.export_public_key()?;

        let resp = self.api.sign_up(&server_url, &public).await?;
        tracing::info!(server = %server_url, "Public key registered");
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use locshare_shared::types::Coordinates;
    use locshare_store::SecretStore;

    use crate::fanout::FanoutOutcome;
    use crate::testing::{alice_options, group_of, TestHarness};

    #[tokio::test]
    async fn test_generate_persists_both_halves() {
        let h = TestHarness::new();
        let key_id = h.session.generate_and_persist_identity(&alice_options()).await.unwrap();

        let pair = h.session.load_key_pair().unwrap();
        assert!(pair.public_key_armored.contains("PUBLIC KEY BLOCK"));
        assert!(pair.private_key_armored.contains("PRIVATE KEY BLOCK"));
        assert_eq!(h.session.load_existing_key_id(), Some(key_id));
    }

    #[tokio::test]
    async fn test_key_id_stable_across_loads() {
        let h = TestHarness::new();
        let key_id = h.session.generate_and_persist_identity(&alice_options()).await.unwrap();
        for _ in 0..3 {
            assert_eq!(h.session.load_existing_key_id().as_ref(), Some(&key_id));
        }
    }

    #[tokio::test]
    async fn test_regenerate_replaces_identity_and_token() {
        let h = TestHarness::new();
        let first = h.session.generate_and_persist_identity(&alice_options()).await.unwrap();
        h.store.set(keys::TOKEN, "old").unwrap();

        let second = h.session.generate_and_persist_identity(&alice_options()).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(h.session.load_existing_key_id(), Some(second));
        assert!(h.store.get(keys::TOKEN).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_generation_keeps_previous_identity() {
        let h = TestHarness::new();
        let key_id = h.session.generate_and_persist_identity(&alice_options()).await.unwrap();

        let err = h
            .session
            .generate_and_persist_identity(&IdentityOptions::new("", "x@y"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Crypto(_)));
        assert_eq!(h.session.load_existing_key_id(), Some(key_id));
    }

    #[test]
    fn test_missing_or_corrupt_identity_is_soft() {
        let h = TestHarness::new();
        assert_eq!(h.session.load_existing_key_id(), None);
        assert!(matches!(h.session.load_key_pair(), Err(ClientError::MissingIdentity)));

        h.store.set(keys::PUBLIC_KEY, "garbage").unwrap();
        assert_eq!(h.session.load_existing_key_id(), None);
    }

    #[tokio::test]
    async fn test_register_with_server() {
        let h = TestHarness::new();
        h.session.save_server_url("http://localhost:3000").unwrap();
        let key_id = h.session.generate_and_persist_identity(&alice_options()).await.unwrap();

        h.session.register_with_server().await.unwrap();
        assert!(h.server.is_registered(&key_id));
    }

    #[tokio::test]
    async fn test_regeneration_waits_for_in_flight_send() {
        let h = TestHarness::logged_in().await;
        let old_key_id = h.key_id();
        let bob = h.server.add_member("bob");
        h.server.set_groups(vec![group_of(&h, "g1", &[&bob])]);
        h.server.script(|s| s.post_delay = Some(Duration::from_millis(150)));

        let send = {
            let session = h.session.clone();
            tokio::spawn(async move { session.send_location(&Coordinates::new(1.0, 2.0)).await })
        };
        // list_groups runs under the identity read lock.
        while h.server.list_groups_calls() == 0 {
            tokio::task::yield_now().await;
        }

        let started = Instant::now();
        let new_key_id = h.session.generate_and_persist_identity(&alice_options()).await.unwrap();

        // The post landed before the new key was written.
        assert_eq!(h.server.posts().len(), 1);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_ne!(new_key_id, old_key_id);

        let outcome = send.await.unwrap().unwrap();
        assert!(matches!(outcome, FanoutOutcome::Completed(report) if report.delivered.len() == 1));
        assert_eq!(h.session.load_existing_key_id(), Some(new_key_id));
    }
}

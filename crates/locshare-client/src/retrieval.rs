//! Retrieval: recent updates fetched and decrypted into map markers.
//! A record that does not decrypt or parse is dropped on its own.

use serde::Serialize;

use locshare_shared::types::{LocationSample, LocationUpdateRecord, PositionMarker};
use locshare_shared::CryptoError;

use crate::error::{ClientError, Result};
use crate::events::PipelineEvent;
use crate::session::{Credentials, Session};

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalReport {
    /// In the order the server returned the records.
    pub markers: Vec<PositionMarker>,
    pub dropped: usize,
}

impl Session {
    /// Fetch and decrypt the `limit` most recent updates.
    pub async fn fetch_locations(&self, limit: u32) -> Result<RetrievalReport> {
        let _guard = self.identity_lock.read().await;

        let creds = self.credentials().map_err(|e| match e {
            ClientError::Configuration(msg) => ClientError::NotAuthenticated(msg),
            other => other,
        })?;
        self.retrieve(&creds, limit).await
    }

    pub async fn retrieve(&self, creds: &Credentials, limit: u32) -> Result<RetrievalReport> {
        let records = self
            .api
            .fetch_locations(&creds.auth.server_url, &creds.auth.token, limit)
            .await?;

        let mut report = RetrievalReport::default();
        for record in &records {
            match self.decrypt_record(record, &creds.private_key_armored) {
                Ok(marker) => report.markers.push(marker),
                Err(e) => {
                    tracing::warn!(record = %record.id, error = %e, "Dropping location update");
                    report.dropped += 1;
                    self.events.emit(PipelineEvent::RecordDropped {
                        record_id: record.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            fetched = records.len(),
            markers = report.markers.len(),
            dropped = report.dropped,
            "Retrieval finished"
        );
        self.events.emit(PipelineEvent::MarkersUpdated {
            markers: report.markers.clone(),
        });
        Ok(report)
    }

    fn decrypt_record(
        &self,
        record: &LocationUpdateRecord,
        private_key_armored: &str,
    ) -> Result<PositionMarker> {
        let plaintext = self
            .engine
            .decrypt(&record.cipher_text, private_key_armored)
            .map_err(ClientError::DecryptFailed)?;
        let sample: LocationSample = serde_json::from_str(&plaintext)
            .map_err(|e| ClientError::DecryptFailed(CryptoError::Encoding(e.to_string())))?;
        Ok(PositionMarker::from_sample(record, sample))
    }
}

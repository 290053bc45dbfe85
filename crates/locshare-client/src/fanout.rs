//! Location fan-out: one sample per group, encrypted to that group's other
//! members and posted separately.
//!
//! A failure in one group never affects the others. Only one fan-out runs
//! at a time; a trigger that arrives while one is in flight is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use locshare_shared::protocol::PostLocationRequest;
use locshare_shared::types::{Coordinates, Group, LocationSample, RemoteId};

use crate::error::{ClientError, Result};
use crate::events::PipelineEvent;
use crate::session::{Credentials, Session};

#[derive(Debug, Clone, Serialize)]
pub struct GroupFailure {
    pub group_id: RemoteId,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FanoutReport {
    pub delivered: Vec<RemoteId>,
    /// Groups with no reachable recipient.
    pub skipped: Vec<RemoteId>,
    pub failed: Vec<GroupFailure>,
}

impl FanoutReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

#[derive(Debug)]
pub enum FanoutOutcome {
    Completed(FanoutReport),
    /// Another fan-out was still running.
    Skipped,
}

/// Single-flight guard for fan-out cycles.
#[derive(Debug, Clone, Default)]
pub struct FanoutGate {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of one fan-out; releases the gate on drop.
#[derive(Debug)]
pub struct FanoutPermit {
    busy: Arc<AtomicBool>,
}

impl FanoutGate {
    pub fn try_acquire(&self) -> Option<FanoutPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FanoutPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for FanoutPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl Session {
    /// Share `coords` with every group, unless a fan-out is already running.
    pub async fn send_location(&self, coords: &Coordinates) -> Result<FanoutOutcome> {
        let Some(_permit) = self.fanout_gate.try_acquire() else {
            tracing::debug!("Fan-out already in flight, skipping trigger");
            return Ok(FanoutOutcome::Skipped);
        };
        let _guard = self.identity_lock.read().await;

        let creds = self.credentials()?;
        self.fan_out(&creds, coords).await.map(FanoutOutcome::Completed)
    }

    /// One fan-out cycle with explicit credentials. Callers are responsible
    /// for single-flight; see [`Session::send_location`].
    pub async fn fan_out(&self, creds: &Credentials, coords: &Coordinates) -> Result<FanoutReport> {
        let groups = self
            .list_groups(&creds.auth)
            .await
            .map_err(|e| ClientError::GroupFetchFailed(Box::new(e)))?;

        let mut report = FanoutReport::default();
        for group in &groups {
            let recipients = self.resolve_recipient_keys(group, &creds.auth).await;
            if recipients.is_empty() {
                tracing::debug!(group = %group.id, "No recipients with a verified key, skipping group");
                report.skipped.push(group.id.clone());
                continue;
            }

            match self.deliver(creds, group, coords, &recipients.keys).await {
                Ok(()) => report.delivered.push(group.id.clone()),
                Err(e) => {
                    tracing::warn!(group = %group.id, error = %e, "Location post failed");
                    report.failed.push(GroupFailure {
                        group_id: group.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            delivered = report.delivered.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Fan-out finished"
        );
        self.events.emit(PipelineEvent::FanoutCompleted {
            delivered: report.delivered.len(),
            skipped: report.skipped.len(),
            failed: report.failed.len(),
        });

        if report.attempted() > 0 && report.delivered.is_empty() {
            return Err(ClientError::AllPostsFailed {
                attempted: report.attempted(),
            });
        }
        Ok(report)
    }

    async fn deliver(
        &self,
        creds: &Credentials,
        group: &Group,
        coords: &Coordinates,
        recipient_keys: &[String],
    ) -> Result<()> {
        let sample = LocationSample::now(group.id.clone(), coords.clone());
        let plaintext = serde_json::to_string(&sample)
            .map_err(|e| ClientError::InvalidInput(format!("unserializable sample: {e}")))?;
        // Several key blocks joined as one recipient entry.
        let cipher_text = self.engine.encrypt(&plaintext, &[recipient_keys.join("\n")])?;

        let request = PostLocationRequest {
            group_ids: vec![group.id.clone()],
            cipher_text,
        };
        self.api
            .post_location(&creds.auth.server_url, &creds.auth.token, &request)
            .await
    }
}

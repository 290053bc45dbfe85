//! The two recurring loops: fan-out of the current position and
//! retrieval of recent updates.
//!
//! Each loop runs its first tick immediately, then waits its interval.
//! Consecutive failures double the wait up to `max_backoff`; a success
//! restores the normal interval. Shutdown is observed between ticks and
//! during waits, never in the middle of a cycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use locshare_shared::types::Coordinates;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::events::PipelineEvent;
use crate::fanout::FanoutOutcome;
use crate::session::Session;

/// Where the device position comes from.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates>;
}

/// A position that never moves.
#[derive(Debug, Clone)]
pub struct FixedPosition(pub Coordinates);

#[async_trait]
impl PositionSource for FixedPosition {
    async fn current_position(&self) -> Result<Coordinates> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        let factor = 1u32.checked_shl(self.failures).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pipeline {
    Fanout,
    Retrieval,
}

impl Pipeline {
    fn name(self) -> &'static str {
        match self {
            Pipeline::Fanout => "fanout",
            Pipeline::Retrieval => "retrieval",
        }
    }
}

pub struct Scheduler {
    session: Session,
    position: Arc<dyn PositionSource>,
    fanout_interval: Duration,
    retrieval_interval: Duration,
    retrieval_limit: u32,
    max_backoff: Duration,
}

impl Scheduler {
    pub fn new(session: Session, position: Arc<dyn PositionSource>, config: &ClientConfig) -> Self {
        Self {
            session,
            position,
            fanout_interval: config.fanout_interval,
            retrieval_interval: config.retrieval_interval,
            retrieval_limit: config.retrieval_limit,
            max_backoff: config.max_backoff,
        }
    }

    /// Spawn both loops on the current runtime.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let this = Arc::new(self);

        let tasks = [Pipeline::Fanout, Pipeline::Retrieval]
            .into_iter()
            .map(|pipeline| {
                let this = Arc::clone(&this);
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move { this.run_loop(pipeline, shutdown).await })
            })
            .collect();

        tracing::info!(
            fanout_every = ?this.fanout_interval,
            retrieval_every = ?this.retrieval_interval,
            "Scheduler started"
        );
        SchedulerHandle { shutdown_tx, tasks }
    }

    async fn run_loop(&self, pipeline: Pipeline, mut shutdown: watch::Receiver<bool>) {
        let base = match pipeline {
            Pipeline::Fanout => self.fanout_interval,
            Pipeline::Retrieval => self.retrieval_interval,
        };
        let mut backoff = Backoff::new(base, self.max_backoff);

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.tick(pipeline).await {
                Ok(()) => backoff.reset(),
                Err(e) => {
                    backoff.record_failure();
                    tracing::warn!(
                        pipeline = pipeline.name(),
                        failures = backoff.failures(),
                        retry_in = ?backoff.delay(),
                        error = %e,
                        "Scheduled cycle failed"
                    );
                    self.session.events.emit(PipelineEvent::TickFailed {
                        pipeline: pipeline.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff.delay()) => {}
                changed = shutdown.changed() => {
                    // A dropped handle counts as shutdown too.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(pipeline = pipeline.name(), "Loop stopped");
    }

    async fn tick(&self, pipeline: Pipeline) -> Result<()> {
        match pipeline {
            Pipeline::Fanout => {
                let coords = self.position.current_position().await?;
                if let FanoutOutcome::Skipped = self.session.send_location(&coords).await? {
                    tracing::debug!("Scheduled fan-out skipped, previous one still running");
                }
                Ok(())
            }
            Pipeline::Retrieval => {
                self.session.fetch_locations(self.retrieval_limit).await?;
                Ok(())
            }
        }
    }
}

/// Stops the loops. In-flight cycles run to completion first.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Scheduler task panicked");
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{group_of, TestHarness};

    fn fast_config() -> ClientConfig {
        ClientConfig {
            fanout_interval: Duration::from_millis(20),
            retrieval_interval: Duration::from_millis(20),
            max_backoff: Duration::from_millis(80),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(20), Duration::from_secs(300));
        assert_eq!(backoff.delay(), Duration::from_secs(20));

        backoff.record_failure();
        assert_eq!(backoff.delay(), Duration::from_secs(40));
        backoff.record_failure();
        assert_eq!(backoff.delay(), Duration::from_secs(80));
        for _ in 0..40 {
            backoff.record_failure();
        }
        assert_eq!(backoff.delay(), Duration::from_secs(300));

        backoff.reset();
        assert_eq!(backoff.delay(), Duration::from_secs(20));
    }

    #[test]
    fn test_backoff_max_below_base() {
        let mut backoff = Backoff::new(Duration::from_secs(20), Duration::from_secs(5));
        backoff.record_failure();
        assert_eq!(backoff.delay(), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_loops_run_and_stop() {
        let h = TestHarness::logged_in().await;
        let bob = h.server.add_member("bob");
        h.server.set_groups(vec![group_of(&h, "g1", &[&bob])]);

        let position = Arc::new(FixedPosition(Coordinates::new(1.0, 2.0)));
        let handle = Scheduler::new(h.session.clone(), position, &fast_config()).start();

        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.shutdown().await;

        let posts = h.server.posts().len();
        let fetches = h.server.location_fetches();
        assert!(posts >= 2, "expected repeated fan-outs, got {posts}");
        assert!(fetches >= 2, "expected repeated retrievals, got {fetches}");

        // Nothing runs after shutdown.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(h.server.posts().len(), posts);
        assert_eq!(h.server.location_fetches(), fetches);
    }

    #[tokio::test]
    async fn test_failing_cycles_back_off_and_report() {
        let h = TestHarness::logged_in().await;
        h.server.script(|s| s.fail_locations = Some(500));
        let mut events = h.session.events().subscribe();

        let position = Arc::new(FixedPosition(Coordinates::new(1.0, 2.0)));
        let handle = Scheduler::new(h.session.clone(), position, &fast_config()).start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().await;

        // 20, 40, 80, 80... ms: far fewer attempts than a fixed 20 ms cadence.
        let fetches = h.server.location_fetches();
        assert!((2..=6).contains(&fetches), "unexpected retrieval count {fetches}");

        let mut failures = 0;
        while let Ok(event) = events.try_recv() {
            if let PipelineEvent::TickFailed { pipeline, .. } = event {
                assert_eq!(pipeline, "retrieval");
                failures += 1;
            }
        }
        assert_eq!(failures, fetches);
    }

    #[tokio::test]
    async fn test_shutdown_lets_in_flight_post_finish() {
        let h = TestHarness::logged_in().await;
        let bob = h.server.add_member("bob");
        h.server.set_groups(vec![group_of(&h, "g1", &[&bob])]);
        h.server.script(|s| s.post_delay = Some(Duration::from_millis(150)));

        let position = Arc::new(FixedPosition(Coordinates::new(1.0, 2.0)));
        let handle = Scheduler::new(h.session.clone(), position, &fast_config()).start();

        // First fan-out is past list_groups and sleeping inside its post.
        while h.server.list_groups_calls() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(h.server.posts().is_empty());

        handle.shutdown().await;
        assert_eq!(h.server.posts().len(), 1);
        assert!(!h.session.fanout_gate.is_busy());
    }
}

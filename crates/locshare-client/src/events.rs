use serde::Serialize;
use tokio::sync::broadcast;

use locshare_shared::types::{PositionMarker, RemoteId};

pub const EVENT_FANOUT_COMPLETED: &str = "fanout-completed";
pub const EVENT_RECORD_DROPPED: &str = "record-dropped";
pub const EVENT_MARKERS_UPDATED: &str = "markers-updated";
pub const EVENT_TICK_FAILED: &str = "tick-failed";

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 64;

/// What the pipelines report to whoever renders them.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum PipelineEvent {
    FanoutCompleted {
        delivered: usize,
        skipped: usize,
        failed: usize,
    },
    RecordDropped {
        record_id: RemoteId,
        reason: String,
    },
    MarkersUpdated {
        markers: Vec<PositionMarker>,
    },
    TickFailed {
        pipeline: String,
        error: String,
    },
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::FanoutCompleted { .. } => EVENT_FANOUT_COMPLETED,
            PipelineEvent::RecordDropped { .. } => EVENT_RECORD_DROPPED,
            PipelineEvent::MarkersUpdated { .. } => EVENT_MARKERS_UPDATED,
            PipelineEvent::TickFailed { .. } => EVENT_TICK_FAILED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: PipelineEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            tracing::trace!(event = name, "No subscribers for event");
        }
    }
}

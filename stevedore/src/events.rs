use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::container::ContainerId;
use crate::record::LaunchRecord;
use crate::worker::{LaunchFailure, LaunchOutcome};

/// Metadata envelope attached to every launch event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventMeta {
    pub version: u16,
    pub worker_id: Uuid,
    pub container_id: ContainerId,
    pub role: String,
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    pub fn new(
        worker_id: Uuid,
        container_id: ContainerId,
        role: impl Into<String>,
    ) -> Self {
        Self {
            version: 1,
            worker_id,
            container_id,
            role: role.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Launch event with metadata and payload.
#[derive(Clone, Debug)]
pub struct LaunchEvent {
    pub meta: EventMeta,
    pub payload: LaunchEventPayload,
}

/// Event payload emitted as a launch worker progresses.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum LaunchEventPayload {
    /// The worker began running.
    Started,
    /// The launch request was accepted by the coordinator.
    Submitted { record: LaunchRecord },
    /// A stage failed; nothing was submitted.
    Failed { failure: LaunchFailure },
    /// The worker finished and the coordinator was notified.
    Finished { outcome: LaunchOutcome },
}

/// In-process fan-out of launch events over a tokio broadcast channel.
///
/// Publishing never blocks. Subscribers that fall behind receive
/// `RecvError::Lagged` and lose the oldest events.
pub struct LaunchEventBus {
    sender: broadcast::Sender<LaunchEvent>,
    capacity: usize,
}

impl std::fmt::Debug for LaunchEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl LaunchEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish to all current subscribers; dropped when there are none.
    pub fn publish(&self, event: LaunchEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LaunchEvent> {
        self.sender.subscribe()
    }
}

impl Default for LaunchEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

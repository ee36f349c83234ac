use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::session::{SessionStatus, SessionType};
use crate::task::TaskStatus;

/// Capacity of the in-process broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Every state change in the engine produces an Event.
/// Views subscribe to them; the driver also relays them to the durable
/// outbox so other processes can catch up with a cursor.
///
/// Consumers must treat events as idempotent: the same change can arrive
/// through both channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionCreated {
        session_id: String,
        session_type: SessionType,
        planned_minutes: u32,
        at: DateTime<Utc>,
    },
    SessionStarted {
        session_id: String,
        remaining_minutes: f64,
        at: DateTime<Utc>,
    },
    SessionPaused {
        session_id: String,
        remaining_minutes: f64,
        at: DateTime<Utc>,
    },
    SessionResumed {
        session_id: String,
        remaining_minutes: f64,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        session_id: String,
        /// Completed by the timer reaching zero.
        automatic: bool,
        at: DateTime<Utc>,
    },
    SessionCancelled {
        session_id: String,
        at: DateTime<Utc>,
    },
    /// An active session was abandoned in favour of a new one.
    SessionSuperseded {
        session_id: String,
        replaced_by: String,
        at: DateTime<Utc>,
    },
    TasksLinked {
        session_id: String,
        task_ids: Vec<String>,
        at: DateTime<Utc>,
    },
    /// A task's status was changed from a session view.
    TaskStatusChanged {
        task_id: String,
        new_status: TaskStatus,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        session_id: String,
        status: SessionStatus,
        remaining_minutes: f64,
        planned_minutes: u32,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::SessionCreated { at, .. }
            | Event::SessionStarted { at, .. }
            | Event::SessionPaused { at, .. }
            | Event::SessionResumed { at, .. }
            | Event::SessionCompleted { at, .. }
            | Event::SessionCancelled { at, .. }
            | Event::SessionSuperseded { at, .. }
            | Event::TasksLinked { at, .. }
            | Event::TaskStatusChanged { at, .. }
            | Event::StateSnapshot { at, .. } => *at,
        }
    }

    /// Session the event is about, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Event::SessionCreated { session_id, .. }
            | Event::SessionStarted { session_id, .. }
            | Event::SessionPaused { session_id, .. }
            | Event::SessionResumed { session_id, .. }
            | Event::SessionCompleted { session_id, .. }
            | Event::SessionCancelled { session_id, .. }
            | Event::SessionSuperseded { session_id, .. }
            | Event::TasksLinked { session_id, .. }
            | Event::StateSnapshot { session_id, .. } => Some(session_id),
            Event::TaskStatusChanged { .. } => None,
        }
    }

    /// Short name used as the outbox `kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::SessionCreated { .. } => "session_created",
            Event::SessionStarted { .. } => "session_started",
            Event::SessionPaused { .. } => "session_paused",
            Event::SessionResumed { .. } => "session_resumed",
            Event::SessionCompleted { .. } => "session_completed",
            Event::SessionCancelled { .. } => "session_cancelled",
            Event::SessionSuperseded { .. } => "session_superseded",
            Event::TasksLinked { .. } => "tasks_linked",
            Event::TaskStatusChanged { .. } => "task_status_changed",
            Event::StateSnapshot { .. } => "state_snapshot",
        }
    }
}

/// In-process fan-out of [`Event`]s.
///
/// Publishing never fails: with no live subscriber the event is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        tracing::trace!(kind = event.kind(), "publishing event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

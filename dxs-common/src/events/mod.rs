//! Event types for the DrumExtract Studio event system
//!
//! Provides shared event definitions and the EventBus used to fan session
//! changes out to SSE clients and loggers.

mod session_types;

pub use session_types::{Phase, Stage};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Studio event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
/// Every event carries the session generation it belongs to so consumers can
/// ignore events from superseded jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StudioEvent {
    /// Session moved to a new phase
    ///
    /// Triggers:
    /// - SSE: Switch the visible panel (upload, progress, tuning, download, error)
    PhaseChanged {
        /// Session generation after the change
        generation: u64,
        /// Phase before change
        old_phase: Phase,
        /// Phase after change
        new_phase: Phase,
        /// When phase changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Remote job progress applied to the session
    ///
    /// Triggers:
    /// - SSE: Update progress indicator and status message
    ProgressUpdated {
        /// Session generation the progress belongs to
        generation: u64,
        /// Stage reporting progress
        stage: Stage,
        /// Percentage complete (0-100)
        percent: u8,
        /// Engine status message
        message: String,
        /// When progress was applied
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Remote stage failed or timed out
    ///
    /// Triggers:
    /// - SSE: Show error panel with recovery action
    StageFailed {
        /// Session generation that failed
        generation: u64,
        /// Stage that failed
        stage: Stage,
        /// Failure description
        message: String,
        /// When failure was applied
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session discarded and replaced by a fresh idle session
    SessionReset {
        /// Session generation after reset
        generation: u64,
        /// When reset happened
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl StudioEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            StudioEvent::PhaseChanged { .. } => "PhaseChanged",
            StudioEvent::ProgressUpdated { .. } => "ProgressUpdated",
            StudioEvent::StageFailed { .. } => "StageFailed",
            StudioEvent::SessionReset { .. } => "SessionReset",
        }
    }

    /// Session generation this event belongs to
    pub fn generation(&self) -> u64 {
        match self {
            StudioEvent::PhaseChanged { generation, .. }
            | StudioEvent::ProgressUpdated { generation, .. }
            | StudioEvent::StageFailed { generation, .. }
            | StudioEvent::SessionReset { generation, .. } => *generation,
        }
    }
}

/// Central event distribution bus
///
/// Uses `tokio::broadcast` for one-to-many event distribution. Slow receivers
/// lose the oldest events once the channel capacity is exceeded.
///
/// # Examples
///
/// ```
/// use dxs_common::events::{EventBus, StudioEvent};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(StudioEvent::SessionReset {
///     generation: 1,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().generation(), 1);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StudioEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<StudioEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: StudioEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for studio event");
        }
    }
}

//! Event types for the sigmap event system
//!
//! The orchestrator and scorer publish state changes here; the API layer
//! (or any other observer) subscribes and forwards them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Engine event types
///
/// Events are broadcast via EventBus and can be serialized for transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// A signature was assigned to an equipment item
    AssignmentCreated {
        assignment_id: Uuid,
        equipment_id: String,
        signature_id: String,
        confidence: f64,
        auto_assigned: bool,
        requires_review: bool,
        timestamp: DateTime<Utc>,
    },

    /// A previous assignment was reversed
    AssignmentRolledBack {
        assignment_id: Uuid,
        equipment_id: String,
        signature_id: String,
        reason: String,
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A user confirmed or rejected an assignment
    FeedbackRecorded {
        assignment_id: Uuid,
        equipment_id: String,
        signature_id: String,
        confirmed: bool,
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A signature's error rate crossed the alert threshold
    ErrorRateAlert {
        signature_id: String,
        error_rate: f64,
        attempts: u64,
        threshold: f64,
        timestamp: DateTime<Utc>,
    },

    /// A signature lost its place in the verified pool
    SignatureEvicted {
        signature_id: String,
        error_rate: f64,
        timestamp: DateTime<Utc>,
    },

    /// Factor weights were recomputed from feedback
    WeightsAdapted {
        version: u64,
        weights: [f64; 8],
        sample_count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Short event name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::AssignmentCreated { .. } => "AssignmentCreated",
            EngineEvent::AssignmentRolledBack { .. } => "AssignmentRolledBack",
            EngineEvent::FeedbackRecorded { .. } => "FeedbackRecorded",
            EngineEvent::ErrorRateAlert { .. } => "ErrorRateAlert",
            EngineEvent::SignatureEvicted { .. } => "SignatureEvicted",
            EngineEvent::WeightsAdapted { .. } => "WeightsAdapted",
        }
    }
}

/// Broadcast bus for engine events
///
/// Cloning the bus shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///
    /// # Examples
    ///
    /// ```
    /// use sigmap_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EngineEvent,
    ) -> Result<usize, broadcast::error::SendError<EngineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EngineEvent) {
        let event_type = event.event_type();
        if self.tx.send(event).is_err() {
            tracing::trace!(event_type, "No subscribers for event");
        }
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(EngineEvent::SignatureEvicted {
            signature_id: "sig-1".to_string(),
            error_rate: 0.4,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "SignatureEvicted");
    }

    #[test]
    fn emit_without_subscribers_is_an_error_but_lossy_is_not() {
        let bus = EventBus::new(4);
        let event = EngineEvent::ErrorRateAlert {
            signature_id: "sig-1".to_string(),
            error_rate: 0.2,
            attempts: 10,
            threshold: 0.05,
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = EngineEvent::FeedbackRecorded {
            assignment_id: Uuid::nil(),
            equipment_id: "eq-1".to_string(),
            signature_id: "sig-1".to_string(),
            confirmed: true,
            user_id: "alice".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "FeedbackRecorded");
        assert_eq!(json["confirmed"], true);
    }
}

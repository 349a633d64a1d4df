use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

// ============================================================================
// Event Envelope - Event Metadata
// ============================================================================

/// Wraps a domain event with the metadata needed to journal it
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub sequence_number: i64,

    // Event Type Information
    pub event_type: String,
    pub event_version: i32,

    // Event Payload
    pub event_data: E,

    /// Groups every event written by one service operation
    pub correlation_id: Uuid,

    pub timestamp: DateTime<Utc>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(
        aggregate_id: Uuid,
        sequence_number: i64,
        event_data: E,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            aggregate_id,
            sequence_number,
            event_type: event_data.event_type().to_string(),
            event_version: event_data.event_version(),
            event_data,
            correlation_id,
            timestamp: Utc::now(),
        }
    }
}

/// Sequence events after `expected_version` under one correlation id.
pub fn envelope_all<E: DomainEvent>(
    aggregate_id: Uuid,
    expected_version: i64,
    events: Vec<E>,
    correlation_id: Uuid,
) -> Vec<EventEnvelope<E>> {
    events
        .into_iter()
        .zip(expected_version + 1..)
        .map(|(event, seq)| EventEnvelope::new(aggregate_id, seq, event, correlation_id))
        .collect()
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// All journaled events implement this trait
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;
    fn event_version(&self) -> i32 { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    struct TestEvent {
        data: String,
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str { "TestEvent" }
    }

    #[test]
    fn test_event_envelope_creation() {
        let aggregate_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();

        let envelope = EventEnvelope::new(
            aggregate_id,
            1,
            TestEvent { data: "test".to_string() },
            correlation_id,
        );

        assert_eq!(envelope.aggregate_id, aggregate_id);
        assert_eq!(envelope.sequence_number, 1);
        assert_eq!(envelope.event_type, "TestEvent");
        assert_eq!(envelope.event_version, 1);
        assert_eq!(envelope.correlation_id, correlation_id);
    }

    #[test]
    fn test_envelopes_are_sequenced_after_expected_version() {
        let events = vec![
            TestEvent { data: "a".into() },
            TestEvent { data: "b".into() },
            TestEvent { data: "c".into() },
        ];

        let envelopes = envelope_all(Uuid::new_v4(), 5, events, Uuid::new_v4());

        let sequence: Vec<i64> = envelopes.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequence, vec![6, 7, 8]);
        assert!(envelopes.iter().all(|e| e.correlation_id == envelopes[0].correlation_id));
    }
}

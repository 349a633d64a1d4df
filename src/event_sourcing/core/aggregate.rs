use uuid::Uuid;
use anyhow::Result;
use chrono::{DateTime, Utc};
use super::event::{DomainEvent, EventEnvelope};

// ============================================================================
// Aggregate Root Pattern
// ============================================================================
//
// Key Principles:
// 1. Commands are validated before emitting events
// 2. Events represent facts that have already happened
// 3. Applying an event never fails for a valid history
// 4. Aggregates enforce business invariants
//
// ============================================================================

/// Generic Aggregate trait - all journaled aggregates implement this
///
/// Type Parameters:
/// - `Event`: The domain event type for this aggregate
/// - `Command`: The command type for this aggregate
/// - `Error`: The error type for business rule violations
pub trait Aggregate: Sized + Send + Sync {
    type Event: DomainEvent;
    type Command;
    type Error;

    /// Create new aggregate from its first event
    fn apply_first_event(aggregate_id: Uuid, event: &Self::Event) -> Result<Self, Self::Error>;

    /// Apply subsequent events to update state
    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error>;

    /// Handle command and emit events (business logic)
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    fn aggregate_id(&self) -> Uuid;

    /// Sequence number of the last event applied
    fn version(&self) -> i64;

    fn set_version(&mut self, version: i64);

    /// Record when the latest event was written
    fn touch(&mut self, _at: DateTime<Utc>) {}

    /// Rebuild an aggregate from its journal
    fn load_from_events(events: &[EventEnvelope<Self::Event>]) -> Result<Self>
    where
        Self::Error: std::fmt::Display,
    {
        let Some(first) = events.first() else {
            anyhow::bail!("No events to load");
        };

        let mut aggregate = Self::apply_first_event(first.aggregate_id, &first.event_data)
            .map_err(|e| anyhow::anyhow!("Failed to apply first event: {}", e))?;
        aggregate.set_version(first.sequence_number);
        aggregate.touch(first.timestamp);

        for envelope in events.iter().skip(1) {
            aggregate.apply_event(&envelope.event_data)
                .map_err(|e| anyhow::anyhow!("Failed to apply event {}: {}", envelope.sequence_number, e))?;
            aggregate.set_version(envelope.sequence_number);
            aggregate.touch(envelope.timestamp);
        }

        Ok(aggregate)
    }
}

use async_trait::async_trait;
use uuid::Uuid;

use crate::event_sourcing::core::{Aggregate, EventEnvelope};

// ============================================================================
// Repository - Storage contract for journaled aggregates
// ============================================================================
//
// Responsibilities:
// 1. Store the latest snapshot together with the events that produced it,
//    atomically (both or neither)
// 2. Enforce optimistic concurrency: a write only lands if the stored
//    version still equals the version the caller read
// 3. Never leave a partially-applied write behind
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Concurrency conflict on {aggregate_id}: expected version {expected}, but current is {actual}")]
    VersionConflict {
        aggregate_id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("Cannot append empty event list")]
    EmptyAppend,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Repository<A>: Send + Sync
where
    A: Aggregate + Clone + 'static,
{
    /// Latest snapshot, or `None` if the aggregate does not exist.
    async fn load(&self, aggregate_id: Uuid) -> Result<Option<A>, RepositoryError>;

    /// Store `aggregate` and append `events`, provided the stored version is
    /// still `expected_version` (0 for a new aggregate). Returns the new version.
    async fn save(
        &self,
        aggregate: &A,
        expected_version: i64,
        events: Vec<EventEnvelope<A::Event>>,
    ) -> Result<i64, RepositoryError>;

    /// Remove the aggregate and its journal. `Ok(false)` if it did not exist.
    async fn delete(&self, aggregate_id: Uuid, expected_version: i64) -> Result<bool, RepositoryError>;

    async fn list(&self) -> Result<Vec<A>, RepositoryError>;

    /// Journal in sequence order; empty if the aggregate does not exist.
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<EventEnvelope<A::Event>>, RepositoryError>;
}

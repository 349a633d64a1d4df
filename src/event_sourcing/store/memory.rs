use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::event_sourcing::core::{Aggregate, EventEnvelope};
use super::repository::{Repository, RepositoryError};

// ============================================================================
// In-Memory Repository
// ============================================================================
//
// Every aggregate id owns a slot with its own lock. The outer map is only
// write-locked to create a slot, so writers to different ids never wait on
// each other. The version check and the write happen under the slot lock.
//
// Slots are never removed from the map. Deleting empties the slot instead,
// so a writer holding a stale handle still sees the deletion.
//
// ============================================================================

struct Stored<A: Aggregate> {
    snapshot: A,
    journal: Vec<EventEnvelope<A::Event>>,
}

type Slot<A> = Arc<Mutex<Option<Stored<A>>>>;

pub struct InMemoryRepository<A: Aggregate> {
    slots: RwLock<HashMap<Uuid, Slot<A>>>,
}

impl<A: Aggregate> InMemoryRepository<A> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, aggregate_id: Uuid) -> Option<Slot<A>> {
        self.slots.read().await.get(&aggregate_id).cloned()
    }

    async fn slot_or_create(&self, aggregate_id: Uuid) -> Slot<A> {
        if let Some(slot) = self.slot(aggregate_id).await {
            return slot;
        }
        self.slots
            .write()
            .await
            .entry(aggregate_id)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }
}

impl<A: Aggregate> Default for InMemoryRepository<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<A> Repository<A> for InMemoryRepository<A>
where
    A: Aggregate + Clone + 'static,
{
    async fn load(&self, aggregate_id: Uuid) -> Result<Option<A>, RepositoryError> {
        let Some(slot) = self.slot(aggregate_id).await else {
            return Ok(None);
        };
        let stored = slot.lock().await;
        Ok(stored.as_ref().map(|stored| stored.snapshot.clone()))
    }

    async fn save(
        &self,
        aggregate: &A,
        expected_version: i64,
        events: Vec<EventEnvelope<A::Event>>,
    ) -> Result<i64, RepositoryError> {
        if events.is_empty() {
            return Err(RepositoryError::EmptyAppend);
        }

        let aggregate_id = aggregate.aggregate_id();
        let slot = self.slot_or_create(aggregate_id).await;
        let mut stored = slot.lock().await;

        let current_version = stored.as_ref().map(|s| s.snapshot.version()).unwrap_or(0);
        if current_version != expected_version {
            return Err(RepositoryError::VersionConflict {
                aggregate_id,
                expected: expected_version,
                actual: current_version,
            });
        }

        let new_version = expected_version + events.len() as i64;
        let mut snapshot = aggregate.clone();
        snapshot.set_version(new_version);

        let event_count = events.len();
        match stored.as_mut() {
            Some(existing) => {
                existing.snapshot = snapshot;
                existing.journal.extend(events);
            }
            None => {
                *stored = Some(Stored { snapshot, journal: events });
            }
        }

        tracing::debug!(
            aggregate_id = %aggregate_id,
            new_version = new_version,
            event_count = event_count,
            "Appended events"
        );

        Ok(new_version)
    }

    async fn delete(&self, aggregate_id: Uuid, expected_version: i64) -> Result<bool, RepositoryError> {
        let Some(slot) = self.slot(aggregate_id).await else {
            return Ok(false);
        };
        let mut stored = slot.lock().await;

        let Some(current) = stored.as_ref() else {
            return Ok(false);
        };
        let current_version = current.snapshot.version();
        if current_version != expected_version {
            return Err(RepositoryError::VersionConflict {
                aggregate_id,
                expected: expected_version,
                actual: current_version,
            });
        }

        *stored = None;
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<A>, RepositoryError> {
        let slots: Vec<Slot<A>> = self.slots.read().await.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(stored) = slot.lock().await.as_ref() {
                snapshots.push(stored.snapshot.clone());
            }
        }
        Ok(snapshots)
    }

    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<EventEnvelope<A::Event>>, RepositoryError> {
        let Some(slot) = self.slot(aggregate_id).await else {
            return Ok(Vec::new());
        };
        let stored = slot.lock().await;
        Ok(stored
            .as_ref()
            .map(|stored| stored.journal.clone())
            .unwrap_or_default())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

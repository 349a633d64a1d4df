// ============================================================================
// Event Sourcing Store - Generic Persistence Layer
// ============================================================================
//
// `Repository` is the storage contract the domain depends on;
// `InMemoryRepository` is the bundled implementation.
//
// ============================================================================

pub mod memory;
pub mod repository;

pub use memory::InMemoryRepository;
pub use repository::{Repository, RepositoryError};

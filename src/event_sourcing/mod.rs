// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Generic aggregate/event abstractions and the repository they are stored
// through. Order-specific code lives in src/domain/.
//
// ============================================================================

pub mod core;
pub mod store;

pub use self::core::*;
pub use store::*;

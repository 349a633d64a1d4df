// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Money, quantities and currencies
// - Value objects (OrderItem, Discount, Transaction, Address, Totals)
// - Item ledger, discount engine, transaction ledger, address book
// - Pricing (tax/shipping policies and the totals derivation)
// - Events, commands and errors
// - Aggregate (Order, with its state machine)
// - Command Handler (OrderService)
//
// This is completely separate from the generic event sourcing infrastructure.
//
// ============================================================================

pub mod money;
pub mod value_objects;
pub mod items;
pub mod discounts;
pub mod transactions;
pub mod addresses;
pub mod pricing;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;

// Re-export for convenience
pub use money::*;
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
pub use pricing::{PricingPolicy, ShippingPolicy, TaxPolicy};

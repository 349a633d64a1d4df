use rust_decimal::Decimal;
use uuid::Uuid;

use crate::event_sourcing::RepositoryError;
use crate::utils::IsTransient;
use super::value_objects::{OrderStatus, TransactionStatus};

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Order item not found: {0}")]
    ItemNotFound(Uuid),

    #[error("Discount not found: {0}")]
    DiscountNotFound(Uuid),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("Cannot {operation} an order in status: {status:?}")]
    InvalidState {
        operation: &'static str,
        status: OrderStatus,
    },

    #[error("Transaction {id} is {status:?} and can no longer be changed")]
    TransactionFinalized {
        id: Uuid,
        status: TransactionStatus,
    },

    #[error("Cannot check out an order with no items")]
    EmptyOrder,

    #[error("Repository failure: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Aggregate not initialized")]
    NotInitialized,
}

/// Coarse error classes a transport layer maps onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidState,
    EmptyOrder,
    RepositoryFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::EmptyOrder => "empty_order",
            ErrorKind::RepositoryFailure => "repository_failure",
        }
    }
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::Validation(_) => ErrorKind::Validation,
            OrderError::NotFound(_)
            | OrderError::ItemNotFound(_)
            | OrderError::DiscountNotFound(_)
            | OrderError::TransactionNotFound(_) => ErrorKind::NotFound,
            OrderError::InvalidState { .. } | OrderError::TransactionFinalized { .. } => {
                ErrorKind::InvalidState
            }
            OrderError::EmptyOrder => ErrorKind::EmptyOrder,
            OrderError::Repository(_) | OrderError::NotInitialized => ErrorKind::RepositoryFailure,
        }
    }
}

/// Only a lost optimistic-concurrency race is safe to re-run: nothing was
/// committed, so the whole read-modify-write starts over against fresh state.
impl IsTransient for OrderError {
    fn is_transient(&self) -> bool {
        matches!(self, OrderError::Repository(RepositoryError::VersionConflict { .. }))
    }
}

// ============================================================================
// Input Validation Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Quantity must be positive, got {0}")]
    NonPositiveQuantity(i64),

    #[error("Quantity {0} exceeds the allowed maximum")]
    QuantityOutOfRange(i64),

    #[error("{field} cannot be negative, got {amount}")]
    NegativeAmount { field: &'static str, amount: Decimal },

    #[error("{field} must be positive, got {amount}")]
    NonPositiveAmount { field: &'static str, amount: Decimal },

    #[error("{field} {amount} exceeds the allowed maximum")]
    AmountOutOfRange { field: &'static str, amount: Decimal },

    #[error("Percentage discount must be within [0, 100], got {0}")]
    PercentageOutOfRange(Decimal),

    #[error("Discount must target at least one item")]
    EmptyDiscountScope,

    #[error("Discount references unknown item: {0}")]
    UnknownItem(Uuid),

    #[error("Free shipping applies to the whole order and cannot target items")]
    ScopedFreeShipping,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    #[error("Invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error("Settled refunds ({refunded}) exceed settled charges ({charged})")]
    RefundExceedsCharges { charged: Decimal, refunded: Decimal },

    #[error("Amount paid ({paid}) exceeds grand total ({grand_total}) and overpayment is not allowed")]
    Overpayment { paid: Decimal, grand_total: Decimal },
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event_sourcing::core::DomainEvent;
use super::money::Currency;
use super::value_objects::{Address, Discount, OrderItem, Totals, Transaction};

// ============================================================================
// Order Events - Facts recorded in the order journal
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Created(OrderCreated),
    HeaderUpdated(OrderHeaderUpdated),
    ItemAdded(ItemAdded),
    ItemUpdated(ItemUpdated),
    ItemRemoved(ItemRemoved),
    DiscountAdded(DiscountAdded),
    DiscountUpdated(DiscountUpdated),
    DiscountRemoved(DiscountRemoved),
    TransactionAdded(TransactionAdded),
    TransactionUpdated(TransactionUpdated),
    TransactionRemoved(TransactionRemoved),
    AddressSet(AddressSet),
    TotalsRecalculated(TotalsRecalculated),
    CheckedOut(OrderCheckedOut),
    Cancelled(OrderCancelled),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "OrderCreated",
            OrderEvent::HeaderUpdated(_) => "OrderHeaderUpdated",
            OrderEvent::ItemAdded(_) => "OrderItemAdded",
            OrderEvent::ItemUpdated(_) => "OrderItemUpdated",
            OrderEvent::ItemRemoved(_) => "OrderItemRemoved",
            OrderEvent::DiscountAdded(_) => "OrderDiscountAdded",
            OrderEvent::DiscountUpdated(_) => "OrderDiscountUpdated",
            OrderEvent::DiscountRemoved(_) => "OrderDiscountRemoved",
            OrderEvent::TransactionAdded(_) => "OrderTransactionAdded",
            OrderEvent::TransactionUpdated(_) => "OrderTransactionUpdated",
            OrderEvent::TransactionRemoved(_) => "OrderTransactionRemoved",
            OrderEvent::AddressSet(_) => "OrderAddressSet",
            OrderEvent::TotalsRecalculated(_) => "OrderTotalsRecalculated",
            OrderEvent::CheckedOut(_) => "OrderCheckedOut",
            OrderEvent::Cancelled(_) => "OrderCancelled",
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Initial event in order lifecycle
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderCreated {
    pub customer_id: Option<Uuid>,
    pub email: Option<String>,
    pub currency: Currency,
    pub notes: Option<String>,
    pub allow_overpayment: bool,
    pub created_at: DateTime<Utc>,
}

/// Only the fields that changed are present
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderHeaderUpdated {
    pub customer_id: Option<Uuid>,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub allow_overpayment: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ItemAdded {
    pub item: OrderItem,
}

/// Carries the full replacement line
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ItemUpdated {
    pub item: OrderItem,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ItemRemoved {
    pub item_id: Uuid,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DiscountAdded {
    pub discount: Discount,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DiscountUpdated {
    pub discount: Discount,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DiscountRemoved {
    pub discount_id: Uuid,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TransactionAdded {
    pub transaction: Transaction,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TransactionUpdated {
    pub transaction: Transaction,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TransactionRemoved {
    pub transaction_id: Uuid,
}

/// Billing or shipping address replaced, see `Address::role`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AddressSet {
    pub address: Address,
}

/// Totals derived under the pricing policy in force at the time
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TotalsRecalculated {
    pub totals: Totals,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderCheckedOut {
    pub checked_out_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderCancelled {
    pub reason: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = OrderEvent::ItemRemoved(ItemRemoved { item_id: Uuid::new_v4() });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ItemRemoved");
        assert_eq!(event.event_type(), "OrderItemRemoved");

        let back: OrderEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}

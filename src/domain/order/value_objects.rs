use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::{Money, Quantity};

// ============================================================================
// Order Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Draft,
    CheckedOut,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Draft)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_ref: String,
    pub name: Option<String>,
    pub unit_price: Money,
    pub quantity: Quantity,
    /// Derived: `unit_price * quantity`, refreshed whenever the item changes.
    pub line_total: Money,
}

impl OrderItem {
    pub fn new(id: Uuid, product_ref: String, name: Option<String>, unit_price: Money, quantity: Quantity) -> Self {
        Self {
            id,
            product_ref,
            name,
            unit_price,
            quantity,
            line_total: unit_price.times(quantity),
        }
    }
}

/// What a discount takes off. Each kind has exactly one deduction rule,
/// see `discounts::deduction`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DiscountKind {
    /// Percent of the targeted merchandise, in `[0, 100]`.
    Percentage(Decimal),
    FixedAmount(Money),
    FreeShipping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountScope {
    WholeOrder,
    Items(Vec<Uuid>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub id: Uuid,
    pub kind: DiscountKind,
    pub applies_to: DiscountScope,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Charge,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Settled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Money,
    pub status: TransactionStatus,
    /// Gateway reference, if the payment processor issued one.
    pub reference: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressRole {
    Billing,
    Shipping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub role: AddressRole,
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

/// Derived monetary summary of an order. Never edited directly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub discount_total: Money,
    pub tax_total: Money,
    pub shipping_total: Money,
    pub grand_total: Money,
    pub amount_paid: Money,
    pub amount_due: Money,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_total_derived_on_creation() {
        let item = OrderItem::new(
            Uuid::new_v4(),
            "SKU-1".to_string(),
            None,
            Money::new(Decimal::new(1000, 2)),
            Quantity::new(2).unwrap(),
        );
        assert_eq!(item.line_total, Money::new(Decimal::from(20)));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!OrderStatus::Draft.is_terminal());
        assert!(OrderStatus::CheckedOut.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_discount_kind_serialization() {
        let kind = DiscountKind::Percentage(Decimal::from(10));
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "percentage");

        let free: DiscountKind = serde_json::from_str(r#"{"kind":"free_shipping"}"#).unwrap();
        assert_eq!(free, DiscountKind::FreeShipping);
    }

    #[test]
    fn test_transaction_type_field_name() {
        let tx = Transaction {
            id: Uuid::new_v4(),
            kind: TransactionType::Refund,
            amount: Money::new(Decimal::ONE),
            status: TransactionStatus::Pending,
            reference: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "refund");
        assert_eq!(json["status"], "pending");
    }
}

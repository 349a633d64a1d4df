use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::{AddressRole, DiscountScope, Totals, TransactionStatus, TransactionType};

// ============================================================================
// Order Inputs - Raw caller data, validated by the aggregate
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: Option<Uuid>,
    pub email: Option<String>,
    /// Falls back to the service's configured default currency.
    pub currency: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub allow_overpayment: bool,
}

/// Header-level changes only. Items, discounts, transactions and addresses
/// have dedicated operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderPatch {
    pub customer_id: Option<Uuid>,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub allow_overpayment: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSpec {
    pub product_ref: String,
    pub name: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub unit_price: Option<Decimal>,
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DiscountValue {
    Percentage(Decimal),
    FixedAmount(Decimal),
    FreeShipping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountSpec {
    pub value: DiscountValue,
    pub applies_to: DiscountScope,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscountPatch {
    pub value: Option<DiscountValue>,
    pub applies_to: Option<DiscountScope>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSpec {
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionPatch {
    pub amount: Option<Decimal>,
    pub status: Option<TransactionStatus>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressSpec {
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================
//
// Commands carry every generated id so that re-running one after a lost
// concurrency race produces the same entities.
//
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    UpdateHeader(OrderPatch),
    AddItem {
        item_id: Uuid,
        spec: ItemSpec,
    },
    UpdateItem {
        item_id: Uuid,
        patch: ItemPatch,
    },
    RemoveItem {
        item_id: Uuid,
    },
    AddDiscount {
        discount_id: Uuid,
        spec: DiscountSpec,
    },
    UpdateDiscount {
        discount_id: Uuid,
        patch: DiscountPatch,
    },
    RemoveDiscount {
        discount_id: Uuid,
    },
    AddTransaction {
        transaction_id: Uuid,
        spec: TransactionSpec,
    },
    UpdateTransaction {
        transaction_id: Uuid,
        patch: TransactionPatch,
    },
    RemoveTransaction {
        transaction_id: Uuid,
    },
    SetAddress {
        address_id: Uuid,
        role: AddressRole,
        spec: AddressSpec,
    },
    /// Totals are derived by the command handler from the pricing policy.
    Recalculate {
        totals: Totals,
    },
    Checkout {
        totals: Totals,
    },
    Cancel {
        reason: Option<String>,
    },
}

impl OrderCommand {
    pub fn name(&self) -> &'static str {
        match self {
            OrderCommand::UpdateHeader(_) => "update_order",
            OrderCommand::AddItem { .. } => "add_item",
            OrderCommand::UpdateItem { .. } => "update_item",
            OrderCommand::RemoveItem { .. } => "delete_item",
            OrderCommand::AddDiscount { .. } => "add_discount",
            OrderCommand::UpdateDiscount { .. } => "update_discount",
            OrderCommand::RemoveDiscount { .. } => "delete_discount",
            OrderCommand::AddTransaction { .. } => "add_transaction",
            OrderCommand::UpdateTransaction { .. } => "update_transaction",
            OrderCommand::RemoveTransaction { .. } => "delete_transaction",
            OrderCommand::SetAddress { role: AddressRole::Billing, .. } => "update_billing_address",
            OrderCommand::SetAddress { role: AddressRole::Shipping, .. } => "update_shipping_address",
            OrderCommand::Recalculate { .. } => "recalculate",
            OrderCommand::Checkout { .. } => "checkout",
            OrderCommand::Cancel { .. } => "cancel",
        }
    }
}

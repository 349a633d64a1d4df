use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::event_sourcing::core::Aggregate;
use super::addresses;
use super::commands::{NewOrder, OrderCommand, OrderPatch};
use super::discounts;
use super::errors::{OrderError, ValidationError};
use super::events::*;
use super::items;
use super::money::Currency;
use super::transactions;
use super::value_objects::{
    Address, AddressRole, Discount, OrderItem, OrderStatus, Totals, Transaction,
};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub version: i64,
    pub status: OrderStatus,

    // Header
    pub customer_id: Option<Uuid>,
    pub email: Option<String>,
    pub currency: Currency,
    pub notes: Option<String>,
    /// Lets settled payments exceed the grand total
    pub allow_overpayment: bool,

    // Owned parts
    pub items: Vec<OrderItem>,
    pub discounts: Vec<Discount>,
    pub transactions: Vec<Transaction>,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,

    /// Derived, only ever replaced through `TotalsRecalculated`
    pub totals: Totals,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub checked_out_at: Option<DateTime<Utc>>,
    pub cancelled_reason: Option<String>,
}

impl Order {
    /// Validate creation data into the order's first event
    pub fn initiate(new: &NewOrder, default_currency: &Currency) -> Result<OrderEvent, OrderError> {
        let currency = match new.currency.as_deref() {
            Some(code) => Currency::parse(code)?,
            None => default_currency.clone(),
        };
        if let Some(email) = &new.email {
            validate_email(email)?;
        }

        Ok(OrderEvent::Created(OrderCreated {
            customer_id: new.customer_id,
            email: new.email.clone(),
            currency,
            notes: new.notes.clone(),
            allow_overpayment: new.allow_overpayment,
            created_at: Utc::now(),
        }))
    }

    pub fn item(&self, item_id: Uuid) -> Option<&OrderItem> {
        items::find(&self.items, item_id)
    }

    pub fn discount(&self, discount_id: Uuid) -> Option<&Discount> {
        self.discounts.iter().find(|d| d.id == discount_id)
    }

    pub fn transaction(&self, transaction_id: Uuid) -> Option<&Transaction> {
        transactions::find(&self.transactions, transaction_id)
    }

    /// Items, discounts and addresses only change while in `Draft`
    pub fn ensure_draft(&self, operation: &'static str) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::InvalidState { operation, status: self.status });
        }
        Ok(())
    }

    /// The transaction ledger stays open after checkout (refunds) but closes
    /// on cancellation
    fn ensure_ledger_open(&self, operation: &'static str) -> Result<(), OrderError> {
        match self.status {
            OrderStatus::Cancelled => Err(OrderError::InvalidState { operation, status: self.status }),
            OrderStatus::Draft | OrderStatus::CheckedOut => Ok(()),
        }
    }

    /// Cross-entity rules that must hold before anything is committed
    pub fn verify_invariants(&self) -> Result<(), OrderError> {
        transactions::verify(&self.transactions, self.totals.grand_total, self.allow_overpayment)?;
        Ok(())
    }

    fn header_events(&self, patch: &OrderPatch) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_draft("update")?;
        if let Some(email) = &patch.email {
            validate_email(email)?;
        }

        let unchanged = patch.customer_id.is_none()
            && patch.email.is_none()
            && patch.notes.is_none()
            && patch.allow_overpayment.is_none();
        if unchanged {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::HeaderUpdated(OrderHeaderUpdated {
            customer_id: patch.customer_id,
            email: patch.email.clone(),
            notes: patch.notes.clone(),
            allow_overpayment: patch.allow_overpayment,
        })])
    }
}

fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidEmail(email.to_string())),
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for Order {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_first_event(aggregate_id: Uuid, event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            OrderEvent::Created(e) => Ok(Self {
                id: aggregate_id,
                version: 0,
                status: OrderStatus::Draft,
                customer_id: e.customer_id,
                email: e.email.clone(),
                currency: e.currency.clone(),
                notes: e.notes.clone(),
                allow_overpayment: e.allow_overpayment,
                items: Vec::new(),
                discounts: Vec::new(),
                transactions: Vec::new(),
                billing_address: None,
                shipping_address: None,
                totals: Totals::default(),
                created_at: e.created_at,
                updated_at: e.created_at,
                checked_out_at: None,
                cancelled_reason: None,
            }),
            _ => Err(OrderError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            OrderEvent::Created(_) => {
                // First event already applied
            }
            OrderEvent::HeaderUpdated(e) => {
                if let Some(customer_id) = e.customer_id {
                    self.customer_id = Some(customer_id);
                }
                if let Some(email) = &e.email {
                    self.email = Some(email.clone());
                }
                if let Some(notes) = &e.notes {
                    self.notes = Some(notes.clone());
                }
                if let Some(allow) = e.allow_overpayment {
                    self.allow_overpayment = allow;
                }
            }
            OrderEvent::ItemAdded(e) => self.items.push(e.item.clone()),
            OrderEvent::ItemUpdated(e) => {
                let slot = self.items.iter_mut().find(|item| item.id == e.item.id)
                    .ok_or(OrderError::ItemNotFound(e.item.id))?;
                *slot = e.item.clone();
            }
            OrderEvent::ItemRemoved(e) => self.items.retain(|item| item.id != e.item_id),
            OrderEvent::DiscountAdded(e) => self.discounts.push(e.discount.clone()),
            OrderEvent::DiscountUpdated(e) => {
                let slot = self.discounts.iter_mut().find(|d| d.id == e.discount.id)
                    .ok_or(OrderError::DiscountNotFound(e.discount.id))?;
                *slot = e.discount.clone();
            }
            OrderEvent::DiscountRemoved(e) => self.discounts.retain(|d| d.id != e.discount_id),
            OrderEvent::TransactionAdded(e) => self.transactions.push(e.transaction.clone()),
            OrderEvent::TransactionUpdated(e) => {
                let slot = self.transactions.iter_mut().find(|tx| tx.id == e.transaction.id)
                    .ok_or(OrderError::TransactionNotFound(e.transaction.id))?;
                *slot = e.transaction.clone();
            }
            OrderEvent::TransactionRemoved(e) => {
                self.transactions.retain(|tx| tx.id != e.transaction_id)
            }
            OrderEvent::AddressSet(e) => match e.address.role {
                AddressRole::Billing => self.billing_address = Some(e.address.clone()),
                AddressRole::Shipping => self.shipping_address = Some(e.address.clone()),
            },
            OrderEvent::TotalsRecalculated(e) => self.totals = e.totals.clone(),
            OrderEvent::CheckedOut(e) => {
                self.status = OrderStatus::CheckedOut;
                self.checked_out_at = Some(e.checked_out_at);
            }
            OrderEvent::Cancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.cancelled_reason = e.reason.clone();
            }
        }
        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::UpdateHeader(patch) => self.header_events(patch),

            OrderCommand::AddItem { item_id, spec } => {
                self.ensure_draft("add an item to")?;
                let item = items::build_item(*item_id, spec)?;
                Ok(vec![OrderEvent::ItemAdded(ItemAdded { item })])
            }

            OrderCommand::UpdateItem { item_id, patch } => {
                self.ensure_draft("update an item of")?;
                let current = self.item(*item_id).ok_or(OrderError::ItemNotFound(*item_id))?;
                let item = items::patch_item(current, patch)?;
                Ok(vec![OrderEvent::ItemUpdated(ItemUpdated { item })])
            }

            OrderCommand::RemoveItem { item_id } => {
                self.ensure_draft("delete an item from")?;
                if self.item(*item_id).is_none() {
                    return Err(OrderError::ItemNotFound(*item_id));
                }
                Ok(vec![OrderEvent::ItemRemoved(ItemRemoved { item_id: *item_id })])
            }

            OrderCommand::AddDiscount { discount_id, spec } => {
                self.ensure_draft("add a discount to")?;
                let discount = discounts::build_discount(*discount_id, spec, &self.items, Utc::now())?;
                Ok(vec![OrderEvent::DiscountAdded(DiscountAdded { discount })])
            }

            OrderCommand::UpdateDiscount { discount_id, patch } => {
                self.ensure_draft("update a discount of")?;
                let current = self.discount(*discount_id)
                    .ok_or(OrderError::DiscountNotFound(*discount_id))?;
                let discount = discounts::patch_discount(current, patch, &self.items)?;
                Ok(vec![OrderEvent::DiscountUpdated(DiscountUpdated { discount })])
            }

            OrderCommand::RemoveDiscount { discount_id } => {
                self.ensure_draft("delete a discount from")?;
                if self.discount(*discount_id).is_none() {
                    return Err(OrderError::DiscountNotFound(*discount_id));
                }
                Ok(vec![OrderEvent::DiscountRemoved(DiscountRemoved { discount_id: *discount_id })])
            }

            OrderCommand::AddTransaction { transaction_id, spec } => {
                self.ensure_ledger_open("add a transaction to")?;
                let transaction = transactions::build_transaction(*transaction_id, spec, Utc::now())?;
                Ok(vec![OrderEvent::TransactionAdded(TransactionAdded { transaction })])
            }

            OrderCommand::UpdateTransaction { transaction_id, patch } => {
                self.ensure_ledger_open("update a transaction of")?;
                let current = self.transaction(*transaction_id)
                    .ok_or(OrderError::TransactionNotFound(*transaction_id))?;
                let transaction = transactions::patch_transaction(current, patch)?;
                Ok(vec![OrderEvent::TransactionUpdated(TransactionUpdated { transaction })])
            }

            OrderCommand::RemoveTransaction { transaction_id } => {
                self.ensure_ledger_open("delete a transaction from")?;
                let current = self.transaction(*transaction_id)
                    .ok_or(OrderError::TransactionNotFound(*transaction_id))?;
                transactions::ensure_pending(current)?;
                Ok(vec![OrderEvent::TransactionRemoved(TransactionRemoved {
                    transaction_id: *transaction_id,
                })])
            }

            OrderCommand::SetAddress { address_id, role, spec } => {
                self.ensure_draft("change the address of")?;
                let address = addresses::build_address(*address_id, *role, spec)?;
                Ok(vec![OrderEvent::AddressSet(AddressSet { address })])
            }

            OrderCommand::Recalculate { totals } => {
                Ok(vec![OrderEvent::TotalsRecalculated(TotalsRecalculated { totals: totals.clone() })])
            }

            OrderCommand::Checkout { totals } => {
                self.ensure_draft("check out")?;
                if self.items.is_empty() {
                    return Err(OrderError::EmptyOrder);
                }
                if totals.grand_total.is_negative() {
                    return Err(ValidationError::NegativeAmount {
                        field: "grand_total",
                        amount: totals.grand_total.amount(),
                    }
                    .into());
                }

                Ok(vec![
                    OrderEvent::TotalsRecalculated(TotalsRecalculated { totals: totals.clone() }),
                    OrderEvent::CheckedOut(OrderCheckedOut { checked_out_at: Utc::now() }),
                ])
            }

            OrderCommand::Cancel { reason } => {
                self.ensure_draft("cancel")?;
                Ok(vec![OrderEvent::Cancelled(OrderCancelled {
                    reason: reason.clone(),
                    cancelled_at: Utc::now(),
                })])
            }
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::commands::{AddressSpec, ItemSpec, TransactionPatch, TransactionSpec};
    use crate::domain::order::value_objects::{TransactionStatus, TransactionType};
    use rust_decimal::Decimal;

    fn usd() -> Currency {
        Currency::parse("USD").unwrap()
    }

    fn draft() -> Order {
        let created = Order::initiate(&NewOrder::default(), &usd()).unwrap();
        Order::apply_first_event(Uuid::new_v4(), &created).unwrap()
    }

    fn execute(order: &mut Order, command: OrderCommand) -> Result<(), OrderError> {
        for event in order.handle_command(&command)? {
            order.apply_event(&event)?;
        }
        Ok(())
    }

    fn add_item(order: &mut Order) -> Uuid {
        let item_id = Uuid::new_v4();
        execute(
            order,
            OrderCommand::AddItem {
                item_id,
                spec: ItemSpec {
                    product_ref: "SKU-1".into(),
                    name: None,
                    unit_price: Decimal::new(1000, 2),
                    quantity: 2,
                },
            },
        )
        .unwrap();
        item_id
    }

    fn checkout(order: &mut Order) -> Result<(), OrderError> {
        let totals = order.totals.clone();
        execute(order, OrderCommand::Checkout { totals })
    }

    #[test]
    fn test_new_order_is_empty_draft() {
        let order = draft();
        assert_eq!(order.status, OrderStatus::Draft);
        assert!(order.items.is_empty() && order.discounts.is_empty() && order.transactions.is_empty());
        assert_eq!(order.currency.code(), "USD");
    }

    #[test]
    fn test_initiate_validates_header() {
        let bad_email = NewOrder { email: Some("nobody".into()), ..Default::default() };
        assert!(matches!(
            Order::initiate(&bad_email, &usd()),
            Err(OrderError::Validation(ValidationError::InvalidEmail(_)))
        ));

        let bad_currency = NewOrder { currency: Some("dollars".into()), ..Default::default() };
        assert!(matches!(
            Order::initiate(&bad_currency, &usd()),
            Err(OrderError::Validation(ValidationError::InvalidCurrency(_)))
        ));
    }

    #[test]
    fn test_checkout_requires_items() {
        let mut order = draft();
        assert!(matches!(checkout(&mut order), Err(OrderError::EmptyOrder)));
        assert_eq!(order.status, OrderStatus::Draft);
    }

    #[test]
    fn test_checked_out_order_is_frozen() {
        let mut order = draft();
        let item_id = add_item(&mut order);
        checkout(&mut order).unwrap();
        assert_eq!(order.status, OrderStatus::CheckedOut);
        assert!(order.checked_out_at.is_some());

        let frozen = [
            OrderCommand::AddItem {
                item_id: Uuid::new_v4(),
                spec: ItemSpec { product_ref: "X".into(), name: None, unit_price: Decimal::ONE, quantity: 1 },
            },
            OrderCommand::UpdateItem { item_id, patch: Default::default() },
            OrderCommand::RemoveItem { item_id },
            OrderCommand::SetAddress {
                address_id: Uuid::new_v4(),
                role: AddressRole::Billing,
                spec: AddressSpec::default(),
            },
            OrderCommand::UpdateHeader(OrderPatch::default()),
            OrderCommand::Cancel { reason: None },
        ];
        for command in frozen {
            assert!(
                matches!(order.handle_command(&command), Err(OrderError::InvalidState { .. })),
                "{} should be rejected after checkout",
                command.name()
            );
        }

        assert!(matches!(checkout(&mut order), Err(OrderError::InvalidState { .. })));
    }

    #[test]
    fn test_refunds_allowed_after_checkout_but_not_after_cancel() {
        let mut order = draft();
        add_item(&mut order);
        checkout(&mut order).unwrap();

        let refund = OrderCommand::AddTransaction {
            transaction_id: Uuid::new_v4(),
            spec: TransactionSpec {
                kind: TransactionType::Refund,
                amount: Decimal::ONE,
                status: TransactionStatus::Pending,
                reference: None,
            },
        };
        assert!(order.handle_command(&refund).is_ok());

        let mut cancelled = draft();
        execute(&mut cancelled, OrderCommand::Cancel { reason: Some("changed mind".into()) }).unwrap();
        assert_eq!(cancelled.cancelled_reason.as_deref(), Some("changed mind"));
        assert!(matches!(
            cancelled.handle_command(&refund),
            Err(OrderError::InvalidState { status: OrderStatus::Cancelled, .. })
        ));
    }

    #[test]
    fn test_settled_transaction_cannot_be_removed() {
        let mut order = draft();
        let transaction_id = Uuid::new_v4();
        execute(
            &mut order,
            OrderCommand::AddTransaction {
                transaction_id,
                spec: TransactionSpec {
                    kind: TransactionType::Charge,
                    amount: Decimal::ONE,
                    status: TransactionStatus::Settled,
                    reference: None,
                },
            },
        )
        .unwrap();

        assert!(matches!(
            order.handle_command(&OrderCommand::RemoveTransaction { transaction_id }),
            Err(OrderError::TransactionFinalized { .. })
        ));
        assert!(matches!(
            order.handle_command(&OrderCommand::UpdateTransaction {
                transaction_id,
                patch: TransactionPatch::default(),
            }),
            Err(OrderError::TransactionFinalized { .. })
        ));
    }

    #[test]
    fn test_missing_sub_entities_are_not_found() {
        let order = draft();
        let missing = Uuid::new_v4();
        assert!(matches!(
            order.handle_command(&OrderCommand::RemoveItem { item_id: missing }),
            Err(OrderError::ItemNotFound(id)) if id == missing
        ));
        assert!(matches!(
            order.handle_command(&OrderCommand::RemoveDiscount { discount_id: missing }),
            Err(OrderError::DiscountNotFound(_))
        ));
        assert!(matches!(
            order.handle_command(&OrderCommand::RemoveTransaction { transaction_id: missing }),
            Err(OrderError::TransactionNotFound(_))
        ));
    }

    #[test]
    fn test_empty_header_patch_emits_nothing() {
        let order = draft();
        let events = order.handle_command(&OrderCommand::UpdateHeader(OrderPatch::default())).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_address_replaced_wholesale() {
        let mut order = draft();
        let spec = AddressSpec {
            name: "A".into(),
            line1: "1 Road".into(),
            line2: Some("Flat 2".into()),
            city: "Town".into(),
            postal_code: "123".into(),
            country: "US".into(),
            ..Default::default()
        };
        execute(&mut order, OrderCommand::SetAddress { address_id: Uuid::new_v4(), role: AddressRole::Shipping, spec: spec.clone() }).unwrap();

        let replacement = AddressSpec { line2: None, ..spec };
        execute(&mut order, OrderCommand::SetAddress { address_id: Uuid::new_v4(), role: AddressRole::Shipping, spec: replacement }).unwrap();

        let shipping = order.shipping_address.as_ref().unwrap();
        assert_eq!(shipping.line2, None);
        assert!(order.billing_address.is_none());
    }
}

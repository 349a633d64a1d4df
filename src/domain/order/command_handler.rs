use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::event_sourcing::core::{envelope_all, Aggregate, EventEnvelope};
use crate::event_sourcing::store::Repository;
use crate::fulfillment::{FulfillmentDispatcher, FulfillmentRequest};
use crate::metrics::OrderMetrics;
use crate::utils::{retry_on_transient, IsTransient, RetryConfig};

use super::aggregate::Order;
use super::commands::*;
use super::errors::OrderError;
use super::events::{OrderEvent, TotalsRecalculated};
use super::money::Currency;
use super::pricing::PricingPolicy;
use super::value_objects::{Address, AddressRole, Discount, OrderItem, OrderStatus, Transaction};

// ============================================================================
// Order Service - Command handling for the order aggregate
// ============================================================================
//
// Orchestrates: Load → Command → Events → Reprice → Verify → Save
//
// Every state change is one read-modify-write against the repository's
// optimistic version check. A lost race discards the attempt and re-runs it
// against fresh state. Commands carry their generated ids, so a re-run
// creates entities under the same ids.
//
// ============================================================================

/// Filters for `OrderService::list`. Results are ordered by creation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl OrderQuery {
    fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |status| order.status == status)
            && self.customer_id.map_or(true, |customer| order.customer_id == Some(customer))
    }
}

pub struct OrderService {
    repository: Arc<dyn Repository<Order>>,
    pricing: PricingPolicy,
    fulfillment: FulfillmentDispatcher,
    metrics: Arc<OrderMetrics>,
    retry: RetryConfig,
    default_currency: Currency,
}

impl OrderService {
    pub fn new(
        repository: Arc<dyn Repository<Order>>,
        fulfillment: FulfillmentDispatcher,
        metrics: Arc<OrderMetrics>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            repository,
            pricing: config.pricing.policy(),
            fulfillment,
            metrics,
            retry: config.conflicts.retry_config(),
            default_currency: config.default_currency.clone(),
        }
    }

    /// Replace the configured flat-rate pricing.
    pub fn with_pricing(mut self, pricing: PricingPolicy) -> Self {
        self.pricing = pricing;
        self
    }

    // ========================================================================
    // Order lifecycle
    // ========================================================================

    pub async fn create(&self, new: NewOrder) -> Result<Order, OrderError> {
        let order_id = Uuid::now_v7();
        let correlation_id = Uuid::new_v4();

        self.run("create", order_id, correlation_id, self.create_once(order_id, &new, correlation_id))
            .await
    }

    async fn create_once(&self, order_id: Uuid, new: &NewOrder, correlation_id: Uuid) -> Result<Order, OrderError> {
        let created = Order::initiate(new, &self.default_currency)?;
        let mut order = Order::apply_first_event(order_id, &created)?;
        let mut events = vec![created];
        self.settle(&mut order, &mut events)?;
        self.commit(order, 0, events, correlation_id).await
    }

    pub async fn get(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.repository
            .load(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    pub async fn list(&self, query: &OrderQuery) -> Result<Vec<Order>, OrderError> {
        let mut orders: Vec<Order> = self
            .repository
            .list()
            .await?
            .into_iter()
            .filter(|order| query.matches(order))
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(orders
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Header fields only
    pub async fn update(&self, order_id: Uuid, patch: OrderPatch) -> Result<Order, OrderError> {
        self.execute(order_id, "update_order", move |_| OrderCommand::UpdateHeader(patch.clone()))
            .await
    }

    /// Remove a `Draft` order together with its journal
    pub async fn delete(&self, order_id: Uuid) -> Result<(), OrderError> {
        let correlation_id = Uuid::new_v4();
        let this = self;

        self.run("delete", order_id, correlation_id, async {
            retry_on_transient(&self.retry, move |_attempt| async move {
                this.delete_once(order_id)
                    .await
                    .map_err(|e| this.note_conflict("delete", e))
            })
            .await
            .into_result()
        })
        .await
    }

    async fn delete_once(&self, order_id: Uuid) -> Result<(), OrderError> {
        let current = self.get(order_id).await?;
        current.ensure_draft("delete")?;
        if self.repository.delete(order_id, current.version()).await? {
            Ok(())
        } else {
            Err(OrderError::NotFound(order_id))
        }
    }

    pub async fn recalculate(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let pricing = &self.pricing;
        self.execute(order_id, "recalculate", move |order| OrderCommand::Recalculate {
            totals: pricing.totals_for(order),
        })
        .await
    }

    /// Commit `CheckedOut`, then hand the order to fulfillment. Fulfillment
    /// runs in the background; this returns as soon as the commit lands.
    pub async fn checkout(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let correlation_id = Uuid::new_v4();
        let pricing = &self.pricing;
        let order = self
            .execute_correlated(order_id, "checkout", correlation_id, move |order| OrderCommand::Checkout {
                totals: pricing.totals_for(order),
            })
            .await?;

        self.metrics.record_checkout();
        match self.fulfillment.dispatch(FulfillmentRequest::for_order(&order, correlation_id)) {
            Ok(()) => {
                self.metrics.record_fulfillment("dispatched");
                tracing::info!(
                    order_id = %order_id,
                    correlation_id = %correlation_id,
                    grand_total = %order.totals.grand_total,
                    "Order checked out, fulfillment requested"
                );
            }
            Err(e) => {
                // The order stays CheckedOut; only the hand-off failed
                self.metrics.record_fulfillment("failed");
                tracing::error!(
                    order_id = %order_id,
                    correlation_id = %correlation_id,
                    error = %e,
                    "Failed to dispatch fulfillment request"
                );
            }
        }

        Ok(order)
    }

    pub async fn cancel(&self, order_id: Uuid, reason: Option<String>) -> Result<Order, OrderError> {
        self.execute(order_id, "cancel", move |_| OrderCommand::Cancel { reason: reason.clone() })
            .await
    }

    /// Full journal, oldest first
    pub async fn events(&self, order_id: Uuid) -> Result<Vec<EventEnvelope<OrderEvent>>, OrderError> {
        let events = self.repository.load_events(order_id).await?;
        if events.is_empty() {
            return Err(OrderError::NotFound(order_id));
        }
        Ok(events)
    }

    // ========================================================================
    // Items
    // ========================================================================

    pub async fn add_item(&self, order_id: Uuid, spec: ItemSpec) -> Result<OrderItem, OrderError> {
        let item_id = Uuid::new_v4();
        let order = self
            .execute(order_id, "add_item", move |_| OrderCommand::AddItem { item_id, spec: spec.clone() })
            .await?;
        order.item(item_id).cloned().ok_or(OrderError::ItemNotFound(item_id))
    }

    pub async fn update_item(&self, order_id: Uuid, item_id: Uuid, patch: ItemPatch) -> Result<OrderItem, OrderError> {
        let order = self
            .execute(order_id, "update_item", move |_| OrderCommand::UpdateItem { item_id, patch: patch.clone() })
            .await?;
        order.item(item_id).cloned().ok_or(OrderError::ItemNotFound(item_id))
    }

    pub async fn delete_item(&self, order_id: Uuid, item_id: Uuid) -> Result<(), OrderError> {
        self.execute(order_id, "delete_item", move |_| OrderCommand::RemoveItem { item_id })
            .await
            .map(|_| ())
    }

    // ========================================================================
    // Discounts
    // ========================================================================

    pub async fn add_discount(&self, order_id: Uuid, spec: DiscountSpec) -> Result<Discount, OrderError> {
        let discount_id = Uuid::new_v4();
        let order = self
            .execute(order_id, "add_discount", move |_| OrderCommand::AddDiscount {
                discount_id,
                spec: spec.clone(),
            })
            .await?;
        order.discount(discount_id).cloned().ok_or(OrderError::DiscountNotFound(discount_id))
    }

    pub async fn update_discount(
        &self,
        order_id: Uuid,
        discount_id: Uuid,
        patch: DiscountPatch,
    ) -> Result<Discount, OrderError> {
        let order = self
            .execute(order_id, "update_discount", move |_| OrderCommand::UpdateDiscount {
                discount_id,
                patch: patch.clone(),
            })
            .await?;
        order.discount(discount_id).cloned().ok_or(OrderError::DiscountNotFound(discount_id))
    }

    pub async fn delete_discount(&self, order_id: Uuid, discount_id: Uuid) -> Result<(), OrderError> {
        self.execute(order_id, "delete_discount", move |_| OrderCommand::RemoveDiscount { discount_id })
            .await
            .map(|_| ())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    pub async fn add_transaction(&self, order_id: Uuid, spec: TransactionSpec) -> Result<Transaction, OrderError> {
        let transaction_id = Uuid::new_v4();
        let order = self
            .execute(order_id, "add_transaction", move |_| OrderCommand::AddTransaction {
                transaction_id,
                spec: spec.clone(),
            })
            .await?;
        order.transaction(transaction_id).cloned().ok_or(OrderError::TransactionNotFound(transaction_id))
    }

    pub async fn update_transaction(
        &self,
        order_id: Uuid,
        transaction_id: Uuid,
        patch: TransactionPatch,
    ) -> Result<Transaction, OrderError> {
        let order = self
            .execute(order_id, "update_transaction", move |_| OrderCommand::UpdateTransaction {
                transaction_id,
                patch: patch.clone(),
            })
            .await?;
        order.transaction(transaction_id).cloned().ok_or(OrderError::TransactionNotFound(transaction_id))
    }

    pub async fn delete_transaction(&self, order_id: Uuid, transaction_id: Uuid) -> Result<(), OrderError> {
        self.execute(order_id, "delete_transaction", move |_| OrderCommand::RemoveTransaction { transaction_id })
            .await
            .map(|_| ())
    }

    // ========================================================================
    // Addresses
    // ========================================================================

    pub async fn update_billing_address(&self, order_id: Uuid, spec: AddressSpec) -> Result<Address, OrderError> {
        self.set_address(order_id, AddressRole::Billing, spec).await
    }

    pub async fn update_shipping_address(&self, order_id: Uuid, spec: AddressSpec) -> Result<Address, OrderError> {
        self.set_address(order_id, AddressRole::Shipping, spec).await
    }

    async fn set_address(&self, order_id: Uuid, role: AddressRole, spec: AddressSpec) -> Result<Address, OrderError> {
        let address_id = Uuid::new_v4();
        let name = match role {
            AddressRole::Billing => "update_billing_address",
            AddressRole::Shipping => "update_shipping_address",
        };
        let order = self
            .execute(order_id, name, move |_| OrderCommand::SetAddress { address_id, role, spec: spec.clone() })
            .await?;

        let address = match role {
            AddressRole::Billing => order.billing_address,
            AddressRole::Shipping => order.shipping_address,
        };
        address.ok_or(OrderError::NotInitialized)
    }

    // ========================================================================
    // Command pipeline
    // ========================================================================

    async fn execute<F>(&self, order_id: Uuid, command: &'static str, make_command: F) -> Result<Order, OrderError>
    where
        F: Fn(&Order) -> OrderCommand,
    {
        self.execute_correlated(order_id, command, Uuid::new_v4(), make_command).await
    }

    async fn execute_correlated<F>(
        &self,
        order_id: Uuid,
        command: &'static str,
        correlation_id: Uuid,
        make_command: F,
    ) -> Result<Order, OrderError>
    where
        F: Fn(&Order) -> OrderCommand,
    {
        let this = self;
        let make_command = &make_command;

        self.run(command, order_id, correlation_id, async {
            retry_on_transient(&self.retry, move |_attempt| async move {
                this.attempt(order_id, make_command, correlation_id)
                    .await
                    .map_err(|e| this.note_conflict(command, e))
            })
            .await
            .into_result()
        })
        .await
    }

    /// One read-modify-write. Nothing is written unless every step succeeds.
    async fn attempt<F>(&self, order_id: Uuid, make_command: &F, correlation_id: Uuid) -> Result<Order, OrderError>
    where
        F: Fn(&Order) -> OrderCommand,
    {
        let current = self.get(order_id).await?;
        let expected_version = current.version();

        let command = make_command(&current);
        let mut events = current.handle_command(&command)?;
        if events.is_empty() {
            return Ok(current);
        }

        let mut next = current;
        for event in &events {
            next.apply_event(event)?;
        }
        self.settle(&mut next, &mut events)?;

        self.commit(next, expected_version, events, correlation_id).await
    }

    /// Bring totals in line with the order's parts and check the
    /// cross-entity invariants.
    fn settle(&self, order: &mut Order, events: &mut Vec<OrderEvent>) -> Result<(), OrderError> {
        let totals = self.pricing.totals_for(order);
        if totals != order.totals {
            let repriced = OrderEvent::TotalsRecalculated(TotalsRecalculated { totals });
            order.apply_event(&repriced)?;
            events.push(repriced);
        }
        order.verify_invariants()
    }

    async fn commit(
        &self,
        mut order: Order,
        expected_version: i64,
        events: Vec<OrderEvent>,
        correlation_id: Uuid,
    ) -> Result<Order, OrderError> {
        let envelopes = envelope_all(order.id, expected_version, events, correlation_id);
        if let Some(last) = envelopes.last() {
            order.touch(last.timestamp);
        }

        let version = self.repository.save(&order, expected_version, envelopes).await?;
        order.set_version(version);

        tracing::debug!(
            order_id = %order.id,
            version = version,
            status = ?order.status,
            grand_total = %order.totals.grand_total,
            "Order committed"
        );
        Ok(order)
    }

    fn note_conflict(&self, command: &'static str, error: OrderError) -> OrderError {
        if error.is_transient() {
            self.metrics.record_conflict(command);
        }
        error
    }

    /// Run `operation` inside the command's span and record its outcome.
    async fn run<T, Fut>(&self, command: &'static str, order_id: Uuid, correlation_id: Uuid, operation: Fut) -> Result<T, OrderError>
    where
        Fut: Future<Output = Result<T, OrderError>>,
    {
        let span = tracing::info_span!(
            "order_command",
            command = command,
            order_id = %order_id,
            correlation_id = %correlation_id
        );
        let started = Instant::now();
        let result = operation.instrument(span.clone()).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind().as_str(),
        };
        self.metrics.record_command(command, outcome, started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            span.in_scope(|| tracing::warn!(error = %e, kind = outcome, "Command rejected"));
        }
        result
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

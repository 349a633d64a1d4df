use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::domain::order::{Currency, Money, Order};
use crate::metrics::OrderMetrics;
use crate::utils::{retry_on_transient, IsTransient, RetryConfig, RetryResult};

// ============================================================================
// Fulfillment - Post-checkout hand-off to the fulfillment side
// ============================================================================
//
// Checkout commits first and only then queues a request here. The worker
// owns the slow part (the gateway call) so checkout never waits on it.
//
// Flow:
// 1. OrderService commits the CheckedOut state
// 2. FulfillmentDispatcher::dispatch pushes a request onto the channel
// 3. The worker task calls the gateway, retrying transient failures
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentRequest {
    pub order_id: Uuid,
    pub correlation_id: Uuid,
    pub grand_total: Money,
    pub currency: Currency,
    pub item_count: u64,
    pub requested_at: DateTime<Utc>,
}

impl FulfillmentRequest {
    pub fn for_order(order: &Order, correlation_id: Uuid) -> Self {
        Self {
            order_id: order.id,
            correlation_id,
            grand_total: order.totals.grand_total,
            currency: order.currency.clone(),
            item_count: order.items.iter().map(|item| u64::from(item.quantity.get())).sum(),
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentReceipt {
    pub order_id: Uuid,
    pub reference: String,
    pub fulfilled_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    #[error("Fulfillment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Fulfillment rejected: {0}")]
    Rejected(String),

    #[error("Fulfillment worker is not running")]
    Closed,
}

impl IsTransient for FulfillmentError {
    fn is_transient(&self) -> bool {
        matches!(self, FulfillmentError::Unavailable(_))
    }
}

#[async_trait]
pub trait FulfillmentGateway: Send + Sync {
    async fn fulfill(&self, request: &FulfillmentRequest) -> Result<FulfillmentReceipt, FulfillmentError>;
}

/// Stand-in gateway that takes `latency` to accept every request.
pub struct SimulatedGateway {
    latency: Duration,
}

impl SimulatedGateway {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl FulfillmentGateway for SimulatedGateway {
    async fn fulfill(&self, request: &FulfillmentRequest) -> Result<FulfillmentReceipt, FulfillmentError> {
        tokio::time::sleep(self.latency).await;
        Ok(FulfillmentReceipt {
            order_id: request.order_id,
            reference: format!("FUL-{}", Uuid::new_v4().simple()),
            fulfilled_at: Utc::now(),
        })
    }
}

// ============================================================================
// Dispatcher & Worker
// ============================================================================

#[derive(Clone)]
pub struct FulfillmentDispatcher {
    sender: mpsc::UnboundedSender<FulfillmentRequest>,
}

impl FulfillmentDispatcher {
    /// Start the worker. It runs until every dispatcher clone is dropped, then
    /// finishes the requests already in flight.
    pub fn spawn(
        gateway: Arc<dyn FulfillmentGateway>,
        retry: RetryConfig,
        metrics: Arc<OrderMetrics>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(receiver, gateway, retry, metrics));
        (Self { sender }, worker)
    }

    pub fn dispatch(&self, request: FulfillmentRequest) -> Result<(), FulfillmentError> {
        self.sender.send(request).map_err(|_| FulfillmentError::Closed)
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<FulfillmentRequest>,
    gateway: Arc<dyn FulfillmentGateway>,
    retry: RetryConfig,
    metrics: Arc<OrderMetrics>,
) {
    tracing::info!("Fulfillment worker started");
    let mut in_flight = JoinSet::new();

    while let Some(request) = receiver.recv().await {
        let gateway = gateway.clone();
        let retry = retry.clone();
        let metrics = metrics.clone();
        in_flight.spawn(async move { fulfill_one(gateway, retry, metrics, request).await });

        // Reap whatever already finished so the set stays small
        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
    tracing::info!("Fulfillment worker stopped");
}

async fn fulfill_one(
    gateway: Arc<dyn FulfillmentGateway>,
    retry: RetryConfig,
    metrics: Arc<OrderMetrics>,
    request: FulfillmentRequest,
) {
    let result = retry_on_transient(&retry, |attempt| {
        let gateway = gateway.clone();
        let request = request.clone();
        async move {
            tracing::debug!(order_id = %request.order_id, attempt = attempt, "Calling fulfillment gateway");
            gateway.fulfill(&request).await
        }
    })
    .await;

    match result {
        RetryResult::Success(receipt) => {
            metrics.record_fulfillment("fulfilled");
            tracing::info!(
                order_id = %request.order_id,
                correlation_id = %request.correlation_id,
                reference = %receipt.reference,
                "Order fulfilled"
            );
        }
        RetryResult::Failed(error) | RetryResult::PermanentFailure(error) => {
            metrics.record_fulfillment("failed");
            tracing::error!(
                order_id = %request.order_id,
                correlation_id = %request.correlation_id,
                error = %error,
                "Fulfillment failed"
            );
        }
    }
}

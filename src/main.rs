use std::sync::Arc;

use rust_decimal::Decimal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_core::domain::order::{
    AddressSpec, DiscountSpec, DiscountScope, DiscountValue, ItemSpec, NewOrder, Order,
    OrderQuery, OrderService, TransactionSpec, TransactionStatus, TransactionType,
};
use order_core::event_sourcing::InMemoryRepository;
use order_core::fulfillment::{FulfillmentDispatcher, SimulatedGateway};
use order_core::metrics::OrderMetrics;
use order_core::ServiceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real environment variables still apply
    let _ = dotenvy::dotenv();

    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_core=debug"))
        )
        .init();

    tracing::info!("🚀 Starting order service demo");

    // === 1. Configuration ===
    let config = ServiceConfig::from_env()?;
    tracing::info!(
        currency = %config.default_currency,
        tax_rate_percent = %config.pricing.tax_rate_percent,
        fulfillment_latency_ms = config.fulfillment.latency.as_millis() as u64,
        "Configuration loaded"
    );

    // === 2. Metrics ===
    let metrics = Arc::new(OrderMetrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. Fulfillment worker ===
    let gateway = Arc::new(SimulatedGateway::new(config.fulfillment.latency));
    let (dispatcher, fulfillment_worker) = FulfillmentDispatcher::spawn(
        gateway,
        config.fulfillment.retry_config(),
        metrics.clone(),
    );

    // === 4. Order service ===
    let repository = Arc::new(InMemoryRepository::<Order>::new());
    let service = OrderService::new(repository, dispatcher, metrics.clone(), &config);

    // === 5. Demonstrate full order lifecycle ===
    tracing::info!("📝 Demonstrating order lifecycle");

    let order = service
        .create(NewOrder {
            customer_id: Some(uuid::Uuid::new_v4()),
            email: Some("ada@example.com".to_string()),
            ..Default::default()
        })
        .await?;
    tracing::info!("✅ Order created: {}", order.id);

    service
        .add_item(order.id, ItemSpec {
            product_ref: "SKU-1001".to_string(),
            name: Some("Notebook".to_string()),
            unit_price: Decimal::new(1000, 2),
            quantity: 2,
        })
        .await?;

    service
        .add_discount(order.id, DiscountSpec {
            value: DiscountValue::Percentage(Decimal::TEN),
            applies_to: DiscountScope::WholeOrder,
            description: Some("Welcome discount".to_string()),
        })
        .await?;

    service
        .update_shipping_address(order.id, AddressSpec {
            name: "Ada Lovelace".to_string(),
            line1: "12 St James's Square".to_string(),
            city: "London".to_string(),
            postal_code: "SW1Y 4JH".to_string(),
            country: "GB".to_string(),
            ..Default::default()
        })
        .await?;

    let priced = service.recalculate(order.id).await?;
    tracing::info!(
        subtotal = %priced.totals.subtotal,
        discount_total = %priced.totals.discount_total,
        grand_total = %priced.totals.grand_total,
        "🧮 Totals recalculated"
    );

    service
        .add_transaction(order.id, TransactionSpec {
            kind: TransactionType::Charge,
            amount: priced.totals.grand_total.amount(),
            status: TransactionStatus::Settled,
            reference: Some("PAY-0001".to_string()),
        })
        .await?;

    let checked_out = service.checkout(order.id).await?;
    tracing::info!(
        status = ?checked_out.status,
        amount_due = %checked_out.totals.amount_due,
        "🛒 Order checked out"
    );

    // Items are frozen from here on
    if let Err(e) = service
        .add_item(order.id, ItemSpec {
            product_ref: "SKU-2002".to_string(),
            name: None,
            unit_price: Decimal::ONE,
            quantity: 1,
        })
        .await
    {
        tracing::info!(error = %e, "Expected rejection after checkout");
    }

    // A second order, cancelled while still a draft
    let abandoned = service.create(NewOrder::default()).await?;
    service.cancel(abandoned.id, Some("customer changed their mind".to_string())).await?;

    let journal = service.events(order.id).await?;
    tracing::info!("📜 Order {} has {} journaled events", order.id, journal.len());
    for envelope in &journal {
        tracing::debug!(sequence = envelope.sequence_number, event_type = %envelope.event_type, "Journal entry");
    }

    let all = service.list(&OrderQuery::default()).await?;
    tracing::info!("📦 {} orders in store", all.len());

    // === 6. Drain fulfillment before exiting ===
    tracing::info!("⏳ Waiting for fulfillment to finish");
    drop(service);
    fulfillment_worker.await?;

    println!("{}", metrics.render()?);
    tracing::info!("👋 Shutdown complete");

    Ok(())
}

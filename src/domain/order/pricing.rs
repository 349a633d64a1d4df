use std::sync::Arc;

use rust_decimal::Decimal;

use super::aggregate::Order;
use super::discounts;
use super::items;
use super::money::{Currency, Money};
use super::transactions;
use super::value_objects::{Address, Discount, OrderItem, OrderStatus, Totals, Transaction};

// ============================================================================
// Pricing - Tax/Shipping collaborator contracts and the totals derivation
// ============================================================================

/// Tax collaborator. Receives the discounted merchandise total.
pub trait TaxPolicy: Send + Sync {
    fn tax(&self, taxable: Money, ship_to: Option<&Address>) -> Money;
}

/// Shipping collaborator. Not consulted when a free-shipping discount applies.
pub trait ShippingPolicy: Send + Sync {
    fn shipping(&self, merchandise: Money, item_count: u64, ship_to: Option<&Address>) -> Money;
}

/// Single rate applied to every order, expressed in percent.
#[derive(Debug, Clone)]
pub struct FlatRateTax {
    pub rate_percent: Decimal,
}

impl TaxPolicy for FlatRateTax {
    fn tax(&self, taxable: Money, _ship_to: Option<&Address>) -> Money {
        Money::new(taxable.amount() * self.rate_percent / Decimal::ONE_HUNDRED)
    }
}

#[derive(Debug, Clone)]
pub struct FlatRateShipping {
    pub flat: Money,
    /// Merchandise total at or above which shipping is free.
    pub free_over: Option<Money>,
}

impl ShippingPolicy for FlatRateShipping {
    fn shipping(&self, merchandise: Money, item_count: u64, _ship_to: Option<&Address>) -> Money {
        if item_count == 0 {
            return Money::ZERO;
        }
        match self.free_over {
            Some(threshold) if merchandise >= threshold => Money::ZERO,
            _ => self.flat,
        }
    }
}

#[derive(Clone)]
pub struct PricingPolicy {
    tax: Arc<dyn TaxPolicy>,
    shipping: Arc<dyn ShippingPolicy>,
}

impl Default for PricingPolicy {
    /// No tax, no shipping charge.
    fn default() -> Self {
        Self::flat(Decimal::ZERO, Money::ZERO, None)
    }
}

impl PricingPolicy {
    pub fn new(tax: Arc<dyn TaxPolicy>, shipping: Arc<dyn ShippingPolicy>) -> Self {
        Self { tax, shipping }
    }

    pub fn flat(tax_rate_percent: Decimal, shipping_flat: Money, free_shipping_over: Option<Money>) -> Self {
        Self::new(
            Arc::new(FlatRateTax { rate_percent: tax_rate_percent }),
            Arc::new(FlatRateShipping { flat: shipping_flat, free_over: free_shipping_over }),
        )
    }

    /// Pure derivation of every figure from the order's parts.
    pub fn compute_totals(
        &self,
        items: &[OrderItem],
        discounts: &[Discount],
        transactions: &[Transaction],
        currency: &Currency,
        ship_to: Option<&Address>,
    ) -> Totals {
        let subtotal = items::subtotal(items);
        let outcome = discounts::apply(items, discounts);
        let merchandise = subtotal - outcome.total;

        let tax_total = self.tax.tax(merchandise, ship_to);
        let shipping_total = if outcome.free_shipping {
            Money::ZERO
        } else {
            let item_count = items.iter().map(|item| u64::from(item.quantity.get())).sum();
            self.shipping.shipping(merchandise, item_count, ship_to)
        };

        let subtotal = subtotal.round_to(currency);
        let discount_total = outcome.total.round_to(currency);
        let tax_total = tax_total.round_to(currency).clamp_non_negative();
        let shipping_total = shipping_total.round_to(currency).clamp_non_negative();
        let grand_total = subtotal - discount_total + tax_total + shipping_total;

        with_payments(
            Totals {
                subtotal,
                discount_total,
                tax_total,
                shipping_total,
                grand_total,
                ..Totals::default()
            },
            transactions,
            currency,
        )
    }

    /// Totals an order should carry right now. Draft orders are fully
    /// repriced; priced figures of finalized orders are frozen and only the
    /// payment position moves.
    pub fn totals_for(&self, order: &Order) -> Totals {
        match order.status {
            OrderStatus::Draft => self.compute_totals(
                &order.items,
                &order.discounts,
                &order.transactions,
                &order.currency,
                order.shipping_address.as_ref(),
            ),
            OrderStatus::CheckedOut | OrderStatus::Cancelled => {
                with_payments(order.totals.clone(), &order.transactions, &order.currency)
            }
        }
    }
}

/// Refresh `amount_paid`/`amount_due` against already-priced figures.
pub fn with_payments(priced: Totals, ledger: &[Transaction], currency: &Currency) -> Totals {
    let amount_paid = transactions::amount_paid(ledger).round_to(currency);
    Totals {
        amount_paid,
        amount_due: priced.grand_total - amount_paid,
        ..priced
    }
}

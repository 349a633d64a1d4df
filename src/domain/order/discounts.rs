use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::{DiscountPatch, DiscountSpec, DiscountValue};
use super::errors::ValidationError;
use super::items;
use super::money::Money;
use super::value_objects::{Discount, DiscountKind, DiscountScope, OrderItem};

// ============================================================================
// Discount Engine
// ============================================================================
//
// Application rules:
// 1. Discounts are considered in ascending creation order.
// 2. Every percentage is taken from the original (pre-discount) base of its
//    scope; percentages never compound.
// 3. Fixed amounts are subtracted after all percentages, each capped at the
//    total of the lines it targets.
// 4. Item-scoped deductions draw down what each targeted line has left, so
//    no line is ever discounted below zero.
// 5. The running discount total never exceeds the subtotal.
// 6. Free shipping only flags the shipping total; it deducts nothing here.
//    It always covers the whole order.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub discount_id: Uuid,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiscountOutcome {
    /// Unrounded sum of all applied deductions.
    pub total: Money,
    pub free_shipping: bool,
    pub applied: Vec<AppliedDiscount>,
}

pub fn build_discount(
    discount_id: Uuid,
    spec: &DiscountSpec,
    items: &[OrderItem],
    created_at: DateTime<Utc>,
) -> Result<Discount, ValidationError> {
    let kind = validate_value(&spec.value)?;
    validate_scope(&spec.applies_to, items)?;
    validate_combination(&kind, &spec.applies_to)?;

    Ok(Discount {
        id: discount_id,
        kind,
        applies_to: spec.applies_to.clone(),
        description: spec.description.clone(),
        created_at,
    })
}

/// Replacement discount for a patch. Creation time, and so application
/// order, is preserved.
pub fn patch_discount(
    current: &Discount,
    patch: &DiscountPatch,
    items: &[OrderItem],
) -> Result<Discount, ValidationError> {
    let kind = match &patch.value {
        Some(value) => validate_value(value)?,
        None => current.kind,
    };
    let applies_to = match &patch.applies_to {
        Some(scope) => {
            validate_scope(scope, items)?;
            scope.clone()
        }
        None => current.applies_to.clone(),
    };
    validate_combination(&kind, &applies_to)?;

    Ok(Discount {
        id: current.id,
        kind,
        applies_to,
        description: patch.description.clone().or_else(|| current.description.clone()),
        created_at: current.created_at,
    })
}

fn validate_value(value: &DiscountValue) -> Result<DiscountKind, ValidationError> {
    match value {
        DiscountValue::Percentage(pct) => {
            if *pct < Decimal::ZERO || *pct > Decimal::ONE_HUNDRED {
                return Err(ValidationError::PercentageOutOfRange(*pct));
            }
            Ok(DiscountKind::Percentage(*pct))
        }
        DiscountValue::FixedAmount(amount) => {
            Ok(DiscountKind::FixedAmount(Money::non_negative(*amount, "discount amount")?))
        }
        DiscountValue::FreeShipping => Ok(DiscountKind::FreeShipping),
    }
}

fn validate_scope(scope: &DiscountScope, items: &[OrderItem]) -> Result<(), ValidationError> {
    if let DiscountScope::Items(ids) = scope {
        if ids.is_empty() {
            return Err(ValidationError::EmptyDiscountScope);
        }
        if let Some(unknown) = ids.iter().find(|id| !items::contains(items, **id)) {
            return Err(ValidationError::UnknownItem(*unknown));
        }
    }
    Ok(())
}

fn validate_combination(kind: &DiscountKind, scope: &DiscountScope) -> Result<(), ValidationError> {
    match (kind, scope) {
        (DiscountKind::FreeShipping, DiscountScope::Items(_)) => Err(ValidationError::ScopedFreeShipping),
        _ => Ok(()),
    }
}

fn scope_base(scope: &DiscountScope, items: &[OrderItem]) -> Money {
    match scope {
        DiscountScope::WholeOrder => items::subtotal(items),
        DiscountScope::Items(ids) => items::subtotal_of(items, ids),
    }
}

/// Deduction of a single discount against the original line totals, before
/// any other discount is taken into account.
pub fn deduction(discount: &Discount, items: &[OrderItem]) -> Money {
    let base = scope_base(&discount.applies_to, items);
    match discount.kind {
        DiscountKind::Percentage(pct) => Money::new(base.amount() * pct / Decimal::ONE_HUNDRED),
        DiscountKind::FixedAmount(amount) => amount.min(base),
        DiscountKind::FreeShipping => Money::ZERO,
    }
}

/// Takes up to `wanted` from the targeted lines in item order. Each line gives
/// at most what it has left. Returns the amount actually taken.
fn draw_from_lines(items: &[OrderItem], remaining: &mut [Money], ids: &[Uuid], wanted: Money) -> Money {
    let mut taken = Money::ZERO;
    for (item, left) in items.iter().zip(remaining.iter_mut()) {
        if !ids.contains(&item.id) {
            continue;
        }
        let share = (wanted - taken).min(*left);
        *left = *left - share;
        taken = taken + share;
    }
    taken
}

pub fn apply(items: &[OrderItem], discounts: &[Discount]) -> DiscountOutcome {
    let subtotal = items::subtotal(items);

    let mut ordered: Vec<&Discount> = discounts.iter().collect();
    ordered.sort_by_key(|d| d.created_at);

    let mut remaining: Vec<Money> = items.iter().map(|item| item.unit_price.times(item.quantity)).collect();

    let mut outcome = DiscountOutcome::default();
    let percentages = ordered.iter().filter(|d| matches!(d.kind, DiscountKind::Percentage(_)));
    let fixed = ordered.iter().filter(|d| matches!(d.kind, DiscountKind::FixedAmount(_)));

    for discount in percentages.chain(fixed) {
        let headroom = (subtotal - outcome.total).clamp_non_negative();
        let wanted = deduction(discount, items).min(headroom);
        let amount = match &discount.applies_to {
            DiscountScope::WholeOrder => wanted,
            DiscountScope::Items(ids) => draw_from_lines(items, &mut remaining, ids, wanted),
        };
        outcome.total = outcome.total + amount;
        outcome.applied.push(AppliedDiscount { discount_id: discount.id, amount });
    }

    outcome.free_shipping = ordered.iter().any(|d| matches!(d.kind, DiscountKind::FreeShipping));
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::commands::ItemSpec;
    use chrono::Duration;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn item(price: &str, quantity: i64) -> OrderItem {
        items::build_item(
            Uuid::new_v4(),
            &ItemSpec {
                product_ref: "SKU".to_string(),
                name: None,
                unit_price: dec(price),
                quantity,
            },
        )
        .unwrap()
    }

    fn discount(value: DiscountValue, scope: DiscountScope, items: &[OrderItem], offset_secs: i64) -> Discount {
        let spec = DiscountSpec { value, applies_to: scope, description: None };
        build_discount(Uuid::new_v4(), &spec, items, Utc::now() + Duration::seconds(offset_secs)).unwrap()
    }

    #[test]
    fn test_percentage_of_whole_order() {
        let items = vec![item("10.00", 2)];
        let d = discount(DiscountValue::Percentage(dec("10")), DiscountScope::WholeOrder, &items, 0);

        let outcome = apply(&items, &[d]);
        assert_eq!(outcome.total.amount(), dec("2.00"));
        assert!(!outcome.free_shipping);
    }

    #[test]
    fn test_percentages_do_not_compound() {
        let items = vec![item("100", 1)];
        let a = discount(DiscountValue::Percentage(dec("10")), DiscountScope::WholeOrder, &items, 0);
        let b = discount(DiscountValue::Percentage(dec("10")), DiscountScope::WholeOrder, &items, 1);

        // 10% + 10% of the original 100, not 10 + 9.
        assert_eq!(apply(&items, &[a, b]).total.amount(), dec("20"));
    }

    #[test]
    fn test_percentage_applies_before_fixed_regardless_of_creation_order() {
        let items = vec![item("100", 1)];
        let fixed = discount(DiscountValue::FixedAmount(dec("30")), DiscountScope::WholeOrder, &items, 0);
        let pct = discount(DiscountValue::Percentage(dec("50")), DiscountScope::WholeOrder, &items, 1);

        let outcome = apply(&items, &[fixed.clone(), pct.clone()]);
        assert_eq!(outcome.total.amount(), dec("80"));
        assert_eq!(outcome.applied[0].discount_id, pct.id);
        assert_eq!(outcome.applied[1].discount_id, fixed.id);
    }

    #[test]
    fn test_fixed_amount_clamped_at_targeted_lines() {
        let cheap = item("5", 1);
        let other = item("50", 1);
        let items = vec![cheap.clone(), other];
        let d = discount(
            DiscountValue::FixedAmount(dec("20")),
            DiscountScope::Items(vec![cheap.id]),
            &items,
            0,
        );

        assert_eq!(apply(&items, &[d]).total.amount(), dec("5"));
    }

    #[test]
    fn test_stacked_item_discounts_never_exceed_their_line() {
        let a = item("10.00", 1);
        let b = item("100.00", 1);
        let items = vec![a.clone(), b];
        let only_a = || DiscountScope::Items(vec![a.id]);
        let discounts = vec![
            discount(DiscountValue::FixedAmount(dec("10")), only_a(), &items, 0),
            discount(DiscountValue::FixedAmount(dec("10")), only_a(), &items, 1),
            discount(DiscountValue::Percentage(dec("100")), only_a(), &items, 2),
        ];

        let outcome = apply(&items, &discounts);
        assert_eq!(outcome.total.amount(), dec("10.00"));
        // The percentage goes first and uses up line A; both fixed amounts get nothing.
        assert_eq!(outcome.applied[0].discount_id, discounts[2].id);
        assert_eq!(outcome.applied[1].amount, Money::ZERO);
        assert_eq!(outcome.applied[2].amount, Money::ZERO);
    }

    #[test]
    fn test_item_discounts_share_what_the_line_has_left() {
        let a = item("10.00", 1);
        let b = item("100.00", 1);
        let items = vec![a.clone(), b.clone()];
        let discounts = vec![
            discount(DiscountValue::FixedAmount(dec("4")), DiscountScope::Items(vec![a.id]), &items, 0),
            discount(DiscountValue::FixedAmount(dec("4")), DiscountScope::Items(vec![a.id]), &items, 1),
            discount(DiscountValue::Percentage(dec("50")), DiscountScope::Items(vec![a.id]), &items, 2),
            discount(DiscountValue::FixedAmount(dec("7")), DiscountScope::Items(vec![b.id]), &items, 3),
        ];

        let outcome = apply(&items, &discounts);
        let amounts: Vec<Decimal> = outcome.applied.iter().map(|d| d.amount.amount()).collect();
        assert_eq!(amounts, vec![dec("5.00"), dec("4"), dec("1.00"), dec("7")]);
        assert_eq!(outcome.total.amount(), dec("17.00"));
    }

    #[test]
    fn test_running_total_capped_at_subtotal() {
        let items = vec![item("10", 1)];
        let pct = discount(DiscountValue::Percentage(dec("100")), DiscountScope::WholeOrder, &items, 0);
        let fixed = discount(DiscountValue::FixedAmount(dec("3")), DiscountScope::WholeOrder, &items, 1);

        let outcome = apply(&items, &[pct, fixed]);
        assert_eq!(outcome.total.amount(), dec("10"));
        assert_eq!(outcome.applied[1].amount, Money::ZERO);
    }

    #[test]
    fn test_discount_never_exceeds_subtotal_for_any_mix() {
        let items = vec![item("19.99", 3), item("0.01", 7), item("250", 1)];
        let pcts = ["0", "12.5", "33.3", "100"];
        let fixeds = ["0", "0.01", "59.97", "1000"];

        for pct in pcts {
            for fixed in fixeds {
                let discounts = vec![
                    discount(DiscountValue::Percentage(dec(pct)), DiscountScope::WholeOrder, &items, 0),
                    discount(DiscountValue::FixedAmount(dec(fixed)), DiscountScope::WholeOrder, &items, 1),
                    discount(
                        DiscountValue::FixedAmount(dec(fixed)),
                        DiscountScope::Items(vec![items[1].id]),
                        &items,
                        2,
                    ),
                ];
                let outcome = apply(&items, &discounts);
                assert!(outcome.total <= items::subtotal(&items), "pct={pct} fixed={fixed}");
                assert!(!outcome.total.is_negative());
            }
        }
    }

    #[test]
    fn test_free_shipping_deducts_nothing() {
        let items = vec![item("10", 1)];
        let d = discount(DiscountValue::FreeShipping, DiscountScope::WholeOrder, &items, 0);

        let outcome = apply(&items, &[d]);
        assert!(outcome.free_shipping);
        assert_eq!(outcome.total, Money::ZERO);
    }

    #[test]
    fn test_validation() {
        let items = vec![item("10", 1)];
        let bad_pct = DiscountSpec {
            value: DiscountValue::Percentage(dec("100.01")),
            applies_to: DiscountScope::WholeOrder,
            description: None,
        };
        assert!(matches!(
            build_discount(Uuid::new_v4(), &bad_pct, &items, Utc::now()),
            Err(ValidationError::PercentageOutOfRange(_))
        ));

        let unknown = Uuid::new_v4();
        let bad_scope = DiscountSpec {
            value: DiscountValue::Percentage(dec("5")),
            applies_to: DiscountScope::Items(vec![unknown]),
            description: None,
        };
        assert_eq!(
            build_discount(Uuid::new_v4(), &bad_scope, &items, Utc::now()).unwrap_err(),
            ValidationError::UnknownItem(unknown)
        );

        let empty_scope = DiscountSpec {
            value: DiscountValue::FreeShipping,
            applies_to: DiscountScope::Items(vec![]),
            description: None,
        };
        assert!(build_discount(Uuid::new_v4(), &empty_scope, &items, Utc::now()).is_err());
    }

    #[test]
    fn test_free_shipping_cannot_target_items() {
        let items = vec![item("10", 1)];
        let scoped = DiscountSpec {
            value: DiscountValue::FreeShipping,
            applies_to: DiscountScope::Items(vec![items[0].id]),
            description: None,
        };
        assert_eq!(
            build_discount(Uuid::new_v4(), &scoped, &items, Utc::now()).unwrap_err(),
            ValidationError::ScopedFreeShipping
        );

        let pct = discount(DiscountValue::Percentage(dec("5")), DiscountScope::Items(vec![items[0].id]), &items, 0);
        let patch = DiscountPatch {
            value: Some(DiscountValue::FreeShipping),
            ..Default::default()
        };
        assert_eq!(patch_discount(&pct, &patch, &items).unwrap_err(), ValidationError::ScopedFreeShipping);
    }

    #[test]
    fn test_patch_keeps_creation_order() {
        let items = vec![item("10", 1)];
        let d = discount(DiscountValue::Percentage(dec("5")), DiscountScope::WholeOrder, &items, 0);
        let patch = DiscountPatch {
            value: Some(DiscountValue::FixedAmount(dec("1"))),
            ..Default::default()
        };

        let patched = patch_discount(&d, &patch, &items).unwrap();
        assert_eq!(patched.created_at, d.created_at);
        assert_eq!(patched.kind, DiscountKind::FixedAmount(Money::new(dec("1"))));
    }
}

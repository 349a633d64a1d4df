use uuid::Uuid;

use super::commands::{ItemPatch, ItemSpec};
use super::errors::ValidationError;
use super::money::{Money, Quantity};
use super::value_objects::OrderItem;

// ============================================================================
// Item Ledger
// ============================================================================

/// Validate a caller's item spec into a priced line.
pub fn build_item(item_id: Uuid, spec: &ItemSpec) -> Result<OrderItem, ValidationError> {
    let product_ref = spec.product_ref.trim();
    if product_ref.is_empty() {
        return Err(ValidationError::MissingField("product_ref"));
    }

    let unit_price = Money::non_negative(spec.unit_price, "unit_price")?;
    let quantity = Quantity::new(spec.quantity)?;

    Ok(OrderItem::new(
        item_id,
        product_ref.to_string(),
        spec.name.clone(),
        unit_price,
        quantity,
    ))
}

/// Produce the replacement line for a patch. The line total is re-derived.
pub fn patch_item(current: &OrderItem, patch: &ItemPatch) -> Result<OrderItem, ValidationError> {
    let unit_price = match patch.unit_price {
        Some(price) => Money::non_negative(price, "unit_price")?,
        None => current.unit_price,
    };
    let quantity = match patch.quantity {
        Some(raw) => Quantity::new(raw)?,
        None => current.quantity,
    };
    let name = patch.name.clone().or_else(|| current.name.clone());

    Ok(OrderItem::new(current.id, current.product_ref.clone(), name, unit_price, quantity))
}

pub fn find(items: &[OrderItem], item_id: Uuid) -> Option<&OrderItem> {
    items.iter().find(|item| item.id == item_id)
}

pub fn contains(items: &[OrderItem], item_id: Uuid) -> bool {
    find(items, item_id).is_some()
}

/// Sum of `unit_price * quantity`, unrounded.
pub fn subtotal(items: &[OrderItem]) -> Money {
    items.iter().map(|item| item.unit_price.times(item.quantity)).sum()
}

/// Subtotal restricted to the given item ids. Unknown ids contribute nothing.
pub fn subtotal_of(items: &[OrderItem], item_ids: &[Uuid]) -> Money {
    items
        .iter()
        .filter(|item| item_ids.contains(&item.id))
        .map(|item| item.unit_price.times(item.quantity))
        .sum()
}

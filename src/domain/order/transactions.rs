use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::commands::{TransactionPatch, TransactionSpec};
use super::errors::{OrderError, ValidationError};
use super::money::Money;
use super::value_objects::{Transaction, TransactionStatus, TransactionType};

// ============================================================================
// Transaction Ledger
// ============================================================================
//
// Pending transactions are drafts; once a transaction is settled or failed it
// is a committed fact and can be neither edited nor removed.
//
// ============================================================================

pub fn build_transaction(
    transaction_id: Uuid,
    spec: &TransactionSpec,
    timestamp: DateTime<Utc>,
) -> Result<Transaction, ValidationError> {
    Ok(Transaction {
        id: transaction_id,
        kind: spec.kind,
        amount: Money::positive(spec.amount, "amount")?,
        status: spec.status,
        reference: spec.reference.clone(),
        timestamp,
    })
}

pub fn ensure_pending(transaction: &Transaction) -> Result<(), OrderError> {
    match transaction.status {
        TransactionStatus::Pending => Ok(()),
        status => Err(OrderError::TransactionFinalized { id: transaction.id, status }),
    }
}

pub fn patch_transaction(current: &Transaction, patch: &TransactionPatch) -> Result<Transaction, OrderError> {
    ensure_pending(current)?;

    let amount = match patch.amount {
        Some(amount) => Money::positive(amount, "amount")?,
        None => current.amount,
    };

    Ok(Transaction {
        id: current.id,
        kind: current.kind,
        amount,
        status: patch.status.unwrap_or(current.status),
        reference: patch.reference.clone().or_else(|| current.reference.clone()),
        timestamp: current.timestamp,
    })
}

pub fn find(transactions: &[Transaction], transaction_id: Uuid) -> Option<&Transaction> {
    transactions.iter().find(|tx| tx.id == transaction_id)
}

fn settled_sum(transactions: &[Transaction], kind: TransactionType) -> Money {
    transactions
        .iter()
        .filter(|tx| tx.kind == kind && tx.status == TransactionStatus::Settled)
        .map(|tx| tx.amount)
        .sum()
}

/// Settled charges minus settled refunds.
pub fn amount_paid(transactions: &[Transaction]) -> Money {
    settled_sum(transactions, TransactionType::Charge) - settled_sum(transactions, TransactionType::Refund)
}

/// Ledger-level invariants, checked against the order's grand total before
/// anything is committed.
pub fn verify(
    transactions: &[Transaction],
    grand_total: Money,
    allow_overpayment: bool,
) -> Result<(), ValidationError> {
    let charged = settled_sum(transactions, TransactionType::Charge);
    let refunded = settled_sum(transactions, TransactionType::Refund);

    if refunded > charged {
        return Err(ValidationError::RefundExceedsCharges {
            charged: charged.amount(),
            refunded: refunded.amount(),
        });
    }

    let paid = charged - refunded;
    if paid > grand_total && !allow_overpayment {
        return Err(ValidationError::Overpayment {
            paid: paid.amount(),
            grand_total: grand_total.amount(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn tx(kind: TransactionType, amount: i64, status: TransactionStatus) -> Transaction {
        build_transaction(
            Uuid::new_v4(),
            &TransactionSpec { kind, amount: Decimal::from(amount), status, reference: None },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_amount_paid_counts_only_settled() {
        let ledger = vec![
            tx(TransactionType::Charge, 18, TransactionStatus::Settled),
            tx(TransactionType::Charge, 5, TransactionStatus::Pending),
            tx(TransactionType::Charge, 7, TransactionStatus::Failed),
            tx(TransactionType::Refund, 3, TransactionStatus::Settled),
        ];
        assert_eq!(amount_paid(&ledger).amount(), Decimal::from(15));
    }

    #[test]
    fn test_amount_must_be_positive() {
        let spec = TransactionSpec {
            kind: TransactionType::Charge,
            amount: Decimal::ZERO,
            status: TransactionStatus::Pending,
            reference: None,
        };
        assert!(matches!(
            build_transaction(Uuid::new_v4(), &spec, Utc::now()),
            Err(ValidationError::NonPositiveAmount { .. })
        ));
    }

    #[test]
    fn test_settled_transactions_are_final() {
        let settled = tx(TransactionType::Charge, 10, TransactionStatus::Settled);
        let patch = TransactionPatch { amount: Some(Decimal::from(11)), ..Default::default() };

        assert!(matches!(
            patch_transaction(&settled, &patch),
            Err(OrderError::TransactionFinalized { status: TransactionStatus::Settled, .. })
        ));

        let failed = tx(TransactionType::Charge, 10, TransactionStatus::Failed);
        assert!(ensure_pending(&failed).is_err());
    }

    #[test]
    fn test_pending_transaction_can_settle() {
        let pending = tx(TransactionType::Charge, 10, TransactionStatus::Pending);
        let patch = TransactionPatch {
            status: Some(TransactionStatus::Settled),
            reference: Some("ch_123".to_string()),
            ..Default::default()
        };

        let settled = patch_transaction(&pending, &patch).unwrap();
        assert_eq!(settled.status, TransactionStatus::Settled);
        assert_eq!(settled.amount, pending.amount);
        assert_eq!(settled.reference.as_deref(), Some("ch_123"));
    }

    #[test]
    fn test_verify_rejects_overpayment_unless_allowed() {
        let ledger = vec![tx(TransactionType::Charge, 20, TransactionStatus::Settled)];
        let grand_total = Money::new(Decimal::from(18));

        assert!(matches!(
            verify(&ledger, grand_total, false),
            Err(ValidationError::Overpayment { .. })
        ));
        assert!(verify(&ledger, grand_total, true).is_ok());
    }

    #[test]
    fn test_verify_rejects_refunds_beyond_charges() {
        let ledger = vec![
            tx(TransactionType::Charge, 5, TransactionStatus::Settled),
            tx(TransactionType::Refund, 6, TransactionStatus::Settled),
        ];
        assert!(matches!(
            verify(&ledger, Money::new(Decimal::from(5)), false),
            Err(ValidationError::RefundExceedsCharges { .. })
        ));
    }
}

//! Payment reconciliation.
//!
//! The only code that writes `IncomeRecord::payment_status`. A payment is
//! applied in two sequential writes, which are not atomic:
//!
//! 1. insert the payment;
//! 2. store the status derived from the payments snapshot plus the new amount.
//!
//! If the second write fails the payment stays recorded and the caller gets
//! [`AppError::StatusUpdateFailed`] carrying it. Nothing is retried;
//! [`resync_status`] is the manual repair.

use anyhow::anyhow;
use tracing::{info, warn};

use crate::domain::{
    IncomeRecord, NewPayment, OwnerId, PaymentInsert, PaymentStatus, PaymentTransaction,
    is_valid_amount, paid_total,
};
use crate::storage::RecordStore;

use super::AppError;

/// Outcome of a fully applied payment.
#[derive(Debug, Clone)]
pub struct AppliedPayment {
    pub payment: PaymentTransaction,
    /// The invoice as stored after the status write
    pub record: IncomeRecord,
}

impl AppliedPayment {
    pub fn status(&self) -> PaymentStatus {
        self.record.payment_status
    }
}

/// Apply `candidate` to its invoice.
///
/// `records` and `existing_payments` are the caller's snapshots taken before
/// this payment. The new status is computed from the snapshot plus the new
/// amount, without reading the payments back from the store.
pub async fn apply_payment<S: RecordStore + ?Sized>(
    store: &S,
    owner: OwnerId,
    candidate: NewPayment,
    records: &[IncomeRecord],
    existing_payments: &[PaymentTransaction],
) -> Result<AppliedPayment, AppError> {
    if !is_valid_amount(candidate.amount_paid_cents) {
        return Err(AppError::InvalidAmount(
            "Payment amount must be positive and at most 10000000000.00".to_string(),
        ));
    }

    let record = records
        .iter()
        .find(|r| r.id == candidate.income_record_id && r.owner_id == owner)
        .ok_or(AppError::InvoiceNotFound(candidate.income_record_id))?;

    let prior_paid = paid_total(record.id, existing_payments);
    let new_total = prior_paid
        .checked_add(candidate.amount_paid_cents)
        .ok_or_else(|| {
            AppError::InvalidAmount(format!(
                "Payment would overflow the total paid on invoice {}",
                record.id
            ))
        })?;

    let payment = store
        .insert_payment(
            owner,
            PaymentInsert {
                payment: candidate,
                client_id: record.client_id,
            },
        )
        .await?;

    let status = PaymentStatus::derive(record.amount_cents, new_total);

    let updated = match store.write_payment_status(owner, record.id, status).await {
        Ok(Some(updated)) => updated,
        Ok(None) => {
            return Err(status_update_failed(
                payment,
                status,
                anyhow!("income record {} no longer exists", record.id),
            ));
        }
        Err(source) => return Err(status_update_failed(payment, status, source)),
    };

    info!(
        invoice = %updated.id,
        payment = %payment.id,
        paid = new_total,
        amount = updated.amount_cents,
        status = %status,
        "Applied payment"
    );

    Ok(AppliedPayment {
        payment,
        record: updated,
    })
}

fn status_update_failed(
    payment: PaymentTransaction,
    status: PaymentStatus,
    source: anyhow::Error,
) -> AppError {
    warn!(
        invoice = %payment.income_record_id,
        payment = %payment.id,
        status = %status,
        error = %source,
        "Payment recorded but invoice status is stale"
    );
    AppError::StatusUpdateFailed {
        payment: Box::new(payment),
        status,
        source,
    }
}

/// Re-derive an invoice's status from its full payment history and store it.
///
/// Repairs the stale status left by a failed [`apply_payment`]. Never lowers a
/// status: there is no reversal path, so a derived status below the stored one
/// is reported and left alone.
pub async fn resync_status<S: RecordStore + ?Sized>(
    store: &S,
    owner: OwnerId,
    record: &IncomeRecord,
    payments: &[PaymentTransaction],
) -> Result<IncomeRecord, AppError> {
    let paid = paid_total(record.id, payments);
    let derived = PaymentStatus::derive(record.amount_cents, paid);

    if derived == record.payment_status {
        return Ok(record.clone());
    }
    if derived < record.payment_status {
        warn!(
            invoice = %record.id,
            stored = %record.payment_status,
            derived = %derived,
            paid,
            "Payments fall short of stored status; leaving it unchanged"
        );
        return Ok(record.clone());
    }

    let updated = store
        .write_payment_status(owner, record.id, derived)
        .await?
        .ok_or(AppError::InvoiceNotFound(record.id))?;

    info!(
        invoice = %updated.id,
        from = %record.payment_status,
        to = %derived,
        "Resynced invoice status"
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::*;
    use crate::domain::{MAX_AMOUNT_CENTS, NewIncomeRecord};
    use crate::storage::{InMemoryRecordStore, RecordQuery};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()
    }

    async fn store_with_invoice(amount: i64) -> (InMemoryRecordStore, OwnerId, IncomeRecord) {
        let store = InMemoryRecordStore::new();
        let owner = Uuid::new_v4();
        let record = store
            .insert_income(owner, NewIncomeRecord::new(Uuid::new_v4(), amount, date()))
            .await
            .unwrap();
        (store, owner, record)
    }

    #[tokio::test]
    async fn test_full_payment_marks_paid() {
        let (store, owner, record) = store_with_invoice(100000).await;

        let applied = apply_payment(
            &store,
            owner,
            NewPayment::new(record.id, 100000, date()),
            &[record.clone()],
            &[],
        )
        .await
        .unwrap();

        assert_eq!(applied.status(), PaymentStatus::Paid);
        assert_eq!(applied.payment.client_id, record.client_id);
    }

    #[tokio::test]
    async fn test_status_uses_snapshot_plus_new_amount() {
        let (store, owner, record) = store_with_invoice(100000).await;

        let first = apply_payment(
            &store,
            owner,
            NewPayment::new(record.id, 40000, date()),
            &[record.clone()],
            &[],
        )
        .await
        .unwrap();
        assert_eq!(first.status(), PaymentStatus::Partial);

        let second = apply_payment(
            &store,
            owner,
            NewPayment::new(record.id, 60000, date()),
            &[first.record.clone()],
            &[first.payment.clone()],
        )
        .await
        .unwrap();
        assert_eq!(second.status(), PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_unknown_invoice_writes_nothing() {
        let (store, owner, record) = store_with_invoice(100000).await;

        let result = apply_payment(
            &store,
            owner,
            NewPayment::new(Uuid::new_v4(), 1000, date()),
            &[record],
            &[],
        )
        .await;

        assert!(matches!(result, Err(AppError::InvoiceNotFound(_))));
        assert!(store.select_payments(owner, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_amount_writes_nothing() {
        let (store, owner, record) = store_with_invoice(100000).await;

        let result = apply_payment(
            &store,
            owner,
            NewPayment::new(record.id, 0, date()),
            &[record],
            &[],
        )
        .await;

        assert!(matches!(result, Err(AppError::InvalidAmount(_))));
        assert!(store.select_payments(owner, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_amounts_write_nothing() {
        let (store, owner, record) = store_with_invoice(100000).await;

        let result = apply_payment(
            &store,
            owner,
            NewPayment::new(record.id, MAX_AMOUNT_CENTS + 1, date()),
            &[record.clone()],
            &[],
        )
        .await;
        assert!(matches!(result, Err(AppError::InvalidAmount(_))));

        // A snapshot total near the i64 limit must not wrap around
        let huge = PaymentTransaction {
            id: Uuid::new_v4(),
            owner_id: owner,
            income_record_id: record.id,
            client_id: record.client_id,
            amount_paid_cents: i64::MAX - 10,
            method: crate::domain::PaymentMethod::Cash,
            payment_date: date(),
            check_number: None,
            check_due_date: None,
            bank_reference: None,
            created_at: chrono::Utc::now(),
        };
        let result = apply_payment(
            &store,
            owner,
            NewPayment::new(record.id, 100, date()),
            &[record],
            &[huge],
        )
        .await;
        assert!(matches!(result, Err(AppError::InvalidAmount(_))));
        assert!(store.select_payments(owner, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_status_write_keeps_payment() {
        let (store, owner, record) = store_with_invoice(100000).await;
        store.set_fail_on_status_write(true);

        let err = apply_payment(
            &store,
            owner,
            NewPayment::new(record.id, 100000, date()),
            &[record.clone()],
            &[],
        )
        .await
        .unwrap_err();

        assert!(err.is_partial_application());
        let AppError::StatusUpdateFailed { payment, status, .. } = err else {
            panic!("expected StatusUpdateFailed");
        };
        assert_eq!(status, PaymentStatus::Paid);

        let stored = store.select_payments(owner, Some(record.id)).await.unwrap();
        assert_eq!(stored, vec![*payment]);
        let invoices = store
            .select_income(owner, &RecordQuery::default())
            .await
            .unwrap();
        assert_eq!(invoices[0].payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_resync_repairs_stale_status() {
        let (store, owner, record) = store_with_invoice(100000).await;
        store.set_fail_on_status_write(true);
        let _ = apply_payment(
            &store,
            owner,
            NewPayment::new(record.id, 30000, date()),
            &[record.clone()],
            &[],
        )
        .await;
        store.set_fail_on_status_write(false);

        let payments = store.select_payments(owner, Some(record.id)).await.unwrap();
        let repaired = resync_status(&store, owner, &record, &payments)
            .await
            .unwrap();
        assert_eq!(repaired.payment_status, PaymentStatus::Partial);
    }

    #[tokio::test]
    async fn test_resync_never_lowers_status() {
        let (store, owner, record) = store_with_invoice(100000).await;
        let paid = store
            .write_payment_status(owner, record.id, PaymentStatus::Paid)
            .await
            .unwrap()
            .unwrap();

        let result = resync_status(&store, owner, &paid, &[]).await.unwrap();
        assert_eq!(result.payment_status, PaymentStatus::Paid);
    }
}

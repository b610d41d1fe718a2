use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::domain::{
    Expense, ExpenseId, IncomeRecord, IncomeRecordId, IncomeUpdate, NewExpense, NewIncomeRecord,
    NewPayment, OwnerId, PaymentTransaction, Session, currencies, expenses_by_category,
    is_valid_amount, net_profit, outstanding_debt, pending_records, total_expenses, total_income,
};
use crate::storage::{RecordQuery, RecordStore, SqliteRecordStore, Table};

use super::reconciler::{self, AppliedPayment};
use super::reporting::{FinancialSummary, MonthlyIncomeReport, monthly_income};
use super::AppError;

/// The owner id of a live session, or `NotAuthenticated`.
pub fn require_owner(session: Option<&Session>) -> Result<OwnerId, AppError> {
    match session {
        Some(session) if !session.is_expired() => Ok(session.user_id),
        _ => Err(AppError::NotAuthenticated),
    }
}

/// The collections a session works against, newest first.
#[derive(Debug, Clone, Default)]
pub struct FinancialSnapshot {
    pub income: Vec<IncomeRecord>,
    pub payments: Vec<PaymentTransaction>,
    pub expenses: Vec<Expense>,
}

/// Application service for the practice's finances.
///
/// Loads invoices, payments and expenses for the signed-in owner, routes
/// every write through the record store, and keeps its snapshot in step with
/// the writes that succeeded. Summaries are computed from the snapshot.
pub struct FinanceService<S: RecordStore> {
    store: S,
    snapshot: FinancialSnapshot,
}

impl FinanceService<SqliteRecordStore> {
    /// Create (or open) a database at the given path and run migrations.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let store = SqliteRecordStore::init(&db_url).await?;
        Ok(Self::new(store))
    }

    /// Open an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let store = SqliteRecordStore::connect(&db_url).await?;
        Ok(Self::new(store))
    }
}

impl<S: RecordStore> FinanceService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            snapshot: FinancialSnapshot::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn snapshot(&self) -> &FinancialSnapshot {
        &self.snapshot
    }

    pub fn income(&self) -> &[IncomeRecord] {
        &self.snapshot.income
    }

    pub fn payments(&self) -> &[PaymentTransaction] {
        &self.snapshot.payments
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.snapshot.expenses
    }

    /// Invoices still open for payment.
    pub fn pending_income(&self) -> Vec<&IncomeRecord> {
        pending_records(&self.snapshot.income)
    }

    pub fn find_income(&self, id: IncomeRecordId) -> Option<&IncomeRecord> {
        self.snapshot.income.iter().find(|r| r.id == id)
    }

    pub fn payments_for(&self, id: IncomeRecordId) -> Vec<&PaymentTransaction> {
        self.snapshot
            .payments
            .iter()
            .filter(|p| p.income_record_id == id)
            .collect()
    }

    // ========================
    // Loading
    // ========================

    /// Reload everything for the session's owner.
    ///
    /// Invoices and expenses are limited to the inclusive date range. Payments
    /// are always loaded in full so that debt stays correct for invoices in
    /// range whose payments fall outside it.
    pub async fn refresh(
        &mut self,
        session: Option<&Session>,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
    ) -> Result<&FinancialSnapshot, AppError> {
        let owner = require_owner(session)?;
        let query = RecordQuery::between(from_date, to_date);

        let income = self.store.select_income(owner, &query).await?;
        let expenses = self.store.select_expenses(owner, &query).await?;
        let payments = self.store.select_payments(owner, None).await?;

        debug!(
            income = income.len(),
            payments = payments.len(),
            expenses = expenses.len(),
            "Loaded financial data"
        );

        self.snapshot = FinancialSnapshot {
            income,
            payments,
            expenses,
        };
        Ok(&self.snapshot)
    }

    // ========================
    // Invoices
    // ========================

    /// Record a new invoice. It starts out `Pending`.
    pub async fn add_income(
        &mut self,
        session: Option<&Session>,
        record: NewIncomeRecord,
    ) -> Result<IncomeRecord, AppError> {
        let owner = require_owner(session)?;
        if !is_valid_amount(record.amount_cents) {
            return Err(AppError::InvalidAmount(
                "Invoice amount must be positive and at most 10000000000.00".to_string(),
            ));
        }

        let stored = self.store.insert_income(owner, record).await?;
        info!(invoice = %stored.id, amount = stored.amount_cents, "Recorded invoice");
        self.snapshot.income.insert(0, stored.clone());
        Ok(stored)
    }

    /// Edit an invoice's descriptive fields or amount. Never touches the
    /// payment status.
    pub async fn update_income(
        &mut self,
        session: Option<&Session>,
        id: IncomeRecordId,
        update: IncomeUpdate,
    ) -> Result<IncomeRecord, AppError> {
        let owner = require_owner(session)?;
        if update.amount_cents.is_some_and(|amount| !is_valid_amount(amount)) {
            return Err(AppError::InvalidAmount(
                "Invoice amount must be positive and at most 10000000000.00".to_string(),
            ));
        }
        let amount_changed = update.amount_cents.is_some();

        let updated = self
            .store
            .update_income(owner, id, update)
            .await?
            .ok_or(AppError::IncomeRecordNotFound(id))?;

        if amount_changed && !self.payments_for(id).is_empty() {
            warn!(
                invoice = %id,
                status = %updated.payment_status,
                "Amount changed on an invoice with payments; status may need a resync"
            );
        }

        self.replace_income(updated.clone());
        Ok(updated)
    }

    /// Remove an invoice together with its payments.
    pub async fn delete_income(
        &mut self,
        session: Option<&Session>,
        id: IncomeRecordId,
    ) -> Result<(), AppError> {
        let owner = require_owner(session)?;
        if !self.store.delete(owner, Table::IncomeRecords, id).await? {
            return Err(AppError::IncomeRecordNotFound(id));
        }
        self.snapshot.income.retain(|r| r.id != id);
        self.snapshot.payments.retain(|p| p.income_record_id != id);
        info!(invoice = %id, "Deleted invoice");
        Ok(())
    }

    // ========================
    // Payments
    // ========================

    /// Apply a payment to one of the loaded invoices.
    ///
    /// On [`AppError::StatusUpdateFailed`] the payment exists in the store, so
    /// it is added to the snapshot before the error is returned.
    pub async fn add_payment(
        &mut self,
        session: Option<&Session>,
        payment: NewPayment,
    ) -> Result<AppliedPayment, AppError> {
        let owner = require_owner(session)?;

        let result = reconciler::apply_payment(
            &self.store,
            owner,
            payment,
            &self.snapshot.income,
            &self.snapshot.payments,
        )
        .await;

        match result {
            Ok(applied) => {
                self.snapshot.payments.insert(0, applied.payment.clone());
                self.replace_income(applied.record.clone());
                Ok(applied)
            }
            Err(err) => {
                if let AppError::StatusUpdateFailed { payment, .. } = &err {
                    self.snapshot.payments.insert(0, payment.as_ref().clone());
                }
                Err(err)
            }
        }
    }

    /// Re-derive one invoice's status from all of its payments.
    pub async fn resync_status(
        &mut self,
        session: Option<&Session>,
        id: IncomeRecordId,
    ) -> Result<IncomeRecord, AppError> {
        let owner = require_owner(session)?;
        let record = self
            .find_income(id)
            .cloned()
            .ok_or(AppError::InvoiceNotFound(id))?;
        let payments = self.store.select_payments(owner, Some(id)).await?;

        let updated = reconciler::resync_status(&self.store, owner, &record, &payments).await?;

        self.snapshot.payments.retain(|p| p.income_record_id != id);
        self.snapshot.payments.extend(payments);
        self.snapshot
            .payments
            .sort_by(|a, b| (b.payment_date, b.created_at).cmp(&(a.payment_date, a.created_at)));
        self.replace_income(updated.clone());
        Ok(updated)
    }

    // ========================
    // Expenses
    // ========================

    pub async fn add_expense(
        &mut self,
        session: Option<&Session>,
        expense: NewExpense,
    ) -> Result<Expense, AppError> {
        let owner = require_owner(session)?;
        if !is_valid_amount(expense.amount_cents) {
            return Err(AppError::InvalidAmount(
                "Expense amount must be positive and at most 10000000000.00".to_string(),
            ));
        }

        let stored = self.store.insert_expense(owner, expense).await?;
        info!(expense = %stored.id, category = %stored.category, "Recorded expense");
        self.snapshot.expenses.insert(0, stored.clone());
        Ok(stored)
    }

    pub async fn delete_expense(
        &mut self,
        session: Option<&Session>,
        id: ExpenseId,
    ) -> Result<(), AppError> {
        let owner = require_owner(session)?;
        if !self.store.delete(owner, Table::Expenses, id).await? {
            return Err(AppError::ExpenseNotFound(id));
        }
        self.snapshot.expenses.retain(|e| e.id != id);
        Ok(())
    }

    // ========================
    // Summaries
    // ========================

    /// Totals over the loaded snapshot.
    pub fn summary(&self) -> FinancialSummary {
        let FinancialSnapshot {
            income,
            payments,
            expenses,
        } = &self.snapshot;

        let codes = currencies(income, expenses);
        if codes.len() > 1 {
            warn!(
                currencies = ?codes,
                "Summing amounts in different currencies without conversion"
            );
        }

        FinancialSummary {
            total_income: total_income(income),
            total_expenses: total_expenses(expenses),
            net_profit: net_profit(income, expenses),
            outstanding_debt: outstanding_debt(income, payments),
            expenses_by_category: expenses_by_category(expenses)
                .into_iter()
                .collect::<BTreeMap<_, _>>(),
            pending_invoices: pending_records(income).len(),
            currencies: codes.into_iter().collect(),
        }
    }

    /// Monthly income rollup over the loaded invoices.
    pub fn monthly_income(&self, today: NaiveDate, months: u32) -> MonthlyIncomeReport {
        monthly_income(&self.snapshot.income, today, months)
    }

    fn replace_income(&mut self, record: IncomeRecord) {
        match self.snapshot.income.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.snapshot.income.insert(0, record),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::storage::InMemoryRecordStore;

    fn session() -> Session {
        Session {
            user_id: Uuid::new_v4(),
            email: "vet@example.com".into(),
            token: "token".into(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[test]
    fn test_require_owner() {
        let live = session();
        assert_eq!(require_owner(Some(&live)).unwrap(), live.user_id);
        assert!(matches!(
            require_owner(None),
            Err(AppError::NotAuthenticated)
        ));

        let mut expired = session();
        expired.expires_at = Utc::now() - Duration::minutes(1);
        assert!(matches!(
            require_owner(Some(&expired)),
            Err(AppError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amounts() {
        let mut service = FinanceService::new(InMemoryRecordStore::new());
        let session = session();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let income = service
            .add_income(Some(&session), NewIncomeRecord::new(Uuid::new_v4(), 0, date))
            .await;
        assert!(matches!(income, Err(AppError::InvalidAmount(_))));

        let expense = service
            .add_expense(Some(&session), NewExpense::new("Rent", -5, date))
            .await;
        assert!(matches!(expense, Err(AppError::InvalidAmount(_))));

        let huge = service
            .add_income(
                Some(&session),
                NewIncomeRecord::new(Uuid::new_v4(), i64::MAX, date),
            )
            .await;
        assert!(matches!(huge, Err(AppError::InvalidAmount(_))));
        assert!(service.income().is_empty());
        assert!(service.expenses().is_empty());
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_snapshot_untouched() {
        let store = InMemoryRecordStore::new();
        store.set_fail_on_insert(true);
        let mut service = FinanceService::new(store);
        let session = session();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let result = service
            .add_income(Some(&session), NewIncomeRecord::new(Uuid::new_v4(), 100, date))
            .await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert!(service.income().is_empty());
    }
}

//! In-memory record store.
//!
//! Mirrors the SQLite store's semantics (owner scoping, cascade on invoice
//! removal, newest-first ordering) without a database. Tests use it to inject
//! failures into individual writes.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    Expense, IncomeRecord, IncomeRecordId, IncomeUpdate, NewExpense, NewIncomeRecord, OwnerId,
    PaymentInsert, PaymentStatus, PaymentTransaction,
};

use super::{RecordQuery, RecordStore, SortOrder, Table};

#[derive(Default)]
struct Tables {
    income: Vec<IncomeRecord>,
    payments: Vec<PaymentTransaction>,
    expenses: Vec<Expense>,
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
    fail_on_insert: AtomicBool,
    fail_on_status_write: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent insert fail.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.fail_on_insert.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent payment status write fail.
    pub fn set_fail_on_status_write(&self, fail: bool) {
        self.fail_on_status_write.store(fail, Ordering::SeqCst);
    }

    fn check_insert(&self) -> Result<()> {
        if self.fail_on_insert.load(Ordering::SeqCst) {
            bail!("insert rejected by store");
        }
        Ok(())
    }
}

fn sorted<T>(
    rows: impl Iterator<Item = T>,
    order: SortOrder,
    key: impl Fn(&T) -> (NaiveDate, DateTime<Utc>),
) -> Vec<T> {
    let mut rows: Vec<T> = rows.collect();
    rows.sort_by_key(key);
    if order == SortOrder::Descending {
        rows.reverse();
    }
    rows
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert_income(&self, owner: OwnerId, record: NewIncomeRecord) -> Result<IncomeRecord> {
        self.check_insert()?;
        let now = Utc::now();
        let stored = IncomeRecord {
            id: Uuid::new_v4(),
            owner_id: owner,
            visit_id: record.visit_id,
            client_id: record.client_id,
            description: record.description,
            amount_cents: record.amount_cents,
            currency: record.currency,
            income_date: record.income_date,
            payment_status: PaymentStatus::Pending,
            notes: record.notes,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.income.push(stored.clone());
        Ok(stored)
    }

    async fn insert_payment(
        &self,
        owner: OwnerId,
        insert: PaymentInsert,
    ) -> Result<PaymentTransaction> {
        self.check_insert()?;
        let mut tables = self.tables.write().await;
        let PaymentInsert { payment, client_id } = insert;
        if !tables
            .income
            .iter()
            .any(|r| r.id == payment.income_record_id && r.owner_id == owner)
        {
            bail!("income record {} does not exist", payment.income_record_id);
        }

        let stored = PaymentTransaction {
            id: Uuid::new_v4(),
            owner_id: owner,
            income_record_id: payment.income_record_id,
            client_id,
            amount_paid_cents: payment.amount_paid_cents,
            method: payment.method,
            payment_date: payment.payment_date,
            check_number: payment.check_number,
            check_due_date: payment.check_due_date,
            bank_reference: payment.bank_reference,
            created_at: Utc::now(),
        };
        tables.payments.push(stored.clone());
        Ok(stored)
    }

    async fn insert_expense(&self, owner: OwnerId, expense: NewExpense) -> Result<Expense> {
        self.check_insert()?;
        let stored = Expense {
            id: Uuid::new_v4(),
            owner_id: owner,
            category: expense.category,
            description: expense.description,
            amount_cents: expense.amount_cents,
            currency: expense.currency,
            expense_date: expense.expense_date,
            supplier: expense.supplier,
            invoice_number: expense.invoice_number,
            payment_method: expense.payment_method,
            notes: expense.notes,
            created_at: Utc::now(),
        };
        self.tables.write().await.expenses.push(stored.clone());
        Ok(stored)
    }

    async fn update_income(
        &self,
        owner: OwnerId,
        id: IncomeRecordId,
        update: IncomeUpdate,
    ) -> Result<Option<IncomeRecord>> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables
            .income
            .iter_mut()
            .find(|r| r.id == id && r.owner_id == owner)
        else {
            return Ok(None);
        };

        if update.is_empty() {
            return Ok(Some(record.clone()));
        }
        if let Some(description) = update.description {
            record.description = description;
        }
        if let Some(amount) = update.amount_cents {
            record.amount_cents = amount;
        }
        if let Some(currency) = update.currency {
            record.currency = currency;
        }
        if let Some(date) = update.income_date {
            record.income_date = date;
        }
        if let Some(notes) = update.notes {
            record.notes = (!notes.is_empty()).then_some(notes);
        }
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn write_payment_status(
        &self,
        owner: OwnerId,
        id: IncomeRecordId,
        status: PaymentStatus,
    ) -> Result<Option<IncomeRecord>> {
        if self.fail_on_status_write.load(Ordering::SeqCst) {
            bail!("status update rejected by store");
        }
        let mut tables = self.tables.write().await;
        Ok(tables
            .income
            .iter_mut()
            .find(|r| r.id == id && r.owner_id == owner)
            .map(|record| {
                record.payment_status = status;
                record.updated_at = Utc::now();
                record.clone()
            }))
    }

    async fn delete(&self, owner: OwnerId, table: Table, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let removed = match table {
            Table::IncomeRecords => {
                let before = tables.income.len();
                tables.income.retain(|r| !(r.id == id && r.owner_id == owner));
                let removed = tables.income.len() < before;
                if removed {
                    tables
                        .payments
                        .retain(|p| !(p.income_record_id == id && p.owner_id == owner));
                }
                removed
            }
            Table::Expenses => {
                let before = tables.expenses.len();
                tables.expenses.retain(|e| !(e.id == id && e.owner_id == owner));
                tables.expenses.len() < before
            }
        };
        Ok(removed)
    }

    async fn select_income(
        &self,
        owner: OwnerId,
        query: &RecordQuery,
    ) -> Result<Vec<IncomeRecord>> {
        let tables = self.tables.read().await;
        let rows = tables
            .income
            .iter()
            .filter(|r| r.owner_id == owner && query.matches(r.income_date))
            .cloned();
        Ok(sorted(rows, query.order, |r| (r.income_date, r.created_at)))
    }

    async fn select_payments(
        &self,
        owner: OwnerId,
        income_record_id: Option<IncomeRecordId>,
    ) -> Result<Vec<PaymentTransaction>> {
        let tables = self.tables.read().await;
        let rows = tables
            .payments
            .iter()
            .filter(|p| p.owner_id == owner)
            .filter(|p| income_record_id.is_none_or(|id| p.income_record_id == id))
            .cloned();
        Ok(sorted(rows, SortOrder::Descending, |p| {
            (p.payment_date, p.created_at)
        }))
    }

    async fn select_expenses(&self, owner: OwnerId, query: &RecordQuery) -> Result<Vec<Expense>> {
        let tables = self.tables.read().await;
        let rows = tables
            .expenses
            .iter()
            .filter(|e| e.owner_id == owner && query.matches(e.expense_date))
            .cloned();
        Ok(sorted(rows, query.order, |e| (e.expense_date, e.created_at)))
    }
}

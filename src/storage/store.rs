use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::{
    Expense, IncomeRecord, IncomeRecordId, IncomeUpdate, NewExpense, NewIncomeRecord, OwnerId,
    PaymentInsert, PaymentStatus, PaymentTransaction,
};

/// Tables rows can be deleted from. Payments are immutable and only go
/// away with their invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    IncomeRecords,
    Expenses,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::IncomeRecords => "income_records",
            Table::Expenses => "expenses",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    /// Newest first
    #[default]
    Descending,
}

/// Filters and ordering for dated rows (invoices and expenses).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    /// Inclusive lower bound on the row's date
    pub from_date: Option<NaiveDate>,
    /// Inclusive upper bound on the row's date
    pub to_date: Option<NaiveDate>,
    pub order: SortOrder,
}

impl RecordQuery {
    pub fn between(from_date: Option<NaiveDate>, to_date: Option<NaiveDate>) -> Self {
        Self {
            from_date,
            to_date,
            order: SortOrder::Descending,
        }
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        self.from_date.is_none_or(|from| date >= from) && self.to_date.is_none_or(|to| date <= to)
    }
}

/// Owner-scoped row storage for the ledger.
///
/// Every method takes the owner id and only ever sees that owner's rows.
/// Ids and timestamps are assigned by the store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_income(&self, owner: OwnerId, record: NewIncomeRecord) -> Result<IncomeRecord>;

    async fn insert_payment(
        &self,
        owner: OwnerId,
        payment: PaymentInsert,
    ) -> Result<PaymentTransaction>;

    async fn insert_expense(&self, owner: OwnerId, expense: NewExpense) -> Result<Expense>;

    /// Apply a patch to an invoice. `None` when the invoice does not exist
    /// for this owner.
    async fn update_income(
        &self,
        owner: OwnerId,
        id: IncomeRecordId,
        update: IncomeUpdate,
    ) -> Result<Option<IncomeRecord>>;

    /// Store a derived payment status. Only the payment reconciler calls this.
    async fn write_payment_status(
        &self,
        owner: OwnerId,
        id: IncomeRecordId,
        status: PaymentStatus,
    ) -> Result<Option<IncomeRecord>>;

    /// Remove a row. Removing an invoice removes its payments too.
    /// Returns whether a row was removed.
    async fn delete(&self, owner: OwnerId, table: Table, id: Uuid) -> Result<bool>;

    async fn select_income(&self, owner: OwnerId, query: &RecordQuery)
    -> Result<Vec<IncomeRecord>>;

    /// Payments newest first, optionally restricted to one invoice.
    async fn select_payments(
        &self,
        owner: OwnerId,
        income_record_id: Option<IncomeRecordId>,
    ) -> Result<Vec<PaymentTransaction>>;

    async fn select_expenses(&self, owner: OwnerId, query: &RecordQuery) -> Result<Vec<Expense>>;
}

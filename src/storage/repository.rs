use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    Expense, IncomeRecord, IncomeRecordId, IncomeUpdate, NewExpense, NewIncomeRecord, OwnerId,
    PaymentInsert, PaymentMethod, PaymentStatus, PaymentTransaction,
};

use super::{MIGRATION_001_LEDGER, MIGRATION_002_AUTH, RecordQuery, RecordStore, SortOrder, Table};

const INCOME_COLUMNS: &str = "id, user_id, visit_id, client_id, description, amount_cents, currency, income_date, payment_status, notes, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, user_id, income_record_id, client_id, amount_paid_cents, payment_method, payment_date, check_number, check_due_date, bank_reference, created_at";

const EXPENSE_COLUMNS: &str = "id, user_id, category, description, amount_cents, currency, expense_date, supplier, invoice_number, payment_method, notes, created_at";

/// SQLite-backed record store.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to run more than once.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_LEDGER)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_AUTH)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// Connect and migrate.
    pub async fn init(database_url: &str) -> Result<Self> {
        let store = Self::connect(database_url).await?;
        store.migrate().await?;
        info!(url = %database_url, "Record store ready");
        Ok(store)
    }

    /// The underlying pool, shared with the auth provider.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn get_income(&self, owner: OwnerId, id: IncomeRecordId) -> Result<Option<IncomeRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {INCOME_COLUMNS} FROM income_records WHERE id = ? AND user_id = ?"
        ))
        .bind(id.to_string())
        .bind(owner.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch income record")?;

        row.as_ref().map(row_to_income).transpose()
    }

    /// Dated select shared by invoices and expenses.
    fn dated_select(table: Table, columns: &str, date_column: &str, query: &RecordQuery) -> String {
        let mut sql = format!("SELECT {columns} FROM {table} WHERE user_id = ?");
        if query.from_date.is_some() {
            sql.push_str(&format!(" AND {date_column} >= ?"));
        }
        if query.to_date.is_some() {
            sql.push_str(&format!(" AND {date_column} <= ?"));
        }
        let direction = match query.order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        sql.push_str(&format!(
            " ORDER BY {date_column} {direction}, created_at {direction}"
        ));
        sql
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert_income(&self, owner: OwnerId, record: NewIncomeRecord) -> Result<IncomeRecord> {
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

        sqlx::query(&format!(
            "INSERT INTO income_records ({INCOME_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(stored.id.to_string())
        .bind(owner.to_string())
        .bind(stored.visit_id.map(|id| id.to_string()))
        .bind(stored.client_id.to_string())
        .bind(&stored.description)
        .bind(stored.amount_cents)
        .bind(&stored.currency)
        .bind(stored.income_date.to_string())
        .bind(stored.payment_status.as_str())
        .bind(&stored.notes)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save income record")?;

        debug!(id = %stored.id, amount = stored.amount_cents, "Inserted income record");
        Ok(stored)
    }

    async fn insert_payment(
        &self,
        owner: OwnerId,
        insert: PaymentInsert,
    ) -> Result<PaymentTransaction> {
        let PaymentInsert { payment, client_id } = insert;
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

        // Inserts nothing unless the invoice belongs to this owner
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO payment_transactions ({PAYMENT_COLUMNS})
            SELECT ?, ?, id, ?, ?, ?, ?, ?, ?, ?, ?
            FROM income_records
            WHERE id = ? AND user_id = ?
            "#
        ))
        .bind(stored.id.to_string())
        .bind(owner.to_string())
        .bind(stored.client_id.to_string())
        .bind(stored.amount_paid_cents)
        .bind(stored.method.as_str())
        .bind(stored.payment_date.to_string())
        .bind(&stored.check_number)
        .bind(stored.check_due_date.map(|d| d.to_string()))
        .bind(&stored.bank_reference)
        .bind(stored.created_at.to_rfc3339())
        .bind(stored.income_record_id.to_string())
        .bind(owner.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to save payment")?;

        if result.rows_affected() == 0 {
            bail!("income record {} does not exist", stored.income_record_id);
        }

        debug!(id = %stored.id, invoice = %stored.income_record_id, "Inserted payment");
        Ok(stored)
    }

    async fn insert_expense(&self, owner: OwnerId, expense: NewExpense) -> Result<Expense> {
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

        sqlx::query(&format!(
            "INSERT INTO expenses ({EXPENSE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(stored.id.to_string())
        .bind(owner.to_string())
        .bind(&stored.category)
        .bind(&stored.description)
        .bind(stored.amount_cents)
        .bind(&stored.currency)
        .bind(stored.expense_date.to_string())
        .bind(&stored.supplier)
        .bind(&stored.invoice_number)
        .bind(&stored.payment_method)
        .bind(&stored.notes)
        .bind(stored.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save expense")?;

        debug!(id = %stored.id, category = %stored.category, "Inserted expense");
        Ok(stored)
    }

    async fn update_income(
        &self,
        owner: OwnerId,
        id: IncomeRecordId,
        update: IncomeUpdate,
    ) -> Result<Option<IncomeRecord>> {
        if update.is_empty() {
            return self.get_income(owner, id).await;
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE income_records
            SET description = COALESCE(?, description),
                amount_cents = COALESCE(?, amount_cents),
                currency = COALESCE(?, currency),
                income_date = COALESCE(?, income_date),
                notes = CASE WHEN ? IS NULL THEN notes ELSE NULLIF(?, '') END,
                updated_at = ?
            WHERE id = ? AND user_id = ?
            RETURNING {INCOME_COLUMNS}
            "#
        ))
        .bind(update.description)
        .bind(update.amount_cents)
        .bind(update.currency)
        .bind(update.income_date.map(|d| d.to_string()))
        .bind(update.notes.clone())
        .bind(update.notes)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(owner.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update income record")?;

        row.as_ref().map(row_to_income).transpose()
    }

    async fn write_payment_status(
        &self,
        owner: OwnerId,
        id: IncomeRecordId,
        status: PaymentStatus,
    ) -> Result<Option<IncomeRecord>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE income_records
            SET payment_status = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            RETURNING {INCOME_COLUMNS}
            "#
        ))
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(owner.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update payment status")?;

        row.as_ref().map(row_to_income).transpose()
    }

    async fn delete(&self, owner: OwnerId, table: Table, id: Uuid) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = ? AND user_id = ?"))
            .bind(id.to_string())
            .bind(owner.to_string())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete from {table}"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn select_income(
        &self,
        owner: OwnerId,
        query: &RecordQuery,
    ) -> Result<Vec<IncomeRecord>> {
        let sql = Self::dated_select(Table::IncomeRecords, INCOME_COLUMNS, "income_date", query);

        let mut sql_query = sqlx::query(&sql).bind(owner.to_string());
        if let Some(from) = query.from_date {
            sql_query = sql_query.bind(from.to_string());
        }
        if let Some(to) = query.to_date {
            sql_query = sql_query.bind(to.to_string());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list income records")?;

        rows.iter().map(row_to_income).collect()
    }

    async fn select_payments(
        &self,
        owner: OwnerId,
        income_record_id: Option<IncomeRecordId>,
    ) -> Result<Vec<PaymentTransaction>> {
        let mut sql = format!("SELECT {PAYMENT_COLUMNS} FROM payment_transactions WHERE user_id = ?");
        if income_record_id.is_some() {
            sql.push_str(" AND income_record_id = ?");
        }
        sql.push_str(" ORDER BY payment_date DESC, created_at DESC");

        let mut sql_query = sqlx::query(&sql).bind(owner.to_string());
        if let Some(id) = income_record_id {
            sql_query = sql_query.bind(id.to_string());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list payments")?;

        rows.iter().map(row_to_payment).collect()
    }

    async fn select_expenses(&self, owner: OwnerId, query: &RecordQuery) -> Result<Vec<Expense>> {
        let sql = Self::dated_select(Table::Expenses, EXPENSE_COLUMNS, "expense_date", query);

        let mut sql_query = sqlx::query(&sql).bind(owner.to_string());
        if let Some(from) = query.from_date {
            sql_query = sql_query.bind(from.to_string());
        }
        if let Some(to) = query.to_date {
            sql_query = sql_query.bind(to.to_string());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list expenses")?;

        rows.iter().map(row_to_expense).collect()
    }
}

fn parse_uuid(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid {what}"))
}

fn parse_date(value: &str, what: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").with_context(|| format!("Invalid {what}"))
}

fn parse_timestamp(value: &str, what: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid {what} timestamp"))?
        .with_timezone(&Utc))
}

fn row_to_income(row: &sqlx::sqlite::SqliteRow) -> Result<IncomeRecord> {
    let id: String = row.get("id");
    let user_id: String = row.get("user_id");
    let visit_id: Option<String> = row.get("visit_id");
    let client_id: String = row.get("client_id");
    let income_date: String = row.get("income_date");
    let status: String = row.get("payment_status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(IncomeRecord {
        id: parse_uuid(&id, "income record ID")?,
        owner_id: parse_uuid(&user_id, "owner ID")?,
        visit_id: visit_id
            .map(|v| parse_uuid(&v, "visit ID"))
            .transpose()?,
        client_id: parse_uuid(&client_id, "client ID")?,
        description: row.get("description"),
        amount_cents: row.get("amount_cents"),
        currency: row.get("currency"),
        income_date: parse_date(&income_date, "income date")?,
        payment_status: PaymentStatus::from_str(&status)
            .ok_or_else(|| anyhow::anyhow!("Invalid payment status: {}", status))?,
        notes: row.get("notes"),
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

fn row_to_payment(row: &sqlx::sqlite::SqliteRow) -> Result<PaymentTransaction> {
    let id: String = row.get("id");
    let user_id: String = row.get("user_id");
    let income_record_id: String = row.get("income_record_id");
    let client_id: String = row.get("client_id");
    let method: String = row.get("payment_method");
    let payment_date: String = row.get("payment_date");
    let check_due_date: Option<String> = row.get("check_due_date");
    let created_at: String = row.get("created_at");

    Ok(PaymentTransaction {
        id: parse_uuid(&id, "payment ID")?,
        owner_id: parse_uuid(&user_id, "owner ID")?,
        income_record_id: parse_uuid(&income_record_id, "income record ID")?,
        client_id: parse_uuid(&client_id, "client ID")?,
        amount_paid_cents: row.get("amount_paid_cents"),
        method: PaymentMethod::from_str(&method)
            .ok_or_else(|| anyhow::anyhow!("Invalid payment method: {}", method))?,
        payment_date: parse_date(&payment_date, "payment date")?,
        check_number: row.get("check_number"),
        check_due_date: check_due_date
            .map(|d| parse_date(&d, "check due date"))
            .transpose()?,
        bank_reference: row.get("bank_reference"),
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}

fn row_to_expense(row: &sqlx::sqlite::SqliteRow) -> Result<Expense> {
    let id: String = row.get("id");
    let user_id: String = row.get("user_id");
    let expense_date: String = row.get("expense_date");
    let created_at: String = row.get("created_at");

    Ok(Expense {
        id: parse_uuid(&id, "expense ID")?,
        owner_id: parse_uuid(&user_id, "owner ID")?,
        category: row.get("category"),
        description: row.get("description"),
        amount_cents: row.get("amount_cents"),
        currency: row.get("currency"),
        expense_date: parse_date(&expense_date, "expense date")?,
        supplier: row.get("supplier"),
        invoice_number: row.get("invoice_number"),
        payment_method: row.get("payment_method"),
        notes: row.get("notes"),
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, OwnerId};

pub type ExpenseId = Uuid;

/// A standalone outflow. Not linked to invoices or payments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub owner_id: OwnerId,
    /// Free-form label such as "Medications" or "Rent"
    pub category: String,
    pub description: String,
    pub amount_cents: Cents,
    pub currency: String,
    pub expense_date: NaiveDate,
    pub supplier: Option<String>,
    pub invoice_number: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExpense {
    pub category: String,
    pub description: String,
    pub amount_cents: Cents,
    pub currency: String,
    pub expense_date: NaiveDate,
    pub supplier: Option<String>,
    pub invoice_number: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl NewExpense {
    pub fn new(category: impl Into<String>, amount_cents: Cents, expense_date: NaiveDate) -> Self {
        Self {
            category: category.into(),
            description: String::new(),
            amount_cents,
            currency: super::DEFAULT_CURRENCY.to_string(),
            expense_date,
            supplier: None,
            invoice_number: None,
            payment_method: None,
            notes: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_supplier(mut self, supplier: impl Into<String>) -> Self {
        self.supplier = Some(supplier.into());
        self
    }

    pub fn with_invoice_number(mut self, invoice_number: impl Into<String>) -> Self {
        self.invoice_number = Some(invoice_number.into());
        self
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

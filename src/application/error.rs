use thiserror::Error;

use crate::domain::{ExpenseId, IncomeRecordId, PaymentStatus, PaymentTransaction};
use crate::storage::AuthError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not authenticated: sign in first")]
    NotAuthenticated,

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(IncomeRecordId),

    #[error("Income record not found: {0}")]
    IncomeRecordNotFound(IncomeRecordId),

    #[error("Expense not found: {0}")]
    ExpenseNotFound(ExpenseId),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// The payment was stored but the invoice still carries its old status.
    #[error(
        "Payment {} was recorded but invoice {} could not be marked {}: {source}",
        .payment.id,
        .payment.income_record_id,
        .status
    )]
    StatusUpdateFailed {
        payment: Box<PaymentTransaction>,
        status: PaymentStatus,
        source: anyhow::Error,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// True when a write already landed before the failure.
    pub fn is_partial_application(&self) -> bool {
        matches!(self, AppError::StatusUpdateFailed { .. })
    }
}

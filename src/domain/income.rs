use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, ClientId, OwnerId};

pub type IncomeRecordId = Uuid;
pub type VisitId = Uuid;

/// Settlement state of an invoice, derived from the payments applied to it.
///
/// Variants are ordered by progress: `Pending < Partial < Paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Partial => "Partial",
            PaymentStatus::Paid => "Paid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "partial" => Some(PaymentStatus::Partial),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }

    /// Status of an invoice of `amount` once `paid` has been applied to it.
    /// Overpayment still yields `Paid`.
    pub fn derive(amount: Cents, paid: Cents) -> Self {
        if paid >= amount {
            PaymentStatus::Paid
        } else if paid > 0 {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Pending
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A billable event owed by one client (an invoice).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeRecord {
    pub id: IncomeRecordId,
    pub owner_id: OwnerId,
    /// Visit the invoice was raised from, if any
    pub visit_id: Option<VisitId>,
    pub client_id: ClientId,
    pub description: String,
    /// Amount owed in cents (always positive)
    pub amount_cents: Cents,
    pub currency: String,
    pub income_date: NaiveDate,
    /// Denormalized from the payments; written only by the reconciler
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IncomeRecord {
    pub fn is_paid(&self) -> bool {
        self.payment_status.is_settled()
    }
}

/// Input for a new invoice. Invoices always start out `Pending`, so the
/// status is not part of the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIncomeRecord {
    pub client_id: ClientId,
    pub visit_id: Option<VisitId>,
    pub description: String,
    pub amount_cents: Cents,
    pub currency: String,
    pub income_date: NaiveDate,
    pub notes: Option<String>,
}

impl NewIncomeRecord {
    pub fn new(client_id: ClientId, amount_cents: Cents, income_date: NaiveDate) -> Self {
        Self {
            client_id,
            visit_id: None,
            description: String::new(),
            amount_cents,
            currency: super::DEFAULT_CURRENCY.to_string(),
            income_date,
            notes: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_visit(mut self, visit_id: VisitId) -> Self {
        self.visit_id = Some(visit_id);
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

/// Partial update of an invoice's editable fields.
///
/// Carries no status: the payment status changes only when a payment is
/// reconciled against the invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeUpdate {
    pub description: Option<String>,
    pub amount_cents: Option<Cents>,
    pub currency: Option<String>,
    pub income_date: Option<NaiveDate>,
    /// `Some("")` clears the notes
    pub notes: Option<String>,
}

impl IncomeUpdate {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.amount_cents.is_none()
            && self.currency.is_none()
            && self.income_date.is_none()
            && self.notes.is_none()
    }
}

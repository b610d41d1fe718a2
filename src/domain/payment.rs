use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, ClientId, IncomeRecordId, OwnerId};

pub type PaymentId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Check,
    BankTransfer,
    CreditCard,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Check => "Check",
            PaymentMethod::BankTransfer => "Bank Transfer",
            PaymentMethod::CreditCard => "Credit Card",
        }
    }

    /// Accepts the stored labels as well as the CLI spellings
    /// (`bank-transfer`, `credit_card`, ...).
    pub fn from_str(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "cash" => Some(PaymentMethod::Cash),
            "check" | "cheque" => Some(PaymentMethod::Check),
            "banktransfer" => Some(PaymentMethod::BankTransfer),
            "creditcard" => Some(PaymentMethod::CreditCard),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One payment applied against exactly one invoice. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: PaymentId,
    pub owner_id: OwnerId,
    pub income_record_id: IncomeRecordId,
    /// Copied from the invoice when the payment is created
    pub client_id: ClientId,
    pub amount_paid_cents: Cents,
    pub method: PaymentMethod,
    pub payment_date: NaiveDate,
    pub check_number: Option<String>,
    pub check_due_date: Option<NaiveDate>,
    pub bank_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A payment as entered by the user, before it is matched to its invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub income_record_id: IncomeRecordId,
    pub amount_paid_cents: Cents,
    pub method: PaymentMethod,
    pub payment_date: NaiveDate,
    pub check_number: Option<String>,
    pub check_due_date: Option<NaiveDate>,
    pub bank_reference: Option<String>,
}

impl NewPayment {
    pub fn new(income_record_id: IncomeRecordId, amount_paid_cents: Cents, payment_date: NaiveDate) -> Self {
        Self {
            income_record_id,
            amount_paid_cents,
            method: PaymentMethod::Cash,
            payment_date,
            check_number: None,
            check_due_date: None,
            bank_reference: None,
        }
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.method = method;
        self
    }

    /// Mark the payment as a check with its number and optional due date.
    pub fn with_check(mut self, number: impl Into<String>, due_date: Option<NaiveDate>) -> Self {
        self.method = PaymentMethod::Check;
        self.check_number = Some(number.into());
        self.check_due_date = due_date;
        self
    }

    pub fn with_bank_reference(mut self, reference: impl Into<String>) -> Self {
        self.bank_reference = Some(reference.into());
        self
    }
}

/// Payment row ready for insertion: the candidate plus the client copied
/// from its invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInsert {
    pub payment: NewPayment,
    pub client_id: ClientId,
}

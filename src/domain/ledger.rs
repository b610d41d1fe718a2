use std::collections::{BTreeSet, HashMap};

use super::{Cents, Expense, IncomeRecord, IncomeRecordId, PaymentTransaction};

/// Sum of all invoiced amounts, whatever their payment status.
pub fn total_income(records: &[IncomeRecord]) -> Cents {
    records.iter().map(|r| r.amount_cents).sum()
}

/// Sum of all expense amounts.
pub fn total_expenses(expenses: &[Expense]) -> Cents {
    expenses.iter().map(|e| e.amount_cents).sum()
}

/// Income minus expenses. Negative when the practice spent more than it billed.
pub fn net_profit(records: &[IncomeRecord], expenses: &[Expense]) -> Cents {
    total_income(records) - total_expenses(expenses)
}

/// Sum of payments applied to one invoice.
pub fn paid_total(record_id: IncomeRecordId, payments: &[PaymentTransaction]) -> Cents {
    payments
        .iter()
        .filter(|p| p.income_record_id == record_id)
        .map(|p| p.amount_paid_cents)
        .sum()
}

/// Paid totals for every invoice that has at least one payment.
pub fn paid_totals(payments: &[PaymentTransaction]) -> HashMap<IncomeRecordId, Cents> {
    let mut totals: HashMap<IncomeRecordId, Cents> = HashMap::new();
    for payment in payments {
        *totals.entry(payment.income_record_id).or_insert(0) += payment.amount_paid_cents;
    }
    totals
}

/// What clients still owe across all invoices not marked `Paid`.
///
/// The stored status decides which invoices count. A `Paid` invoice is left
/// out even if its payments do not add up, and the payments of counted
/// invoices are not used to re-derive their status.
pub fn outstanding_debt(records: &[IncomeRecord], payments: &[PaymentTransaction]) -> Cents {
    let paid = paid_totals(payments);
    records
        .iter()
        .filter(|r| !r.is_paid())
        .map(|r| r.amount_cents - paid.get(&r.id).copied().unwrap_or(0))
        .sum()
}

/// Expense totals per category. Only categories that occur are present.
pub fn expenses_by_category(expenses: &[Expense]) -> HashMap<String, Cents> {
    let mut categories: HashMap<String, Cents> = HashMap::new();
    for expense in expenses {
        *categories.entry(expense.category.clone()).or_insert(0) += expense.amount_cents;
    }
    categories
}

/// Invoices that can still receive payments.
pub fn pending_records(records: &[IncomeRecord]) -> Vec<&IncomeRecord> {
    records.iter().filter(|r| !r.is_paid()).collect()
}

/// Distinct currency codes across invoices and expenses.
pub fn currencies(records: &[IncomeRecord], expenses: &[Expense]) -> BTreeSet<String> {
    records
        .iter()
        .map(|r| r.currency.clone())
        .chain(expenses.iter().map(|e| e.currency.clone()))
        .collect()
}

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::{Cents, IncomeRecord};

/// Dashboard totals over one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub total_income: Cents,
    pub total_expenses: Cents,
    pub net_profit: Cents,
    pub outstanding_debt: Cents,
    pub expenses_by_category: BTreeMap<String, Cents>,
    pub pending_invoices: usize,
    /// Currency codes seen; more than one means the totals mix currencies
    pub currencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
    pub total: Cents,
    pub count: usize,
}

impl MonthBucket {
    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyIncomeReport {
    pub as_of: NaiveDate,
    /// Oldest first, ending with the month of `as_of`
    pub months: Vec<MonthBucket>,
    pub this_month: Cents,
    pub last_month: Cents,
    pub all_time: Cents,
    pub change_percent: f64,
}

/// (year, month) shifted back by `offset` months.
fn month_back(year: i32, month: u32, offset: u32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 - offset as i32;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

fn bucket(records: &[IncomeRecord], year: i32, month: u32) -> MonthBucket {
    let in_month: Vec<&IncomeRecord> = records
        .iter()
        .filter(|r| r.income_date.year() == year && r.income_date.month() == month)
        .collect();
    MonthBucket {
        year,
        month,
        total: in_month.iter().map(|r| r.amount_cents).sum(),
        count: in_month.len(),
    }
}

/// Month-over-month change. 100% when income appears after an empty month.
pub fn change_percent(this_month: Cents, last_month: Cents) -> f64 {
    if last_month > 0 {
        (this_month - last_month) as f64 / last_month as f64 * 100.0
    } else if this_month > 0 {
        100.0
    } else {
        0.0
    }
}

/// Invoiced income per calendar month for the `months` months ending at
/// `today`, bucketed by invoice date.
pub fn monthly_income(records: &[IncomeRecord], today: NaiveDate, months: u32) -> MonthlyIncomeReport {
    let (year, month) = (today.year(), today.month());

    let buckets: Vec<MonthBucket> = (0..months)
        .rev()
        .map(|offset| {
            let (y, m) = month_back(year, month, offset);
            bucket(records, y, m)
        })
        .collect();

    let this_month = bucket(records, year, month).total;
    let (last_year, last_month_no) = month_back(year, month, 1);
    let last_month = bucket(records, last_year, last_month_no).total;

    MonthlyIncomeReport {
        as_of: today,
        months: buckets,
        this_month,
        last_month,
        all_time: records.iter().map(|r| r.amount_cents).sum(),
        change_percent: change_percent(this_month, last_month),
    }
}

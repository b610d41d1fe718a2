// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::NaiveDate;
use tempfile::TempDir;
use uuid::Uuid;
use vetledger::application::FinanceService;
use vetledger::domain::{IncomeRecord, NewIncomeRecord, Session};
use vetledger::storage::{AuthProvider, SqliteAuthProvider, SqliteRecordStore};

pub type TestService = FinanceService<SqliteRecordStore>;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(TestService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = FinanceService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Auth provider sharing the service's database
pub fn auth_for(service: &TestService) -> SqliteAuthProvider {
    SqliteAuthProvider::new(service.store().pool().clone())
}

/// Test service with a signed-up user
pub async fn signed_in_service() -> Result<(TestService, Session, TempDir)> {
    let (service, temp_dir) = test_service().await?;
    let session = auth_for(&service)
        .sign_up("vet@clinic.example", "secret123")
        .await?;
    Ok((service, session, temp_dir))
}

/// Helper to parse a date string into NaiveDate
pub fn parse_date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

/// Record an invoice for a fresh client
pub async fn add_invoice(
    service: &mut TestService,
    session: &Session,
    amount_cents: i64,
    date: &str,
) -> Result<IncomeRecord> {
    let record = NewIncomeRecord::new(Uuid::new_v4(), amount_cents, parse_date(date))
        .with_description("Consultation");
    Ok(service.add_income(Some(session), record).await?)
}

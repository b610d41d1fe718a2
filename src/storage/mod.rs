mod auth;
mod memory;
mod repository;
mod store;

pub use auth::*;
pub use memory::*;
pub use repository::*;
pub use store::*;

/// SQL migration for invoices, payments and expenses
pub const MIGRATION_001_LEDGER: &str = include_str!("migrations/001_ledger.sql");

/// SQL migration for users and the current session
pub const MIGRATION_002_AUTH: &str = include_str!("migrations/002_auth.sql");

pub mod error;
pub mod reconciler;
pub mod reporting;
pub mod service;

pub use error::*;
pub use reconciler::{AppliedPayment, apply_payment, resync_status};
pub use reporting::*;
pub use service::*;

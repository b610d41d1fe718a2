mod expense;
mod income;
mod ledger;
mod money;
mod payment;
mod session;

pub use expense::*;
pub use income::*;
pub use ledger::*;
pub use money::*;
pub use payment::*;
pub use session::*;

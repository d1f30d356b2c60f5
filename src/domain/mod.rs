mod account;
mod catalog;
mod coins;
mod idempotency;
mod ledger;

pub use account::*;
pub use catalog::*;
pub use coins::*;
pub use idempotency::*;
pub use ledger::*;

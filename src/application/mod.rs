// Application layer - use cases over a LedgerStore

pub mod economy;
pub mod error;
pub mod query;
pub mod service;

pub use economy::*;
pub use error::*;
pub use query::*;
pub use service::*;

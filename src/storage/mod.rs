mod error;
mod memory;
mod repository;
mod store;

pub use error::*;
pub use memory::*;
pub use repository::*;
pub use store::*;

/// SQL migration for the initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

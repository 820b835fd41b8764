//! Database connection management and transaction scoping.

pub mod connection;
pub mod migrations;
pub mod transaction;

pub use connection::{create_pool, health_check};
pub use transaction::{begin_with_options, IsolationLevel, TransactionOptions};

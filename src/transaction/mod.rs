//! Transaction coordination.
//!
//! A transaction may span several attached databases. Each attachment gets
//! its own option block, and all of them are started in a single atomic
//! multi-database call so the transaction commits or rolls back as a unit.

mod coordinator;
mod options;

pub(crate) use coordinator::Transaction;
pub use coordinator::TransactionState;
pub use options::*;

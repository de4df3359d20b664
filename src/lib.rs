//! # Database Session Layer
//!
//! Client-side bookkeeping for a relational database server: attachments,
//! multi-database transactions, the statements, blobs and arrays open under
//! them, and asynchronous event notifications.
//!
//! ## Core Concepts
//!
//! - **Session**: An arena owning every database, transaction and dependent,
//!   addressed by stable identifiers
//! - **Transactions**: Span one or more databases, each with its own option
//!   block, and start atomically across all of them
//! - **Events**: Named server events tracked by count; listeners fire with
//!   the number of new occurrences
//! - **Transport**: The injected capability that actually talks to the server
//!
//! ## Example
//!
//! ```ignore
//! use dbsession::{DatabaseParams, MemoryTransport, Session, TransactionPolicy};
//! use std::sync::Arc;
//!
//! let mut session = Session::new(Arc::new(MemoryTransport::new()));
//! let db = session.add_database(DatabaseParams::new("localhost", "employee.fdb"));
//! session.connect(db)?;
//!
//! let tx = session.create_transaction(db, TransactionPolicy::read_only())?;
//! session.start(tx)?;
//! let stmt = session.create_statement(db, tx, "SELECT * FROM EMPLOYEE")?;
//! session.open_cursor(stmt)?;
//! session.commit(tx)?;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod transaction;
pub mod transport;
pub mod types;
pub mod value;

// Re-exports
pub use config::{DatabaseParams, SessionConfig};
pub use error::{Result, SessionError};
pub use events::{
    DispatchReport, EventBuffers, EventCursor, EventListener, EventNotification, EventRecord,
    EventSet, ListenerError,
};
pub use session::Session;
pub use transaction::{OptionBlock, TransactionState};
pub use transport::{
    MemoryTransport, StartDescriptor, Transport, TransportCall, TransportError, TransportOp,
    TransportResult,
};
pub use types::*;
pub use value::{Date, Time, Timestamp, Value};

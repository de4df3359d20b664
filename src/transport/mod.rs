//! Transport contract consumed by the session layer.
//!
//! The transport is the only component that talks to the database server.
//! It is injected into a [`Session`](crate::Session) as an `Arc<dyn Transport>`
//! and owns the wire protocol for everything except the two buffers this
//! crate builds itself: transaction option blocks and event subscription
//! buffers.
//!
//! [`MemoryTransport`] is an in-process simulated server, useful for tests
//! and for embedding the session layer without a live server.

mod memory;

pub use memory::{codes, MemoryTransport, TransportCall, TransportOp};

use crate::config::DatabaseParams;
use crate::types::{AttachmentHandle, StatementHandle, TransactionHandle};
use thiserror::Error;

/// Error reported by the server through the transport.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("server error {code}: {message}")]
pub struct TransportError {
    /// Server status code.
    pub code: i64,
    pub message: String,
}

impl TransportError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Result type for transport calls.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// One attachment's participation in a multi-database transaction start.
#[derive(Clone, Copy, Debug)]
pub struct StartDescriptor<'a> {
    pub attachment: AttachmentHandle,
    /// Wire-ready transaction option block for this attachment.
    pub options: &'a [u8],
}

impl StartDescriptor<'_> {
    /// Length of the option block in bytes.
    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// Capability to reach a database server.
///
/// Calls are synchronous round-trips. Implementations must not retry;
/// failures are surfaced to the caller as-is.
pub trait Transport: Send + Sync {
    /// Connect to a database.
    fn attach(&self, params: &DatabaseParams) -> TransportResult<AttachmentHandle>;

    /// Disconnect from a database.
    fn detach(&self, attachment: AttachmentHandle) -> TransportResult<()>;

    /// Start one transaction spanning every described attachment, atomically.
    fn begin_transaction(
        &self,
        descriptors: &[StartDescriptor<'_>],
    ) -> TransportResult<TransactionHandle>;

    fn commit(&self, transaction: TransactionHandle) -> TransportResult<()>;

    /// Commit the work done so far, keeping the handle valid.
    fn commit_retaining(&self, transaction: TransactionHandle) -> TransportResult<()>;

    fn rollback(&self, transaction: TransactionHandle) -> TransportResult<()>;

    /// Roll back the work done so far, keeping the handle valid.
    fn rollback_retaining(&self, transaction: TransactionHandle) -> TransportResult<()>;

    fn allocate_statement(&self, attachment: AttachmentHandle) -> TransportResult<StatementHandle>;

    /// Execute a statement and leave a cursor open on its result set.
    fn open_cursor(
        &self,
        transaction: TransactionHandle,
        statement: StatementHandle,
    ) -> TransportResult<()>;

    fn release_cursor(&self, statement: StatementHandle) -> TransportResult<()>;

    fn free_statement(&self, statement: StatementHandle) -> TransportResult<()>;

    /// Send an event subscription buffer and receive the updated counts.
    fn exchange_events(
        &self,
        attachment: AttachmentHandle,
        subscription: &[u8],
    ) -> TransportResult<Vec<u8>>;
}

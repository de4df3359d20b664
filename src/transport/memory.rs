//! In-process simulated server.

use super::{StartDescriptor, Transport, TransportError, TransportResult};
use crate::config::DatabaseParams;
use crate::events::{encode_record, EventCursor, EVENT_BUFFER_MARKER};
use crate::transaction::TPB_VERSION3;
use crate::types::{AttachmentHandle, StatementHandle, TransactionHandle};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Server status codes reported by the simulated server.
pub mod codes {
    pub const BAD_DB_HANDLE: i64 = 335_544_324;
    pub const BAD_TRANS_HANDLE: i64 = 335_544_332;
    pub const BAD_TPB_FORM: i64 = 335_544_338;
    pub const OPEN_TRANS: i64 = 335_544_357;
    pub const BAD_STMT_HANDLE: i64 = 335_544_485;
    pub const BAD_EVENT_BUFFER: i64 = 335_544_436;
}

/// Operation kinds, used to target failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportOp {
    Attach,
    Detach,
    Begin,
    Commit,
    CommitRetaining,
    Rollback,
    RollbackRetaining,
    AllocateStatement,
    OpenCursor,
    ReleaseCursor,
    FreeStatement,
    ExchangeEvents,
}

/// A call received by the simulated server, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCall {
    Attach { database: String },
    Detach(AttachmentHandle),
    Begin {
        attachments: Vec<(AttachmentHandle, Vec<u8>)>,
    },
    Commit(TransactionHandle),
    CommitRetaining(TransactionHandle),
    Rollback(TransactionHandle),
    RollbackRetaining(TransactionHandle),
    AllocateStatement(AttachmentHandle),
    OpenCursor(TransactionHandle, StatementHandle),
    ReleaseCursor(StatementHandle),
    FreeStatement(StatementHandle),
    ExchangeEvents(AttachmentHandle, Vec<u8>),
}

impl TransportCall {
    pub fn op(&self) -> TransportOp {
        match self {
            TransportCall::Attach { .. } => TransportOp::Attach,
            TransportCall::Detach(_) => TransportOp::Detach,
            TransportCall::Begin { .. } => TransportOp::Begin,
            TransportCall::Commit(_) => TransportOp::Commit,
            TransportCall::CommitRetaining(_) => TransportOp::CommitRetaining,
            TransportCall::Rollback(_) => TransportOp::Rollback,
            TransportCall::RollbackRetaining(_) => TransportOp::RollbackRetaining,
            TransportCall::AllocateStatement(_) => TransportOp::AllocateStatement,
            TransportCall::OpenCursor(..) => TransportOp::OpenCursor,
            TransportCall::ReleaseCursor(_) => TransportOp::ReleaseCursor,
            TransportCall::FreeStatement(_) => TransportOp::FreeStatement,
            TransportCall::ExchangeEvents(..) => TransportOp::ExchangeEvents,
        }
    }
}

#[derive(Default)]
struct ServerState {
    next_handle: u32,
    /// Live attachments and the database they point at.
    attachments: HashMap<AttachmentHandle, String>,
    /// Live transactions and the attachments they span.
    transactions: HashMap<TransactionHandle, Vec<AttachmentHandle>>,
    statements: HashMap<StatementHandle, AttachmentHandle>,
    cursors: HashSet<StatementHandle>,
    /// Event posts per (database, event name).
    event_posts: HashMap<(String, Vec<u8>), u32>,
    failures: HashMap<TransportOp, TransportError>,
    calls: Vec<TransportCall>,
}

impl ServerState {
    fn next_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Log the call, then fail it if a failure was injected for its kind.
    fn record(&mut self, call: TransportCall) -> TransportResult<()> {
        let op = call.op();
        self.calls.push(call);
        match self.failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_attachment(&self, attachment: AttachmentHandle) -> TransportResult<()> {
        if self.attachments.contains_key(&attachment) {
            Ok(())
        } else {
            Err(TransportError::new(
                codes::BAD_DB_HANDLE,
                "invalid database handle (no active connection)",
            ))
        }
    }

    fn check_transaction(&self, transaction: TransactionHandle) -> TransportResult<()> {
        if self.transactions.contains_key(&transaction) {
            Ok(())
        } else {
            Err(TransportError::new(
                codes::BAD_TRANS_HANDLE,
                "invalid transaction handle (expecting explicit transaction start)",
            ))
        }
    }

    fn check_statement(&self, statement: StatementHandle) -> TransportResult<()> {
        if self.statements.contains_key(&statement) {
            Ok(())
        } else {
            Err(TransportError::new(
                codes::BAD_STMT_HANDLE,
                "invalid statement handle",
            ))
        }
    }
}

/// Simulated server that keeps all state in memory.
///
/// Every call is recorded, and a single failure can be queued per
/// operation kind with [`fail_next`](Self::fail_next). Event counts are
/// reported as `1 + posts`, so a freshly subscribed event (baseline 1)
/// fires only once something has been posted.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<ServerState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of the given kind fail with `error`.
    pub fn fail_next(&self, op: TransportOp, error: TransportError) {
        self.state.lock().failures.insert(op, error);
    }

    /// Post an event on a database, as a trigger would on the server.
    pub fn post_event(&self, database: &str, name: &str) {
        self.post_event_times(database, name, 1);
    }

    pub fn post_event_times(&self, database: &str, name: &str, times: u32) {
        let mut state = self.state.lock();
        let posts = state
            .event_posts
            .entry((database.to_string(), name.as_bytes().to_vec()))
            .or_insert(0);
        *posts = posts.saturating_add(times);
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }

    /// Calls of one kind.
    pub fn calls_of(&self, op: TransportOp) -> Vec<TransportCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.op() == op)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn is_attached(&self, attachment: AttachmentHandle) -> bool {
        self.state.lock().attachments.contains_key(&attachment)
    }

    pub fn live_transactions(&self) -> usize {
        self.state.lock().transactions.len()
    }

    pub fn open_cursors(&self) -> usize {
        self.state.lock().cursors.len()
    }

    pub fn live_statements(&self) -> usize {
        self.state.lock().statements.len()
    }
}

impl Transport for MemoryTransport {
    fn attach(&self, params: &DatabaseParams) -> TransportResult<AttachmentHandle> {
        let database = params.connection_string();
        let mut state = self.state.lock();
        state.record(TransportCall::Attach {
            database: database.clone(),
        })?;

        if params.database.is_empty() {
            return Err(TransportError::new(
                codes::BAD_DB_HANDLE,
                "database name is empty",
            ));
        }

        let handle = AttachmentHandle(state.next_handle());
        state.attachments.insert(handle, database);
        Ok(handle)
    }

    fn detach(&self, attachment: AttachmentHandle) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.record(TransportCall::Detach(attachment))?;
        state.check_attachment(attachment)?;

        if state
            .transactions
            .values()
            .any(|spans| spans.contains(&attachment))
        {
            return Err(TransportError::new(
                codes::OPEN_TRANS,
                "cannot disconnect database with open transactions",
            ));
        }

        state.attachments.remove(&attachment);
        let orphaned: Vec<StatementHandle> = state
            .statements
            .iter()
            .filter(|(_, owner)| **owner == attachment)
            .map(|(stmt, _)| *stmt)
            .collect();
        for stmt in orphaned {
            state.statements.remove(&stmt);
            state.cursors.remove(&stmt);
        }
        Ok(())
    }

    fn begin_transaction(
        &self,
        descriptors: &[StartDescriptor<'_>],
    ) -> TransportResult<TransactionHandle> {
        let mut state = self.state.lock();
        state.record(TransportCall::Begin {
            attachments: descriptors
                .iter()
                .map(|d| (d.attachment, d.options.to_vec()))
                .collect(),
        })?;

        if descriptors.is_empty() {
            return Err(TransportError::new(
                codes::BAD_DB_HANDLE,
                "no attachment supplied to transaction start",
            ));
        }
        for descriptor in descriptors {
            state.check_attachment(descriptor.attachment)?;
            if descriptor.options.first() != Some(&TPB_VERSION3) {
                return Err(TransportError::new(
                    codes::BAD_TPB_FORM,
                    "transaction parameter block has an unsupported version",
                ));
            }
        }

        let handle = TransactionHandle(state.next_handle());
        let spans = descriptors.iter().map(|d| d.attachment).collect();
        state.transactions.insert(handle, spans);
        Ok(handle)
    }

    fn commit(&self, transaction: TransactionHandle) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.record(TransportCall::Commit(transaction))?;
        state.check_transaction(transaction)?;
        state.transactions.remove(&transaction);
        Ok(())
    }

    fn commit_retaining(&self, transaction: TransactionHandle) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.record(TransportCall::CommitRetaining(transaction))?;
        state.check_transaction(transaction)
    }

    fn rollback(&self, transaction: TransactionHandle) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.record(TransportCall::Rollback(transaction))?;
        state.check_transaction(transaction)?;
        state.transactions.remove(&transaction);
        Ok(())
    }

    fn rollback_retaining(&self, transaction: TransactionHandle) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.record(TransportCall::RollbackRetaining(transaction))?;
        state.check_transaction(transaction)
    }

    fn allocate_statement(&self, attachment: AttachmentHandle) -> TransportResult<StatementHandle> {
        let mut state = self.state.lock();
        state.record(TransportCall::AllocateStatement(attachment))?;
        state.check_attachment(attachment)?;
        let handle = StatementHandle(state.next_handle());
        state.statements.insert(handle, attachment);
        Ok(handle)
    }

    fn open_cursor(
        &self,
        transaction: TransactionHandle,
        statement: StatementHandle,
    ) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.record(TransportCall::OpenCursor(transaction, statement))?;
        state.check_transaction(transaction)?;
        state.check_statement(statement)?;
        state.cursors.insert(statement);
        Ok(())
    }

    fn release_cursor(&self, statement: StatementHandle) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.record(TransportCall::ReleaseCursor(statement))?;
        state.check_statement(statement)?;
        state.cursors.remove(&statement);
        Ok(())
    }

    fn free_statement(&self, statement: StatementHandle) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.record(TransportCall::FreeStatement(statement))?;
        state.check_statement(statement)?;
        state.statements.remove(&statement);
        state.cursors.remove(&statement);
        Ok(())
    }

    fn exchange_events(
        &self,
        attachment: AttachmentHandle,
        subscription: &[u8],
    ) -> TransportResult<Vec<u8>> {
        let mut state = self.state.lock();
        state.record(TransportCall::ExchangeEvents(
            attachment,
            subscription.to_vec(),
        ))?;
        state.check_attachment(attachment)?;

        let database = state
            .attachments
            .get(&attachment)
            .cloned()
            .unwrap_or_default();

        let bad_buffer =
            || TransportError::new(codes::BAD_EVENT_BUFFER, "malformed event parameter block");

        let mut fresh = Vec::with_capacity(subscription.len());
        if subscription.is_empty() {
            return Ok(fresh);
        }
        if subscription[0] != EVENT_BUFFER_MARKER {
            return Err(bad_buffer());
        }
        fresh.push(EVENT_BUFFER_MARKER);

        for record in EventCursor::new(subscription) {
            let record = record.map_err(|_| bad_buffer())?;
            let posts = state
                .event_posts
                .get(&(database.clone(), record.name.to_vec()))
                .copied()
                .unwrap_or(0);
            encode_record(&mut fresh, record.name, posts.saturating_add(1));
        }
        Ok(fresh)
    }
}

//! The session: an arena of databases, transactions and their dependents.
//!
//! Resources reference each other by stable identifiers instead of
//! pointers. A transaction lists the databases it spans and the statements,
//! blobs and arrays open under it; each of those holds its transaction's id
//! as a back-reference, and each database lists the transactions that span
//! it. Attaching and detaching are edge inserts and removals on both sides.
//!
//! Teardown runs dependents before owners: blobs and arrays, then
//! statements, then databases.

mod databases;
mod dependents;
mod events;
mod transactions;

use crate::config::{DatabaseParams, SessionConfig};
use crate::transaction::Transaction;
use crate::transport::Transport;
use crate::types::{
    ArrayId, AttachmentHandle, BlobId, DatabaseId, StatementHandle, StatementId, TransactionId,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// A registered database and its connection state.
#[derive(Debug)]
pub(crate) struct Database {
    pub(crate) params: DatabaseParams,
    pub(crate) handle: Option<AttachmentHandle>,
    /// Transactions spanning this database.
    pub(crate) transactions: Vec<TransactionId>,
}

#[derive(Debug)]
pub(crate) struct Statement {
    pub(crate) database: DatabaseId,
    pub(crate) transaction: Option<TransactionId>,
    pub(crate) sql: String,
    /// Dropped when the database disconnects; reallocated on next use.
    pub(crate) handle: Option<StatementHandle>,
    pub(crate) cursor_open: bool,
}

/// A blob or array open under a transaction.
#[derive(Debug)]
pub(crate) struct Dependent {
    pub(crate) database: DatabaseId,
    pub(crate) transaction: Option<TransactionId>,
}

/// Owns every resource of one client session.
///
/// Single-threaded: calls are synchronous round-trips to the transport.
/// Share a session across threads only behind external synchronization.
pub struct Session {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    next_id: u64,
    databases: BTreeMap<DatabaseId, Database>,
    transactions: BTreeMap<TransactionId, Transaction>,
    statements: BTreeMap<StatementId, Statement>,
    blobs: BTreeMap<BlobId, Dependent>,
    arrays: BTreeMap<ArrayId, Dependent>,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        Self {
            config,
            transport,
            next_id: 1,
            databases: BTreeMap::new(),
            transactions: BTreeMap::new(),
            statements: BTreeMap::new(),
            blobs: BTreeMap::new(),
            arrays: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Identifiers are unique across all resource kinds of a session.
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn database_count(&self) -> usize {
        self.databases.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    pub fn array_count(&self) -> usize {
        self.arrays.len()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let transactions: Vec<TransactionId> = self.transactions.keys().rev().copied().collect();
        for tx in transactions {
            self.teardown_transaction(tx);
        }

        let statements: Vec<StatementId> = self.statements.keys().rev().copied().collect();
        for stmt in statements {
            self.discard_statement(stmt);
        }

        let databases: Vec<DatabaseId> = self.databases.keys().rev().copied().collect();
        for db in databases {
            if let Err(e) = self.disconnect(db) {
                warn!(database = %db, error = %e, "disconnect failed during session teardown");
            }
        }
    }
}

//! Per-transaction state.
//!
//! A `Transaction` holds its server handle, the databases it spans (each
//! paired with its option block) and back-references to the statements,
//! blobs and arrays open under it. Lifecycle operations that need the
//! transport or other resources are driven by the owning
//! [`Session`](crate::Session).

use super::options::OptionBlock;
use crate::error::{Result, SessionError};
use crate::types::{
    ArrayId, BlobId, DatabaseId, StatementId, TableReservation, TransactionHandle,
    TransactionPolicy,
};

/// Lifecycle state, keyed on whether a server handle is held.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Inactive,
    Active,
}

/// One database participating in the transaction.
#[derive(Clone, Debug)]
pub(crate) struct Attachment {
    pub(crate) database: DatabaseId,
    pub(crate) options: OptionBlock,
}

#[derive(Debug, Default)]
pub(crate) struct Transaction {
    handle: Option<TransactionHandle>,
    /// Attachments in attach order. Each entry carries its own option
    /// block, so databases and blocks can never drift out of step.
    attachments: Vec<Attachment>,
    statements: Vec<StatementId>,
    blobs: Vec<BlobId>,
    arrays: Vec<ArrayId>,
}

impl Transaction {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn state(&self) -> TransactionState {
        if self.handle.is_some() {
            TransactionState::Active
        } else {
            TransactionState::Inactive
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn handle(&self) -> Option<TransactionHandle> {
        self.handle
    }

    pub(crate) fn set_handle(&mut self, handle: TransactionHandle) {
        self.handle = Some(handle);
    }

    pub(crate) fn clear_handle(&mut self) {
        self.handle = None;
    }

    /// Fail with `IllegalState` if the transaction has started.
    pub(crate) fn ensure_inactive(&self, action: &str) -> Result<()> {
        if self.is_active() {
            return Err(SessionError::IllegalState(format!(
                "Can't {} if transaction started",
                action
            )));
        }
        Ok(())
    }

    /// Return the handle, or fail with `IllegalState` if not started.
    pub(crate) fn require_handle(&self) -> Result<TransactionHandle> {
        self.handle
            .ok_or_else(|| SessionError::IllegalState("Transaction is not started".into()))
    }

    // --- Attachments ---

    pub(crate) fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub(crate) fn is_attached(&self, database: DatabaseId) -> bool {
        self.attachments.iter().any(|a| a.database == database)
    }

    pub(crate) fn databases(&self) -> Vec<DatabaseId> {
        self.attachments.iter().map(|a| a.database).collect()
    }

    pub(crate) fn options(&self, database: DatabaseId) -> Option<&OptionBlock> {
        self.attachments
            .iter()
            .find(|a| a.database == database)
            .map(|a| &a.options)
    }

    /// Add a database with a block built from `policy`.
    pub(crate) fn attach(&mut self, database: DatabaseId, policy: &TransactionPolicy) -> Result<()> {
        self.ensure_inactive("attach a database")?;
        self.attachments.push(Attachment {
            database,
            options: OptionBlock::from_policy(policy),
        });
        Ok(())
    }

    /// Remove a database and discard its block.
    pub(crate) fn detach(&mut self, database: DatabaseId) -> Result<OptionBlock> {
        self.ensure_inactive("detach a database")?;
        let index = self
            .attachments
            .iter()
            .position(|a| a.database == database)
            .ok_or_else(|| {
                SessionError::InvalidArgument(format!(
                    "{} is not attached to this transaction",
                    database
                ))
            })?;
        Ok(self.attachments.remove(index).options)
    }

    /// Remove the most recently attached database, for teardown.
    pub(crate) fn pop_attachment(&mut self) -> Option<Attachment> {
        self.attachments.pop()
    }

    pub(crate) fn reserve_table(
        &mut self,
        database: DatabaseId,
        table: &str,
        reservation: TableReservation,
    ) -> Result<()> {
        self.ensure_inactive("add table reservation")?;
        let attachment = self
            .attachments
            .iter_mut()
            .find(|a| a.database == database)
            .ok_or_else(|| {
                SessionError::NotFound(format!(
                    "{} is not attached to this transaction",
                    database
                ))
            })?;
        attachment.options.reserve_table(table, reservation)
    }

    // --- Dependents ---

    pub(crate) fn statements(&self) -> &[StatementId] {
        &self.statements
    }

    pub(crate) fn blobs(&self) -> &[BlobId] {
        &self.blobs
    }

    pub(crate) fn arrays(&self) -> &[ArrayId] {
        &self.arrays
    }

    pub(crate) fn register_statement(&mut self, id: StatementId) {
        self.statements.push(id);
    }

    pub(crate) fn register_blob(&mut self, id: BlobId) {
        self.blobs.push(id);
    }

    pub(crate) fn register_array(&mut self, id: ArrayId) {
        self.arrays.push(id);
    }

    pub(crate) fn deregister_statement(&mut self, id: StatementId) -> bool {
        remove_item(&mut self.statements, id)
    }

    pub(crate) fn deregister_blob(&mut self, id: BlobId) -> bool {
        remove_item(&mut self.blobs, id)
    }

    pub(crate) fn deregister_array(&mut self, id: ArrayId) -> bool {
        remove_item(&mut self.arrays, id)
    }

    /// Latest registered dependents first, for teardown.
    pub(crate) fn pop_blob(&mut self) -> Option<BlobId> {
        self.blobs.pop()
    }

    pub(crate) fn pop_array(&mut self) -> Option<ArrayId> {
        self.arrays.pop()
    }

    pub(crate) fn pop_statement(&mut self) -> Option<StatementId> {
        self.statements.pop()
    }
}

fn remove_item<T: PartialEq>(items: &mut Vec<T>, item: T) -> bool {
    match items.iter().position(|x| *x == item) {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}

//! Statements, blobs and arrays registered under a transaction.

use super::{Dependent, Session, Statement};
use crate::error::{Result, SessionError};
use crate::types::{ArrayId, BlobId, DatabaseId, StatementId, TransactionId};
use tracing::{debug, warn};

impl Session {
    /// Prepare a statement on `db` under transaction `tx`.
    ///
    /// The database must be connected and attached to the transaction.
    pub fn create_statement(
        &mut self,
        db: DatabaseId,
        tx: TransactionId,
        sql: &str,
    ) -> Result<StatementId> {
        self.check_attached(db, tx)?;
        let attachment = self.database_entry(db)?.handle.ok_or_else(|| {
            SessionError::IllegalState(format!("{} must be connected to prepare statements", db))
        })?;

        let handle = self
            .transport
            .allocate_statement(attachment)
            .map_err(|e| SessionError::transport("Statement::prepare", e))?;

        let stmt = StatementId(self.next_id());
        self.statements.insert(
            stmt,
            Statement {
                database: db,
                transaction: Some(tx),
                sql: sql.to_string(),
                handle: Some(handle),
                cursor_open: false,
            },
        );
        self.transaction_entry_mut(tx)?.register_statement(stmt);
        debug!(statement = %stmt, transaction = %tx, ?handle, "statement prepared");
        Ok(stmt)
    }

    /// Open a result cursor. The statement's transaction must be started.
    ///
    /// A cursor left open by a previous execution is released first.
    pub fn open_cursor(&mut self, stmt: StatementId) -> Result<()> {
        let statement = self.statement_entry(stmt)?;
        let tx = statement.transaction.ok_or_else(|| {
            SessionError::IllegalState(format!("{} is not bound to a transaction", stmt))
        })?;
        let database = statement.database;
        let reopen = statement.cursor_open;
        let tx_handle = self.transaction_entry(tx)?.require_handle()?;

        if reopen {
            if let Err(e) = self.release_cursor(stmt) {
                warn!(statement = %stmt, error = %e, "stale cursor release failed");
            }
        }

        let handle = match self.statement_entry(stmt)?.handle {
            Some(handle) => handle,
            None => {
                let attachment = self.database_entry(database)?.handle.ok_or_else(|| {
                    SessionError::IllegalState(format!("{} is not connected", database))
                })?;
                let handle = self
                    .transport
                    .allocate_statement(attachment)
                    .map_err(|e| SessionError::transport("Statement::prepare", e))?;
                self.statement_entry_mut(stmt)?.handle = Some(handle);
                handle
            }
        };

        self.transport
            .open_cursor(tx_handle, handle)
            .map_err(|e| SessionError::transport("Statement::execute", e))?;
        self.statement_entry_mut(stmt)?.cursor_open = true;
        Ok(())
    }

    /// Close the statement's cursor. No-op if none is open.
    ///
    /// If the server refuses, the cursor stays open and the call can be
    /// retried.
    pub fn close_cursor(&mut self, stmt: StatementId) -> Result<()> {
        let statement = self.statement_entry(stmt)?;
        if !statement.cursor_open {
            return Ok(());
        }
        if let Some(handle) = statement.handle {
            self.transport
                .release_cursor(handle)
                .map_err(|e| SessionError::transport("Statement::close", e))?;
        }
        self.statement_entry_mut(stmt)?.cursor_open = false;
        Ok(())
    }

    /// Free a statement, detaching it from its transaction first.
    pub fn drop_statement(&mut self, stmt: StatementId) -> Result<()> {
        self.statement_entry(stmt)?;
        self.discard_statement(stmt);
        Ok(())
    }

    pub fn statement_transaction(&self, stmt: StatementId) -> Result<Option<TransactionId>> {
        Ok(self.statement_entry(stmt)?.transaction)
    }

    pub fn statement_sql(&self, stmt: StatementId) -> Result<&str> {
        Ok(&self.statement_entry(stmt)?.sql)
    }

    pub fn has_open_cursor(&self, stmt: StatementId) -> Result<bool> {
        Ok(self.statement_entry(stmt)?.cursor_open)
    }

    // --- Blobs ---

    /// Open a blob on `db` under transaction `tx`.
    pub fn create_blob(&mut self, db: DatabaseId, tx: TransactionId) -> Result<BlobId> {
        self.check_attached(db, tx)?;
        let blob = BlobId(self.next_id());
        self.blobs.insert(
            blob,
            Dependent {
                database: db,
                transaction: Some(tx),
            },
        );
        self.transaction_entry_mut(tx)?.register_blob(blob);
        debug!(blob = %blob, transaction = %tx, "blob opened");
        Ok(blob)
    }

    pub fn drop_blob(&mut self, blob: BlobId) -> Result<()> {
        let entry = self
            .blobs
            .remove(&blob)
            .ok_or_else(|| SessionError::NotFound(format!("Unknown blob {}", blob)))?;
        if let Some(tx) = entry.transaction {
            if let Some(transaction) = self.transactions.get_mut(&tx) {
                transaction.deregister_blob(blob);
            }
        }
        Ok(())
    }

    pub fn blob_transaction(&self, blob: BlobId) -> Result<Option<TransactionId>> {
        self.blobs
            .get(&blob)
            .map(|b| b.transaction)
            .ok_or_else(|| SessionError::NotFound(format!("Unknown blob {}", blob)))
    }

    // --- Arrays ---

    /// Open an array slice on `db` under transaction `tx`.
    pub fn create_array(&mut self, db: DatabaseId, tx: TransactionId) -> Result<ArrayId> {
        self.check_attached(db, tx)?;
        let array = ArrayId(self.next_id());
        self.arrays.insert(
            array,
            Dependent {
                database: db,
                transaction: Some(tx),
            },
        );
        self.transaction_entry_mut(tx)?.register_array(array);
        debug!(array = %array, transaction = %tx, "array opened");
        Ok(array)
    }

    pub fn drop_array(&mut self, array: ArrayId) -> Result<()> {
        let entry = self
            .arrays
            .remove(&array)
            .ok_or_else(|| SessionError::NotFound(format!("Unknown array {}", array)))?;
        if let Some(tx) = entry.transaction {
            if let Some(transaction) = self.transactions.get_mut(&tx) {
                transaction.deregister_array(array);
            }
        }
        Ok(())
    }

    pub fn array_transaction(&self, array: ArrayId) -> Result<Option<TransactionId>> {
        self.arrays
            .get(&array)
            .map(|a| a.transaction)
            .ok_or_else(|| SessionError::NotFound(format!("Unknown array {}", array)))
    }

    // --- Internals ---

    fn statement_entry(&self, stmt: StatementId) -> Result<&Statement> {
        self.statements
            .get(&stmt)
            .ok_or_else(|| SessionError::NotFound(format!("Unknown statement {}", stmt)))
    }

    fn statement_entry_mut(&mut self, stmt: StatementId) -> Result<&mut Statement> {
        self.statements
            .get_mut(&stmt)
            .ok_or_else(|| SessionError::NotFound(format!("Unknown statement {}", stmt)))
    }

    /// Both the transaction and the database must exist, and the database
    /// must be one the transaction spans.
    fn check_attached(&self, db: DatabaseId, tx: TransactionId) -> Result<()> {
        self.database_entry(db)?;
        if !self.transaction_entry(tx)?.is_attached(db) {
            return Err(SessionError::NotFound(format!(
                "{} is not attached to {}",
                db, tx
            )));
        }
        Ok(())
    }

    /// Mark the cursor closed, then ask the server to release it. The
    /// flag is cleared even if the server call fails.
    pub(super) fn release_cursor(&mut self, stmt: StatementId) -> Result<()> {
        let Some(statement) = self.statements.get_mut(&stmt) else {
            return Ok(());
        };
        if !statement.cursor_open {
            return Ok(());
        }
        statement.cursor_open = false;

        match statement.handle {
            Some(handle) => self
                .transport
                .release_cursor(handle)
                .map_err(|e| SessionError::transport("Statement::close", e)),
            None => Ok(()),
        }
    }

    /// Unbind a statement its transaction has already let go of.
    pub(super) fn sever_statement(&mut self, stmt: StatementId) {
        if let Err(e) = self.release_cursor(stmt) {
            warn!(statement = %stmt, error = %e, "cursor release failed while detaching");
        }
        if let Some(statement) = self.statements.get_mut(&stmt) {
            statement.transaction = None;
        }
    }

    /// Free a statement, never failing.
    pub(super) fn discard_statement(&mut self, stmt: StatementId) {
        let transaction = self.statements.get(&stmt).and_then(|s| s.transaction);
        if let Some(tx) = transaction {
            if let Some(entry) = self.transactions.get_mut(&tx) {
                entry.deregister_statement(stmt);
            }
            self.sever_statement(stmt);
        }

        let Some(statement) = self.statements.remove(&stmt) else {
            return;
        };
        if let Some(handle) = statement.handle {
            if let Err(e) = self.transport.free_statement(handle) {
                warn!(statement = %stmt, error = %e, "statement free failed");
            }
        }
        debug!(statement = %stmt, "statement dropped");
    }
}

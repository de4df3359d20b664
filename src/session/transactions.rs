//! Transaction coordinator operations.

use super::Session;
use crate::error::{Result, SessionError};
use crate::transaction::{Transaction, TransactionState};
use crate::transport::StartDescriptor;
use crate::types::{
    ArrayId, BlobId, DatabaseId, StatementId, TableReservation, TransactionHandle, TransactionId,
    TransactionPolicy,
};
use tracing::{debug, warn};

impl Session {
    /// Create a transaction spanning `db`, configured by `policy`.
    pub fn create_transaction(
        &mut self,
        db: DatabaseId,
        policy: TransactionPolicy,
    ) -> Result<TransactionId> {
        let tx = TransactionId(self.next_id());
        self.transactions.insert(tx, Transaction::new());

        if let Err(e) = self.attach_database(tx, db, policy) {
            self.transactions.remove(&tx);
            return Err(e);
        }

        debug!(transaction = %tx, database = %db, "transaction created");
        Ok(tx)
    }

    /// Create a transaction using the session's default policy.
    pub fn create_default_transaction(&mut self, db: DatabaseId) -> Result<TransactionId> {
        let policy = self.config.default_policy;
        self.create_transaction(db, policy)
    }

    /// Add a database to a transaction that has not started yet.
    pub fn attach_database(
        &mut self,
        tx: TransactionId,
        db: DatabaseId,
        policy: TransactionPolicy,
    ) -> Result<()> {
        let transaction = self
            .transactions
            .get_mut(&tx)
            .ok_or_else(|| unknown_transaction(tx))?;
        transaction.ensure_inactive("attach a database")?;

        let database = self.databases.get_mut(&db).ok_or_else(|| {
            SessionError::InvalidArgument(format!("Can't attach unknown database {}", db))
        })?;
        if transaction.is_attached(db) {
            return Err(SessionError::InvalidArgument(format!(
                "{} is already attached to {}",
                db, tx
            )));
        }

        transaction.attach(db, &policy)?;
        database.transactions.push(tx);
        debug!(transaction = %tx, database = %db, ?policy, "database attached");
        Ok(())
    }

    /// Remove a database from a transaction that has not started yet.
    pub fn detach_database(&mut self, tx: TransactionId, db: DatabaseId) -> Result<()> {
        let transaction = self
            .transactions
            .get_mut(&tx)
            .ok_or_else(|| unknown_transaction(tx))?;
        transaction.detach(db)?;

        if let Some(database) = self.databases.get_mut(&db) {
            database.transactions.retain(|t| *t != tx);
        }
        debug!(transaction = %tx, database = %db, "database detached");
        Ok(())
    }

    /// Reserve a table lock on one of the transaction's databases.
    pub fn add_reservation(
        &mut self,
        tx: TransactionId,
        db: DatabaseId,
        table: &str,
        reservation: TableReservation,
    ) -> Result<()> {
        self.transaction_entry_mut(tx)?
            .reserve_table(db, table, reservation)?;
        debug!(transaction = %tx, database = %db, table, ?reservation, "table reserved");
        Ok(())
    }

    /// Start the transaction on every attached database at once.
    ///
    /// No-op if already started. On failure no handle is assigned.
    pub fn start(&mut self, tx: TransactionId) -> Result<()> {
        let transaction = self.transaction_entry(tx)?;
        if transaction.is_active() {
            return Ok(());
        }
        if transaction.attachments().is_empty() {
            return Err(SessionError::IllegalState(format!(
                "No database is attached to {}",
                tx
            )));
        }

        let mut descriptors = Vec::with_capacity(transaction.attachments().len());
        for attachment in transaction.attachments() {
            let handle = self
                .databases
                .get(&attachment.database)
                .and_then(|d| d.handle)
                .ok_or_else(|| {
                    SessionError::IllegalState(format!(
                        "All attached databases must be connected ({} is not)",
                        attachment.database
                    ))
                })?;
            descriptors.push(StartDescriptor {
                attachment: handle,
                options: attachment.options.as_bytes(),
            });
        }

        let handle = self
            .transport
            .begin_transaction(&descriptors)
            .map_err(|e| SessionError::transport("Transaction::start", e))?;
        let databases = descriptors.len();

        self.transaction_entry_mut(tx)?.set_handle(handle);
        debug!(transaction = %tx, ?handle, databases, "transaction started");
        Ok(())
    }

    /// Commit and end the transaction, then close cursors opened under it.
    pub fn commit(&mut self, tx: TransactionId) -> Result<()> {
        let handle = self.transaction_entry(tx)?.require_handle()?;
        self.transport
            .commit(handle)
            .map_err(|e| SessionError::transport("Transaction::commit", e))?;

        self.transaction_entry_mut(tx)?.clear_handle();
        self.release_cursors(tx);
        debug!(transaction = %tx, "transaction committed");
        Ok(())
    }

    /// Commit the work so far. The transaction stays started.
    pub fn commit_retain(&mut self, tx: TransactionId) -> Result<()> {
        let handle = self.transaction_entry(tx)?.require_handle()?;
        self.transport
            .commit_retaining(handle)
            .map_err(|e| SessionError::transport("Transaction::commit_retain", e))?;
        debug!(transaction = %tx, "transaction commit retained");
        Ok(())
    }

    /// Roll back and end the transaction. No-op if not started.
    pub fn rollback(&mut self, tx: TransactionId) -> Result<()> {
        let Some(handle) = self.transaction_entry(tx)?.handle() else {
            return Ok(());
        };
        self.transport
            .rollback(handle)
            .map_err(|e| SessionError::transport("Transaction::rollback", e))?;

        self.transaction_entry_mut(tx)?.clear_handle();
        self.release_cursors(tx);
        debug!(transaction = %tx, "transaction rolled back");
        Ok(())
    }

    /// Roll back the work so far. The transaction stays started.
    pub fn rollback_retain(&mut self, tx: TransactionId) -> Result<()> {
        let handle = self.transaction_entry(tx)?.require_handle()?;
        self.transport
            .rollback_retaining(handle)
            .map_err(|e| SessionError::transport("Transaction::rollback_retain", e))?;
        debug!(transaction = %tx, "transaction rollback retained");
        Ok(())
    }

    /// Destroy a transaction.
    ///
    /// A started transaction is rolled back first; a rollback failure is
    /// logged, not returned. Blobs, arrays and statements are then detached,
    /// latest first, followed by every database.
    pub fn drop_transaction(&mut self, tx: TransactionId) -> Result<()> {
        self.transaction_entry(tx)?;
        self.teardown_transaction(tx);
        Ok(())
    }

    // --- Inspection ---

    pub fn state(&self, tx: TransactionId) -> Result<TransactionState> {
        Ok(self.transaction_entry(tx)?.state())
    }

    pub fn is_active(&self, tx: TransactionId) -> Result<bool> {
        Ok(self.transaction_entry(tx)?.is_active())
    }

    pub fn transaction_handle(&self, tx: TransactionId) -> Result<Option<TransactionHandle>> {
        Ok(self.transaction_entry(tx)?.handle())
    }

    /// Databases in attach order.
    pub fn attached_databases(&self, tx: TransactionId) -> Result<Vec<DatabaseId>> {
        Ok(self.transaction_entry(tx)?.databases())
    }

    /// Wire bytes of the option block built for one attached database.
    pub fn option_block(&self, tx: TransactionId, db: DatabaseId) -> Result<&[u8]> {
        self.transaction_entry(tx)?
            .options(db)
            .map(|block| block.as_bytes())
            .ok_or_else(|| {
                SessionError::NotFound(format!("{} is not attached to {}", db, tx))
            })
    }

    pub fn transaction_statements(&self, tx: TransactionId) -> Result<Vec<StatementId>> {
        Ok(self.transaction_entry(tx)?.statements().to_vec())
    }

    pub fn transaction_blobs(&self, tx: TransactionId) -> Result<Vec<BlobId>> {
        Ok(self.transaction_entry(tx)?.blobs().to_vec())
    }

    pub fn transaction_arrays(&self, tx: TransactionId) -> Result<Vec<ArrayId>> {
        Ok(self.transaction_entry(tx)?.arrays().to_vec())
    }

    // --- Internals ---

    pub(super) fn transaction_entry(&self, tx: TransactionId) -> Result<&Transaction> {
        self.transactions
            .get(&tx)
            .ok_or_else(|| unknown_transaction(tx))
    }

    pub(super) fn transaction_entry_mut(&mut self, tx: TransactionId) -> Result<&mut Transaction> {
        self.transactions
            .get_mut(&tx)
            .ok_or_else(|| unknown_transaction(tx))
    }

    /// Close the cursor of every statement under `tx`, latest first.
    /// Failures are logged and skipped.
    fn release_cursors(&mut self, tx: TransactionId) {
        let statements = match self.transactions.get(&tx) {
            Some(transaction) => transaction.statements().to_vec(),
            None => return,
        };

        for stmt in statements.into_iter().rev() {
            if let Err(e) = self.release_cursor(stmt) {
                warn!(transaction = %tx, statement = %stmt, error = %e, "cursor release failed");
            }
        }
    }

    /// Tear down a transaction, never failing.
    pub(super) fn teardown_transaction(&mut self, tx: TransactionId) {
        if let Err(e) = self.rollback(tx) {
            warn!(transaction = %tx, error = %e, "implicit rollback failed during teardown");
        }
        if let Some(transaction) = self.transactions.get_mut(&tx) {
            transaction.clear_handle();
        }

        while let Some(blob) = self.transactions.get_mut(&tx).and_then(Transaction::pop_blob) {
            if let Some(entry) = self.blobs.get_mut(&blob) {
                entry.transaction = None;
            }
        }

        while let Some(array) = self.transactions.get_mut(&tx).and_then(Transaction::pop_array) {
            if let Some(entry) = self.arrays.get_mut(&array) {
                entry.transaction = None;
            }
        }

        while let Some(stmt) = self
            .transactions
            .get_mut(&tx)
            .and_then(Transaction::pop_statement)
        {
            self.sever_statement(stmt);
        }

        while let Some(attachment) = self
            .transactions
            .get_mut(&tx)
            .and_then(Transaction::pop_attachment)
        {
            if let Some(database) = self.databases.get_mut(&attachment.database) {
                database.transactions.retain(|t| *t != tx);
            }
        }

        self.transactions.remove(&tx);
        debug!(transaction = %tx, "transaction destroyed");
    }
}

fn unknown_transaction(tx: TransactionId) -> SessionError {
    SessionError::NotFound(format!("Unknown transaction {}", tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseParams;
    use crate::transaction::{TPB_LOCK_WRITE, TPB_PROTECTED, TPB_VERSION3};
    use crate::transport::{MemoryTransport, TransportCall, TransportError, TransportOp};
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryTransport>, Session, DatabaseId) {
        let transport = Arc::new(MemoryTransport::new());
        let mut session = Session::new(transport.clone());
        let db = session.add_database(DatabaseParams::new("srv", "main.fdb"));
        session.connect(db).unwrap();
        (transport, session, db)
    }

    #[test]
    fn test_start_commit_cycle() {
        let (transport, mut session, db) = setup();
        let tx = session.create_default_transaction(db).unwrap();

        session.start(tx).unwrap();
        assert_eq!(session.state(tx).unwrap(), TransactionState::Active);
        session.start(tx).unwrap();
        assert_eq!(transport.calls_of(TransportOp::Begin).len(), 1);

        session.commit(tx).unwrap();
        assert_eq!(session.state(tx).unwrap(), TransactionState::Inactive);
        assert!(matches!(
            session.commit(tx),
            Err(SessionError::IllegalState(_))
        ));
    }

    #[test]
    fn test_start_sends_option_blocks() {
        let (transport, mut session, db) = setup();
        let tx = session.create_default_transaction(db).unwrap();
        session
            .add_reservation(tx, db, "EMP", TableReservation::ProtectedWrite)
            .unwrap();
        session.start(tx).unwrap();

        let handle = session.attachment_handle(db).unwrap().unwrap();
        let begin = transport.calls_of(TransportOp::Begin);
        let mut block = vec![TPB_VERSION3, 9, 2, 6, TPB_LOCK_WRITE, 3];
        block.extend_from_slice(b"EMP");
        block.push(TPB_PROTECTED);
        assert_eq!(
            begin,
            vec![TransportCall::Begin {
                attachments: vec![(handle, block)]
            }]
        );
    }

    #[test]
    fn test_start_failure_leaves_inactive() {
        let (transport, mut session, db) = setup();
        let tx = session.create_default_transaction(db).unwrap();
        transport.fail_next(TransportOp::Begin, TransportError::new(335_544_345, "lock conflict"));

        let result = session.start(tx);
        assert!(matches!(result, Err(SessionError::Transport { .. })));
        assert_eq!(session.transaction_handle(tx).unwrap(), None);
    }

    #[test]
    fn test_start_requires_connected_databases() {
        let (_transport, mut session, db) = setup();
        let other = session.add_database(DatabaseParams::new("srv", "other.fdb"));
        let tx = session.create_default_transaction(db).unwrap();
        session
            .attach_database(tx, other, TransactionPolicy::default())
            .unwrap();

        assert!(matches!(
            session.start(tx),
            Err(SessionError::IllegalState(_))
        ));
        assert!(!session.is_active(tx).unwrap());
    }

    #[test]
    fn test_start_without_databases() {
        let (_transport, mut session, db) = setup();
        let tx = session.create_default_transaction(db).unwrap();
        session.detach_database(tx, db).unwrap();

        assert!(matches!(
            session.start(tx),
            Err(SessionError::IllegalState(_))
        ));
        assert_eq!(session.transaction_handle(tx).unwrap(), None);
    }

    #[test]
    fn test_retaining_keeps_transaction_started() {
        let (transport, mut session, db) = setup();
        let tx = session.create_default_transaction(db).unwrap();
        assert!(matches!(
            session.commit_retain(tx),
            Err(SessionError::IllegalState(_))
        ));
        assert!(matches!(
            session.rollback_retain(tx),
            Err(SessionError::IllegalState(_))
        ));

        session.start(tx).unwrap();
        let handle = session.transaction_handle(tx).unwrap();
        session.commit_retain(tx).unwrap();
        session.rollback_retain(tx).unwrap();
        assert!(session.is_active(tx).unwrap());
        assert_eq!(session.transaction_handle(tx).unwrap(), handle);
        assert_eq!(transport.live_transactions(), 1);
    }

    #[test]
    fn test_rollback_when_inactive_is_noop() {
        let (transport, mut session, db) = setup();
        let tx = session.create_default_transaction(db).unwrap();
        session.rollback(tx).unwrap();
        assert!(transport.calls_of(TransportOp::Rollback).is_empty());
    }

    #[test]
    fn test_commit_failure_stays_active() {
        let (transport, mut session, db) = setup();
        let tx = session.create_default_transaction(db).unwrap();
        session.start(tx).unwrap();
        transport.fail_next(TransportOp::Commit, TransportError::new(335_544_336, "deadlock"));

        assert!(matches!(
            session.commit(tx),
            Err(SessionError::Transport { .. })
        ));
        assert!(session.is_active(tx).unwrap());
    }

    #[test]
    fn test_create_with_unknown_database() {
        let (_transport, mut session, _db) = setup();
        let result = session.create_transaction(DatabaseId(999), TransactionPolicy::default());
        assert!(matches!(result, Err(SessionError::InvalidArgument(_))));
        assert_eq!(session.transaction_count(), 0);
    }

    #[test]
    fn test_back_references() {
        let (_transport, mut session, db) = setup();
        let tx1 = session.create_default_transaction(db).unwrap();
        let tx2 = session.create_default_transaction(db).unwrap();
        assert_eq!(session.database_transactions(db).unwrap(), vec![tx1, tx2]);

        session.detach_database(tx1, db).unwrap();
        assert_eq!(session.database_transactions(db).unwrap(), vec![tx2]);

        session.drop_transaction(tx2).unwrap();
        assert!(session.database_transactions(db).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_attach_rejected() {
        let (_transport, mut session, db) = setup();
        let tx = session.create_default_transaction(db).unwrap();
        assert!(matches!(
            session.attach_database(tx, db, TransactionPolicy::default()),
            Err(SessionError::InvalidArgument(_))
        ));
        assert_eq!(session.attached_databases(tx).unwrap(), vec![db]);
    }

    #[test]
    fn test_attach_while_active_checked_first() {
        let (_transport, mut session, db) = setup();
        let tx = session.create_default_transaction(db).unwrap();
        session.start(tx).unwrap();

        assert!(matches!(
            session.attach_database(tx, DatabaseId(999), TransactionPolicy::default()),
            Err(SessionError::IllegalState(_))
        ));
        assert!(matches!(
            session.detach_database(tx, DatabaseId(999)),
            Err(SessionError::IllegalState(_))
        ));
    }
}

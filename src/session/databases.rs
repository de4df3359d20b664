//! Database registration and connection lifecycle.

use super::{Database, Session};
use crate::config::DatabaseParams;
use crate::error::{Result, SessionError};
use crate::types::{AttachmentHandle, DatabaseId, TransactionId};
use tracing::debug;

impl Session {
    /// Register a database. It is not connected until [`connect`](Self::connect).
    pub fn add_database(&mut self, params: DatabaseParams) -> DatabaseId {
        let id = DatabaseId(self.next_id());
        debug!(database = %id, target = %params.connection_string(), "database registered");
        self.databases.insert(
            id,
            Database {
                params,
                handle: None,
                transactions: Vec::new(),
            },
        );
        id
    }

    /// Connect through the transport. No-op if already connected.
    pub fn connect(&mut self, db: DatabaseId) -> Result<()> {
        let database = self.database_entry(db)?;
        if database.handle.is_some() {
            return Ok(());
        }

        let handle = self
            .transport
            .attach(&database.params)
            .map_err(|e| SessionError::transport("Database::connect", e))?;

        if let Some(database) = self.databases.get_mut(&db) {
            database.handle = Some(handle);
        }
        debug!(database = %db, ?handle, "database connected");
        Ok(())
    }

    /// Disconnect. No-op if not connected.
    ///
    /// Every started transaction spanning the database is rolled back first.
    /// Statements on the database lose their server handle and open cursor.
    pub fn disconnect(&mut self, db: DatabaseId) -> Result<()> {
        let database = self.database_entry(db)?;
        let Some(handle) = database.handle else {
            return Ok(());
        };

        for tx in database.transactions.clone() {
            self.rollback(tx)?;
        }

        for statement in self.statements.values_mut() {
            if statement.database == db {
                statement.handle = None;
                statement.cursor_open = false;
            }
        }

        self.transport
            .detach(handle)
            .map_err(|e| SessionError::transport("Database::disconnect", e))?;

        if let Some(database) = self.databases.get_mut(&db) {
            database.handle = None;
        }
        debug!(database = %db, "database disconnected");
        Ok(())
    }

    pub fn is_connected(&self, db: DatabaseId) -> Result<bool> {
        Ok(self.database_entry(db)?.handle.is_some())
    }

    /// Server handle of a connected database.
    pub fn attachment_handle(&self, db: DatabaseId) -> Result<Option<AttachmentHandle>> {
        Ok(self.database_entry(db)?.handle)
    }

    pub fn database_params(&self, db: DatabaseId) -> Result<&DatabaseParams> {
        Ok(&self.database_entry(db)?.params)
    }

    /// Transactions that currently span this database.
    pub fn database_transactions(&self, db: DatabaseId) -> Result<Vec<TransactionId>> {
        Ok(self.database_entry(db)?.transactions.clone())
    }

    /// Disconnect and forget a database.
    ///
    /// Fails with `IllegalState` while any transaction, statement, blob or
    /// array still references it.
    pub fn remove_database(&mut self, db: DatabaseId) -> Result<()> {
        let database = self.database_entry(db)?;
        if !database.transactions.is_empty() {
            return Err(SessionError::IllegalState(format!(
                "{} is still attached to {} transaction(s)",
                db,
                database.transactions.len()
            )));
        }

        let referenced = self.statements.values().any(|s| s.database == db)
            || self.blobs.values().any(|b| b.database == db)
            || self.arrays.values().any(|a| a.database == db);
        if referenced {
            return Err(SessionError::IllegalState(format!(
                "{} still has open statements, blobs or arrays",
                db
            )));
        }

        self.disconnect(db)?;
        self.databases.remove(&db);
        debug!(database = %db, "database removed");
        Ok(())
    }

    pub(super) fn database_entry(&self, db: DatabaseId) -> Result<&Database> {
        self.databases
            .get(&db)
            .ok_or_else(|| SessionError::NotFound(format!("Unknown database {}", db)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, TransportError, TransportOp};
    use crate::types::TransactionPolicy;
    use std::sync::Arc;

    fn session() -> (Arc<MemoryTransport>, Session) {
        let transport = Arc::new(MemoryTransport::new());
        let session = Session::new(transport.clone());
        (transport, session)
    }

    #[test]
    fn test_connect_disconnect() {
        let (transport, mut session) = session();
        let db = session.add_database(DatabaseParams::new("srv", "a.fdb"));
        assert!(!session.is_connected(db).unwrap());

        session.connect(db).unwrap();
        session.connect(db).unwrap();
        assert!(session.is_connected(db).unwrap());
        assert_eq!(transport.calls_of(TransportOp::Attach).len(), 1);

        let handle = session.attachment_handle(db).unwrap().unwrap();
        assert!(transport.is_attached(handle));

        session.disconnect(db).unwrap();
        assert!(!session.is_connected(db).unwrap());
        assert!(!transport.is_attached(handle));
    }

    #[test]
    fn test_connect_failure_leaves_disconnected() {
        let (transport, mut session) = session();
        let db = session.add_database(DatabaseParams::new("srv", "a.fdb"));
        transport.fail_next(
            TransportOp::Attach,
            TransportError::new(335_544_344, "I/O error during open"),
        );

        let result = session.connect(db);
        assert!(matches!(result, Err(SessionError::Transport { .. })));
        assert!(!session.is_connected(db).unwrap());
    }

    #[test]
    fn test_disconnect_rolls_back_started_transactions() {
        let (transport, mut session) = session();
        let db = session.add_database(DatabaseParams::new("srv", "a.fdb"));
        session.connect(db).unwrap();
        let tx = session
            .create_transaction(db, TransactionPolicy::default())
            .unwrap();
        session.start(tx).unwrap();

        session.disconnect(db).unwrap();
        assert!(!session.is_active(tx).unwrap());
        assert_eq!(transport.live_transactions(), 0);
        assert_eq!(transport.calls_of(TransportOp::Rollback).len(), 1);
    }

    #[test]
    fn test_remove_database_with_transaction() {
        let (_transport, mut session) = session();
        let db = session.add_database(DatabaseParams::new("srv", "a.fdb"));
        let tx = session
            .create_transaction(db, TransactionPolicy::default())
            .unwrap();

        assert!(matches!(
            session.remove_database(db),
            Err(SessionError::IllegalState(_))
        ));

        session.drop_transaction(tx).unwrap();
        session.remove_database(db).unwrap();
        assert_eq!(session.database_count(), 0);
        assert!(matches!(
            session.is_connected(db),
            Err(SessionError::NotFound(_))
        ));
    }
}

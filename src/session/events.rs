//! Event polling over a database connection.

use super::Session;
use crate::error::{Result, SessionError};
use crate::events::{DispatchReport, EventSet};
use crate::types::DatabaseId;
use tracing::debug;

impl Session {
    /// Exchange the subscription buffer with the server and fire listeners
    /// whose events were posted since the last poll.
    ///
    /// An empty set returns an empty report without a round-trip. The set
    /// must have been created for `db`; its baselines mean nothing elsewhere.
    pub fn poll_events(&self, db: DatabaseId, events: &mut EventSet) -> Result<DispatchReport> {
        let database = self.database_entry(db)?;
        if events.database() != db {
            return Err(SessionError::InvalidArgument(format!(
                "Event set belongs to {}, not {}",
                events.database(),
                db
            )));
        }
        if events.is_empty() {
            return Ok(DispatchReport::default());
        }
        let attachment = database.handle.ok_or_else(|| {
            SessionError::IllegalState(format!("{} must be connected to poll events", db))
        })?;

        let fresh = self
            .transport
            .exchange_events(attachment, events.buffers().subscription())
            .map_err(|e| SessionError::transport("Events::poll", e))?;

        let report = events.reconcile(&fresh)?;
        debug!(
            database = %db,
            fired = report.fired.len(),
            failed = report.failed.len(),
            "events polled"
        );
        Ok(report)
    }
}

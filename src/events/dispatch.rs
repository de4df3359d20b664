//! Counter diffing and listener dispatch.

use super::buffer::EventCursor;
use super::set::EventSet;
use super::types::{DispatchReport, EventListener, EventNotification};
use crate::error::{Result, SessionError};
use crate::types::DatabaseId;
use std::any::Any;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

/// A counter increase found while diffing, applied after validation.
struct PendingFire {
    index: usize,
    name: String,
    occurrences: u32,
    new_count: u32,
    count_range: Range<usize>,
}

impl EventSet {
    /// Diff freshly returned counts against the baseline and fire listeners.
    ///
    /// Every listener whose count went up is called once with the increase.
    /// Its baseline moves to the new count only if the listener succeeded.
    /// A failed or panicking listener keeps its old baseline, so the same
    /// occurrences are offered again next time.
    /// The fresh buffer is validated in full before anything is mutated: a
    /// record count or name mismatch fails with `InternalInconsistency` and
    /// leaves the set unchanged.
    pub fn reconcile(&mut self, fresh: &[u8]) -> Result<DispatchReport> {
        let pending = self.diff(fresh)?;
        let database = self.database;
        let mut report = DispatchReport::default();

        for fire in pending {
            let listener = &mut self.listeners[fire.index];
            match invoke(listener.as_mut(), database, &fire.name, fire.occurrences) {
                Ok(()) => {
                    self.buffers.set_baseline(fire.count_range, fire.new_count);
                    report.fired.push(EventNotification {
                        database,
                        name: fire.name,
                        occurrences: fire.occurrences,
                    });
                }
                Err(message) => {
                    warn!(
                        database = %database,
                        event = %fire.name,
                        error = %message,
                        "event listener failed, occurrences kept pending"
                    );
                    report.failed.push((fire.name, message));
                }
            }
        }

        self.buffers.store_counts(fresh);
        Ok(report)
    }

    fn diff(&self, fresh: &[u8]) -> Result<Vec<PendingFire>> {
        let mut baseline = EventCursor::new(self.buffers.subscription());
        let mut counts = EventCursor::new(fresh);
        let mut pending = Vec::new();

        for index in 0..self.listeners.len() {
            if baseline.at_end() || counts.at_end() {
                return Err(SessionError::InternalInconsistency(format!(
                    "Event buffer ended at record {} of {}",
                    index,
                    self.listeners.len()
                )));
            }

            let old = baseline.current()?;
            let new = counts.current()?;
            if old.name != new.name {
                return Err(SessionError::InternalInconsistency(format!(
                    "Event record {} is '{}' in the subscription but '{}' in the counts",
                    index,
                    old.name_lossy(),
                    new.name_lossy()
                )));
            }

            if new.count > old.count {
                pending.push(PendingFire {
                    index,
                    name: old.name_lossy(),
                    occurrences: new.count - old.count,
                    new_count: new.count,
                    count_range: old.count_range(),
                });
            }

            baseline.advance()?;
            counts.advance()?;
        }

        if !baseline.at_end() || !counts.at_end() {
            return Err(SessionError::InternalInconsistency(format!(
                "Event buffers hold more records than the {} registered listeners",
                self.listeners.len()
            )));
        }

        Ok(pending)
    }
}

/// Run one listener, turning errors and panics into a message.
fn invoke(
    listener: &mut dyn EventListener,
    database: DatabaseId,
    name: &str,
    occurrences: u32,
) -> std::result::Result<(), String> {
    let call = || listener.on_event(database, name, occurrences);
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("listener panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("listener panicked: {}", s)
    } else {
        "listener panicked".to_string()
    }
}

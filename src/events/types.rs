//! Listener types for event notifications.

use crossbeam_channel::{Sender, TrySendError};
use crate::types::DatabaseId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a listener. Isolated to that listener during dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        ListenerError(message.into())
    }
}

/// Receives event occurrences.
pub trait EventListener: Send {
    /// Called once per reconciliation for each event whose count went up,
    /// with the database it was posted on and the number of occurrences
    /// since the last delivery.
    ///
    /// Returning an error keeps the occurrences pending: they are offered
    /// again, together with any new ones, on the next reconciliation.
    fn on_event(
        &mut self,
        database: DatabaseId,
        name: &str,
        occurrences: u32,
    ) -> Result<(), ListenerError>;
}

impl<F> EventListener for F
where
    F: FnMut(DatabaseId, &str, u32) -> Result<(), ListenerError> + Send,
{
    fn on_event(
        &mut self,
        database: DatabaseId,
        name: &str,
        occurrences: u32,
    ) -> Result<(), ListenerError> {
        self(database, name, occurrences)
    }
}

/// A fired event, as delivered through a channel listener.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventNotification {
    pub database: DatabaseId,
    pub name: String,
    pub occurrences: u32,
}

/// Forwards notifications into a bounded channel.
pub(crate) struct ChannelListener {
    pub(crate) sender: Sender<EventNotification>,
}

impl EventListener for ChannelListener {
    fn on_event(
        &mut self,
        database: DatabaseId,
        name: &str,
        occurrences: u32,
    ) -> Result<(), ListenerError> {
        let notification = EventNotification {
            database,
            name: name.to_string(),
            occurrences,
        };
        match self.sender.try_send(notification) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ListenerError::new("notification channel is full")),
            Err(TrySendError::Disconnected(_)) => {
                Err(ListenerError::new("notification receiver was dropped"))
            }
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events delivered to their listeners, in registration order.
    pub fired: Vec<EventNotification>,
    /// Listeners that failed or panicked: (event name, message). Their
    /// occurrences stay pending for the next reconciliation.
    pub failed: Vec<(String, String)>,
}

impl DispatchReport {
    /// Nothing was delivered and nothing failed.
    pub fn is_quiet(&self) -> bool {
        self.fired.is_empty() && self.failed.is_empty()
    }
}

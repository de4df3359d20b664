//! Event subscriptions with their listener registry.

use super::buffer::EventBuffers;
use super::types::{ChannelListener, EventListener, EventNotification};
use crate::error::Result;
use crate::types::DatabaseId;
use crossbeam_channel::{bounded, Receiver};
use tracing::debug;

/// A set of named event subscriptions for one database.
///
/// Listeners are index-aligned with the records of both buffers: the n-th
/// listener belongs to the n-th record. A listener is only ever removed
/// together with its record.
pub struct EventSet {
    pub(super) database: DatabaseId,
    pub(super) buffers: EventBuffers,
    pub(super) listeners: Vec<Box<dyn EventListener>>,
}

impl EventSet {
    /// An empty set whose counters track events posted on `database`.
    pub fn new(database: DatabaseId) -> Self {
        Self {
            database,
            buffers: EventBuffers::new(),
            listeners: Vec::new(),
        }
    }

    pub fn database(&self) -> DatabaseId {
        self.database
    }

    /// Subscribe `listener` to the event `name`.
    ///
    /// The same name may be subscribed more than once; each subscription
    /// gets its own record and fires independently.
    pub fn subscribe(&mut self, name: &str, listener: impl EventListener + 'static) -> Result<()> {
        self.buffers.append(name)?;
        self.listeners.push(Box::new(listener));
        debug!(event = name, subscriptions = self.listeners.len(), "event subscribed");
        Ok(())
    }

    /// Subscribe with a bounded channel as the listener.
    ///
    /// When the channel is full or its receiver is gone, the notification
    /// is reported as a listener failure by [`reconcile`](Self::reconcile).
    pub fn subscribe_channel(
        &mut self,
        name: &str,
        capacity: usize,
    ) -> Result<Receiver<EventNotification>> {
        let (sender, receiver) = bounded(capacity);
        self.subscribe(name, ChannelListener { sender })?;
        Ok(receiver)
    }

    /// Remove the first subscription to `name`, with its listener.
    ///
    /// Returns false if nothing matched.
    pub fn unsubscribe(&mut self, name: &str) -> Result<bool> {
        match self.buffers.remove(name)? {
            Some(index) => {
                self.listeners.remove(index);
                debug!(event = name, subscriptions = self.listeners.len(), "event unsubscribed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Subscribed event names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.buffers.names()
    }

    pub fn buffers(&self) -> &EventBuffers {
        &self.buffers
    }
}

impl std::fmt::Debug for EventSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSet")
            .field("database", &self.database)
            .field("names", &self.names())
            .field("subscription", &hex::encode(self.buffers.subscription()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::events::ListenerError;

    fn noop(_: DatabaseId, _: &str, _: u32) -> std::result::Result<(), ListenerError> {
        Ok(())
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let mut set = EventSet::new(DatabaseId(1));
        set.subscribe("A", noop).unwrap();
        set.subscribe("B", noop).unwrap();
        assert_eq!(set.len(), 2);

        assert!(set.unsubscribe("A").unwrap());
        assert_eq!(set.names(), vec!["B"]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.buffers().subscription(), set.buffers().counts());
    }

    #[test]
    fn test_unsubscribe_unknown() {
        let mut set = EventSet::new(DatabaseId(1));
        set.subscribe("A", noop).unwrap();
        assert!(!set.unsubscribe("Z").unwrap());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_invalid_name_leaves_registry_untouched() {
        let mut set = EventSet::new(DatabaseId(1));
        let result = set.subscribe("", noop);
        assert!(matches!(result, Err(SessionError::InvalidArgument(_))));
        assert!(set.is_empty());
        assert!(set.buffers().subscription().is_empty());

        assert!(matches!(
            set.unsubscribe(&"n".repeat(200)),
            Err(SessionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_debug_shows_hex() {
        let mut set = EventSet::new(DatabaseId(1));
        set.subscribe("A", noop).unwrap();
        let debug = format!("{:?}", set);
        assert!(debug.contains("01014101000000"));
    }
}

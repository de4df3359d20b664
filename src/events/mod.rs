//! Server event notifications.
//!
//! Named events posted on the server are tracked through two buffers with
//! the same layout: the subscription buffer sent to the server, and the
//! counts buffer the server answers with. After each exchange the counters
//! are diffed record by record and each listener whose counter went up is
//! called with the number of new occurrences.
//!
//! # Example
//!
//! ```ignore
//! let mut events = EventSet::new(db);
//! let orders = events.subscribe_channel("new_order", 64)?;
//!
//! // Round-trip through the transport and fire listeners.
//! session.poll_events(db, &mut events)?;
//!
//! while let Ok(notification) = orders.try_recv() {
//!     println!("{} x{} on {}", notification.name, notification.occurrences, notification.database);
//! }
//! ```

mod buffer;
mod dispatch;
mod set;
mod types;

pub(crate) use buffer::encode_record;
pub use buffer::{
    validate_event_name, EventBuffers, EventCursor, EventRecord, EVENT_BUFFER_MARKER,
    MAX_EVENT_NAME_LEN,
};
pub use set::EventSet;
pub use types::{DispatchReport, EventListener, EventNotification, ListenerError};

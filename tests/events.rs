//! Event subscription and dispatch tests.

use dbsession::events::{EVENT_BUFFER_MARKER, MAX_EVENT_NAME_LEN};
use dbsession::{
    DatabaseId, DatabaseParams, EventCursor, EventSet, ListenerError, MemoryTransport, Session,
    SessionError, TransportError, TransportOp,
};
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<(String, u32)>>>;

const DB: DatabaseId = DatabaseId(1);

fn recorder(
    log: &Log,
) -> impl FnMut(DatabaseId, &str, u32) -> Result<(), ListenerError> + Send + 'static {
    let log = Arc::clone(log);
    move |_: DatabaseId, name: &str, n: u32| {
        log.lock().unwrap().push((name.to_string(), n));
        Ok(())
    }
}

/// Fresh counts buffer in the server's format.
fn counts(records: &[(&str, u32)]) -> Vec<u8> {
    let mut buf = vec![EVENT_BUFFER_MARKER];
    for (name, count) in records {
        buf.push(name.len() as u8);
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
    }
    buf
}

// --- Subscription buffers ---

#[test]
fn test_unsubscribe_keeps_buffers_in_step() {
    let log = Log::default();
    let mut events = EventSet::new(DB);
    events.subscribe("A", recorder(&log)).unwrap();
    events.subscribe("B", recorder(&log)).unwrap();

    assert!(events.unsubscribe("A").unwrap());
    assert_eq!(events.names(), vec!["B".to_string()]);
    assert_eq!(events.len(), 1);
    assert_eq!(events.buffers().subscription(), counts(&[("B", 1)]));
    assert_eq!(events.buffers().counts(), counts(&[("B", 1)]));

    // The surviving listener is B's.
    events.reconcile(&counts(&[("B", 2)])).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![("B".to_string(), 1)]);
}

#[test]
fn test_unsubscribe_all_leaves_marker() {
    let mut events = EventSet::new(DB);
    assert!(events.buffers().subscription().is_empty());

    for name in ["orders", "stock", "audit"] {
        events.subscribe(name, recorder(&Log::default())).unwrap();
    }
    for name in ["stock", "orders", "audit"] {
        assert!(events.unsubscribe(name).unwrap());
    }

    assert!(events.is_empty());
    assert_eq!(events.buffers().subscription(), [EVENT_BUFFER_MARKER]);
    assert_eq!(events.buffers().counts(), [EVENT_BUFFER_MARKER]);
    assert!(!events.unsubscribe("orders").unwrap());
}

#[test]
fn test_name_length_limits() {
    let mut events = EventSet::new(DB);
    let longest = "x".repeat(MAX_EVENT_NAME_LEN);
    let too_long = "x".repeat(MAX_EVENT_NAME_LEN + 1);

    events.subscribe(&longest, recorder(&Log::default())).unwrap();
    assert!(matches!(
        events.subscribe(&too_long, recorder(&Log::default())),
        Err(SessionError::InvalidArgument(_))
    ));
    assert!(matches!(
        events.subscribe("", recorder(&Log::default())),
        Err(SessionError::InvalidArgument(_))
    ));
    assert_eq!(events.len(), 1);
}

#[test]
fn test_cursor_walks_records() {
    let buf = counts(&[("one", 1), ("two", 22)]);
    let records: Vec<_> = EventCursor::new(&buf)
        .map(|r| r.map(|r| (r.name_lossy(), r.count)))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        records,
        vec![("one".to_string(), 1), ("two".to_string(), 22)]
    );
}

// --- Reconciliation ---

#[test]
fn test_delta_then_quiet() {
    let log = Log::default();
    let mut events = EventSet::new(DB);
    events.subscribe("X", recorder(&log)).unwrap();

    let fresh = counts(&[("X", 4)]);
    let report = events.reconcile(&fresh).unwrap();
    assert_eq!(report.fired.len(), 1);
    assert_eq!(report.fired[0].occurrences, 3);

    let report = events.reconcile(&fresh).unwrap();
    assert!(report.is_quiet());
    assert_eq!(*log.lock().unwrap(), vec![("X".to_string(), 3)]);
}

#[test]
fn test_mismatched_buffer_leaves_baseline() {
    let log = Log::default();
    let mut events = EventSet::new(DB);
    events.subscribe("X", recorder(&log)).unwrap();
    events.subscribe("Y", recorder(&log)).unwrap();
    let before = events.buffers().counts().to_vec();

    let result = events.reconcile(&counts(&[("X", 9)]));
    assert!(matches!(result, Err(SessionError::InternalInconsistency(_))));
    assert_eq!(events.buffers().counts(), before.as_slice());
    assert!(log.lock().unwrap().is_empty());
}

// --- Polling through a session ---

#[test]
fn test_poll_through_transport() {
    let transport = Arc::new(MemoryTransport::new());
    let mut session = Session::new(transport.clone());
    let db = session.add_database(DatabaseParams::new("srv", "a.fdb"));
    session.connect(db).unwrap();

    let log = Log::default();
    let mut events = EventSet::new(db);
    events.subscribe("X", recorder(&log)).unwrap();
    let channel = events.subscribe_channel("Y", 4).unwrap();

    transport.post_event_times("srv:a.fdb", "X", 3);
    let report = session.poll_events(db, &mut events).unwrap();
    assert_eq!(report.fired.len(), 1);
    assert_eq!(*log.lock().unwrap(), vec![("X".to_string(), 3)]);
    assert!(channel.try_recv().is_err());

    transport.post_event("srv:a.fdb", "Y");
    transport.post_event("other:b.fdb", "X");
    let report = session.poll_events(db, &mut events).unwrap();
    assert_eq!(report.fired.len(), 1);
    assert_eq!(channel.try_recv().unwrap().occurrences, 1);
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn test_poll_transport_failure_keeps_baseline() {
    let transport = Arc::new(MemoryTransport::new());
    let mut session = Session::new(transport.clone());
    let db = session.add_database(DatabaseParams::new("srv", "a.fdb"));
    session.connect(db).unwrap();

    let log = Log::default();
    let mut events = EventSet::new(db);
    events.subscribe("X", recorder(&log)).unwrap();
    transport.post_event("srv:a.fdb", "X");

    transport.fail_next(
        TransportOp::ExchangeEvents,
        TransportError::new(335_544_721, "network error"),
    );
    assert!(matches!(
        session.poll_events(db, &mut events),
        Err(SessionError::Transport { .. })
    ));
    assert!(log.lock().unwrap().is_empty());

    session.poll_events(db, &mut events).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![("X".to_string(), 1)]);
}

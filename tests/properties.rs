//! Property-based tests for the attachment and event buffer invariants.

use dbsession::events::EVENT_BUFFER_MARKER;
use dbsession::{
    DatabaseId, DatabaseParams, EventCursor, EventSet, ListenerError, MemoryTransport, Session,
    TransactionPolicy,
};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum AttachOp {
    Attach(usize),
    Detach(usize),
}

fn arb_attach_ops() -> impl Strategy<Value = Vec<AttachOp>> {
    prop::collection::vec(
        prop_oneof![
            (0..4usize).prop_map(AttachOp::Attach),
            (0..4usize).prop_map(AttachOp::Detach),
        ],
        0..40,
    )
}

#[derive(Clone, Debug)]
enum EventOp {
    Subscribe(String),
    Unsubscribe(String),
}

fn arb_event_ops() -> impl Strategy<Value = Vec<EventOp>> {
    let name = prop::sample::select(vec!["alpha", "beta", "gamma", "delta"]);
    prop::collection::vec(
        prop_oneof![
            name.clone().prop_map(|n| EventOp::Subscribe(n.to_string())),
            name.prop_map(|n| EventOp::Unsubscribe(n.to_string())),
        ],
        0..40,
    )
}

fn noop(_: DatabaseId, _: &str, _: u32) -> Result<(), ListenerError> {
    Ok(())
}

fn record_names(buf: &[u8]) -> Vec<String> {
    EventCursor::new(buf)
        .map(|r| r.map(|r| r.name_lossy()))
        .collect::<dbsession::Result<_>>()
        .unwrap()
}

proptest! {
    /// Before start, every attached database has exactly one option block
    /// and lists the transaction as a back-reference.
    #[test]
    fn test_attachments_and_blocks_stay_paired(ops in arb_attach_ops()) {
        let mut session = Session::new(Arc::new(MemoryTransport::new()));
        let dbs: Vec<DatabaseId> = (0..4)
            .map(|i| session.add_database(DatabaseParams::new("srv", format!("db{}.fdb", i))))
            .collect();
        let tx = session.create_default_transaction(dbs[0]).unwrap();
        let mut model = vec![dbs[0]];

        for op in ops {
            match op {
                AttachOp::Attach(i) => {
                    let result = session.attach_database(tx, dbs[i], TransactionPolicy::default());
                    prop_assert_eq!(result.is_ok(), !model.contains(&dbs[i]));
                    if result.is_ok() {
                        model.push(dbs[i]);
                    }
                }
                AttachOp::Detach(i) => {
                    let result = session.detach_database(tx, dbs[i]);
                    prop_assert_eq!(result.is_ok(), model.contains(&dbs[i]));
                    model.retain(|db| *db != dbs[i]);
                }
            }

            let attached = session.attached_databases(tx).unwrap();
            prop_assert_eq!(&attached, &model);
            for db in &dbs {
                let listed = session.database_transactions(*db).unwrap().contains(&tx);
                prop_assert_eq!(session.option_block(tx, *db).is_ok(), listed);
                prop_assert_eq!(listed, model.contains(db));
            }
        }
    }

    /// Subscription and counts buffers describe the same records as the
    /// listener registry after any subscribe/unsubscribe sequence.
    #[test]
    fn test_event_buffers_move_in_lockstep(ops in arb_event_ops()) {
        let mut events = EventSet::new(DatabaseId(1));
        let mut model: Vec<String> = Vec::new();

        for op in ops {
            match op {
                EventOp::Subscribe(name) => {
                    events.subscribe(&name, noop).unwrap();
                    model.push(name);
                }
                EventOp::Unsubscribe(name) => {
                    let removed = events.unsubscribe(&name).unwrap();
                    let index = model.iter().position(|n| *n == name);
                    prop_assert_eq!(removed, index.is_some());
                    if let Some(index) = index {
                        model.remove(index);
                    }
                }
            }

            prop_assert_eq!(events.len(), model.len());
            prop_assert_eq!(record_names(events.buffers().subscription()), model.clone());
            prop_assert_eq!(record_names(events.buffers().counts()), model.clone());
        }

        let names = events.names();
        for name in names {
            events.unsubscribe(&name).unwrap();
        }
        let subscription = events.buffers().subscription();
        prop_assert!(subscription.is_empty() || subscription == [EVENT_BUFFER_MARKER]);
    }
}

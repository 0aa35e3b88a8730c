//! Global ordering and live broadcast.

use serde_json::json;
use xdcmesh_core::{EventKind, MeshError, SubmittedUpdate};

use crate::common::{Mailbox, connect, events_for, kinds, recorded_processor, reconnect};

#[test]
fn test_hello_bye_session() {
    let (mut processor, _recorder) = recorded_processor();
    let first = connect(&mut processor, "3001", 0);
    let second = connect(&mut processor, "3002", 0);

    let hello = processor
        .client("3001")
        .unwrap()
        .send_update(SubmittedUpdate::new("Hello"), "hello")
        .unwrap();
    assert_eq!((hello.serial, hello.max_serial), (1, 1));

    // Connect already delivered one empty catch-up batch to each
    assert_eq!(first.stamps(), vec![(1, 1)]);
    assert_eq!(second.stamps(), vec![(1, 1)]);

    processor
        .client("3001")
        .unwrap()
        .send_update(SubmittedUpdate::new("Bye"), "bye")
        .unwrap();
    assert_eq!(first.stamps(), vec![(1, 1), (2, 2)]);
    assert_eq!(second.stamps(), vec![(1, 1), (2, 2)]);

    let late = connect(&mut processor, "3003", 0);
    let batches = late.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(late.stamps(), vec![(1, 2), (2, 2)]);
    assert_eq!(batches[0][0].update.payload, json!("Hello"));
    assert_eq!(batches[0][1].descr, "bye");
}

#[test]
fn test_serials_are_shared_across_senders() {
    let (mut processor, recorder) = recorded_processor();
    let ids = ["a", "b", "c"];
    let mailboxes: Vec<Mailbox> = ids
        .iter()
        .map(|id| connect(&mut processor, id, 0))
        .collect();

    for round in 0..3 {
        for id in ids {
            processor
                .client(id)
                .unwrap()
                .send_update(SubmittedUpdate::new(json!({ "from": id, "round": round })), "")
                .unwrap();
        }
    }

    let expected: Vec<u64> = (1..=9).collect();
    for mailbox in &mailboxes {
        assert_eq!(mailbox.serials(), expected);
    }

    let sent: Vec<u64> = recorder
        .events()
        .iter()
        .filter_map(|event| match &event.kind {
            EventKind::Sent { update, .. } => Some(update.serial),
            _ => None,
        })
        .collect();
    assert_eq!(sent, expected);
}

#[test]
fn test_sent_precedes_received_in_registration_order() {
    let (mut processor, recorder) = recorded_processor();
    connect(&mut processor, "a", 0);
    connect(&mut processor, "b", 0);
    recorder.take();

    processor
        .client("b")
        .unwrap()
        .send_update(SubmittedUpdate::new(1), "")
        .unwrap();

    assert_eq!(
        kinds(&recorder.events()),
        vec![("b", "sent"), ("a", "received"), ("b", "received")]
    );
}

#[test]
fn test_unconnected_client_misses_live_updates() {
    let (mut processor, recorder) = recorded_processor();
    processor.create_client("quiet").unwrap();
    let listener = connect(&mut processor, "loud", 0);

    processor
        .client("quiet")
        .unwrap()
        .send_update(SubmittedUpdate::new("pre-connect"), "")
        .unwrap();

    assert_eq!(listener.serials(), vec![1]);
    assert_eq!(processor.last_seen_serial("quiet").unwrap(), None);
    assert_eq!(events_for(&recorder.events(), "quiet", "received").count(), 0);

    // Catch-up makes the update visible once the sender connects
    let quiet = connect(&mut processor, "quiet", 0);
    assert_eq!(quiet.stamps(), vec![(1, 1)]);
}

#[test]
fn test_declined_delivery_keeps_cursor() {
    let (mut processor, recorder) = recorded_processor();
    let picky = connect(&mut processor, "picky", 0);
    picky.set_accept_updates(false);

    processor
        .client("picky")
        .unwrap()
        .send_update(SubmittedUpdate::new(1), "")
        .unwrap();

    assert_eq!(processor.last_seen_serial("picky").unwrap(), Some(0));
    assert_eq!(events_for(&recorder.events(), "picky", "received").count(), 0);

    picky.set_accept_updates(true);
    reconnect(&mut processor, "picky", &picky, 0);
    assert_eq!(picky.stamps(), vec![(1, 1)]);
    assert_eq!(processor.last_seen_serial("picky").unwrap(), Some(1));
}

#[test]
fn test_sender_view_lags_catch_up_view() {
    let (mut processor, _recorder) = recorded_processor();
    let live = connect(&mut processor, "live", 0);
    for n in 0..3 {
        processor
            .client("live")
            .unwrap()
            .send_update(SubmittedUpdate::new(n), "")
            .unwrap();
    }

    let late = connect(&mut processor, "late", 1);

    assert_eq!(live.stamps(), vec![(1, 1), (2, 2), (3, 3)]);
    assert_eq!(late.stamps(), vec![(2, 3), (3, 3)]);
    // The log keeps the provisional stamp
    assert_eq!(processor.log().entries()[1].update.max_serial, 2);
}

#[test]
fn test_duplicate_and_unknown_clients() {
    let (mut processor, _recorder) = recorded_processor();
    processor.create_client("3001").unwrap();

    assert!(matches!(
        processor.create_client("3001"),
        Err(MeshError::DuplicateClient { ref id }) if id == "3001"
    ));
    assert!(matches!(
        processor.client("3002"),
        Err(MeshError::UnknownClient { .. })
    ));
    assert_eq!(processor.client_count(), 1);
}

#[test]
fn test_remove_client_sends_delete() {
    let (mut processor, _recorder) = recorded_processor();
    let gone = connect(&mut processor, "gone", 0);
    let stays = connect(&mut processor, "stays", 0);

    processor.remove_client("gone").unwrap();
    assert_eq!(gone.deletes(), 1);
    assert!(!processor.contains_client("gone"));
    assert!(matches!(
        processor.remove_client("gone"),
        Err(MeshError::UnknownClient { .. })
    ));

    processor
        .client("stays")
        .unwrap()
        .send_update(SubmittedUpdate::new(1), "")
        .unwrap();
    assert_eq!(stays.serials(), vec![1]);
    assert!(gone.serials().is_empty());
}

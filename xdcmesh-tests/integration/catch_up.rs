//! Catch-up on connect and reconnect.

use xdcmesh_core::{Processor, SubmittedUpdate};

use crate::common::{connect, events_for, kinds, recorded_processor, reconnect};

fn send_n(processor: &mut Processor, id: &str, count: u64) {
    if !processor.contains_client(id) {
        processor.create_client(id).unwrap();
    }
    for n in 0..count {
        processor
            .client(id)
            .unwrap()
            .send_update(SubmittedUpdate::new(n), format!("update {n}"))
            .unwrap();
    }
}

#[test]
fn test_catch_up_delivers_everything_after_cursor() {
    let (mut processor, recorder) = recorded_processor();
    send_n(&mut processor, "writer", 5);

    let reader = connect(&mut processor, "reader", 2);

    let batches = reader.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(reader.stamps(), vec![(3, 5), (4, 5), (5, 5)]);
    assert_eq!(batches[0][0].descr, "update 2");
    assert_eq!(processor.last_seen_serial("reader").unwrap(), Some(5));
    assert_eq!(events_for(&recorder.events(), "reader", "received").count(), 3);
}

#[test]
fn test_catch_up_at_log_length_is_empty() {
    let (mut processor, recorder) = recorded_processor();
    send_n(&mut processor, "writer", 3);

    let reader = connect(&mut processor, "reader", 3);

    assert_eq!(reader.batches(), vec![Vec::new()]);
    assert_eq!(processor.last_seen_serial("reader").unwrap(), Some(3));
    assert_eq!(events_for(&recorder.events(), "reader", "received").count(), 0);
}

#[test]
fn test_connect_event_order() {
    let (mut processor, recorder) = recorded_processor();
    send_n(&mut processor, "writer", 2);
    recorder.take();

    connect(&mut processor, "reader", 0);

    assert_eq!(
        kinds(&recorder.events()),
        vec![
            ("reader", "connect"),
            ("reader", "clear"),
            ("reader", "received"),
            ("reader", "received"),
        ]
    );
}

#[test]
fn test_live_updates_follow_catch_up_in_order() {
    let (mut processor, _recorder) = recorded_processor();
    send_n(&mut processor, "writer", 2);
    let reader = connect(&mut processor, "reader", 0);

    send_n(&mut processor, "writer", 2);

    assert_eq!(reader.serials(), vec![1, 2, 3, 4]);
    assert_eq!(reader.batches().len(), 3);
}

#[test]
fn test_reconnect_from_cursor_redelivers_nothing() {
    let (mut processor, _recorder) = recorded_processor();
    let reader = connect(&mut processor, "reader", 0);
    send_n(&mut processor, "writer", 3);
    assert_eq!(reader.serials(), vec![1, 2, 3]);

    let cursor = processor.last_seen_serial("reader").unwrap().unwrap();
    reader.reset();
    reconnect(&mut processor, "reader", &reader, cursor);

    assert!(reader.serials().is_empty());
    assert_eq!(reader.batches().len(), 1);
}

#[test]
fn test_reconnect_from_zero_replays_log() {
    let (mut processor, _recorder) = recorded_processor();
    let reader = connect(&mut processor, "reader", 0);
    send_n(&mut processor, "writer", 3);

    reader.reset();
    reconnect(&mut processor, "reader", &reader, 0);

    assert_eq!(reader.stamps(), vec![(1, 3), (2, 3), (3, 3)]);
}

#[test]
fn test_cursor_ahead_of_log_is_pulled_back_on_catch_up() {
    let (mut processor, _recorder) = recorded_processor();
    let reader = connect(&mut processor, "reader", 2);

    send_n(&mut processor, "writer", 3);

    // Cursor was moved to the log length on connect, so nothing is skipped
    assert_eq!(reader.serials(), vec![1, 2, 3]);
}

#[test]
fn test_declined_catch_up_keeps_cursor() {
    let (mut processor, recorder) = recorded_processor();
    send_n(&mut processor, "writer", 2);

    let reader = crate::common::Mailbox::new();
    reader.set_accept_updates(false);
    reconnect(&mut processor, "reader", &reader, 0);

    assert_eq!(processor.last_seen_serial("reader").unwrap(), Some(0));
    assert_eq!(events_for(&recorder.events(), "reader", "received").count(), 0);
}

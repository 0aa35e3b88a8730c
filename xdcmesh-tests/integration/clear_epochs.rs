//! Clear notifications and epoch boundaries.

use xdcmesh_core::{EventKind, SubmittedUpdate};

use crate::common::{Mailbox, connect, events_for, is_clear, recorded_processor, reconnect};

#[test]
fn test_repeated_connects_clear_once() {
    let (mut processor, recorder) = recorded_processor();
    let mailbox = connect(&mut processor, "3001", 0);

    reconnect(&mut processor, "3001", &mailbox, 0);
    reconnect(&mut processor, "3001", &mailbox, 0);

    assert_eq!(mailbox.clears(), 1);
    assert_eq!(events_for(&recorder.events(), "3001", "clear").count(), 1);
}

#[test]
fn test_processor_clear_adds_exactly_one_more() {
    let (mut processor, recorder) = recorded_processor();
    let mailbox = connect(&mut processor, "3001", 0);
    assert_eq!(mailbox.clears(), 1);

    processor.clear();
    assert_eq!(mailbox.clears(), 2);

    mailbox.reset();
    reconnect(&mut processor, "3001", &mailbox, 0);
    assert_eq!(mailbox.clears(), 2);
    assert!(mailbox.serials().is_empty());
    assert_eq!(events_for(&recorder.events(), "3001", "clear").count(), 2);

    processor.clear();
    assert_eq!(mailbox.clears(), 3);
}

#[test]
fn test_serial_restarts_after_clear() {
    let (mut processor, _recorder) = recorded_processor();
    let mailbox = connect(&mut processor, "3001", 0);
    for n in 0..3 {
        processor
            .client("3001")
            .unwrap()
            .send_update(SubmittedUpdate::new(n), "")
            .unwrap();
    }

    processor.clear();
    assert!(processor.log().is_empty());
    assert_eq!(processor.log().current_serial(), 0);
    assert_eq!(processor.epoch(), 1);

    // The host resubscribes from 0 after wiping its state
    mailbox.reset();
    reconnect(&mut processor, "3001", &mailbox, 0);
    let update = processor
        .client("3001")
        .unwrap()
        .send_update(SubmittedUpdate::new("fresh"), "")
        .unwrap();

    assert_eq!((update.serial, update.max_serial), (1, 1));
    assert_eq!(mailbox.stamps(), vec![(1, 1)]);
}

#[test]
fn test_stale_cursor_drops_new_epoch_updates() {
    let (mut processor, _recorder) = recorded_processor();
    let stale = connect(&mut processor, "stale", 0);
    for n in 0..2 {
        processor
            .client("stale")
            .unwrap()
            .send_update(SubmittedUpdate::new(n), "")
            .unwrap();
    }

    processor.clear();
    stale.reset();
    processor
        .client("stale")
        .unwrap()
        .send_update(SubmittedUpdate::new("after"), "")
        .unwrap();

    // Serial 1 of the new epoch is below the old cursor of 2
    assert!(stale.serials().is_empty());
}

#[test]
fn test_client_joining_after_clear_is_cleared_once() {
    let (mut processor, recorder) = recorded_processor();
    connect(&mut processor, "early", 0);
    processor.clear();

    let late = connect(&mut processor, "late", 0);
    reconnect(&mut processor, "late", &late, 0);

    assert_eq!(late.clears(), 1);
    let clears: Vec<u64> = events_for(&recorder.events(), "late", "clear")
        .map(|event| event.epoch)
        .collect();
    assert_eq!(clears, vec![1]);
}

#[test]
fn test_clear_events_carry_new_epoch() {
    let (mut processor, recorder) = recorded_processor();
    connect(&mut processor, "a", 0);
    connect(&mut processor, "b", 0);
    recorder.take();

    processor.clear();

    let events = recorder.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(is_clear));
    assert!(events.iter().all(|event| event.epoch == 1));
}

#[test]
fn test_unconnected_clients_get_no_clear() {
    let (mut processor, recorder) = recorded_processor();
    processor.create_client("idle").unwrap();

    processor.clear();

    assert!(recorder.events().is_empty());
    let idle = connect(&mut processor, "idle", 0);
    assert_eq!(idle.clears(), 1);
}

#[test]
fn test_declined_clear_is_retried_on_connect() {
    let (mut processor, recorder) = recorded_processor();
    let mailbox = Mailbox::new();
    mailbox.set_accept_clears(false);
    reconnect(&mut processor, "3001", &mailbox, 0);

    assert_eq!(mailbox.clears(), 0);
    assert_eq!(events_for(&recorder.events(), "3001", "clear").count(), 0);

    mailbox.set_accept_clears(true);
    reconnect(&mut processor, "3001", &mailbox, 0);

    assert_eq!(mailbox.clears(), 1);
    assert_eq!(events_for(&recorder.events(), "3001", "clear").count(), 1);
}

#[test]
fn test_clear_without_listener_is_skipped() {
    let (mut processor, recorder) = recorded_processor();
    processor.create_client("bare").unwrap();
    processor
        .client("bare")
        .unwrap()
        .connect(xdcmesh_core::Subscription::new(
            |_: &[xdcmesh_core::UpdateEntry]| true,
            0,
        ))
        .unwrap();

    processor.clear();

    assert!(
        !recorder
            .events()
            .iter()
            .any(|event| event.kind == EventKind::Clear)
    );
}

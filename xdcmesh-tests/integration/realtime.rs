//! Realtime side-channel relay.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use xdcmesh_core::{EventKind, MeshError, Processor};

use crate::common::{connect, recorded_processor};

type Inbox = Arc<Mutex<Vec<Bytes>>>;

fn join(processor: &mut Processor, id: &str) -> Inbox {
    if !processor.contains_client(id) {
        processor.create_client(id).unwrap();
    }
    let inbox = Inbox::default();
    let sink = Arc::clone(&inbox);
    processor
        .client(id)
        .unwrap()
        .join_realtime(move |data: &Bytes| sink.lock().push(data.clone()))
        .unwrap();
    inbox
}

#[test]
fn test_relay_reaches_others_not_sender() {
    let (mut processor, recorder) = recorded_processor();
    let a = join(&mut processor, "a");
    let b = join(&mut processor, "b");
    let c = join(&mut processor, "c");

    processor
        .client("a")
        .unwrap()
        .send_realtime_data(Bytes::from_static(b"ping"))
        .unwrap();

    assert!(a.lock().is_empty());
    assert_eq!(*b.lock(), vec![Bytes::from_static(b"ping")]);
    assert_eq!(*c.lock(), vec![Bytes::from_static(b"ping")]);

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].kind,
        EventKind::RealtimeSent {
            data: b"ping".to_vec()
        }
    );
}

#[test]
fn test_clients_without_handle_miss_payloads() {
    let (mut processor, _recorder) = recorded_processor();
    let sender = join(&mut processor, "sender");
    processor.create_client("deaf").unwrap();

    processor
        .client("sender")
        .unwrap()
        .send_realtime_data(vec![1u8])
        .unwrap();
    let deaf = join(&mut processor, "deaf");

    // Nothing is buffered for later joiners
    assert!(deaf.lock().is_empty());
    assert!(sender.lock().is_empty());
}

#[test]
fn test_realtime_is_independent_of_updates() {
    let (mut processor, _recorder) = recorded_processor();
    let mailbox = connect(&mut processor, "a", 0);
    join(&mut processor, "a");
    let b = join(&mut processor, "b");

    processor
        .client("a")
        .unwrap()
        .send_realtime_data(vec![7u8])
        .unwrap();

    assert!(mailbox.serials().is_empty());
    assert!(processor.log().is_empty());
    assert_eq!(b.lock().len(), 1);
}

#[test]
fn test_sending_after_leave_fails() {
    let (mut processor, recorder) = recorded_processor();
    join(&mut processor, "a");
    let b = join(&mut processor, "b");

    processor.client("a").unwrap().leave_realtime().unwrap();
    let result = processor.client("a").unwrap().send_realtime_data(vec![1u8]);

    assert!(matches!(
        result,
        Err(MeshError::RealtimeChannelLeft { ref id }) if id == "a"
    ));
    assert!(b.lock().is_empty());
    assert!(recorder.events().is_empty());
}

#[test]
fn test_left_receivers_are_skipped() {
    let (mut processor, _recorder) = recorded_processor();
    join(&mut processor, "a");
    let b = join(&mut processor, "b");
    processor.client("b").unwrap().leave_realtime().unwrap();

    processor
        .client("a")
        .unwrap()
        .send_realtime_data(vec![1u8])
        .unwrap();

    assert!(b.lock().is_empty());
}

#[test]
fn test_rejoin_after_leave() {
    let (mut processor, _recorder) = recorded_processor();
    join(&mut processor, "a");
    let old = join(&mut processor, "b");
    processor.client("a").unwrap().leave_realtime().unwrap();

    join(&mut processor, "a");
    processor
        .client("a")
        .unwrap()
        .send_realtime_data(vec![2u8])
        .unwrap();

    assert_eq!(old.lock().len(), 1);
}

#[test]
fn test_send_without_joining_is_allowed() {
    let (mut processor, _recorder) = recorded_processor();
    processor.create_client("shy").unwrap();
    let listener = join(&mut processor, "listener");

    processor
        .client("shy")
        .unwrap()
        .send_realtime_data(vec![3u8])
        .unwrap();

    assert_eq!(listener.lock().len(), 1);
}

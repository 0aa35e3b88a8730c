//! Inbound parsing and outbound re-serialization at the transport boundary.

use serde_json::{Value, json};
use xdcmesh_core::{InboundMessage, MeshConfig, OutboundMessage, ProtocolError};
use xdcmesh_sim::{SimulatedNetwork, SimulationError};

fn network_with(ids: &[&str]) -> SimulatedNetwork {
    let mut network = SimulatedNetwork::new(MeshConfig::for_testing()).unwrap();
    for id in ids {
        network.add_instance_with_id(*id).unwrap();
    }
    network
}

fn outbox_json(network: &SimulatedNetwork, id: &str) -> Vec<Value> {
    network
        .drain_outbox(id)
        .unwrap()
        .iter()
        .map(|message| serde_json::from_str(&message.to_json().unwrap()).unwrap())
        .collect()
}

#[test]
fn test_parse_every_inbound_kind() {
    let cases = [
        (
            r#"{"type":"sendUpdate","update":{"payload":1},"descr":"d"}"#,
            "sendUpdate",
        ),
        (r#"{"type":"setUpdateListener","serial":4}"#, "setUpdateListener"),
        (r#"{"type":"sendRealtime","data":[1,2,3]}"#, "sendRealtime"),
        (r#"{"type":"joinRealtime"}"#, "joinRealtime"),
        (r#"{"type":"leaveRealtime"}"#, "leaveRealtime"),
    ];

    for (text, kind) in cases {
        let message = InboundMessage::parse(text).unwrap();
        assert_eq!(message.kind(), kind);
    }
}

#[test]
fn test_reject_bad_inbound_shapes() {
    assert!(matches!(
        InboundMessage::parse("{"),
        Err(ProtocolError::MalformedJson { .. })
    ));
    assert_eq!(
        InboundMessage::parse(r#"{"serial":1}"#),
        Err(ProtocolError::MissingType)
    );
    assert_eq!(
        InboundMessage::parse(r#"{"type":"getAllUpdates"}"#),
        Err(ProtocolError::UnknownMessageType {
            kind: "getAllUpdates".to_string()
        })
    );
    assert!(matches!(
        InboundMessage::parse(r#"{"type":"setUpdateListener","serial":"zero"}"#),
        Err(ProtocolError::InvalidMessage { ref kind, .. }) if kind == "setUpdateListener"
    ));
    assert!(matches!(
        InboundMessage::parse(r#"{"type":"sendUpdate","descr":"no update"}"#),
        Err(ProtocolError::InvalidMessage { .. })
    ));
}

#[test]
fn test_instance_sees_reserialized_batches() {
    let mut network = network_with(&["3001", "3002"]);

    network
        .handle_message("3001", r#"{"type":"setUpdateListener","serial":0}"#)
        .unwrap();
    network
        .handle_message("3002", r#"{"type":"setUpdateListener","serial":0}"#)
        .unwrap();
    network
        .handle_message(
            "3002",
            r#"{"type":"sendUpdate","update":{"payload":{"move":"e4"},"summary":"White to move"},"descr":"move"}"#,
        )
        .unwrap();

    let messages = outbox_json(&network, "3001");
    assert_eq!(
        messages,
        vec![
            json!({ "type": "clear" }),
            json!({ "type": "updates", "updates": [] }),
            json!({
                "type": "updates",
                "updates": [{
                    "update": {
                        "payload": { "move": "e4" },
                        "summary": "White to move",
                        "serial": 1,
                        "max_serial": 1
                    },
                    "descr": "move"
                }]
            }),
        ]
    );
}

#[test]
fn test_realtime_and_delete_messages() {
    let mut network = network_with(&["a", "b"]);
    network.handle_message("a", r#"{"type":"joinRealtime"}"#).unwrap();
    network.handle_message("b", r#"{"type":"joinRealtime"}"#).unwrap();
    network
        .handle_message("b", r#"{"type":"sendRealtime","data":[104,105]}"#)
        .unwrap();

    assert_eq!(
        outbox_json(&network, "a"),
        vec![json!({ "type": "realtime", "data": [104, 105] })]
    );

    network.handle_message("a", r#"{"type":"setUpdateListener","serial":0}"#).unwrap();
    outbox_json(&network, "a");
    let removed = network.remove_instance("a").unwrap();
    assert_eq!(removed.drain_outbox(), vec![OutboundMessage::Delete]);
}

#[test]
fn test_rejected_messages_never_reach_processor() {
    let mut network = network_with(&["3001"]);

    let result = network.handle_message("3001", r#"{"type":"sendUpdate"}"#);

    assert!(matches!(result, Err(SimulationError::Mesh(_))));
    assert!(network.processor().log().is_empty());
    assert!(network.events().is_empty());
}

#[test]
fn test_leave_then_send_is_reported() {
    let mut network = network_with(&["3001"]);
    network
        .handle_message("3001", r#"{"type":"joinRealtime"}"#)
        .unwrap();
    network
        .handle_message("3001", r#"{"type":"leaveRealtime"}"#)
        .unwrap();

    let error = network
        .handle_message("3001", r#"{"type":"sendRealtime","data":[1]}"#)
        .unwrap_err();
    assert!(error.to_string().contains("after leaving"));
}

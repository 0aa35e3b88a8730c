//! Tests for the simulated network and scenario runner.

use serde_json::json;
use xdcmesh_core::{EventKind, MeshConfig, MeshError, OutboundMessage, SubmittedUpdate};

use crate::{
    GeneratorConfig, Scenario, ScenarioRunner, SimulatedNetwork, SimulationError, Step,
    random_scenario,
};

fn network() -> SimulatedNetwork {
    SimulatedNetwork::new(MeshConfig::for_testing()).unwrap()
}

#[test]
fn test_add_instance_allocates_port_ids() {
    let mut network = network();

    assert_eq!(network.add_instance().unwrap(), "3001");
    network.add_instance_with_id("3002").unwrap();
    assert_eq!(network.add_instance().unwrap(), "3003");

    let ids: Vec<_> = network.instances().iter().map(|i| i.id()).collect();
    assert_eq!(ids, vec!["3001", "3002", "3003"]);
}

#[test]
fn test_duplicate_instance_is_rejected() {
    let mut network = network();
    network.add_instance_with_id("alice").unwrap();

    assert!(matches!(
        network.add_instance_with_id("alice"),
        Err(SimulationError::DuplicateInstance { ref id }) if id == "alice"
    ));
    assert_eq!(network.processor().client_count(), 1);
}

#[test]
fn test_instance_limit() {
    let mut config = MeshConfig::for_testing();
    config.instances.max_instances = 2;
    let mut network = SimulatedNetwork::new(config).unwrap();

    network.add_instance().unwrap();
    network.add_instance().unwrap();
    assert!(matches!(
        network.add_instance(),
        Err(SimulationError::InstanceLimitReached { limit: 2 })
    ));
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = MeshConfig::for_testing();
    config.colors.palette.clear();

    assert!(matches!(
        SimulatedNetwork::new(config),
        Err(SimulationError::Mesh(MeshError::Configuration { .. }))
    ));
}

#[test]
fn test_handle_message_routes_to_processor() {
    let mut network = network();
    let id = network.add_instance().unwrap();

    network
        .handle_message(&id, r#"{"type":"setUpdateListener","serial":0}"#)
        .unwrap();
    network
        .handle_message(
            &id,
            r#"{"type":"sendUpdate","update":{"payload":"Hello"},"descr":"hi"}"#,
        )
        .unwrap();

    let instance = network.instance(&id).unwrap();
    let applied = instance.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].update.payload, json!("Hello"));
    assert_eq!(applied[0].descr, "hi");
}

#[test]
fn test_handle_message_rejects_bad_input() {
    let mut network = network();
    let id = network.add_instance().unwrap();

    assert!(matches!(
        network.handle_message(&id, r#"{"type":"explode"}"#),
        Err(SimulationError::Mesh(MeshError::Protocol(_)))
    ));
    assert!(matches!(
        network.handle_message("9999", r#"{"type":"joinRealtime"}"#),
        Err(SimulationError::UnknownInstance { .. })
    ));
    assert!(network.events().is_empty());
}

#[test]
fn test_clear_resubscribes_wiped_instances() {
    let mut network = network();
    let a = network.add_instance().unwrap();
    let b = network.add_instance().unwrap();
    network.connect(&a, 0).unwrap();
    network.connect(&b, 0).unwrap();
    network
        .send_update(&a, SubmittedUpdate::new(1), "one")
        .unwrap();

    network.clear();

    for id in [&a, &b] {
        let instance = network.instance(id).unwrap();
        assert_eq!(instance.clear_count(), 2);
        assert!(instance.applied().is_empty());
    }

    // Both instances listen again, from serial 0 of the new epoch
    let update = network
        .send_update(&b, SubmittedUpdate::new(2), "two")
        .unwrap();
    assert_eq!(update.serial, 1);
    assert_eq!(network.instance(&a).unwrap().last_serial(), 1);
    assert_eq!(network.instance(&b).unwrap().last_serial(), 1);
}

#[test]
fn test_remove_instance_sends_delete() {
    let mut network = network();
    let id = network.add_instance().unwrap();
    network.connect(&id, 0).unwrap();

    let removed = network.remove_instance(&id).unwrap();
    assert!(removed.is_deleted());
    assert_eq!(removed.drain_outbox().last(), Some(&OutboundMessage::Delete));
    assert!(!network.has_instance(&id));
    assert!(matches!(
        network.remove_instance(&id),
        Err(SimulationError::UnknownInstance { .. })
    ));
}

#[test]
fn test_realtime_between_instances() {
    let mut network = network();
    let a = network.add_instance().unwrap();
    let b = network.add_instance().unwrap();
    let c = network.add_instance().unwrap();
    network.join_realtime(&a).unwrap();
    network.join_realtime(&b).unwrap();

    network.send_realtime(&a, vec![1u8, 2, 3]).unwrap();

    assert!(network.instance(&a).unwrap().realtime_received().is_empty());
    assert_eq!(
        network.instance(&b).unwrap().realtime_received(),
        vec![bytes::Bytes::from_static(&[1, 2, 3])]
    );
    assert!(network.instance(&c).unwrap().realtime_received().is_empty());

    network.leave_realtime(&a).unwrap();
    assert!(matches!(
        network.send_realtime(&a, vec![4u8]),
        Err(SimulationError::Mesh(MeshError::RealtimeChannelLeft { .. }))
    ));
}

#[test]
fn test_feed_is_reproducible() {
    let first = ScenarioRunner::new().run(&Scenario::hello_bye()).unwrap();
    let second = ScenarioRunner::new().run(&Scenario::hello_bye()).unwrap();

    assert_eq!(first.events, second.events);
}

#[test]
fn test_hello_bye_report() {
    let report = ScenarioRunner::new().run(&Scenario::hello_bye()).unwrap();

    assert!(report.is_success(), "{}", report.summary());
    assert!(report.rejected.is_empty());

    let late = report.instance("3003").unwrap();
    let stamps: Vec<_> = late
        .applied
        .iter()
        .map(|entry| (entry.update.serial, entry.update.max_serial))
        .collect();
    assert_eq!(stamps, vec![(1, 2), (2, 2)]);

    let sent = report
        .events
        .iter()
        .filter(|event| matches!(event.kind, EventKind::Sent { .. }))
        .count();
    assert_eq!(sent, 2);
    assert!(report.summary().contains("Scenario: hello-bye"));
}

#[test]
fn test_runner_records_rejected_steps() {
    let scenario = Scenario::new(
        "rejections",
        vec![
            Step::AddInstance {
                id: Some("a".to_string()),
            },
            Step::AddInstance {
                id: Some("a".to_string()),
            },
            Step::Raw {
                instance: "a".to_string(),
                message: "not json".to_string(),
            },
            Step::Connect {
                instance: "ghost".to_string(),
                serial: 0,
            },
        ],
    );

    let report = ScenarioRunner::new().run(&scenario).unwrap();
    let steps: Vec<_> = report.rejected.iter().map(|r| r.step).collect();
    assert_eq!(steps, vec![1, 2, 3]);
    assert!(report.is_success());
}

#[test]
fn test_short_event_history_does_not_break_invariants() {
    let mut steps = vec![
        Step::AddInstance {
            id: Some("a".to_string()),
        },
        Step::Connect {
            instance: "a".to_string(),
            serial: 0,
        },
    ];
    steps.extend((0..10).map(|n| Step::Send {
        instance: "a".to_string(),
        update: SubmittedUpdate::new(n),
        descr: String::new(),
    }));
    let mut scenario = Scenario::new("short-history", steps);
    scenario.config.simulation.event_history_limit = 5;

    let report = ScenarioRunner::new().run(&scenario).unwrap();

    assert!(report.is_success(), "{}", report.summary());
    assert_eq!(report.events.len(), 5);
    assert_eq!(report.instance("a").unwrap().last_serial, 10);
}

#[test]
fn test_audit_recorder_keeps_what_history_drops() {
    let mut config = MeshConfig::for_testing();
    config.simulation.event_history_limit = 2;
    let audit = xdcmesh_core::EventRecorder::new();
    let mut network = SimulatedNetwork::with_audit(config, audit.clone()).unwrap();
    network.add_instance_with_id("a").unwrap();
    network.connect("a", 0).unwrap();
    for n in 0..3 {
        network
            .send_update("a", SubmittedUpdate::new(n), "")
            .unwrap();
    }

    let history = network.events();
    let full = audit.events();
    assert_eq!(history.len(), 2);
    assert!(full.len() > history.len());
    assert_eq!(&full[full.len() - 2..], history.as_slice());
}

#[test]
fn test_scenario_json_round_trip_through_runner() {
    let text = r#"{
        "name": "json",
        "steps": [
            {"op": "addInstance"},
            {"op": "connect", "instance": "3001"},
            {"op": "send", "instance": "3001", "update": {"payload": {"x": 1}}, "descr": "x"},
            {"op": "clear"},
            {"op": "send", "instance": "3001", "update": {"payload": {"x": 2}}}
        ]
    }"#;

    let scenario = Scenario::from_json(text).unwrap();
    scenario.validate().unwrap();
    let report = ScenarioRunner::new().run(&scenario).unwrap();

    assert_eq!(report.epoch, 1);
    let instance = report.instance("3001").unwrap();
    assert_eq!(instance.applied.len(), 1);
    assert_eq!(instance.applied[0].update.payload, json!({"x": 2}));
    assert_eq!(instance.clear_count, 2);
}

#[test]
fn test_empty_scenario_fails_validation() {
    let scenario = Scenario::new("empty", Vec::new());
    assert!(matches!(
        scenario.validate(),
        Err(SimulationError::InvalidScenario { .. })
    ));
}

#[test]
fn test_random_scenarios_hold_invariants() {
    for seed in 0..20 {
        let scenario = random_scenario(GeneratorConfig {
            seed,
            instances: 4,
            steps: 60,
        });
        let report = ScenarioRunner::new().run(&scenario).unwrap();

        assert!(report.is_success(), "seed {seed}: {}", report.summary());
        assert!(report.rejected.is_empty(), "seed {seed}: {}", report.summary());
    }
}

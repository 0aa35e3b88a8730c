//! Scenario files, reports and invariant checking.

use std::io::Write;

use serde_json::json;
use tempfile::NamedTempFile;
use xdcmesh_core::{EventKind, MeshEvent};
use xdcmesh_sim::{
    GeneratorConfig, Invariant, InvariantViolation, Scenario, ScenarioRunner, SimulationError,
    random_scenario,
};

struct NoClearInvariant;

impl Invariant for NoClearInvariant {
    fn check(&self, events: &[MeshEvent]) -> Result<(), InvariantViolation> {
        match events.iter().position(|event| event.kind == EventKind::Clear) {
            Some(index) => Err(self.violation(index, "clear observed".to_string())),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "NoClear"
    }
}

#[test]
fn test_scenario_file_round_trip() {
    let mut file = NamedTempFile::new().unwrap();
    let scenario = json!({
        "name": "file",
        "seed": 9,
        "steps": [
            { "op": "addInstance", "id": "alice" },
            { "op": "addInstance", "id": "bob" },
            { "op": "connect", "instance": "alice" },
            { "op": "send", "instance": "alice", "update": { "payload": "hi", "info": "alice says hi" } },
            { "op": "joinRealtime", "instance": "bob" },
            { "op": "sendRealtime", "instance": "alice", "data": [1, 2] },
            { "op": "connect", "instance": "bob", "serial": 0 },
            { "op": "remove", "instance": "alice" }
        ]
    });
    file.write_all(scenario.to_string().as_bytes()).unwrap();

    let scenario = Scenario::from_file(file.path()).unwrap();
    let report = ScenarioRunner::new().run(&scenario).unwrap();

    assert!(report.is_success(), "{}", report.summary());
    assert!(report.rejected.is_empty(), "{}", report.summary());
    assert_eq!(report.seed, Some(9));
    assert!(report.instance("alice").is_none());

    let bob = report.instance("bob").unwrap();
    assert_eq!(bob.applied.len(), 1);
    assert_eq!(bob.applied[0].update.info.as_deref(), Some("alice says hi"));
    assert_eq!(bob.realtime_received, 1);
}

#[test]
fn test_missing_scenario_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = Scenario::from_file(&dir.path().join("absent.json"));

    assert!(matches!(result, Err(SimulationError::Io(_))));
}

#[test]
fn test_unknown_step_is_rejected_at_parse_time() {
    let result = Scenario::from_json(r#"{"name":"bad","steps":[{"op":"explode"}]}"#);

    assert!(matches!(result, Err(SimulationError::Json(_))));
}

#[test]
fn test_report_serializes_event_feed() {
    let report = ScenarioRunner::new().run(&Scenario::hello_bye()).unwrap();
    let value = serde_json::to_value(&report).unwrap();

    let first = &value["events"][0];
    assert_eq!(first["type"], "connect");
    assert_eq!(first["instanceId"], "3001");
    assert_eq!(first["epoch"], 0);
    assert!(first["color"].as_str().unwrap().starts_with('#'));
}

#[test]
fn test_custom_invariant_is_reported_once() {
    let runner = ScenarioRunner::without_invariants().with_invariant(NoClearInvariant);
    let report = runner.run(&Scenario::hello_bye()).unwrap();

    assert!(!report.is_success());
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].invariant, "NoClear");
    assert!(report.summary().contains("Invariant violations"));
}

#[test]
fn test_colors_follow_registration_order() {
    let report = ScenarioRunner::new().run(&Scenario::hello_bye()).unwrap();
    let color_of = |id: &str| {
        report
            .events
            .iter()
            .find(|event| event.instance_id == id)
            .map(|event| event.color.clone())
            .unwrap()
    };

    assert_ne!(color_of("3001"), color_of("3002"));
    assert_ne!(color_of("3002"), color_of("3003"));
    assert!(
        report
            .events
            .iter()
            .filter(|event| event.instance_id == "3001")
            .all(|event| event.color == color_of("3001"))
    );
}

#[test]
fn test_generated_scenarios_are_clean() {
    for seed in [1, 42, 12345, 987_654_321] {
        let scenario = random_scenario(GeneratorConfig {
            seed,
            instances: 5,
            steps: 150,
        });
        let report = ScenarioRunner::new().run(&scenario).unwrap();

        assert!(report.is_success(), "seed {seed}: {}", report.summary());
        assert!(report.rejected.is_empty(), "seed {seed}: {}", report.summary());
    }
}

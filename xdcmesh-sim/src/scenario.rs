//! Scripted scenarios and their execution.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use xdcmesh_core::{EventRecorder, MeshConfig, MeshEvent, Serial, SubmittedUpdate, UpdateEntry};

use crate::invariants::{Invariant, InvariantViolation, default_invariants};
use crate::network::SimulatedNetwork;
use crate::{Result, SimulationError};

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    /// Registers an instance, allocating a port id when none is given
    AddInstance {
        /// Instance id to bind
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Subscribes an instance from `serial`
    Connect {
        /// Instance to subscribe
        instance: String,
        /// Cursor to catch up from
        #[serde(default)]
        serial: Serial,
    },
    /// Resubscribes an instance from its own cursor
    Reconnect {
        /// Instance to resubscribe
        instance: String,
    },
    /// Submits an update from an instance
    Send {
        /// Sending instance
        instance: String,
        /// Update as submitted, before a serial is assigned
        update: SubmittedUpdate,
        /// Free-form description passed along with the update
        #[serde(default)]
        descr: String,
    },
    /// Relays realtime bytes from an instance
    SendRealtime {
        /// Sending instance
        instance: String,
        /// Raw payload
        data: Vec<u8>,
    },
    /// Joins the realtime channel
    JoinRealtime {
        /// Joining instance
        instance: String,
    },
    /// Leaves the realtime channel
    LeaveRealtime {
        /// Leaving instance
        instance: String,
    },
    /// Clears every instance and starts a new epoch
    Clear,
    /// Tears an instance down; it receives a delete
    Remove {
        /// Instance to remove
        instance: String,
    },
    /// Feeds raw inbound message text through the transport boundary
    Raw {
        /// Instance the message comes from
        instance: String,
        /// Message text as it would arrive on the wire
        message: String,
    },
}

/// A named list of steps with an optional configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Name shown in reports
    pub name: String,
    /// Session configuration; deterministic test settings when omitted
    #[serde(default = "MeshConfig::for_testing")]
    pub config: MeshConfig,
    /// Seed the scenario was generated from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Creates a scenario with the test configuration and no seed.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            config: MeshConfig::for_testing(),
            seed: None,
            steps,
        }
    }

    /// Parses a scenario from JSON text.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Json` - If the text is not a valid scenario
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a scenario file.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Io` - If the file cannot be read
    /// - `SimulationError::Json` - If the file is not a valid scenario
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Checks that the scenario has steps and a valid configuration.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidScenario` - If there are no steps
    /// - `SimulationError::Mesh` - If the configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(SimulationError::InvalidScenario {
                reason: format!("scenario '{}' has no steps", self.name),
            });
        }
        self.config.validate()?;
        Ok(())
    }

    /// The hello/bye exchange between two instances plus a late joiner.
    pub fn hello_bye() -> Self {
        let instance = |id: &str| id.to_string();
        Self::new(
            "hello-bye",
            vec![
                Step::AddInstance { id: None },
                Step::AddInstance { id: None },
                Step::Connect {
                    instance: instance("3001"),
                    serial: 0,
                },
                Step::Connect {
                    instance: instance("3002"),
                    serial: 0,
                },
                Step::Send {
                    instance: instance("3001"),
                    update: SubmittedUpdate::new("Hello"),
                    descr: "hello".to_string(),
                },
                Step::Send {
                    instance: instance("3001"),
                    update: SubmittedUpdate::new("Bye"),
                    descr: "bye".to_string(),
                },
                Step::AddInstance { id: None },
                Step::Connect {
                    instance: instance("3003"),
                    serial: 0,
                },
            ],
        )
    }
}

/// A step the network refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRejection {
    /// Index of the step in the scenario
    pub step: usize,
    /// Error the network returned
    pub reason: String,
}

/// Final state of one instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    /// Instance id
    pub id: String,
    /// Updates applied since the last clear
    pub applied: Vec<UpdateEntry>,
    /// Highest serial applied
    pub last_serial: Serial,
    /// Highest `max_serial` seen
    pub max_serial: Serial,
    /// Number of clears received
    pub clear_count: usize,
    /// Number of realtime messages received
    pub realtime_received: usize,
    /// Whether a delete was received
    pub deleted: bool,
}

/// Result of a scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Scenario seed, if any
    pub seed: Option<u64>,
    /// Number of steps run, rejected ones included
    pub steps_executed: usize,
    /// Epoch after the last step
    pub epoch: u64,
    /// Tail of the event feed, bounded by `event_history_limit`
    pub events: Vec<MeshEvent>,
    /// Instances still registered at the end
    pub instances: Vec<InstanceSummary>,
    /// Steps the network refused
    pub rejected: Vec<StepRejection>,
    /// First violation of each broken invariant
    pub violations: Vec<InvariantViolation>,
}

impl ScenarioReport {
    /// Whether every invariant held.
    pub fn is_success(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns the summary of `id`, if it was still registered at the end.
    pub fn instance(&self, id: &str) -> Option<&InstanceSummary> {
        self.instances.iter().find(|instance| instance.id == id)
    }

    /// Generates human-readable summary.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        let _ = writeln!(summary, "Scenario: {}", self.name);
        if let Some(seed) = self.seed {
            let _ = writeln!(summary, "Seed: {seed}");
        }
        let _ = writeln!(summary, "Steps executed: {}", self.steps_executed);
        let _ = writeln!(summary, "Events recorded: {}", self.events.len());
        let _ = writeln!(summary, "Final epoch: {}", self.epoch);
        let _ = writeln!(summary, "Success: {}", self.is_success());

        if !self.instances.is_empty() {
            summary.push_str("\nInstances:\n");
            for instance in &self.instances {
                let _ = writeln!(
                    summary,
                    "  {}: {} updates (last serial {}, max serial {}), {} clears, {} realtime",
                    instance.id,
                    instance.applied.len(),
                    instance.last_serial,
                    instance.max_serial,
                    instance.clear_count,
                    instance.realtime_received
                );
            }
        }

        if !self.rejected.is_empty() {
            summary.push_str("\nRejected steps:\n");
            for rejection in &self.rejected {
                let _ = writeln!(summary, "  #{}: {}", rejection.step, rejection.reason);
            }
        }

        if !self.violations.is_empty() {
            summary.push_str("\nInvariant violations:\n");
            for violation in &self.violations {
                let _ = writeln!(summary, "  - {violation}");
            }
        }

        summary
    }
}

/// Executes scenarios and checks invariants after every step.
pub struct ScenarioRunner {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioRunner {
    /// Creates a runner with the default invariants.
    pub fn new() -> Self {
        Self {
            invariants: default_invariants(),
        }
    }

    /// Creates a runner checking nothing.
    pub fn without_invariants() -> Self {
        Self {
            invariants: Vec::new(),
        }
    }

    /// Adds an invariant to check after every step.
    pub fn with_invariant(mut self, invariant: impl Invariant + 'static) -> Self {
        self.invariants.push(Box::new(invariant));
        self
    }

    /// Runs every step of `scenario` on a fresh network.
    ///
    /// Steps the network refuses are recorded and skipped. Each invariant is
    /// reported at most once, for the first step that broke it. Invariants
    /// see the whole feed, whatever `event_history_limit` says.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Mesh` - If the scenario configuration is invalid
    pub fn run(&self, scenario: &Scenario) -> Result<ScenarioReport> {
        let audit = EventRecorder::new();
        let mut network = SimulatedNetwork::with_audit(scenario.config.clone(), audit.clone())?;
        let mut feed: Vec<MeshEvent> = Vec::new();
        let mut rejected = Vec::new();
        let mut violations: Vec<InvariantViolation> = Vec::new();

        tracing::info!(
            scenario = %scenario.name,
            steps = scenario.steps.len(),
            "Running scenario"
        );

        for (index, step) in scenario.steps.iter().enumerate() {
            if let Err(e) = execute_step(&mut network, step) {
                tracing::debug!(step = index, error = %e, "Step rejected");
                rejected.push(StepRejection {
                    step: index,
                    reason: e.to_string(),
                });
            }

            feed.extend(audit.take());
            for invariant in &self.invariants {
                if violations.iter().any(|v| v.invariant == invariant.name()) {
                    continue;
                }
                if let Err(violation) = invariant.check(&feed) {
                    tracing::warn!(step = index, %violation, "Invariant violated");
                    violations.push(violation);
                }
            }
        }

        let instances = network
            .instances()
            .iter()
            .map(|instance| {
                let view = instance.snapshot();
                InstanceSummary {
                    id: instance.id().to_string(),
                    last_serial: view.last_serial,
                    max_serial: view.max_serial,
                    clear_count: view.clear_count,
                    realtime_received: view.realtime_received.len(),
                    deleted: view.deleted,
                    applied: view.applied,
                }
            })
            .collect();

        Ok(ScenarioReport {
            name: scenario.name.clone(),
            seed: scenario.seed,
            steps_executed: scenario.steps.len(),
            epoch: network.processor().epoch(),
            events: network.events(),
            instances,
            rejected,
            violations,
        })
    }
}

fn execute_step(network: &mut SimulatedNetwork, step: &Step) -> Result<()> {
    match step {
        Step::AddInstance { id: Some(id) } => network.add_instance_with_id(id.clone()),
        Step::AddInstance { id: None } => network.add_instance().map(|_| ()),
        Step::Connect { instance, serial } => network.connect(instance, *serial),
        Step::Reconnect { instance } => network.reconnect(instance),
        Step::Send {
            instance,
            update,
            descr,
        } => network
            .send_update(instance, update.clone(), descr.clone())
            .map(|_| ()),
        Step::SendRealtime { instance, data } => network.send_realtime(instance, data.clone()),
        Step::JoinRealtime { instance } => network.join_realtime(instance),
        Step::LeaveRealtime { instance } => network.leave_realtime(instance),
        Step::Clear => {
            network.clear();
            Ok(())
        }
        Step::Remove { instance } => network.remove_instance(instance).map(|_| ()),
        Step::Raw { instance, message } => network.handle_message(instance, message),
    }
}

impl std::fmt::Debug for ScenarioRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.invariants.iter().map(|i| i.name()).collect();
        f.debug_struct("ScenarioRunner")
            .field("invariants", &names)
            .finish()
    }
}

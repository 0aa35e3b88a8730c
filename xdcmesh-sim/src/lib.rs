//! xdcmesh Simulation Framework - Reproducible multi-instance sessions.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! This crate plays the parts around the update engine: it binds simulated
//! app instances to processor clients, parses and routes their inbound
//! messages, replays scripted or randomly generated scenarios, and checks
//! the resulting event feed against protocol invariants.
//!
//! # Example
//!
//! ```rust
//! use xdcmesh_sim::{Scenario, ScenarioRunner};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let report = ScenarioRunner::new().run(&Scenario::hello_bye())?;
//!
//! let late_joiner = report.instance("3003").expect("registered");
//! assert_eq!(late_joiner.applied.len(), 2);
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod generator;
pub mod instance;
pub mod invariants;
pub mod network;
pub mod scenario;

pub use clock::{DeterministicClock, DeterministicRng};
pub use generator::{GeneratorConfig, random_scenario};
pub use instance::{InstanceView, SimulatedInstance};
pub use invariants::{
    Invariant, InvariantViolation, MonotonicDeliveryInvariant, SerialContinuityInvariant,
    SingleClearPerEpochInvariant, default_invariants,
};
pub use network::SimulatedNetwork;
pub use scenario::{InstanceSummary, Scenario, ScenarioReport, ScenarioRunner, Step, StepRejection};
use thiserror::Error;
use xdcmesh_core::MeshError;

/// Errors that can occur while driving a simulated network.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// An instance id was bound twice
    #[error("Instance {id} is already registered")]
    DuplicateInstance {
        /// The id that was already bound
        id: String,
    },

    /// No instance is bound to the id
    #[error("Instance {id} not found")]
    UnknownInstance {
        /// The id that was looked up
        id: String,
    },

    /// The configured instance limit was reached
    #[error("Instance limit of {limit} reached")]
    InstanceLimitReached {
        /// Configured maximum
        limit: usize,
    },

    /// The scenario cannot be run
    #[error("Invalid scenario: {reason}")]
    InvalidScenario {
        /// Why the scenario was refused
        reason: String,
    },

    /// The update engine refused a call
    #[error(transparent)]
    Mesh(#[from] MeshError),

    /// Scenario JSON could not be decoded
    #[error("Scenario JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A scenario file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for simulation operations.
pub type Result<T> = std::result::Result<T, SimulationError>;

#[cfg(test)]
mod tests;

//! Invariant checking over the recorded event feed.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use xdcmesh_core::{EventKind, MeshEvent, Serial};

/// Violation of a feed invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: String,
    /// Detailed description of the violation
    pub description: String,
    /// Index of the offending event in the feed
    pub event_index: usize,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invariant '{}' violated at event {}: {}",
            self.invariant, self.event_index, self.description
        )
    }
}

/// Trait for checking invariants of an event feed.
pub trait Invariant: Send + Sync {
    /// Checks the whole feed, oldest event first.
    ///
    /// # Errors
    /// Returns `InvariantViolation` for the first event breaking the invariant.
    fn check(&self, events: &[MeshEvent]) -> Result<(), InvariantViolation>;

    /// Returns name of this invariant.
    fn name(&self) -> &str;

    /// Builds a violation of this invariant at `event_index`.
    fn violation(&self, event_index: usize, description: String) -> InvariantViolation {
        InvariantViolation {
            invariant: self.name().to_string(),
            description,
            event_index,
        }
    }
}

/// Sent serials count 1, 2, 3, ... within every epoch, across all senders.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialContinuityInvariant;

impl Invariant for SerialContinuityInvariant {
    fn check(&self, events: &[MeshEvent]) -> Result<(), InvariantViolation> {
        let mut last_by_epoch: HashMap<u64, Serial> = HashMap::new();

        for (index, event) in events.iter().enumerate() {
            let EventKind::Sent { update, .. } = &event.kind else {
                continue;
            };

            let last = last_by_epoch.entry(event.epoch).or_insert(0);
            if update.serial != *last + 1 {
                return Err(self.violation(
                    index,
                    format!(
                        "{} sent serial {} in epoch {}, expected {}",
                        event.instance_id,
                        update.serial,
                        event.epoch,
                        *last + 1
                    ),
                ));
            }
            *last = update.serial;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "SerialContinuity"
    }
}

/// Between two connects, an instance receives strictly increasing serials.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicDeliveryInvariant;

impl Invariant for MonotonicDeliveryInvariant {
    fn check(&self, events: &[MeshEvent]) -> Result<(), InvariantViolation> {
        let mut last_received: HashMap<&str, Serial> = HashMap::new();

        for (index, event) in events.iter().enumerate() {
            match &event.kind {
                EventKind::Connect => {
                    last_received.remove(event.instance_id.as_str());
                }
                EventKind::Received { update, .. } => {
                    let id = event.instance_id.as_str();
                    if let Some(&last) = last_received.get(id) {
                        if update.serial <= last {
                            return Err(self.violation(
                                index,
                                format!(
                                    "{id} received serial {} after {last}",
                                    update.serial
                                ),
                            ));
                        }
                    }
                    last_received.insert(id, update.serial);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "MonotonicDelivery"
    }
}

/// No instance acknowledges more than one clear per epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleClearPerEpochInvariant;

impl Invariant for SingleClearPerEpochInvariant {
    fn check(&self, events: &[MeshEvent]) -> Result<(), InvariantViolation> {
        let mut cleared: HashSet<(&str, u64)> = HashSet::new();

        for (index, event) in events.iter().enumerate() {
            if event.kind != EventKind::Clear {
                continue;
            }
            if !cleared.insert((event.instance_id.as_str(), event.epoch)) {
                return Err(self.violation(
                    index,
                    format!(
                        "{} was cleared twice in epoch {}",
                        event.instance_id, event.epoch
                    ),
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "SingleClearPerEpoch"
    }
}

/// The invariants every run is checked against.
pub fn default_invariants() -> Vec<Box<dyn Invariant>> {
    vec![
        Box::new(SerialContinuityInvariant),
        Box::new(MonotonicDeliveryInvariant),
        Box::new(SingleClearPerEpochInvariant),
    ]
}

//! Integration tests for xdcmesh
//!
//! These tests drive the processor through client handles, the transport
//! boundary and the simulated network, and check the delivered batches and
//! the event feed against the ordering, catch-up and clear contracts.

#[path = "integration/common.rs"]
mod common;

#[path = "integration/catch_up.rs"]
mod catch_up;
#[path = "integration/clear_epochs.rs"]
mod clear_epochs;
#[path = "integration/ordering.rs"]
mod ordering;
#[path = "integration/properties.rs"]
mod properties;
#[path = "integration/realtime.rs"]
mod realtime;
#[path = "integration/scenarios.rs"]
mod scenarios;
#[path = "integration/transport.rs"]
mod transport;

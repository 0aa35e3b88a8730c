//! Event feed mirroring every delivery decision.
//!
//! The [`Processor`](crate::Processor) reports each state-changing step to a
//! single [`Observer`], in the order the steps happen. The feed is the basis
//! for inspection tooling and for test assertions.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::update::Update;

/// One entry of the event feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshEvent {
    pub instance_id: String,
    pub color: String,
    pub timestamp: DateTime<Utc>,
    /// Number of clears that preceded this event
    pub epoch: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Kind-specific part of a [`MeshEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventKind {
    /// Listeners were registered
    Connect,
    /// An update was accepted into the log
    Sent { update: Update, descr: String },
    /// An instance accepted an update
    Received { update: Update, descr: String },
    /// An instance acknowledged a clear for the current epoch
    Clear,
    /// Realtime bytes left an instance
    RealtimeSent { data: Vec<u8> },
}

impl EventKind {
    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Sent { .. } => "sent",
            EventKind::Received { .. } => "received",
            EventKind::Clear => "clear",
            EventKind::RealtimeSent { .. } => "realtime-sent",
        }
    }
}

/// Receives every event emitted by a processor.
pub trait Observer: Send {
    fn observe(&mut self, event: &MeshEvent);
}

impl<F> Observer for F
where
    F: FnMut(&MeshEvent) + Send,
{
    fn observe(&mut self, event: &MeshEvent) {
        self(event)
    }
}

/// Observer that writes each event to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn observe(&mut self, event: &MeshEvent) {
        match &event.kind {
            EventKind::Sent { update, .. } | EventKind::Received { update, .. } => {
                tracing::debug!(
                    instance = %event.instance_id,
                    epoch = event.epoch,
                    serial = update.serial,
                    max_serial = update.max_serial,
                    "{}",
                    event.kind.as_str()
                );
            }
            EventKind::RealtimeSent { data } => {
                tracing::trace!(
                    instance = %event.instance_id,
                    bytes = data.len(),
                    "realtime-sent"
                );
            }
            EventKind::Connect | EventKind::Clear => {
                tracing::debug!(
                    instance = %event.instance_id,
                    epoch = event.epoch,
                    "{}",
                    event.kind.as_str()
                );
            }
        }
    }
}

/// Observer that keeps the feed in memory.
///
/// Clones share the same storage, so one clone can be handed to the
/// processor while another is read by tests or tooling. A non-zero limit
/// bounds the history, dropping the oldest events first.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<VecDeque<MeshEvent>>>,
    limit: usize,
}

impl EventRecorder {
    /// Creates a recorder that keeps every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recorder keeping at most `limit` events (0 = unbounded).
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Arc::default(),
            limit,
        }
    }

    /// Returns a copy of the recorded feed, oldest first.
    pub fn events(&self) -> Vec<MeshEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Removes and returns the recorded feed.
    pub fn take(&self) -> Vec<MeshEvent> {
        self.events.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl Observer for EventRecorder {
    fn observe(&mut self, event: &MeshEvent) {
        let mut events = self.events.lock();
        if self.limit > 0 && events.len() == self.limit {
            events.pop_front();
        }
        events.push_back(event.clone());
    }
}

//! Simulated app instances.
//!
//! A [`SimulatedInstance`] stands in for one host running the app. Its
//! listeners re-serialize what the processor delivers into
//! [`OutboundMessage`]s and apply them to a local view the way a host would:
//! updates are appended, a clear wipes everything, a delete marks the
//! instance gone.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use xdcmesh_core::{OutboundMessage, Serial, Subscription, UpdateEntry};

/// Local state of one instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceView {
    /// Updates applied since the last clear, in delivery order
    pub applied: Vec<UpdateEntry>,
    /// Serial of the last applied update
    pub last_serial: Serial,
    /// Highest `max_serial` seen since the last clear
    pub max_serial: Serial,
    /// Clear notifications acknowledged so far
    pub clear_count: usize,
    /// Set once the instance has been removed from the network
    pub deleted: bool,
    /// Realtime payloads received from other instances
    #[serde(skip)]
    pub realtime_received: Vec<Bytes>,
    /// Messages not yet drained by the host
    #[serde(skip)]
    pub outbox: VecDeque<OutboundMessage>,
    /// Whether listeners accept deliveries; false simulates a dropped socket
    pub accepting: bool,
    /// Set by a clear; the host must resubscribe from serial 0
    #[serde(skip)]
    pub needs_resync: bool,
}

impl Default for InstanceView {
    fn default() -> Self {
        Self {
            applied: Vec::new(),
            last_serial: 0,
            max_serial: 0,
            clear_count: 0,
            deleted: false,
            realtime_received: Vec::new(),
            outbox: VecDeque::new(),
            accepting: true,
            needs_resync: false,
        }
    }
}

impl InstanceView {
    fn apply_updates(&mut self, batch: &[UpdateEntry]) -> bool {
        if !self.accepting || self.deleted {
            return false;
        }

        self.outbox.push_back(OutboundMessage::Updates {
            updates: batch.to_vec(),
        });
        for entry in batch {
            self.last_serial = entry.update.serial;
            self.max_serial = self.max_serial.max(entry.update.max_serial);
            self.applied.push(entry.clone());
        }
        true
    }

    fn apply_clear(&mut self) -> bool {
        if !self.accepting || self.deleted {
            return false;
        }

        self.outbox.push_back(OutboundMessage::Clear);
        self.applied.clear();
        self.last_serial = 0;
        self.max_serial = 0;
        self.clear_count += 1;
        self.needs_resync = true;
        true
    }

    fn apply_delete(&mut self) {
        self.outbox.push_back(OutboundMessage::Delete);
        self.deleted = true;
    }

    fn apply_realtime(&mut self, data: &Bytes) {
        self.outbox.push_back(OutboundMessage::Realtime {
            data: data.to_vec(),
        });
        self.realtime_received.push(data.clone());
    }
}

/// Handle on one simulated instance.
///
/// Clones share the same view; the listeners handed to the processor hold
/// one clone each.
#[derive(Debug, Clone)]
pub struct SimulatedInstance {
    id: String,
    view: Arc<Mutex<InstanceView>>,
}

impl SimulatedInstance {
    /// Creates an instance with an empty view that accepts deliveries.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            view: Arc::default(),
        }
    }

    /// Id the instance is registered under.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Builds a subscription whose listeners feed this instance's view.
    pub fn subscription(&self, from_serial: Serial) -> Subscription {
        let updates = Arc::clone(&self.view);
        let clears = Arc::clone(&self.view);
        let deletes = Arc::clone(&self.view);

        Subscription::new(
            move |batch: &[UpdateEntry]| updates.lock().apply_updates(batch),
            from_serial,
        )
        .on_clear(move || clears.lock().apply_clear())
        .on_delete(move || deletes.lock().apply_delete())
    }

    /// Builds a realtime listener feeding this instance's view.
    pub fn realtime_listener(&self) -> impl Fn(&Bytes) + Send + 'static {
        let view = Arc::clone(&self.view);
        move |data: &Bytes| view.lock().apply_realtime(data)
    }

    /// Copy of the current local state.
    pub fn snapshot(&self) -> InstanceView {
        self.view.lock().clone()
    }

    /// Removes and returns every pending outbound message.
    pub fn drain_outbox(&self) -> Vec<OutboundMessage> {
        self.view.lock().outbox.drain(..).collect()
    }

    /// Updates applied since the last clear.
    pub fn applied(&self) -> Vec<UpdateEntry> {
        self.view.lock().applied.clone()
    }

    /// Serial of the last applied update.
    pub fn last_serial(&self) -> Serial {
        self.view.lock().last_serial
    }

    /// Clears acknowledged so far.
    pub fn clear_count(&self) -> usize {
        self.view.lock().clear_count
    }

    /// Whether a delete notification arrived.
    pub fn is_deleted(&self) -> bool {
        self.view.lock().deleted
    }

    /// Realtime payloads received so far.
    pub fn realtime_received(&self) -> Vec<Bytes> {
        self.view.lock().realtime_received.clone()
    }

    /// Toggles whether deliveries are accepted.
    pub fn set_accepting(&self, accepting: bool) {
        self.view.lock().accepting = accepting;
    }

    pub(crate) fn take_resync(&self) -> bool {
        std::mem::take(&mut self.view.lock().needs_resync)
    }
}

#[cfg(test)]
mod tests {
    use xdcmesh_core::{MeshConfig, Processor, SubmittedUpdate};

    use super::*;

    #[test]
    fn test_subscription_applies_batches() {
        let instance = SimulatedInstance::new("3001");
        let mut processor = Processor::new(&MeshConfig::for_testing());

        let mut client = processor.create_client("3001").unwrap();
        client.connect(instance.subscription(0)).unwrap();
        client
            .send_update(SubmittedUpdate::new("Hello"), "hello")
            .unwrap();

        let view = instance.snapshot();
        assert_eq!(view.applied.len(), 1);
        assert_eq!(view.last_serial, 1);
        assert_eq!(view.clear_count, 1);

        let outbox = instance.drain_outbox();
        assert_eq!(outbox.len(), 3);
        assert_eq!(outbox[0], OutboundMessage::Clear);
        assert!(matches!(&outbox[1], OutboundMessage::Updates { updates } if updates.is_empty()));
        assert!(matches!(&outbox[2], OutboundMessage::Updates { updates } if updates.len() == 1));
        assert!(instance.drain_outbox().is_empty());
    }

    #[test]
    fn test_non_accepting_instance_declines() {
        let instance = SimulatedInstance::new("3001");
        instance.set_accepting(false);
        let mut processor = Processor::new(&MeshConfig::for_testing());

        let mut client = processor.create_client("3001").unwrap();
        client.connect(instance.subscription(0)).unwrap();
        client.send_update(SubmittedUpdate::new(1), "").unwrap();

        assert!(instance.applied().is_empty());
        assert_eq!(instance.clear_count(), 0);
        assert_eq!(client.last_seen_serial().unwrap(), Some(0));
    }

    #[test]
    fn test_clear_wipes_view_and_requests_resync() {
        let instance = SimulatedInstance::new("a");
        let mut view = instance.view.lock();
        view.applied.push(UpdateEntry {
            update: serde_json::from_value(serde_json::json!({
                "payload": 1, "serial": 1, "max_serial": 1
            }))
            .unwrap(),
            descr: String::new(),
        });
        view.last_serial = 1;
        assert!(view.apply_clear());
        drop(view);

        assert!(instance.applied().is_empty());
        assert_eq!(instance.last_serial(), 0);
        assert!(instance.take_resync());
        assert!(!instance.take_resync());
    }
}

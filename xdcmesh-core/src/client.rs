//! Per-instance client state and the handle instances use to talk to the
//! processor.

use std::collections::HashSet;
use std::fmt;

use bytes::Bytes;

use crate::Result;
use crate::listener::{ClearListener, DeleteListener, RealtimeListener, UpdateListener};
use crate::observer::EventKind;
use crate::processor::{EventSink, Processor};
use crate::realtime::RealtimeHandle;
use crate::update::{Serial, SubmittedUpdate, Update, UpdateEntry};

/// Listener registration passed to [`Client::connect`].
///
/// ```
/// use xdcmesh_core::{Subscription, UpdateEntry};
///
/// let subscription = Subscription::new(|batch: &[UpdateEntry]| !batch.is_empty(), 0)
///     .on_clear(|| true)
///     .on_delete(|| {});
/// assert_eq!(subscription.from_serial(), 0);
/// ```
pub struct Subscription {
    update_listener: Box<dyn UpdateListener>,
    from_serial: Serial,
    clear_listener: Option<Box<dyn ClearListener>>,
    delete_listener: Option<Box<dyn DeleteListener>>,
}

impl Subscription {
    /// Subscribes to every update with a serial greater than `from_serial`.
    pub fn new(listener: impl UpdateListener + 'static, from_serial: Serial) -> Self {
        Self {
            update_listener: Box::new(listener),
            from_serial,
            clear_listener: None,
            delete_listener: None,
        }
    }

    pub fn on_clear(mut self, listener: impl ClearListener + 'static) -> Self {
        self.clear_listener = Some(Box::new(listener));
        self
    }

    pub fn on_delete(mut self, listener: impl DeleteListener + 'static) -> Self {
        self.delete_listener = Some(Box::new(listener));
        self
    }

    pub fn from_serial(&self) -> Serial {
        self.from_serial
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("from_serial", &self.from_serial)
            .field("clear_listener", &self.clear_listener.is_some())
            .field("delete_listener", &self.delete_listener.is_some())
            .finish()
    }
}

/// Registry entry for one instance. Only the processor mutates it.
pub(crate) struct ClientState {
    pub(crate) id: String,
    update_listener: Option<Box<dyn UpdateListener>>,
    clear_listener: Option<Box<dyn ClearListener>>,
    delete_listener: Option<Box<dyn DeleteListener>>,
    last_seen_serial: Option<Serial>,
    pub(crate) realtime: Option<RealtimeHandle>,
}

impl ClientState {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            update_listener: None,
            clear_listener: None,
            delete_listener: None,
            last_seen_serial: None,
            realtime: None,
        }
    }

    pub(crate) fn last_seen_serial(&self) -> Option<Serial> {
        self.last_seen_serial
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.update_listener.is_some()
    }

    /// Replaces all listeners and moves the cursor to the subscription start.
    pub(crate) fn install(&mut self, subscription: Subscription) {
        self.update_listener = Some(subscription.update_listener);
        self.clear_listener = subscription.clear_listener;
        self.delete_listener = subscription.delete_listener;
        self.last_seen_serial = Some(subscription.from_serial);
    }

    /// Live delivery of a freshly accepted update.
    pub(crate) fn receive_update(&mut self, entry: &UpdateEntry, sink: &mut EventSink, epoch: u64) {
        let (Some(listener), Some(cursor)) =
            (self.update_listener.as_mut(), self.last_seen_serial)
        else {
            return;
        };

        let serial = entry.update.serial;
        if serial <= cursor {
            tracing::debug!(
                client = %self.id,
                serial,
                cursor,
                "Dropping update already covered by cursor"
            );
            return;
        }

        if listener.on_updates(std::slice::from_ref(entry)) {
            sink.emit(
                epoch,
                &self.id,
                EventKind::Received {
                    update: entry.update.clone(),
                    descr: entry.descr.clone(),
                },
            );
            self.last_seen_serial = Some(serial);
        } else {
            tracing::debug!(client = %self.id, serial, "Listener declined update");
        }
    }

    /// Delivers a catch-up batch stamped with `max_serial`.
    ///
    /// The listener is called even for an empty batch so the instance learns
    /// it is up to date; acceptance moves the cursor to `max_serial`.
    pub(crate) fn receive_catch_up(
        &mut self,
        batch: &[UpdateEntry],
        max_serial: Serial,
        sink: &mut EventSink,
        epoch: u64,
    ) {
        let Some(listener) = self.update_listener.as_mut() else {
            return;
        };

        tracing::debug!(
            client = %self.id,
            count = batch.len(),
            max_serial,
            "Delivering catch-up batch"
        );

        if !listener.on_updates(batch) {
            tracing::debug!(client = %self.id, "Listener declined catch-up batch");
            return;
        }

        for entry in batch {
            sink.emit(
                epoch,
                &self.id,
                EventKind::Received {
                    update: entry.update.clone(),
                    descr: entry.descr.clone(),
                },
            );
        }
        self.last_seen_serial = Some(max_serial);
    }

    /// Notifies the clear listener unless this client was already cleared
    /// in the current epoch.
    pub(crate) fn notify_clear(
        &mut self,
        cleared_in_epoch: &mut HashSet<String>,
        sink: &mut EventSink,
        epoch: u64,
    ) {
        let Some(listener) = self.clear_listener.as_mut() else {
            return;
        };

        if cleared_in_epoch.contains(&self.id) {
            tracing::trace!(client = %self.id, epoch, "Already cleared in this epoch");
            return;
        }

        if listener.on_clear() {
            cleared_in_epoch.insert(self.id.clone());
            sink.emit(epoch, &self.id, EventKind::Clear);
        }
    }

    /// Tells the instance it is being torn down.
    pub(crate) fn notify_delete(&mut self) {
        if let Some(listener) = self.delete_listener.as_mut() {
            listener.on_delete();
        }
    }
}

impl fmt::Debug for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientState")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .field("last_seen_serial", &self.last_seen_serial)
            .field("realtime", &self.realtime)
            .finish()
    }
}

/// An instance's view of the processor.
///
/// Obtained from [`Processor::create_client`] or [`Processor::client`]; all
/// calls are forwarded to the processor under this client's id.
#[derive(Debug)]
pub struct Client<'p> {
    processor: &'p mut Processor,
    id: String,
}

impl<'p> Client<'p> {
    pub(crate) fn new(processor: &'p mut Processor, id: String) -> Self {
        Self { processor, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registers listeners and catches up from the subscription's serial.
    ///
    /// # Errors
    ///
    /// - `MeshError::UnknownClient` - If the client was removed
    pub fn connect(&mut self, subscription: Subscription) -> Result<()> {
        self.processor.connect_client(&self.id, subscription)
    }

    /// Submits an update and returns the record as stored in the log.
    ///
    /// # Errors
    ///
    /// - `MeshError::UnknownClient` - If the client was removed
    pub fn send_update(
        &mut self,
        update: SubmittedUpdate,
        descr: impl Into<String>,
    ) -> Result<Update> {
        self.processor.distribute(&self.id, update, descr.into())
    }

    /// Relays raw bytes to every other instance with an active realtime
    /// handle.
    ///
    /// # Errors
    ///
    /// - `MeshError::RealtimeChannelLeft` - If this client left its channel
    pub fn send_realtime_data(&mut self, data: impl Into<Bytes>) -> Result<()> {
        self.processor.distribute_realtime(&self.id, data.into())
    }

    /// Installs an active realtime handle, replacing a previously left one.
    ///
    /// # Errors
    ///
    /// - `MeshError::UnknownClient` - If the client was removed
    pub fn join_realtime(&mut self, listener: impl RealtimeListener + 'static) -> Result<()> {
        self.processor.join_realtime(&self.id, listener)
    }

    /// Flags this client's realtime handle as left.
    ///
    /// # Errors
    ///
    /// - `MeshError::UnknownClient` - If the client was removed
    pub fn leave_realtime(&mut self) -> Result<()> {
        self.processor.leave_realtime(&self.id)
    }

    /// Cursor below which this client has been caught up, `None` until it
    /// connects.
    ///
    /// # Errors
    ///
    /// - `MeshError::UnknownClient` - If the client was removed
    pub fn last_seen_serial(&self) -> Result<Option<Serial>> {
        self.processor.last_seen_serial(&self.id)
    }
}

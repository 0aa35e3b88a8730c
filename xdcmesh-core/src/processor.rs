//! The update processor: ordering, broadcast, catch-up, clear and realtime
//! relay for one simulated network session.
//!
//! The processor exclusively owns the [`UpdateLog`] and the client registry.
//! Every entry point runs to completion synchronously, so each mutation is
//! atomic with respect to the call that triggered it and no locking is
//! needed. Listeners are invoked inline and cannot re-enter the processor.

use std::collections::HashSet;
use std::fmt;

use bytes::Bytes;

use crate::client::{Client, ClientState, Subscription};
use crate::clock::{Clock, SystemClock};
use crate::color::{ColorAllocator, PaletteColors};
use crate::config::MeshConfig;
use crate::listener::RealtimeListener;
use crate::observer::{EventKind, MeshEvent, Observer, TracingObserver};
use crate::realtime::RealtimeHandle;
use crate::update::{Serial, SubmittedUpdate, Update};
use crate::update_log::UpdateLog;
use crate::{MeshError, Result};

/// Builds and forwards observer events.
pub(crate) struct EventSink {
    observer: Box<dyn Observer>,
    colors: Box<dyn ColorAllocator>,
    clock: Box<dyn Clock>,
}

impl EventSink {
    pub(crate) fn emit(&mut self, epoch: u64, instance_id: &str, kind: EventKind) {
        let event = MeshEvent {
            instance_id: instance_id.to_string(),
            color: self.colors.color_for(instance_id),
            timestamp: self.clock.now(),
            epoch,
            kind,
        };
        self.observer.observe(&event);
    }
}

/// Owner of the update log and the client registry.
pub struct Processor {
    clients: Vec<ClientState>,
    log: UpdateLog,
    cleared_in_epoch: HashSet<String>,
    epoch: u64,
    sink: EventSink,
}

impl Processor {
    /// Creates a processor using wall-clock time, the configured palette and
    /// an observer that writes to the `tracing` log.
    pub fn new(config: &MeshConfig) -> Self {
        Self {
            clients: Vec::new(),
            log: UpdateLog::new(),
            cleared_in_epoch: HashSet::new(),
            epoch: 0,
            sink: EventSink {
                observer: Box::new(TracingObserver),
                colors: Box::new(PaletteColors::from_config(&config.colors)),
                clock: Box::new(SystemClock),
            },
        }
    }

    /// Replaces the observer receiving the event feed.
    pub fn with_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.sink.observer = Box::new(observer);
        self
    }

    /// Replaces the timestamp source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.sink.clock = Box::new(clock);
        self
    }

    /// Replaces the colour allocator.
    pub fn with_colors(mut self, colors: impl ColorAllocator + 'static) -> Self {
        self.sink.colors = Box::new(colors);
        self
    }

    /// Registers a new client.
    ///
    /// # Errors
    ///
    /// - `MeshError::DuplicateClient` - If `id` is already registered
    pub fn create_client(&mut self, id: impl Into<String>) -> Result<Client<'_>> {
        let id = id.into();
        if self.contains_client(&id) {
            return Err(MeshError::DuplicateClient { id });
        }

        tracing::info!(client = %id, "Client created");
        self.clients.push(ClientState::new(id.clone()));
        Ok(Client::new(self, id))
    }

    /// Returns the handle of a registered client.
    ///
    /// # Errors
    ///
    /// - `MeshError::UnknownClient` - If `id` is not registered
    pub fn client(&mut self, id: &str) -> Result<Client<'_>> {
        self.position(id)?;
        Ok(Client::new(self, id.to_string()))
    }

    pub fn contains_client(&self, id: &str) -> bool {
        self.clients.iter().any(|client| client.id == id)
    }

    /// Registered client ids in registration order.
    pub fn client_ids(&self) -> impl Iterator<Item = &str> {
        self.clients.iter().map(|client| client.id.as_str())
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Cursor of a client, `None` until it connects.
    ///
    /// # Errors
    ///
    /// - `MeshError::UnknownClient` - If `id` is not registered
    pub fn last_seen_serial(&self, id: &str) -> Result<Option<Serial>> {
        let index = self.position(id)?;
        Ok(self.clients[index].last_seen_serial())
    }

    /// Number of clears performed so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn log(&self) -> &UpdateLog {
        &self.log
    }

    /// Tears a client down: notifies its delete listener, then drops it.
    ///
    /// # Errors
    ///
    /// - `MeshError::UnknownClient` - If `id` is not registered
    pub fn remove_client(&mut self, id: &str) -> Result<()> {
        let index = self.position(id)?;
        let mut client = self.clients.remove(index);
        client.notify_delete();
        tracing::info!(client = %id, "Client removed");
        Ok(())
    }

    /// Simulates wiping every instance and starts a new epoch.
    ///
    /// Each connected client gets one clear notification for the new epoch;
    /// afterwards the log is empty and the next update gets serial 1.
    pub fn clear(&mut self) {
        self.cleared_in_epoch.clear();
        self.epoch += 1;

        let epoch = self.epoch;
        for client in &mut self.clients {
            client.notify_clear(&mut self.cleared_in_epoch, &mut self.sink, epoch);
        }

        self.log.reset_epoch();
        tracing::info!(
            epoch,
            notified = self.cleared_in_epoch.len(),
            "Started new epoch"
        );
    }

    /// Appends an update and fans it out to every client, sender included.
    pub(crate) fn distribute(
        &mut self,
        sender: &str,
        update: SubmittedUpdate,
        descr: String,
    ) -> Result<Update> {
        self.position(sender)?;

        let epoch = self.epoch;
        let entry = self.log.append(update, descr);
        self.sink.emit(
            epoch,
            sender,
            EventKind::Sent {
                update: entry.update.clone(),
                descr: entry.descr.clone(),
            },
        );

        for client in &mut self.clients {
            client.receive_update(&entry, &mut self.sink, epoch);
        }

        Ok(entry.update)
    }

    /// Installs listeners, attempts the epoch's clear notification, then
    /// delivers everything after the subscription's serial as one batch.
    pub(crate) fn connect_client(&mut self, id: &str, subscription: Subscription) -> Result<()> {
        let index = self.position(id)?;
        let epoch = self.epoch;
        let from_serial = subscription.from_serial();

        let client = &mut self.clients[index];
        client.install(subscription);
        self.sink.emit(epoch, id, EventKind::Connect);

        client.notify_clear(&mut self.cleared_in_epoch, &mut self.sink, epoch);

        let max_serial = self.log.max_serial();
        let batch = self.log.catch_up_from(from_serial);
        client.receive_catch_up(&batch, max_serial, &mut self.sink, epoch);

        Ok(())
    }

    /// Relays realtime bytes to every other client with an active handle.
    pub(crate) fn distribute_realtime(&mut self, sender: &str, data: Bytes) -> Result<()> {
        let index = self.position(sender)?;
        if let Some(handle) = &self.clients[index].realtime {
            handle.ensure_can_send()?;
        }

        self.sink.emit(
            self.epoch,
            sender,
            EventKind::RealtimeSent {
                data: data.to_vec(),
            },
        );

        for client in self.clients.iter_mut().filter(|client| client.id != sender) {
            match client.realtime.as_mut() {
                Some(handle) if handle.is_active() => handle.receive(&data)?,
                _ => tracing::trace!(client = %client.id, "No active realtime handle"),
            }
        }

        Ok(())
    }

    pub(crate) fn join_realtime(
        &mut self,
        id: &str,
        listener: impl RealtimeListener + 'static,
    ) -> Result<()> {
        let index = self.position(id)?;
        self.clients[index].realtime = Some(RealtimeHandle::join(id, listener));
        tracing::debug!(client = %id, "Joined realtime channel");
        Ok(())
    }

    pub(crate) fn leave_realtime(&mut self, id: &str) -> Result<()> {
        let index = self.position(id)?;
        if let Some(handle) = self.clients[index].realtime.as_mut() {
            handle.leave();
            tracing::debug!(client = %id, "Left realtime channel");
        }
        Ok(())
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.clients
            .iter()
            .position(|client| client.id == id)
            .ok_or_else(|| MeshError::UnknownClient { id: id.to_string() })
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("clients", &self.clients)
            .field("log_len", &self.log.len())
            .field("epoch", &self.epoch)
            .field("cleared_in_epoch", &self.cleared_in_epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::observer::EventRecorder;
    use crate::update::UpdateEntry;

    type Inbox = Arc<Mutex<Vec<UpdateEntry>>>;

    fn processor_with_recorder() -> (Processor, EventRecorder) {
        let recorder = EventRecorder::new();
        let processor = Processor::new(&MeshConfig::for_testing()).with_observer(recorder.clone());
        (processor, recorder)
    }

    fn inbox_subscription(inbox: &Inbox, from_serial: Serial) -> Subscription {
        let inbox = Arc::clone(inbox);
        Subscription::new(
            move |batch: &[UpdateEntry]| {
                inbox.lock().extend_from_slice(batch);
                true
            },
            from_serial,
        )
        .on_clear(|| true)
    }

    fn kinds(recorder: &EventRecorder) -> Vec<(String, &'static str)> {
        recorder
            .events()
            .into_iter()
            .map(|event| (event.instance_id, event.kind.as_str()))
            .collect()
    }

    #[test]
    fn test_two_clients_see_same_serials() {
        let (mut processor, _) = processor_with_recorder();
        let first: Inbox = Arc::default();
        let second: Inbox = Arc::default();

        processor
            .create_client("3001")
            .unwrap()
            .connect(inbox_subscription(&first, 0))
            .unwrap();
        processor
            .create_client("3002")
            .unwrap()
            .connect(inbox_subscription(&second, 0))
            .unwrap();

        let mut sender = processor.client("3001").unwrap();
        sender.send_update(SubmittedUpdate::new("Hello"), "hello").unwrap();
        sender.send_update(SubmittedUpdate::new("Bye"), "bye").unwrap();

        for inbox in [&first, &second] {
            let serials: Vec<_> = inbox
                .lock()
                .iter()
                .map(|entry| (entry.update.serial, entry.update.max_serial))
                .collect();
            assert_eq!(serials, vec![(1, 1), (2, 2)]);
        }
    }

    #[test]
    fn test_connect_emits_connect_clear_then_received() {
        let (mut processor, recorder) = processor_with_recorder();
        processor.create_client("3001").unwrap();
        processor
            .client("3001")
            .unwrap()
            .send_update(SubmittedUpdate::new(json!(1)), "one")
            .unwrap();

        let inbox: Inbox = Arc::default();
        processor
            .client("3001")
            .unwrap()
            .connect(inbox_subscription(&inbox, 0))
            .unwrap();

        assert_eq!(
            kinds(&recorder),
            vec![
                ("3001".to_string(), "sent"),
                ("3001".to_string(), "connect"),
                ("3001".to_string(), "clear"),
                ("3001".to_string(), "received"),
            ]
        );
        assert_eq!(processor.last_seen_serial("3001").unwrap(), Some(1));
    }

    #[test]
    fn test_updates_before_connect_are_invisible_until_catch_up() {
        let (mut processor, recorder) = processor_with_recorder();
        processor.create_client("3001").unwrap();
        processor.create_client("3002").unwrap();

        processor
            .client("3001")
            .unwrap()
            .send_update(SubmittedUpdate::new("early"), "")
            .unwrap();

        let received = recorder
            .events()
            .iter()
            .filter(|event| event.kind.as_str() == "received")
            .count();
        assert_eq!(received, 0);
        assert_eq!(processor.last_seen_serial("3002").unwrap(), None);
    }

    #[test]
    fn test_declined_batch_keeps_cursor() {
        let (mut processor, recorder) = processor_with_recorder();
        processor.create_client("3001").unwrap();
        processor
            .client("3001")
            .unwrap()
            .send_update(SubmittedUpdate::new("x"), "")
            .unwrap();

        processor
            .client("3001")
            .unwrap()
            .connect(Subscription::new(|_: &[UpdateEntry]| false, 0))
            .unwrap();

        assert_eq!(processor.last_seen_serial("3001").unwrap(), Some(0));
        assert!(
            recorder
                .events()
                .iter()
                .all(|event| event.kind.as_str() != "received")
        );
    }

    #[test]
    fn test_clear_resets_serials_and_bumps_epoch() {
        let (mut processor, _) = processor_with_recorder();
        processor.create_client("3001").unwrap();
        let mut client = processor.client("3001").unwrap();
        client.send_update(SubmittedUpdate::new("a"), "").unwrap();
        client.send_update(SubmittedUpdate::new("b"), "").unwrap();

        processor.clear();
        assert_eq!(processor.epoch(), 1);
        assert!(processor.log().is_empty());

        let update = processor
            .client("3001")
            .unwrap()
            .send_update(SubmittedUpdate::new("c"), "")
            .unwrap();
        assert_eq!(update.serial, 1);
    }

    #[test]
    fn test_duplicate_and_unknown_clients_are_rejected() {
        let (mut processor, _) = processor_with_recorder();
        processor.create_client("3001").unwrap();

        assert!(matches!(
            processor.create_client("3001"),
            Err(MeshError::DuplicateClient { .. })
        ));
        assert!(matches!(
            processor.remove_client("9999"),
            Err(MeshError::UnknownClient { .. })
        ));
        assert!(matches!(
            processor.client("9999"),
            Err(MeshError::UnknownClient { .. })
        ));
    }

    #[test]
    fn test_client_cursor_reports_unknown_client() {
        let (mut processor, _) = processor_with_recorder();
        let inbox = Inbox::default();

        let mut client = processor.create_client("3001").unwrap();
        assert_eq!(client.last_seen_serial().unwrap(), None);
        client.connect(inbox_subscription(&inbox, 0)).unwrap();
        assert_eq!(client.last_seen_serial().unwrap(), Some(0));

        processor.remove_client("3001").unwrap();
        let stale = Client::new(&mut processor, "3001".to_string());
        assert!(matches!(
            stale.last_seen_serial(),
            Err(MeshError::UnknownClient { .. })
        ));
    }

    #[test]
    fn test_remove_client_notifies_delete_listener() {
        let (mut processor, _) = processor_with_recorder();
        let deleted = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&deleted);

        processor
            .create_client("3001")
            .unwrap()
            .connect(
                Subscription::new(|_: &[UpdateEntry]| true, 0).on_delete(move || {
                    *flag.lock() = true;
                }),
            )
            .unwrap();

        processor.remove_client("3001").unwrap();
        assert!(*deleted.lock());
        assert!(!processor.contains_client("3001"));
        assert_eq!(processor.client_count(), 0);
    }

    #[test]
    fn test_realtime_skips_sender_and_inactive_handles() {
        let (mut processor, recorder) = processor_with_recorder();
        let received: Arc<Mutex<Vec<(String, Bytes)>>> = Arc::default();

        for id in ["a", "b", "c"] {
            let sink = Arc::clone(&received);
            let owner = id.to_string();
            processor
                .create_client(id)
                .unwrap()
                .join_realtime(move |data: &Bytes| {
                    sink.lock().push((owner.clone(), data.clone()));
                })
                .unwrap();
        }
        processor.client("c").unwrap().leave_realtime().unwrap();

        processor
            .client("a")
            .unwrap()
            .send_realtime_data(&b"hi"[..])
            .unwrap();

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "b");
        assert_eq!(received[0].1, Bytes::from_static(b"hi"));
        assert_eq!(kinds(&recorder), vec![("a".to_string(), "realtime-sent")]);
    }

    #[test]
    fn test_realtime_send_after_leave_fails() {
        let (mut processor, recorder) = processor_with_recorder();
        let mut client = processor.create_client("a").unwrap();
        client.join_realtime(|_: &Bytes| {}).unwrap();
        client.leave_realtime().unwrap();

        assert!(matches!(
            client.send_realtime_data(vec![1u8, 2, 3]),
            Err(MeshError::RealtimeChannelLeft { .. })
        ));
        assert!(recorder.is_empty());

        // Joining again installs a fresh handle
        client.join_realtime(|_: &Bytes| {}).unwrap();
        client.send_realtime_data(vec![4u8]).unwrap();
    }
}

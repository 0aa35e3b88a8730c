//! Shared fixtures: a mailbox standing in for an instance and a processor
//! wired to an in-memory recorder.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use xdcmesh_core::{
    EventKind, EventRecorder, MeshConfig, MeshEvent, Processor, Serial, Subscription, UpdateEntry,
};

#[derive(Debug, Default)]
struct MailboxState {
    batches: Vec<Vec<UpdateEntry>>,
    clears: usize,
    deletes: usize,
    accept_updates: bool,
    accept_clears: bool,
}

/// Collects whatever the processor hands an instance.
#[derive(Debug, Clone)]
pub struct Mailbox {
    state: Arc<Mutex<MailboxState>>,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MailboxState {
                accept_updates: true,
                accept_clears: true,
                ..MailboxState::default()
            })),
        }
    }

    pub fn subscription(&self, from_serial: Serial) -> Subscription {
        let updates = Arc::clone(&self.state);
        let clears = Arc::clone(&self.state);
        let deletes = Arc::clone(&self.state);

        Subscription::new(
            move |batch: &[UpdateEntry]| {
                let mut state = updates.lock();
                if state.accept_updates {
                    state.batches.push(batch.to_vec());
                }
                state.accept_updates
            },
            from_serial,
        )
        .on_clear(move || {
            let mut state = clears.lock();
            if state.accept_clears {
                state.clears += 1;
            }
            state.accept_clears
        })
        .on_delete(move || deletes.lock().deletes += 1)
    }

    pub fn set_accept_updates(&self, accept: bool) {
        self.state.lock().accept_updates = accept;
    }

    pub fn set_accept_clears(&self, accept: bool) {
        self.state.lock().accept_clears = accept;
    }

    pub fn batches(&self) -> Vec<Vec<UpdateEntry>> {
        self.state.lock().batches.clone()
    }

    /// `(serial, max_serial)` of every accepted update, in delivery order.
    pub fn stamps(&self) -> Vec<(Serial, Serial)> {
        self.state
            .lock()
            .batches
            .iter()
            .flatten()
            .map(|entry| (entry.update.serial, entry.update.max_serial))
            .collect()
    }

    pub fn serials(&self) -> Vec<Serial> {
        self.stamps().into_iter().map(|(serial, _)| serial).collect()
    }

    pub fn clears(&self) -> usize {
        self.state.lock().clears
    }

    pub fn deletes(&self) -> usize {
        self.state.lock().deletes
    }

    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.batches.clear();
    }
}

/// Processor whose event feed lands in the returned recorder.
pub fn recorded_processor() -> (Processor, EventRecorder) {
    let recorder = EventRecorder::new();
    let processor = Processor::new(&MeshConfig::for_testing()).with_observer(recorder.clone());
    (processor, recorder)
}

/// Registers `id` if needed and connects a fresh mailbox from `from_serial`.
pub fn connect(processor: &mut Processor, id: &str, from_serial: Serial) -> Mailbox {
    let mailbox = Mailbox::new();
    reconnect(processor, id, &mailbox, from_serial);
    mailbox
}

/// Connects an existing mailbox again, registering `id` if needed.
pub fn reconnect(processor: &mut Processor, id: &str, mailbox: &Mailbox, from_serial: Serial) {
    if !processor.contains_client(id) {
        processor.create_client(id).unwrap();
    }
    processor
        .client(id)
        .unwrap()
        .connect(mailbox.subscription(from_serial))
        .unwrap();
}

/// Events of one kind for one instance.
pub fn events_for<'a>(
    events: &'a [MeshEvent],
    id: &'a str,
    kind: &'static str,
) -> impl Iterator<Item = &'a MeshEvent> + 'a {
    events
        .iter()
        .filter(move |event| event.instance_id == id && event.kind.as_str() == kind)
}

pub fn kinds(events: &[MeshEvent]) -> Vec<(&str, &'static str)> {
    events
        .iter()
        .map(|event| (event.instance_id.as_str(), event.kind.as_str()))
        .collect()
}

pub fn is_clear(event: &MeshEvent) -> bool {
    event.kind == EventKind::Clear
}

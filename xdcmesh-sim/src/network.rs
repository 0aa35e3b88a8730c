//! In-process stand-in for the transport layer.
//!
//! [`SimulatedNetwork`] binds instance ids to [`SimulatedInstance`]s, parses
//! their inbound messages and routes them to the matching processor client.
//! It also plays the host's part after a clear: every instance that was told
//! to wipe its state resubscribes from serial 0 once the clear completes.

use bytes::Bytes;
use xdcmesh_core::{
    EventRecorder, InboundMessage, MeshConfig, MeshError, MeshEvent, Observer, OutboundMessage,
    Processor, Serial, SubmittedUpdate, Update,
};

use crate::clock::DeterministicClock;
use crate::instance::SimulatedInstance;
use crate::{Result, SimulationError};

/// A simulated network session: one processor plus its instances.
#[derive(Debug)]
pub struct SimulatedNetwork {
    processor: Processor,
    instances: Vec<SimulatedInstance>,
    recorder: EventRecorder,
    config: MeshConfig,
    next_port: u32,
}

impl SimulatedNetwork {
    /// Creates a network with a deterministic clock and an event recorder.
    ///
    /// The recorder keeps at most `event_history_limit` events.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Mesh` - If the configuration is invalid
    pub fn new(config: MeshConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Like [`SimulatedNetwork::new`], but also copies every event into
    /// `audit`, which has no history limit of its own.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Mesh` - If the configuration is invalid
    pub fn with_audit(config: MeshConfig, audit: EventRecorder) -> Result<Self> {
        Self::build(config, Some(audit))
    }

    fn build(config: MeshConfig, audit: Option<EventRecorder>) -> Result<Self> {
        config.validate()?;

        let recorder = EventRecorder::with_limit(config.simulation.event_history_limit);
        let mut history = recorder.clone();
        let mut audit = audit;
        let processor = Processor::new(&config)
            .with_observer(move |event: &MeshEvent| {
                history.observe(event);
                if let Some(audit) = audit.as_mut() {
                    audit.observe(event);
                }
            })
            .with_clock(DeterministicClock::with_step_ms(
                config.simulation.step_interval_ms,
            ));

        Ok(Self {
            processor,
            instances: Vec::new(),
            recorder,
            next_port: u32::from(config.instances.base_port),
            config,
        })
    }

    /// Registers an instance under the next free port-like id.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InstanceLimitReached` - If `max_instances` are registered
    pub fn add_instance(&mut self) -> Result<String> {
        let mut id = self.next_port.to_string();
        while self.has_instance(&id) {
            self.next_port += 1;
            id = self.next_port.to_string();
        }
        self.add_instance_with_id(id.clone())?;
        self.next_port += 1;
        Ok(id)
    }

    /// Registers an instance under a caller-chosen id.
    ///
    /// # Errors
    ///
    /// - `SimulationError::DuplicateInstance` - If `id` is already bound
    /// - `SimulationError::InstanceLimitReached` - If `max_instances` are registered
    pub fn add_instance_with_id(&mut self, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        if self.has_instance(&id) {
            return Err(SimulationError::DuplicateInstance { id });
        }

        let limit = self.config.instances.max_instances;
        if self.instances.len() >= limit {
            return Err(SimulationError::InstanceLimitReached { limit });
        }

        self.processor.create_client(id.clone())?;
        self.instances.push(SimulatedInstance::new(id));
        Ok(())
    }

    /// Tears an instance down and returns its final handle.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownInstance` - If `id` is not bound
    pub fn remove_instance(&mut self, id: &str) -> Result<SimulatedInstance> {
        let index = self.index_of(id)?;
        self.processor.remove_client(id)?;
        Ok(self.instances.remove(index))
    }

    /// Parses one inbound message from `id` and routes it.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownInstance` - If `id` is not bound
    /// - `SimulationError::Mesh` - If the message is rejected or misuses the channel
    pub fn handle_message(&mut self, id: &str, text: &str) -> Result<()> {
        self.index_of(id)?;

        let message = InboundMessage::parse(text).map_err(|e| {
            tracing::warn!(instance = %id, error = %e, "Rejected inbound message");
            SimulationError::from(MeshError::from(e))
        })?;

        self.dispatch(id, message)
    }

    /// Routes an already-parsed message.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownInstance` - If `id` is not bound
    /// - `SimulationError::Mesh` - If the processor rejects the call
    pub fn dispatch(&mut self, id: &str, message: InboundMessage) -> Result<()> {
        tracing::trace!(instance = %id, kind = message.kind(), "Routing inbound message");
        match message {
            InboundMessage::SendUpdate { update, descr } => {
                self.send_update(id, update, descr).map(|_| ())
            }
            InboundMessage::SetUpdateListener { serial } => self.connect(id, serial),
            InboundMessage::SendRealtime { data } => self.send_realtime(id, data),
            InboundMessage::JoinRealtime => self.join_realtime(id),
            InboundMessage::LeaveRealtime => self.leave_realtime(id),
        }
    }

    /// Subscribes an instance from `serial`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownInstance` - If `id` is not bound
    pub fn connect(&mut self, id: &str, serial: Serial) -> Result<()> {
        let instance = self.instance(id)?.clone();
        self.processor
            .client(id)?
            .connect(instance.subscription(serial))?;
        // The connect itself resubscribed, so a clear seen during it needs no
        // second round trip.
        instance.take_resync();
        Ok(())
    }

    /// Resubscribes an instance from its own cursor, as a reloaded host does.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownInstance` - If `id` is not bound
    pub fn reconnect(&mut self, id: &str) -> Result<()> {
        let serial = self.instance(id)?.last_serial();
        self.connect(id, serial)
    }

    /// Submits an update on behalf of an instance.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownInstance` - If `id` is not bound
    pub fn send_update(
        &mut self,
        id: &str,
        update: SubmittedUpdate,
        descr: impl Into<String>,
    ) -> Result<Update> {
        self.index_of(id)?;
        Ok(self.processor.client(id)?.send_update(update, descr)?)
    }

    /// Relays realtime bytes on behalf of an instance.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownInstance` - If `id` is not bound
    /// - `SimulationError::Mesh` - If the instance left its realtime channel
    pub fn send_realtime(&mut self, id: &str, data: impl Into<Bytes>) -> Result<()> {
        self.index_of(id)?;
        Ok(self.processor.client(id)?.send_realtime_data(data)?)
    }

    /// Joins the realtime channel for an instance.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownInstance` - If `id` is not bound
    pub fn join_realtime(&mut self, id: &str) -> Result<()> {
        let listener = self.instance(id)?.realtime_listener();
        Ok(self.processor.client(id)?.join_realtime(listener)?)
    }

    /// Leaves the realtime channel for an instance.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownInstance` - If `id` is not bound
    pub fn leave_realtime(&mut self, id: &str) -> Result<()> {
        self.index_of(id)?;
        Ok(self.processor.client(id)?.leave_realtime()?)
    }

    /// Clears the network, then resubscribes every wiped instance from 0.
    pub fn clear(&mut self) {
        self.processor.clear();

        let resync: Vec<String> = self
            .instances
            .iter()
            .filter(|instance| instance.take_resync())
            .map(|instance| instance.id().to_string())
            .collect();

        for id in resync {
            if let Err(e) = self.connect(&id, 0) {
                tracing::warn!(instance = %id, error = %e, "Resubscribe after clear failed");
            }
        }
    }

    /// Returns the instance bound to `id`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownInstance` - If `id` is not bound
    pub fn instance(&self, id: &str) -> Result<&SimulatedInstance> {
        let index = self.index_of(id)?;
        Ok(&self.instances[index])
    }

    /// Removes and returns the messages waiting for `id`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownInstance` - If `id` is not bound
    pub fn drain_outbox(&self, id: &str) -> Result<Vec<OutboundMessage>> {
        Ok(self.instance(id)?.drain_outbox())
    }

    /// Registered instances in registration order.
    pub fn instances(&self) -> &[SimulatedInstance] {
        &self.instances
    }

    /// Whether `id` is bound to an instance.
    pub fn has_instance(&self, id: &str) -> bool {
        self.instances.iter().any(|instance| instance.id() == id)
    }

    /// Copy of the recorded event feed, oldest events first.
    ///
    /// Only the last `event_history_limit` events are kept.
    pub fn events(&self) -> Vec<MeshEvent> {
        self.recorder.events()
    }

    /// The bounded recorder behind [`SimulatedNetwork::events`].
    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    /// The processor every instance is a client of.
    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    /// Configuration the network was built with.
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.instances
            .iter()
            .position(|instance| instance.id() == id)
            .ok_or_else(|| SimulationError::UnknownInstance { id: id.to_string() })
    }
}

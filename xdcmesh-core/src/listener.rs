//! Listener contracts through which instances receive data.
//!
//! Listeners are owned by the [`Processor`](crate::Processor) and called
//! synchronously while an operation runs, so they must not block. A listener
//! cannot call back into the processor; implementations typically push onto a
//! queue or channel that the instance drains later.
//!
//! Every trait is implemented for matching closures.

use bytes::Bytes;

use crate::update::UpdateEntry;

/// Receives ordered updates, either live or as a catch-up batch.
pub trait UpdateListener: Send {
    /// Delivers a batch in serial order.
    ///
    /// Returns `true` when the instance accepted the batch. Only accepted
    /// batches advance the client's cursor and produce `received` events.
    fn on_updates(&mut self, batch: &[UpdateEntry]) -> bool;
}

/// Told to wipe local state because the network was cleared.
pub trait ClearListener: Send {
    /// Returns `true` when the instance acknowledged the clear.
    fn on_clear(&mut self) -> bool;
}

/// Told that the instance is being torn down.
pub trait DeleteListener: Send {
    fn on_delete(&mut self);
}

/// Receives raw realtime payloads from other instances.
pub trait RealtimeListener: Send {
    fn on_realtime(&mut self, data: &Bytes);
}

impl<F> UpdateListener for F
where
    F: FnMut(&[UpdateEntry]) -> bool + Send,
{
    fn on_updates(&mut self, batch: &[UpdateEntry]) -> bool {
        self(batch)
    }
}

impl<F> ClearListener for F
where
    F: FnMut() -> bool + Send,
{
    fn on_clear(&mut self) -> bool {
        self()
    }
}

impl<F> DeleteListener for F
where
    F: FnMut() + Send,
{
    fn on_delete(&mut self) {
        self()
    }
}

impl<F> RealtimeListener for F
where
    F: FnMut(&Bytes) + Send,
{
    fn on_realtime(&mut self, data: &Bytes) {
        self(data)
    }
}

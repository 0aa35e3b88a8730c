//! Realtime side-channel handle.
//!
//! The realtime channel is independent of the update log: payloads are
//! relayed immediately to whoever is listening, never ordered, buffered or
//! retried. A handle that has been left stays around as an inert marker so
//! that late use is caught instead of silently ignored.

use std::fmt;

use bytes::Bytes;

use crate::listener::RealtimeListener;
use crate::{MeshError, Result};

/// Per-client realtime handle.
pub struct RealtimeHandle {
    owner: String,
    state: ChannelState,
}

enum ChannelState {
    Active(Box<dyn RealtimeListener>),
    Left,
}

impl RealtimeHandle {
    /// Creates an active handle for `owner`.
    pub fn join(owner: impl Into<String>, listener: impl RealtimeListener + 'static) -> Self {
        Self {
            owner: owner.into(),
            state: ChannelState::Active(Box::new(listener)),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ChannelState::Active(_))
    }

    /// Marks the handle inert. Leaving twice is harmless.
    pub fn leave(&mut self) {
        self.state = ChannelState::Left;
    }

    /// Checks that the owner may still send through this handle.
    ///
    /// # Errors
    ///
    /// - `MeshError::RealtimeChannelLeft` - If the handle was left
    pub fn ensure_can_send(&self) -> Result<()> {
        match self.state {
            ChannelState::Active(_) => Ok(()),
            ChannelState::Left => Err(self.left_error()),
        }
    }

    /// Hands `data` to the listener.
    ///
    /// # Errors
    ///
    /// - `MeshError::RealtimeChannelLeft` - If the handle was left
    pub fn receive(&mut self, data: &Bytes) -> Result<()> {
        match &mut self.state {
            ChannelState::Active(listener) => {
                listener.on_realtime(data);
                Ok(())
            }
            ChannelState::Left => Err(self.left_error()),
        }
    }

    fn left_error(&self) -> MeshError {
        MeshError::RealtimeChannelLeft {
            id: self.owner.clone(),
        }
    }
}

impl fmt::Debug for RealtimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeHandle")
            .field("owner", &self.owner)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn test_active_handle_forwards_payloads() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let mut handle = RealtimeHandle::join("3001", move |data: &Bytes| {
            sink.lock().push(data.clone());
        });

        assert!(handle.is_active());
        handle.receive(&Bytes::from_static(b"ping")).unwrap();
        handle.ensure_can_send().unwrap();

        assert_eq!(received.lock().as_slice(), &[Bytes::from_static(b"ping")]);
    }

    #[test]
    fn test_left_handle_rejects_use() {
        let mut handle = RealtimeHandle::join("3002", |_: &Bytes| {});
        handle.leave();

        assert!(!handle.is_active());
        assert!(matches!(
            handle.receive(&Bytes::from_static(b"late")),
            Err(MeshError::RealtimeChannelLeft { ref id }) if id == "3002"
        ));
        assert!(matches!(
            handle.ensure_can_send(),
            Err(MeshError::RealtimeChannelLeft { .. })
        ));

        // Leaving again keeps the handle inert
        handle.leave();
        assert!(!handle.is_active());
    }
}

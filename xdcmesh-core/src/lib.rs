//! xdcmesh Core - Ordered update distribution for simulated app instances
//!
//! This crate provides the engine that lets several independent instances of
//! the same mini-application share state by exchanging status updates: a
//! global total order over accepted updates, catch-up for late joiners,
//! epoch-scoped clear notifications, and a best-effort realtime side-channel.
//!
//! Everything runs in-process and synchronously. Instances talk to the engine
//! through a [`Client`] view obtained from the [`Processor`], and receive data
//! through the listener traits in [`listener`]. Every state transition is
//! reported to an injected [`Observer`].

pub mod clock;
pub mod color;
pub mod config;
pub mod listener;
pub mod observer;
pub mod processor;
pub mod protocol;
pub mod realtime;
pub mod tracing_setup;
pub mod update;
pub mod update_log;

mod client;

pub use client::{Client, Subscription};
pub use clock::{Clock, SystemClock};
pub use color::{ColorAllocator, PaletteColors};
pub use config::MeshConfig;
pub use listener::{ClearListener, DeleteListener, RealtimeListener, UpdateListener};
pub use observer::{EventKind, EventRecorder, MeshEvent, Observer, TracingObserver};
pub use processor::Processor;
pub use protocol::{InboundMessage, OutboundMessage, ProtocolError};
pub use realtime::RealtimeHandle;
pub use update::{Serial, SubmittedUpdate, Update, UpdateEntry};
pub use update_log::UpdateLog;

/// Errors surfaced by the update engine.
///
/// All of them are caller mistakes detected by local validation. The engine
/// performs no I/O, so nothing here is transient or worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("Client {id} not found")]
    UnknownClient { id: String },

    #[error("Client {id} is already registered")]
    DuplicateClient { id: String },

    #[error("Realtime channel of client {id} was used after leaving")]
    RealtimeChannelLeft { id: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl MeshError {
    /// Checks if this error is a contract violation by the calling layer.
    ///
    /// Configuration problems are reported before any client exists and are
    /// not counted as caller errors.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            MeshError::UnknownClient { .. }
                | MeshError::DuplicateClient { .. }
                | MeshError::RealtimeChannelLeft { .. }
                | MeshError::Protocol(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_error_classification() {
        let unknown = MeshError::UnknownClient {
            id: "3001".to_string(),
        };
        let config = MeshError::Configuration {
            reason: "empty palette".to_string(),
        };

        assert!(unknown.is_caller_error());
        assert!(!config.is_caller_error());
        assert_eq!(unknown.to_string(), "Client 3001 not found");
    }
}

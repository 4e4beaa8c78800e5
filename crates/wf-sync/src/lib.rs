//! Task-progress synchronization engine.
//!
//! Keeps a [`ViewStore`](wf_core::view_state::ViewStore) consistent with a
//! remote roadmap-generation task. Events arrive over a per-task WebSocket
//! ([`transport`]); a status poller ([`poller`]) covers for a silent or
//! dropped channel; the [`reconciler`] owns both and applies every update.

pub mod api_client;
pub mod error;
pub mod poller;
pub mod reconciler;
pub mod transport;

pub use api_client::{HttpTaskApi, TaskApi};
pub use error::SyncError;
pub use reconciler::{Command, Reconciler, SyncHandle};
pub use transport::{EventTransport, TransportFactory, TransportSignal, WsTransportFactory};

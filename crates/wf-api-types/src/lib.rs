//! Wire types shared between the wayfinder sync engine and its front ends.
//!
//! Everything here mirrors the JSON the roadmap backend speaks over HTTP and
//! over the per-task WebSocket channel. The types carry no behaviour beyond
//! small classification helpers; reconciliation lives in `wf-sync`.

pub mod event;
pub mod log;
pub mod roadmap;
pub mod task;

pub use event::*;
pub use log::*;
pub use roadmap::*;
pub use task::*;

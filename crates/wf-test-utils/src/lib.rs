//! Test doubles for the wayfinder sync engine.
//!
//! [`ScriptedApi`] stands in for the HTTP backend and records every call;
//! [`ScriptedTransportFactory`] hands out transports whose signals the test
//! drives by hand.

pub mod api;
pub mod fixtures;
pub mod transport;

pub use api::{ApiCall, ApiMethod, ScriptedApi};
pub use transport::{ScriptedTransportFactory, TransportProbe};

//! The keepr caching controller.
//!
//! This crate provides the controller (fetch-and-persist, freshness checks,
//! batch orchestration, passive interception, dispatch and lifecycle), the
//! registry of connected clients, and the stdio transport the `keepr`
//! binary serves it over.
//!
//! Interception ([`Controller::intercept`]) is library API for hosts that
//! embed the controller and route page requests through it. The stdio
//! protocol only carries commands, so the `keepr` binary never intercepts.

pub mod clients;
pub mod controller;
pub mod error;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use clients::{ClientHub, ReplyTo};
pub use controller::{Controller, ControllerSettings, Intercepted, Lifecycle, Route};
pub use error::TransportError;

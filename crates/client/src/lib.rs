//! Client code for keepr.
//!
//! This crate provides the network side of the controller (the `Network`
//! abstraction and its reqwest-backed implementation) and the page-side
//! wrapper that talks to a controller over the message protocol.

pub mod fetch;
pub mod page;

pub use fetch::{CacheMode, Credentials, HttpNetwork, Method, NetRequest, NetResponse, Network, NetworkConfig};
pub use page::PageClient;

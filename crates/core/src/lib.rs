//! Core types and shared functionality for keepr.
//!
//! This crate provides:
//! - Dual response stores (asset bodies and freshness metadata) with a SQLite backend
//! - Asset URL normalization and the cacheability filter
//! - Control-plane message protocol types
//! - Unified error types
//! - Configuration structures

pub mod assets;
pub mod config;
pub mod error;
pub mod protocol;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use protocol::{BatchResult, Command, ControllerPort, FailedAsset, Inbound, MissingReport, Outbound, Reply};
pub use store::{
    AssetMetadata, NamedStore, ResponseStore, StoreDb, StoreNames, StoreSource, StoredResponse, Stores, VersionedStores,
};

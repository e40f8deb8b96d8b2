//! SQLite-backed dual store for asset bodies and freshness metadata.
//!
//! This module provides persistent named response stores using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Idempotent open of named stores, versioned by name
//! - Atomic per-key UPSERT of stored responses
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Whole-store deletion for version invalidation

pub mod connection;
pub mod hash;
pub mod metadata;
pub mod migrations;
pub mod named;
pub mod response;

use std::sync::Arc;

use async_trait::async_trait;

pub use connection::StoreDb;
pub use metadata::{AssetMetadata, METADATA_PREFIX, metadata_key, read_metadata, write_metadata};
pub use named::{NamedStore, ResponseStore};
pub use response::StoredResponse;

use crate::Error;

/// Names of the body and metadata stores for one cache version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreNames {
    pub body: String,
    pub meta: String,
}

impl StoreNames {
    /// `{prefix}-{version}` for bodies, `{prefix}-meta-{version}` for metadata.
    pub fn versioned(prefix: &str, version: &str) -> Self {
        Self { body: format!("{prefix}-{version}"), meta: format!("{prefix}-meta-{version}") }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.body == name || self.meta == name
    }
}

/// The pair of stores the controller works with.
#[derive(Debug, Clone)]
pub struct Stores {
    pub body: Arc<dyn ResponseStore>,
    pub meta: Arc<dyn ResponseStore>,
}

impl Stores {
    /// Open (creating if absent) both stores named by `names`.
    pub async fn open(db: &StoreDb, names: &StoreNames) -> Result<Self, Error> {
        let body = db.open_store(&names.body).await?;
        let meta = db.open_store(&names.meta).await?;
        Ok(Self { body: Arc::new(body), meta: Arc::new(meta) })
    }
}

/// Where the controller gets its stores from.
///
/// Opening must be idempotent: every call returns handles onto the same data.
#[async_trait]
pub trait StoreSource: Send + Sync {
    /// Open the current body and metadata stores.
    async fn open_stores(&self) -> Result<Stores, Error>;

    /// Delete stores that belong to other cache versions, returning their names.
    async fn retire_stale(&self) -> Result<Vec<String>, Error> {
        Ok(Vec::new())
    }
}

/// A fixed pair of stores is its own source.
#[async_trait]
impl StoreSource for Stores {
    async fn open_stores(&self) -> Result<Stores, Error> {
        Ok(self.clone())
    }
}

/// The stores of one cache version inside a [`StoreDb`].
#[derive(Debug, Clone)]
pub struct VersionedStores {
    db: StoreDb,
    names: StoreNames,
}

impl VersionedStores {
    pub fn new(db: StoreDb, names: StoreNames) -> Self {
        Self { db, names }
    }
}

#[async_trait]
impl StoreSource for VersionedStores {
    async fn open_stores(&self) -> Result<Stores, Error> {
        Stores::open(&self.db, &self.names).await
    }

    async fn retire_stale(&self) -> Result<Vec<String>, Error> {
        let mut retired = Vec::new();
        for name in self.db.store_names().await? {
            if self.names.contains(&name) {
                continue;
            }
            if self.db.delete_store(&name).await? {
                tracing::info!(store = %name, "deleted store from a previous cache version");
                retired.push(name);
            }
        }
        Ok(retired)
    }
}

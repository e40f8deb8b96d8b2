//! The caching controller.
//!
//! A [`Controller`] owns the store source, the network and the client hub.
//! It goes through `Installing -> Installed -> Active`; activation claims the
//! connected clients and deletes stores left behind by other cache versions.
//!
//! Inbound messages are dispatched on their own task. Every command ends in
//! exactly one reply to the caller that sent it: the command's result, or
//! `CACHE_ERROR` when handling failed.

pub mod batch;
pub mod freshness;
pub mod intercept;
pub mod persist;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;
use url::Url;

use keepr_client::{NetRequest, Network};
use keepr_core::assets::prepare;
use keepr_core::{
    AppConfig, BatchResult, Command, ControllerPort, Error, Inbound, MissingReport, Outbound, Reply, StoreSource,
};

use crate::clients::{ClientHub, ReplyTo};

pub use freshness::Freshness;
pub use intercept::{Intercepted, Route};

/// Activation state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    Installing = 0,
    Installed = 1,
    Active = 2,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Lifecycle::Installing,
            1 => Lifecycle::Installed,
            _ => Lifecycle::Active,
        }
    }
}

/// Settings the controller needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Origin that relative asset references resolve against.
    pub origin: Url,
    /// Assets processed at once per batch (default: 4)
    pub max_concurrency: usize,
}

impl ControllerSettings {
    pub fn new(origin: Url) -> Self {
        Self { origin, max_concurrency: 4 }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = config
            .origin_url()
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self::new(origin).with_max_concurrency(config.max_concurrency))
    }
}

struct Inner {
    source: Arc<dyn StoreSource>,
    network: Arc<dyn Network>,
    settings: ControllerSettings,
    state: AtomicU8,
    clients: ClientHub,
}

/// Handle to a caching controller. Clones share the same controller.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    /// A controller in the `Installing` state.
    pub fn new(source: Arc<dyn StoreSource>, network: Arc<dyn Network>, settings: ControllerSettings) -> Self {
        let inner = Inner {
            source,
            network,
            settings,
            state: AtomicU8::new(Lifecycle::Installing as u8),
            clients: ClientHub::new(),
        };
        Self { inner: Arc::new(inner) }
    }

    /// Create, install and activate a controller.
    pub async fn start(
        source: Arc<dyn StoreSource>, network: Arc<dyn Network>, settings: ControllerSettings,
    ) -> Result<Self, Error> {
        let controller = Self::new(source, network, settings);
        controller.install();
        controller.activate().await?;
        Ok(controller)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn clients(&self) -> &ClientHub {
        &self.inner.clients
    }

    /// Finish installing without waiting for older controllers to retire.
    pub fn install(&self) {
        let _ = self.inner.state.compare_exchange(
            Lifecycle::Installing as u8,
            Lifecycle::Installed as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        tracing::info!("controller installed");
    }

    /// Retire stale stores, then take control of every connected client.
    ///
    /// Returns the names of the deleted stores. On failure the controller
    /// stays in its current state.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        let retired = self.inner.source.retire_stale().await?;
        self.inner.state.store(Lifecycle::Active as u8, Ordering::Release);
        tracing::info!(claimed = self.inner.clients.len(), retired = retired.len(), "controller active");
        Ok(retired)
    }

    /// Handle `CACHE_ASSETS`: re-fetch every cacheable asset and reply with the result.
    pub async fn cache_assets<S: AsRef<str>>(&self, assets: &[S], reply_to: &ReplyTo) -> Result<BatchResult, Error> {
        let urls = prepare(&self.inner.settings.origin, assets);
        let stores = self.inner.source.open_stores().await?;
        let result = batch::cache_assets(&stores, &self.inner.network, urls, self.inner.settings.max_concurrency).await?;
        self.inner.clients.post(reply_to, Reply::CacheDone(result.clone()));
        Ok(result)
    }

    /// Handle `CHECK_MISSING`: report missing and, with `check_fresh`, outdated assets.
    pub async fn check_missing<S: AsRef<str>>(
        &self, assets: &[S], check_fresh: bool, reply_to: &ReplyTo,
    ) -> Result<MissingReport, Error> {
        let urls = prepare(&self.inner.settings.origin, assets);
        let stores = self.inner.source.open_stores().await?;
        let report =
            batch::check_missing(&stores, &self.inner.network, urls, check_fresh, self.inner.settings.max_concurrency)
                .await?;
        self.inner.clients.post(reply_to, Reply::MissingAssets(report.clone()));
        Ok(report)
    }

    /// Answer a page request from the body store when it is a cacheable asset.
    ///
    /// Only embedding hosts call this; no stdio message reaches it.
    pub async fn intercept(&self, request: &NetRequest) -> Result<Intercepted, Error> {
        if intercept::route(&request.url, request.method) == Route::Bypass {
            return Ok(Intercepted::Bypass);
        }
        let stores = self.inner.source.open_stores().await?;
        intercept::intercept(&stores, self.inner.network.as_ref(), request).await
    }

    /// Handle one inbound message and return the reply that was posted for it.
    pub async fn dispatch(&self, inbound: Inbound) -> Reply {
        let reply_to = ReplyTo { client: inbound.client, correlation: inbound.correlation };

        let Some(command) = Command::from_message(&inbound.message) else {
            tracing::debug!(client = reply_to.client.as_deref(), "unknown command");
            let reply = Reply::UnknownCommand { original: inbound.message };
            self.inner.clients.post(&reply_to, reply.clone());
            return reply;
        };

        let name = command.name();
        tracing::debug!(command = name, client = reply_to.client.as_deref(), "dispatching");

        let outcome = match command {
            Command::CacheAssets { assets } => self.cache_assets(&assets, &reply_to).await.map(Reply::CacheDone),
            Command::CheckMissing { assets, check_fresh } => self
                .check_missing(&assets, check_fresh, &reply_to)
                .await
                .map(Reply::MissingAssets),
        };

        match outcome {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(command = name, error = %e, "command failed");
                let reply = Reply::CacheError { error: e.to_string() };
                self.inner.clients.post(&reply_to, reply.clone());
                reply
            }
        }
    }
}

impl ControllerPort for Controller {
    fn is_active(&self) -> bool {
        self.lifecycle() == Lifecycle::Active
    }

    fn connect(&self) -> (String, mpsc::UnboundedReceiver<Outbound>) {
        self.inner.clients.register()
    }

    fn disconnect(&self, client: &str) {
        self.inner.clients.remove(client);
    }

    /// Must be called inside a Tokio runtime.
    fn post_message(&self, inbound: Inbound) {
        let controller = self.clone();
        tokio::spawn(async move {
            controller.dispatch(inbound).await;
        });
    }
}

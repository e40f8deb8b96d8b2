//! Page-side wrapper around the controller protocol.
//!
//! A [`PageClient`] registers itself with a controller, sends commands with a
//! fresh correlation token each, and resolves when the reply carrying that
//! token arrives. Calls fail fast when the controller is gone or not yet
//! active, and fail with `PROTOCOL_TIMEOUT` when no reply arrives in time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use keepr_core::{BatchResult, Command, ControllerPort, Error, Inbound, MissingReport, Outbound, Reply};

/// Default wait for a controller reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Reply>>>>;

/// A page's connection to a controller.
///
/// Must be created inside a Tokio runtime: it spawns the task that routes
/// replies to waiting calls.
pub struct PageClient {
    port: Weak<dyn ControllerPort>,
    client_id: String,
    pending: Pending,
    next_correlation: AtomicU64,
    timeout: Duration,
    pump: JoinHandle<()>,
}

impl PageClient {
    /// Connect to `port` with the default 30s reply timeout.
    pub fn connect(port: &Arc<dyn ControllerPort>) -> Self {
        Self::with_timeout(port, DEFAULT_REPLY_TIMEOUT)
    }

    /// Connect to `port`, waiting at most `timeout` for each reply.
    pub fn with_timeout(port: &Arc<dyn ControllerPort>, timeout: Duration) -> Self {
        let (client_id, replies) = port.connect();
        let pending: Pending = Arc::default();
        let pump = tokio::spawn(route_replies(replies, pending.clone()));

        tracing::debug!(client = %client_id, "page connected to controller");

        Self { port: Arc::downgrade(port), client_id, pending, next_correlation: AtomicU64::new(1), timeout, pump }
    }

    /// Ask which assets are missing, and with `check_fresh` which are outdated.
    pub async fn check_assets<S: AsRef<str>>(&self, assets: &[S], check_fresh: bool) -> Result<MissingReport, Error> {
        let command = Command::CheckMissing { assets: owned(assets), check_fresh };
        match self.request(&command).await? {
            Reply::MissingAssets(report) => Ok(report),
            other => Err(unexpected(&command, other)),
        }
    }

    /// Ask the controller to (re)fetch and store every listed asset.
    pub async fn repair_assets<S: AsRef<str>>(&self, assets: &[S]) -> Result<BatchResult, Error> {
        let command = Command::CacheAssets { assets: owned(assets) };
        match self.request(&command).await? {
            Reply::CacheDone(result) => Ok(result),
            other => Err(unexpected(&command, other)),
        }
    }

    async fn request(&self, command: &Command) -> Result<Reply, Error> {
        let port = self
            .port
            .upgrade()
            .filter(|port| port.is_active())
            .ok_or(Error::NoActiveController)?;

        let correlation = format!("{}-{}", self.client_id, self.next_correlation.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(correlation.clone(), tx);

        port.post_message(Inbound::new(Some(self.client_id.clone()), Some(correlation.clone()), command.to_message()));
        drop(port);

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(Error::NoActiveController),
            Err(_) => {
                self.pending.lock().await.remove(&correlation);
                Err(Error::ProtocolTimeout {
                    command: command.name().to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl Drop for PageClient {
    fn drop(&mut self) {
        self.pump.abort();
        if let Some(port) = self.port.upgrade() {
            port.disconnect(&self.client_id);
        }
    }
}

async fn route_replies(mut replies: mpsc::UnboundedReceiver<Outbound>, pending: Pending) {
    while let Some(outbound) = replies.recv().await {
        let Some(correlation) = outbound.correlation else {
            tracing::debug!(reply = outbound.message.name(), "dropping uncorrelated reply");
            continue;
        };
        match pending.lock().await.remove(&correlation) {
            Some(waiter) => {
                let _ = waiter.send(outbound.message);
            }
            None => tracing::debug!(%correlation, "no caller waiting for reply"),
        }
    }

    // Controller side hung up: fail every waiting call now rather than at its timeout.
    pending.lock().await.clear();
}

fn owned<S: AsRef<str>>(assets: &[S]) -> Vec<String> {
    assets.iter().map(|a| a.as_ref().to_string()).collect()
}

fn unexpected(command: &Command, reply: Reply) -> Error {
    match reply {
        Reply::CacheError { error } => Error::Dispatch(error),
        Reply::UnknownCommand { original } => Error::UnknownCommand(original.to_string()),
        other => Error::Dispatch(format!("unexpected {} reply to {}", other.name(), command.name())),
    }
}

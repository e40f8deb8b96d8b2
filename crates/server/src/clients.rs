//! Registry of connected pages and their reply channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;

use keepr_core::{Outbound, Reply};

/// Where a reply should go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyTo {
    pub client: Option<String>,
    pub correlation: Option<String>,
}

/// Prefix of ids handed out by [`ClientHub::register`].
///
/// Transport clients pick their own ids; an id with this prefix names an
/// in-process client.
pub const LOCAL_PREFIX: &str = "local:";

/// Connected clients keyed by id.
#[derive(Debug, Default)]
pub struct ClientHub {
    clients: RwLock<HashMap<String, mpsc::UnboundedSender<Outbound>>>,
    next_id: AtomicU64,
}

impl ClientHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new in-process client under a generated `local:N` id.
    pub fn register(&self) -> (String, mpsc::UnboundedReceiver<Outbound>) {
        let id = format!("{LOCAL_PREFIX}{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        self.attach(&id, tx);
        (id, rx)
    }

    /// Route replies for `id` into `sender`, replacing any earlier channel.
    pub fn attach(&self, id: &str, sender: mpsc::UnboundedSender<Outbound>) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), sender);
    }

    /// Route replies for `id` into `sender` unless another channel owns `id`.
    pub fn try_attach(&self, id: &str, sender: mpsc::UnboundedSender<Outbound>) -> bool {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        if clients.contains_key(id) {
            return false;
        }
        clients.insert(id.to_string(), sender);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn remove(&self, id: &str) -> bool {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.clients.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Deliver `reply`. Returns false when it was dropped.
    ///
    /// A reply with no client, or for a client that is gone, is dropped
    /// without error.
    pub fn post(&self, to: &ReplyTo, reply: Reply) -> bool {
        let Some(client) = &to.client else {
            tracing::debug!(reply = reply.name(), "reply has no client; dropped");
            return false;
        };

        let sender = self.clients.read().unwrap_or_else(PoisonError::into_inner).get(client).cloned();
        let Some(sender) = sender else {
            tracing::debug!(%client, reply = reply.name(), "client not connected; reply dropped");
            return false;
        };

        let outbound = Outbound { client: client.clone(), correlation: to.correlation.clone(), message: reply };
        if sender.send(outbound).is_err() {
            tracing::debug!(%client, "client channel closed; forgetting client");
            self.remove(client);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepr_core::MissingReport;

    fn to(client: &str, correlation: &str) -> ReplyTo {
        ReplyTo { client: Some(client.to_string()), correlation: Some(correlation.to_string()) }
    }

    #[test]
    fn test_register_generates_ids() {
        let hub = ClientHub::new();
        let (a, _rx_a) = hub.register();
        let (b, _rx_b) = hub.register();
        assert_eq!(a, "local:1");
        assert_eq!(b, "local:2");
        assert_eq!(hub.len(), 2);
    }

    #[tokio::test]
    async fn test_post_routes_by_client() {
        let hub = ClientHub::new();
        let (a, mut rx_a) = hub.register();
        let (_b, mut rx_b) = hub.register();

        assert!(hub.post(&to(&a, "c-1"), Reply::MissingAssets(MissingReport::default())));

        let outbound = rx_a.recv().await.unwrap();
        assert_eq!(outbound.client, a);
        assert_eq!(outbound.correlation.as_deref(), Some("c-1"));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_unknown_client_dropped_silently() {
        let hub = ClientHub::new();
        assert!(!hub.post(&to("page-9", "c-1"), Reply::CacheError { error: "x".into() }));
        assert!(!hub.post(&ReplyTo::default(), Reply::CacheError { error: "x".into() }));
    }

    #[test]
    fn test_closed_channel_forgets_client() {
        let hub = ClientHub::new();
        let (a, rx) = hub.register();
        drop(rx);

        assert!(!hub.post(&to(&a, "c-1"), Reply::CacheError { error: "x".into() }));
        assert!(!hub.contains(&a));
    }

    #[tokio::test]
    async fn test_attach_replaces_channel() {
        let hub = ClientHub::new();
        let (tx_old, mut rx_old) = mpsc::unbounded_channel();
        let (tx_new, mut rx_new) = mpsc::unbounded_channel();
        hub.attach("tab", tx_old);
        hub.attach("tab", tx_new);

        assert!(hub.post(&to("tab", "c-1"), Reply::CacheError { error: "x".into() }));
        assert!(rx_new.recv().await.is_some());
        assert!(rx_old.try_recv().is_err());
        assert_eq!(hub.len(), 1);
    }

    #[tokio::test]
    async fn test_try_attach_keeps_existing_owner() {
        let hub = ClientHub::new();
        let (local, mut rx_local) = hub.register();
        let (tx_other, mut rx_other) = mpsc::unbounded_channel();

        assert!(!hub.try_attach(&local, tx_other.clone()));
        assert!(hub.try_attach("tab", tx_other));

        assert!(hub.post(&to(&local, "c-1"), Reply::CacheError { error: "x".into() }));
        assert_eq!(rx_local.recv().await.unwrap().client, local);
        assert!(rx_other.try_recv().is_err());
        assert_eq!(hub.len(), 2);
    }
}

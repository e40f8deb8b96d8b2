//! Control-plane message protocol between pages and the controller.
//!
//! Messages are JSON objects discriminated by `type`. Inbound messages are
//! parsed leniently: a missing payload reads as empty, a non-array `assets`
//! as no assets, and `checkFresh` is read with JavaScript truthiness. A
//! message whose `type` is not a known command is echoed back verbatim in
//! an `UNKNOWN_COMMAND` reply.
//!
//! Messages travel inside envelopes carrying the caller id and an optional
//! correlation token, which the controller copies onto the reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// A command sent from a page to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    /// Fetch and store every listed asset.
    #[serde(rename = "CACHE_ASSETS")]
    CacheAssets { assets: Vec<String> },

    /// Report which listed assets are missing, and optionally which are outdated.
    #[serde(rename = "CHECK_MISSING")]
    CheckMissing {
        assets: Vec<String>,
        #[serde(rename = "checkFresh", default)]
        check_fresh: bool,
    },
}

impl Command {
    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::CacheAssets { .. } => "CACHE_ASSETS",
            Command::CheckMissing { .. } => "CHECK_MISSING",
        }
    }

    /// Interpret a raw inbound message.
    ///
    /// Returns `None` when the message does not name a known command.
    pub fn from_message(message: &Value) -> Option<Self> {
        let payload = message.get("payload");
        let assets = || asset_list(payload.and_then(|p| p.get("assets")));

        match message.get("type").and_then(Value::as_str)? {
            "CACHE_ASSETS" => Some(Command::CacheAssets { assets: assets() }),
            "CHECK_MISSING" => {
                let check_fresh = payload.and_then(|p| p.get("checkFresh")).is_some_and(truthy);
                Some(Command::CheckMissing { assets: assets(), check_fresh })
            }
            _ => None,
        }
    }

    /// The command as a wire message.
    pub fn to_message(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// `false`, `null`, zero, NaN and the empty string are falsy.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn asset_list(value: Option<&Value>) -> Vec<String> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item.as_str() {
            Some(s) => Some(s.to_string()),
            None => {
                tracing::debug!(%item, "skipping non-string asset reference");
                None
            }
        })
        .collect()
}

/// One asset that could not be cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAsset {
    pub url: String,
    pub error: String,
}

/// Outcome of a `CACHE_ASSETS` batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub total: usize,
    pub success_count: usize,
    #[serde(default)]
    pub failed: Vec<FailedAsset>,
}

/// Outcome of a `CHECK_MISSING` batch. An asset never appears in both lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingReport {
    #[serde(default)]
    pub missing: Vec<String>,
    #[serde(default)]
    pub outdated: Vec<String>,
}

/// A reply from the controller to a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Reply {
    #[serde(rename = "CACHE_DONE")]
    CacheDone(BatchResult),

    #[serde(rename = "MISSING_ASSETS")]
    MissingAssets(MissingReport),

    #[serde(rename = "CACHE_ERROR")]
    CacheError { error: String },

    #[serde(rename = "UNKNOWN_COMMAND")]
    UnknownCommand { original: Value },
}

impl Reply {
    /// Wire name of the reply.
    pub fn name(&self) -> &'static str {
        match self {
            Reply::CacheDone(_) => "CACHE_DONE",
            Reply::MissingAssets(_) => "MISSING_ASSETS",
            Reply::CacheError { .. } => "CACHE_ERROR",
            Reply::UnknownCommand { .. } => "UNKNOWN_COMMAND",
        }
    }
}

/// An inbound message with its routing information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inbound {
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub correlation: Option<String>,
    pub message: Value,
}

impl Inbound {
    pub fn new(client: Option<String>, correlation: Option<String>, message: Value) -> Self {
        Self { client, correlation, message }
    }
}

/// A reply addressed to one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outbound {
    pub client: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
    pub message: Reply,
}

/// What a page needs from a controller: liveness, a reply channel, and a way to post.
pub trait ControllerPort: Send + Sync {
    /// Whether the controller has finished activating.
    fn is_active(&self) -> bool;

    /// Register a new client and return its id with the channel its replies arrive on.
    fn connect(&self) -> (String, mpsc::UnboundedReceiver<Outbound>);

    /// Forget a client; later replies addressed to it are dropped.
    fn disconnect(&self, client: &str);

    /// Hand a message to the controller. Handling happens asynchronously.
    fn post_message(&self, inbound: Inbound);
}

//! Per-asset freshness metadata.
//!
//! Metadata records live in their own store, keyed by [`METADATA_PREFIX`]
//! followed by the asset URL. The prefix is constant, so distinct URLs always
//! map to distinct keys.

use serde::{Deserialize, Serialize};

use super::named::ResponseStore;
use super::response::StoredResponse;
use crate::Error;

/// Key prefix for metadata records.
pub const METADATA_PREFIX: &str = "/__meta__";

/// Validator tags recorded when an asset body is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
}

impl AssetMetadata {
    /// Capture the validators of a response, stamped with the current time.
    pub fn from_response(response: &StoredResponse) -> Self {
        Self {
            etag: response.header("etag").map(str::to_string),
            last_modified: response.header("last-modified").map(str::to_string),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Validators taken from the headers of a cached body, with no timestamp.
    pub fn from_cached_headers(response: &StoredResponse) -> Self {
        Self { timestamp: 0, ..Self::from_response(response) }
    }
}

/// Metadata store key for an asset URL.
pub fn metadata_key(url: &str) -> String {
    format!("{METADATA_PREFIX}{url}")
}

/// Write the metadata record for `url`.
pub async fn write_metadata(store: &dyn ResponseStore, url: &str, metadata: &AssetMetadata) -> Result<(), Error> {
    let record = StoredResponse::json(metadata)?;
    store.put(&metadata_key(url), &record).await
}

/// Read the metadata record for `url`.
///
/// A record that exists but cannot be parsed reads as an empty record rather
/// than as absent.
pub async fn read_metadata(store: &dyn ResponseStore, url: &str) -> Result<Option<AssetMetadata>, Error> {
    let Some(record) = store.match_key(&metadata_key(url)).await? else {
        return Ok(None);
    };

    match serde_json::from_slice(&record.body) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) => {
            tracing::warn!(url, error = %e, "unreadable metadata record; treating it as empty");
            Ok(Some(AssetMetadata::default()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreDb;
    use bytes::Bytes;

    #[test]
    fn test_metadata_key() {
        assert_eq!(metadata_key("http://localhost:8080/a.png"), "/__meta__http://localhost:8080/a.png");
    }

    #[test]
    fn test_serialized_shape() {
        let metadata = AssetMetadata { etag: Some("\"a\"".into()), last_modified: None, timestamp: 42 };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json, serde_json::json!({"etag": "\"a\"", "timestamp": 42}));

        let parsed: AssetMetadata =
            serde_json::from_str(r#"{"lastModified":"Tue, 01 Jul 2025 10:00:00 GMT","timestamp":1}"#).unwrap();
        assert_eq!(parsed.last_modified.as_deref(), Some("Tue, 01 Jul 2025 10:00:00 GMT"));
        assert!(parsed.etag.is_none());
    }

    #[test]
    fn test_from_response_captures_validators() {
        let response = StoredResponse::new(200, [("ETag", "\"v2\"")], Bytes::new());
        let metadata = AssetMetadata::from_response(&response);
        assert_eq!(metadata.etag.as_deref(), Some("\"v2\""));
        assert!(metadata.last_modified.is_none());
        assert!(metadata.timestamp > 0);
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let meta = db.open_store("pwa-assets-meta-v1").await.unwrap();
        let url = "http://localhost:8080/a.png";
        let metadata = AssetMetadata { etag: Some("\"a\"".into()), last_modified: None, timestamp: 7 };

        write_metadata(&meta, url, &metadata).await.unwrap();

        assert_eq!(read_metadata(&meta, url).await.unwrap(), Some(metadata));
        assert!(meta.has(&metadata_key(url)).await.unwrap());
        assert!(!meta.has(url).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_absent() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let meta = db.open_store("pwa-assets-meta-v1").await.unwrap();
        assert_eq!(read_metadata(&meta, "http://localhost:8080/a.png").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_corrupt_is_empty() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let meta = db.open_store("pwa-assets-meta-v1").await.unwrap();
        let url = "http://localhost:8080/a.png";
        let garbage = StoredResponse::new(200, [("content-type", "application/json")], Bytes::from_static(b"{not json"));
        meta.put(&metadata_key(url), &garbage).await.unwrap();

        assert_eq!(read_metadata(&meta, url).await.unwrap(), Some(AssetMetadata::default()));
    }
}

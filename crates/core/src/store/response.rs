//! Stored response records.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;

use super::hash::content_digest;

/// A response held in a named store: status, headers and an owned copy of the body.
///
/// Header names are kept lower-cased so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    /// Hex SHA-256 of `body`.
    pub digest: String,
    /// RFC 3339 time the entry was written; set by the store on `put`.
    pub stored_at: Option<String>,
}

impl StoredResponse {
    /// Build a record from response parts, normalizing header names.
    pub fn new<K, V>(status: u16, headers: impl IntoIterator<Item = (K, V)>, body: Bytes) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.as_ref().to_ascii_lowercase(), value.into()))
            .collect();
        let digest = content_digest(&body);
        Self { status, headers, body, digest, stored_at: None }
    }

    /// A JSON document record, as written to the metadata store.
    pub fn json(value: &impl Serialize) -> Result<Self, serde_json::Error> {
        let body = Bytes::from(serde_json::to_vec(value)?);
        Ok(Self::new(200, [("content-type", "application/json")], body))
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Whether the status is in the 2xx success range.
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = StoredResponse::new(200, [("ETag", "\"abc\""), ("Last-Modified", "Wed, 01 Jan 2025 00:00:00 GMT")], Bytes::new());
        assert_eq!(response.header("etag"), Some("\"abc\""));
        assert_eq!(response.header("ETAG"), Some("\"abc\""));
        assert_eq!(response.header("last-modified"), Some("Wed, 01 Jan 2025 00:00:00 GMT"));
        assert_eq!(response.header("content-type"), None);
    }

    #[test]
    fn test_digest_tracks_body() {
        let a = StoredResponse::new(200, [("a", "b")], Bytes::from_static(b"one"));
        let b = StoredResponse::new(200, Vec::<(String, String)>::new(), Bytes::from_static(b"one"));
        let c = StoredResponse::new(200, [("a", "b")], Bytes::from_static(b"two"));
        assert_eq!(a.digest, b.digest);
        assert_ne!(a.digest, c.digest);
    }

    #[test]
    fn test_json_record() {
        let record = StoredResponse::json(&serde_json::json!({"etag": "x"})).unwrap();
        assert_eq!(record.header("Content-Type"), Some("application/json"));
        assert_eq!(&record.body[..], br#"{"etag":"x"}"#);
        assert!(record.is_success());
    }
}

//! Network access for the controller.
//!
//! ### Requests
//! - `GET` for asset bodies, `HEAD` for freshness checks
//! - Cache bypass sends `Cache-Control: no-cache` and `Pragma: no-cache`
//! - Credentials are same-origin: the configured cookie is attached only
//!   when the request targets the controller origin
//!
//! ### Limits
//! - Max redirects: 5 (configurable)
//! - Max body bytes: 5MB (configurable), checked on GET only
//!
//! Non-success statuses come back as ordinary responses; deciding what a 404
//! means is the caller's job.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};
use url::Url;

use keepr_core::{AppConfig, Error, StoredResponse};

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
        }
    }
}

/// How the request treats intermediate caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Leave the request untouched.
    Default,
    /// Ask every cache on the way to revalidate with the origin.
    Bypass,
}

/// Which requests carry credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    Omit,
    SameOrigin,
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetRequest {
    pub url: String,
    pub method: Method,
    pub cache: CacheMode,
    pub credentials: Credentials,
}

impl NetRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into(), method: Method::Get, cache: CacheMode::Default, credentials: Credentials::SameOrigin }
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self { method: Method::Head, ..Self::get(url) }
    }

    pub fn bypass_cache(mut self) -> Self {
        self.cache = CacheMode::Bypass;
        self
    }
}

/// A response as seen by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetResponse {
    /// The final URL after redirects
    pub url: String,
    pub status: u16,
    /// Lower-cased header names; repeated headers joined with ", "
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl NetResponse {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// An independent copy suitable for a store.
    pub fn to_stored(&self) -> StoredResponse {
        StoredResponse::new(self.status, self.headers.clone(), self.body.clone())
    }
}

/// Anything that can carry a [`NetRequest`] to the network.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request.
    ///
    /// Returns `Err` only when no response was obtained (transport failure,
    /// timeout, oversize body).
    async fn fetch(&self, request: &NetRequest) -> Result<NetResponse, Error>;
}

/// Configuration for [`HttpNetwork`].
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Origin whose requests count as same-origin.
    pub origin: Url,

    /// User agent string (default: "keepr/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Cookie header value for same-origin requests.
    pub credentials: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://localhost:8080").expect("static origin parses"),
            user_agent: "keepr/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            credentials: None,
        }
    }
}

impl NetworkConfig {
    /// Derive the network settings from the application config.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = config
            .origin_url()
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            origin,
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
            credentials: config.credentials.clone().filter(|c| !c.is_empty()),
        })
    }
}

/// reqwest-backed [`Network`].
pub struct HttpNetwork {
    http: Client,
    config: NetworkConfig,
}

impl HttpNetwork {
    /// Create a new network client with the given configuration.
    pub fn new(config: NetworkConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network { url: config.origin.to_string(), reason: format!("failed to build HTTP client: {e}") })?;

        Ok(Self { http, config })
    }

    fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.config.origin.origin()
    }

    fn transport_error(url: &str, err: &reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::FetchTimeout(format!("{url}: {err}"))
        } else {
            Error::Network { url: url.to_string(), reason: err.to_string() }
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &NetRequest) -> Result<NetResponse, Error> {
        let start = Instant::now();
        let url = Url::parse(&request.url).map_err(|e| Error::InvalidUrl(format!("{}: {e}", request.url)))?;

        let mut builder = self.http.request(request.method.into(), url.clone());

        if request.cache == CacheMode::Bypass {
            builder = builder
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::PRAGMA, "no-cache");
        }

        if request.credentials == Credentials::SameOrigin
            && self.is_same_origin(&url)
            && let Some(cookie) = &self.config.credentials
        {
            builder = builder.header(header::COOKIE, cookie);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::transport_error(&request.url, &e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let Ok(value) = value.to_str() else {
                continue;
            };
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        let body = match request.method {
            Method::Head => Bytes::new(),
            Method::Get => {
                if let Some(len) = response.content_length()
                    && len as usize > self.config.max_bytes
                {
                    return Err(Error::FetchTooLarge(format!(
                        "{}: {} bytes exceeds {}",
                        request.url, len, self.config.max_bytes
                    )));
                }

                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| Self::transport_error(&request.url, &e))?;

                if bytes.len() > self.config.max_bytes {
                    return Err(Error::FetchTooLarge(format!(
                        "{}: {} bytes exceeds {}",
                        request.url,
                        bytes.len(),
                        self.config.max_bytes
                    )));
                }
                bytes
            }
        };

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            method = ?request.method,
            url = %request.url,
            status,
            fetch_ms,
            bytes = body.len(),
            "network request complete"
        );

        Ok(NetResponse { url: final_url, status, headers, body, fetch_ms })
    }
}

//! Passive interception of page requests.
//!
//! Cacheable asset requests are answered from the body store when possible
//! and forwarded to the network otherwise. The interceptor only reads: a
//! miss is never written back.

use url::Url;

use keepr_client::{Method, NetRequest, NetResponse, Network};
use keepr_core::assets::is_cacheable;
use keepr_core::{Error, StoredResponse, Stores};

/// How a request should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Not ours; the host performs the request unchanged.
    Bypass,
    /// Look up this key in the body store.
    Lookup(String),
}

/// The result of intercepting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intercepted {
    Bypass,
    Served(StoredResponse),
    Forwarded(NetResponse),
}

/// Decide whether a request is a cacheable asset request.
pub fn route(url: &str, method: Method) -> Route {
    if method != Method::Get {
        return Route::Bypass;
    }

    let Ok(mut parsed) = Url::parse(url) else {
        return Route::Bypass;
    };

    // Root, `.php` and `.html` paths fail the filter too.
    if !is_cacheable(parsed.path()) {
        return Route::Bypass;
    }

    parsed.set_fragment(None);
    Route::Lookup(parsed.into())
}

/// Serve `request` from the body store, falling back to the network.
pub async fn intercept(stores: &Stores, network: &dyn Network, request: &NetRequest) -> Result<Intercepted, Error> {
    let Route::Lookup(key) = route(&request.url, request.method) else {
        return Ok(Intercepted::Bypass);
    };

    if let Some(cached) = stores.body.match_key(&key).await? {
        tracing::debug!(url = %key, "served from cache");
        return Ok(Intercepted::Served(cached));
    }

    let response = network.fetch(request).await?;
    tracing::debug!(url = %key, status = response.status, "cache miss forwarded");
    Ok(Intercepted::Forwarded(response))
}

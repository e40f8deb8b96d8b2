//! Fetch an asset past every cache and store it with its freshness record.

use keepr_client::{NetRequest, Network};
use keepr_core::store::write_metadata;
use keepr_core::{AssetMetadata, Error, StoredResponse, Stores};

/// Fetch `url` bypassing caches and store the body under `url`.
///
/// The metadata write is best effort: its failure is logged and the asset
/// still counts as cached.
pub async fn fetch_and_cache(stores: &Stores, network: &dyn Network, url: &str) -> Result<StoredResponse, Error> {
    let response = network.fetch(&NetRequest::get(url).bypass_cache()).await?;
    if !response.is_success() {
        return Err(Error::Fetch { url: url.to_string(), status: response.status });
    }

    let stored = response.to_stored();
    stores.body.put(url, &stored).await?;

    let metadata = AssetMetadata::from_response(&stored);
    if let Err(e) = write_metadata(stores.meta.as_ref(), url, &metadata).await {
        tracing::warn!(url, error = %e, "metadata write failed; freshness checks fall back to cached headers");
    }

    tracing::debug!(
        url,
        status = stored.status,
        bytes = stored.body.len(),
        fetch_ms = response.fetch_ms,
        etag = metadata.etag.as_deref(),
        "asset cached"
    );

    Ok(stored)
}

//! Presence and staleness of one cached asset.
//!
//! Presence is read from the body store. Staleness needs a HEAD request: a
//! `HEAD` past every cache whose validators are compared against the ones
//! recorded when the asset was stored. Anything inconclusive counts as fresh.

use keepr_client::{NetRequest, Network};
use keepr_core::store::read_metadata;
use keepr_core::{AssetMetadata, Error, Stores};

/// What the checker found for one asset. Never both flags at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Freshness {
    pub is_missing: bool,
    pub is_outdated: bool,
}

impl Freshness {
    pub const FRESH: Freshness = Freshness { is_missing: false, is_outdated: false };
    pub const MISSING: Freshness = Freshness { is_missing: true, is_outdated: false };
    pub const OUTDATED: Freshness = Freshness { is_missing: false, is_outdated: true };
}

/// Check `url`; with `check_fresh`, ask the network for a changed validator.
pub async fn check_one(stores: &Stores, network: &dyn Network, url: &str, check_fresh: bool) -> Freshness {
    let present = match stores.body.has(url).await {
        Ok(present) => present,
        Err(e) => {
            tracing::warn!(url, error = %e, "body store unreadable; reporting asset as missing");
            false
        }
    };

    if !present {
        return Freshness::MISSING;
    }
    if !check_fresh {
        return Freshness::FRESH;
    }

    match head_outdated(stores, network, url).await {
        Ok(true) => Freshness::OUTDATED,
        Ok(false) => Freshness::FRESH,
        Err(e) => {
            tracing::debug!(url, error = %e, "freshness check inconclusive");
            Freshness::FRESH
        }
    }
}

async fn head_outdated(stores: &Stores, network: &dyn Network, url: &str) -> Result<bool, Error> {
    let head = network.fetch(&NetRequest::head(url).bypass_cache()).await?;
    if !head.is_success() {
        tracing::debug!(url, status = head.status, "freshness HEAD returned non-success");
        return Ok(false);
    }

    let local = match read_metadata(stores.meta.as_ref(), url).await? {
        Some(metadata) => metadata,
        None => match stores.body.match_key(url).await? {
            Some(cached) => AssetMetadata::from_cached_headers(&cached),
            None => AssetMetadata::default(),
        },
    };

    Ok(differs(head.header("etag"), local.etag.as_deref())
        || differs(head.header("last-modified"), local.last_modified.as_deref()))
}

/// Two validators disagree only when both sides have a non-empty value.
fn differs(remote: Option<&str>, local: Option<&str>) -> bool {
    match (remote.filter(|v| !v.is_empty()), local.filter(|v| !v.is_empty())) {
        (Some(remote), Some(local)) => remote != local,
        _ => false,
    }
}

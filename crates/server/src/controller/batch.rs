//! Batch orchestration over lists of assets.
//!
//! Each batch fans out over its assets with bounded concurrency. Every asset
//! yields exactly one outcome and results are reported in input order, no
//! matter which order the fetches finish in.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use keepr_client::Network;
use keepr_core::{BatchResult, Error, FailedAsset, MissingReport, Stores};

use super::freshness::{Freshness, check_one};
use super::persist::fetch_and_cache;

/// Fetch and store every asset in `urls`, always re-fetching.
///
/// Per-asset failures land in [`BatchResult::failed`]; only a failing task
/// fails the batch.
pub async fn cache_assets(
    stores: &Stores, network: &Arc<dyn Network>, urls: Vec<String>, max_concurrency: usize,
) -> Result<BatchResult, Error> {
    let total = urls.len();
    let outcomes = fan_out(urls, max_concurrency, |url| {
        let stores = stores.clone();
        let network = network.clone();
        async move { fetch_and_cache(&stores, network.as_ref(), &url).await.map(|_| ()) }
    })
    .await?;

    let mut result = BatchResult { total, ..Default::default() };
    for (url, outcome) in outcomes {
        match outcome {
            Ok(()) => result.success_count += 1,
            Err(e) => {
                tracing::debug!(%url, error = %e, "asset failed to cache");
                result.failed.push(FailedAsset { url, error: e.to_string() });
            }
        }
    }

    tracing::info!(total, succeeded = result.success_count, failed = result.failed.len(), "cache batch finished");
    Ok(result)
}

/// Partition `urls` into missing and (with `check_fresh`) outdated assets.
pub async fn check_missing(
    stores: &Stores, network: &Arc<dyn Network>, urls: Vec<String>, check_fresh: bool, max_concurrency: usize,
) -> Result<MissingReport, Error> {
    let total = urls.len();
    let outcomes = fan_out(urls, max_concurrency, |url| {
        let stores = stores.clone();
        let network = network.clone();
        async move { check_one(&stores, network.as_ref(), &url, check_fresh).await }
    })
    .await?;

    let mut report = MissingReport::default();
    for (url, freshness) in outcomes {
        match freshness {
            Freshness { is_missing: true, .. } => report.missing.push(url),
            Freshness { is_outdated: true, .. } => report.outdated.push(url),
            _ => {}
        }
    }

    tracing::info!(
        total,
        check_fresh,
        missing = report.missing.len(),
        outdated = report.outdated.len(),
        "missing check finished"
    );
    Ok(report)
}

/// Run `task` for every url, at most `max_concurrency` at a time.
async fn fan_out<T, F, Fut>(urls: Vec<String>, max_concurrency: usize, task: F) -> Result<Vec<(String, T)>, Error>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut join_set = JoinSet::new();

    for (index, url) in urls.into_iter().enumerate() {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Dispatch(e.to_string()))?;
        let work = task(url.clone());

        join_set.spawn(async move {
            // NOTE: Hold permit for task duration to enforce concurrency limit
            let _permit = permit;
            (index, url, work.await)
        });
    }

    let mut outcomes = Vec::with_capacity(join_set.len());
    while let Some(joined) = join_set.join_next().await {
        outcomes.push(joined.map_err(|e| Error::Dispatch(format!("asset task failed: {e}")))?);
    }

    outcomes.sort_by_key(|(index, _, _)| *index);
    Ok(outcomes.into_iter().map(|(_, url, outcome)| (url, outcome)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedNetwork, memory_stores, url};
    use async_trait::async_trait;
    use keepr_client::{Method, NetRequest, NetResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn network(scripted: &Arc<ScriptedNetwork>) -> Arc<dyn Network> {
        scripted.clone()
    }

    #[tokio::test]
    async fn test_cache_assets_counts_every_asset() {
        let (_db, stores) = memory_stores().await;
        let scripted = ScriptedNetwork::new();
        scripted.serve(&url("/a.png"), 200, &[], b"a");
        scripted.serve(&url("/c.css"), 200, &[], b"c");

        let urls = vec![url("/a.png"), url("/b.js"), url("/c.css")];
        let result = cache_assets(&stores, &network(&scripted), urls, 4).await.unwrap();

        assert_eq!(result.total, 3);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].url, url("/b.js"));
        assert!(result.failed[0].error.contains("404"));
    }

    #[tokio::test]
    async fn test_cache_assets_failed_in_input_order() {
        let (_db, stores) = memory_stores().await;
        let scripted = ScriptedNetwork::new();
        let urls: Vec<String> = (0..8).map(|i| url(&format!("/missing-{i}.png"))).collect();

        let result = cache_assets(&stores, &network(&scripted), urls.clone(), 3).await.unwrap();

        let failed: Vec<String> = result.failed.into_iter().map(|f| f.url).collect();
        assert_eq!(failed, urls);
        assert_eq!(result.success_count, 0);
    }

    #[tokio::test]
    async fn test_cache_assets_is_idempotent() {
        let (_db, stores) = memory_stores().await;
        let scripted = ScriptedNetwork::new();
        scripted.serve(&url("/a.png"), 200, &[("etag", "\"1\"")], b"a");
        scripted.serve(&url("/b.js"), 200, &[], b"b");
        let urls = vec![url("/a.png"), url("/b.js")];

        let first = cache_assets(&stores, &network(&scripted), urls.clone(), 4).await.unwrap();
        let body_after_first = stores.body.match_key(&url("/a.png")).await.unwrap().unwrap();
        let second = cache_assets(&stores, &network(&scripted), urls, 4).await.unwrap();
        let body_after_second = stores.body.match_key(&url("/a.png")).await.unwrap().unwrap();

        assert_eq!(first.success_count, first.total);
        assert_eq!(second.success_count, second.total);
        assert_eq!(body_after_first.body, body_after_second.body);
        assert_eq!(body_after_first.digest, body_after_second.digest);
        assert_eq!(scripted.count(Method::Get), 4);
    }

    #[tokio::test]
    async fn test_cache_assets_empty_batch() {
        let (_db, stores) = memory_stores().await;
        let scripted = ScriptedNetwork::new();

        let result = cache_assets(&stores, &network(&scripted), Vec::new(), 4).await.unwrap();
        assert_eq!(result, BatchResult { total: 0, success_count: 0, failed: vec![] });
    }

    #[tokio::test]
    async fn test_check_missing_partitions() {
        let (_db, stores) = memory_stores().await;
        let scripted = ScriptedNetwork::new();
        for path in ["/fresh.png", "/stale.png"] {
            scripted.serve(&url(path), 200, &[("etag", "v1")], b"x");
        }
        cache_assets(&stores, &network(&scripted), vec![url("/fresh.png"), url("/stale.png")], 4)
            .await
            .unwrap();
        scripted.serve_head(&url("/stale.png"), 200, &[("etag", "v2")]);

        let urls = vec![url("/absent.js"), url("/fresh.png"), url("/stale.png"), url("/also-absent.css")];
        let report = check_missing(&stores, &network(&scripted), urls, true, 2).await.unwrap();

        assert_eq!(report.missing, vec![url("/absent.js"), url("/also-absent.css")]);
        assert_eq!(report.outdated, vec![url("/stale.png")]);
    }

    #[tokio::test]
    async fn test_check_missing_without_fresh_skips_network() {
        let (_db, stores) = memory_stores().await;
        let scripted = ScriptedNetwork::new();

        let report = check_missing(&stores, &network(&scripted), vec![url("/a.png")], false, 4).await.unwrap();
        assert_eq!(report.missing, vec![url("/a.png")]);
        assert!(report.outdated.is_empty());
        assert!(scripted.calls().is_empty());
    }

    /// Counts how many fetches are in flight at once.
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Network for Gauge {
        async fn fetch(&self, request: &NetRequest) -> Result<NetResponse, Error> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(NetResponse {
                url: request.url.clone(),
                status: 200,
                headers: Default::default(),
                body: bytes::Bytes::from_static(b"ok"),
                fetch_ms: 10,
            })
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let (_db, stores) = memory_stores().await;
        let gauge = Arc::new(Gauge { current: AtomicUsize::new(0), peak: AtomicUsize::new(0) });
        let network: Arc<dyn Network> = gauge.clone();
        let urls: Vec<String> = (0..10).map(|i| url(&format!("/{i}.png"))).collect();

        let result = cache_assets(&stores, &network, urls, 2).await.unwrap();
        assert_eq!(result.success_count, 10);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_sequential_when_concurrency_is_one() {
        let (_db, stores) = memory_stores().await;
        let gauge = Arc::new(Gauge { current: AtomicUsize::new(0), peak: AtomicUsize::new(0) });
        let network: Arc<dyn Network> = gauge.clone();
        let urls: Vec<String> = (0..4).map(|i| url(&format!("/{i}.js"))).collect();

        cache_assets(&stores, &network, urls, 1).await.unwrap();
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
    }
}

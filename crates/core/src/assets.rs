//! Asset URL normalization and the cacheability filter.
//!
//! Normalization steps:
//! 1. Trim leading/trailing whitespace
//! 2. Resolve against the controller origin
//! 3. Remove fragment (#...)
//! 4. Keep query string intact (do not reorder)
//!
//! Malformed input is returned unchanged rather than rejected; the filter
//! then decides whether it can ever be cached.

use std::collections::HashSet;

use url::Url;

/// File extensions eligible for caching.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".js", ".css", ".png", ".jpg", ".jpeg", ".svg", ".webp", ".gif", ".ico", ".woff", ".woff2", ".ttf", ".eot", ".json",
    ".map",
];

/// Path endings that are never cached, whatever else the string contains.
const PAGE_SUFFIXES: &[&str] = &["/", ".php", ".html"];

/// Resolve an asset reference against `origin`, returning an absolute URL string.
///
/// Never fails: if `raw` cannot be resolved it comes back unchanged.
pub fn normalize(origin: &Url, raw: &str) -> String {
    match origin.join(raw.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.into()
        }
        Err(e) => {
            tracing::debug!(raw, error = %e, "asset reference did not resolve; keeping it as-is");
            raw.to_string()
        }
    }
}

/// Whether `url` names a static asset that may live in the body store.
///
/// Query and fragment are ignored. Paths ending in `/`, `.php` or `.html`
/// are rejected; otherwise the path must end with an allowed extension.
pub fn is_cacheable(url: &str) -> bool {
    let path = path_part(url);
    if path.is_empty() || PAGE_SUFFIXES.iter().any(|suffix| path.ends_with(suffix)) {
        return false;
    }
    ALLOWED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Normalize, de-duplicate (first occurrence wins) and filter a batch of asset references.
pub fn prepare<S: AsRef<str>>(origin: &Url, assets: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    assets
        .iter()
        .map(|raw| normalize(origin, raw.as_ref()))
        .filter(|url| seen.insert(url.clone()))
        .filter(|url| is_cacheable(url))
        .collect()
}

fn path_part(url: &str) -> &str {
    let without_query = url.split('?').next().unwrap_or_default();
    without_query.split('#').next().unwrap_or_default()
}

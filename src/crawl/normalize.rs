// src/crawl/normalize.rs
// =============================================================================
// URL normalization for deduplication.
//
// Two spellings of the same page must map to the same key, or the seen-set
// can't keep its "never fetch twice" promise. The rules are deliberately
// small and deterministic:
// - scheme and host are lowercased (the url crate already does this)
// - default ports are dropped (":80" on http, ":443" on https)
// - the #fragment is removed (it never reaches the server anyway)
// - a trailing slash is removed from any path other than "/"
//
// Query strings are kept as-is: "?page=2" really is a different page.
// =============================================================================

use url::Url;

// Returns the normalized form of `url`.
//
// Example:
//   "HTTPS://Example.COM:443/Docs/#intro" -> "https://example.com/Docs"
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    // Url::parse already strips default ports; set_port(None) covers URLs
    // that were built up by hand.
    if normalized.port().is_some() && normalized.port() == default_port(normalized.scheme()) {
        let _ = normalized.set_port(None);
    }

    let path = normalized.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed }.to_string();
        normalized.set_path(&trimmed);
    }

    normalized
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

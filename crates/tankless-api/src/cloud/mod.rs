// Cloud REST transport
//
// Bearer-token JSON API. Every request obtains its token from the shared
// `SessionManager`; a 401 earns exactly one forced refresh and retry.

mod client;

pub use client::CloudClient;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use url::Url;

/// Backoff applied when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Seconds to wait from a `Retry-After` header (delta-seconds form only).
pub(crate) fn retry_after(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Make relative joins append to the base path instead of replacing its
/// last segment (`https://host/api` -> `https://host/api/`).
pub fn normalize_base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn retry_after_defaults_when_missing_or_dated() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), 60);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), 12);
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), 60);
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let url = normalize_base_url(Url::parse("https://cloud.example/api").unwrap());
        assert_eq!(url.join("devices").unwrap().path(), "/api/devices");
    }
}

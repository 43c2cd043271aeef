use std::time::Duration;

use once_cell::sync::Lazy;

use crate::constants::HTTP_TIMEOUT_SECS;

static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|e| {
            log::warn!("[Http] Failed to build tuned client, using default: {}", e);
            reqwest::Client::new()
        })
});

/// Shared client for catalog and media requests.
pub fn client() -> &'static reqwest::Client {
    &CLIENT
}

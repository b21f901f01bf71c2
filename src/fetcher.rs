use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::Url;
use tracing::{debug, instrument, warn};

use crate::fetch_error::FetchError;

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FETCH_RETRIES: usize = 2;

/// Blocking-style document retrieval: one GET, body as text, non-2xx is an error
#[derive(Clone)]
pub struct DocumentFetcher {
    client: reqwest::Client,
    retries: usize,
}

impl DocumentFetcher {
    pub fn new(timeout: Duration, retries: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, retries })
    }

    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let attempt = || async { self.get_once(url).await };

        attempt
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(500))
                    .with_max_times(self.retries),
            )
            .when(FetchError::is_transient)
            .notify(|e, delay| {
                warn!("Transient fetch failure for {}: {} (retrying in {:?})", url, e, delay);
            })
            .await
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        debug!("Sending HTTP request");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        debug!("Received HTTP response with status: {}", status);

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        debug!("Retrieved document, size: {} bytes", text.len());
        Ok(text)
    }
}

/// Resolve a listing `href` against the listing page URL
pub fn resolve_link(base: &str, href: &str) -> Result<String, FetchError> {
    let base = Url::parse(base).map_err(|e| FetchError::InvalidUrl(format!("{base}: {e}")))?;
    base.join(href.trim())
        .map(|url| url.to_string())
        .map_err(|e| FetchError::InvalidUrl(format!("{href}: {e}")))
}

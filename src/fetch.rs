//! Page retrieval.
//!
//! [`PageFetcher`] is the seam between the network and the HTML stages. The
//! scrapers and the pipeline are generic over it, so the production
//! [`HttpFetcher`] can be swapped for an in-memory fetcher in tests.
//!
//! Every request carries the timeout the client was built with. Nothing is
//! retried: a failed fetch is reported to the caller, which decides whether the
//! failure is scoped to one day or fatal for the run.

use crate::error::FetchError;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};
use url::Url;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Something that can turn a URL into an HTML body.
pub trait PageFetcher {
    /// Fetch `url` and return its body decoded as text.
    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError>;
}

/// [`PageFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }

    /// The underlying client, shared with the listing client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl PageFetcher for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let body = get_text(&self.client, url.as_str(), &[]).await;
        let dt = t0.elapsed();

        match &body {
            Ok(text) => debug!(elapsed_ms = dt.as_millis() as u64, bytes = text.len(), "Fetched page"),
            Err(e) => warn!(elapsed_ms = dt.as_millis() as u64, error = %e, "Page fetch failed"),
        }
        body
    }
}

/// GET `url` with `query`, require a 2xx status and return the body.
pub async fn get_text(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, &str)],
) -> Result<String, FetchError> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .text()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))
}

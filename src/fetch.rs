use std::time::Duration;

use reqwest::Method;
use reqwest::header::RANGE;
use tracing::debug;

use crate::error::HarvestError;

/// Per-request timeouts, tuned per call site: listing pages are the largest
/// responses, shortener resolution should give up quickly.
pub const LISTING_TIMEOUT: Duration = Duration::from_secs(30);
pub const DETAIL_TIMEOUT: Duration = Duration::from_secs(25);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(20);
pub const SHORTENER_TIMEOUT: Duration = Duration::from_secs(12);
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(18);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_CAP_MS: u64 = 6_000;

pub const DEFAULT_USER_AGENT: &str =
    concat!("connpass-harvest/", env!("CARGO_PKG_VERSION"));

/// One completed HTTP exchange. `final_url` reflects the post-redirect
/// location; a non-200 `status` is a result, not an error.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: u16,
    pub final_url: String,
    pub body: Vec<u8>,
}

impl Fetched {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sequential HTTP fetcher: redirects followed transparently, transport
/// failures retried with capped exponential backoff. HTTP error statuses are
/// passed through for the caller to judge.
pub struct FetchClient {
    client: reqwest::Client,
    retries: usize,
}

impl FetchClient {
    pub fn new(user_agent: &str, retries: usize) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(HarvestError::Client)?;
        Ok(Self { client, retries })
    }

    pub async fn get(&self, url: &str, timeout: Duration) -> Result<Fetched, HarvestError> {
        self.request(Method::GET, url, timeout, None, true).await
    }

    /// HEAD-only exchange, used to resolve shortener redirects without
    /// downloading a body.
    pub async fn head(&self, url: &str, timeout: Duration) -> Result<Fetched, HarvestError> {
        self.request(Method::HEAD, url, timeout, None, false).await
    }

    /// Ranged GET capped at `max_bytes`. Servers are free to ignore the
    /// Range header, so the body is also truncated client-side.
    pub async fn get_ranged(
        &self,
        url: &str,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<Fetched, HarvestError> {
        let mut fetched = self
            .request(Method::GET, url, timeout, Some(max_bytes), true)
            .await?;
        fetched.body.truncate(max_bytes);
        Ok(fetched)
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        timeout: Duration,
        range: Option<usize>,
        read_body: bool,
    ) -> Result<Fetched, HarvestError> {
        let attempts = self.retries + 1;
        let mut last_error: Option<reqwest::Error> = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = BACKOFF_CAP_MS.min(BACKOFF_BASE_MS << (attempt - 1));
                debug!(url, attempt, backoff_ms = backoff, "retrying fetch");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let mut builder = self.client.request(method.clone(), url).timeout(timeout);
            if let Some(max_bytes) = range {
                builder = builder.header(RANGE, format!("bytes=0-{max_bytes}"));
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let final_url = response.url().to_string();
                    if !read_body {
                        return Ok(Fetched {
                            status,
                            final_url,
                            body: Vec::new(),
                        });
                    }
                    match response.bytes().await {
                        Ok(body) => {
                            return Ok(Fetched {
                                status,
                                final_url,
                                body: body.to_vec(),
                            });
                        }
                        Err(err) => last_error = Some(err),
                    }
                }
                Err(err) => {
                    if !is_retryable(&err) {
                        return Err(HarvestError::TransientFetch {
                            url: url.to_string(),
                            attempts: attempt + 1,
                            source: err,
                        });
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(HarvestError::TransientFetch {
            url: url.to_string(),
            attempts,
            source: last_error.expect("at least one attempt was made"),
        })
    }
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

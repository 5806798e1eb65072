//! Remote feed access: URL allow-listing and the HTTP client.
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;

pub mod model;

pub use model::{FeedItem, FeedPage};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid source URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid source URL: host '{host}' is not allowed")]
    DisallowedHost { host: String },
    #[error("fetch failure: {0}")]
    Http(#[from] reqwest::Error),
    #[error("fetch failure: {status} from {url}")]
    Status { status: StatusCode, url: String },
    #[error("fetch failure: invalid feed payload: {0}")]
    Parse(#[from] serde_json::Error),
}

impl FeedError {
    /// True for errors raised before any request was attempted.
    pub fn is_invalid_url(&self) -> bool {
        matches!(
            self,
            FeedError::InvalidUrl { .. } | FeedError::DisallowedHost { .. }
        )
    }
}

/// Parse `raw` and check its host against `allowed_hosts`.
pub fn validate_url(raw: &str, allowed_hosts: &[String]) -> Result<Url, FeedError> {
    let url = Url::parse(raw.trim()).map_err(|e| FeedError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FeedError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    let Some(host) = url.host_str() else {
        return Err(FeedError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".into(),
        });
    };
    if !allowed_hosts
        .iter()
        .any(|allowed| allowed.trim().eq_ignore_ascii_case(host))
    {
        return Err(FeedError::DisallowedHost {
            host: host.to_string(),
        });
    }
    Ok(url)
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    /// GET `url` and return its `results`, in API order.
    async fn fetch(&self, url: &Url) -> Result<Vec<FeedItem>, FeedError>;
}

#[derive(Clone)]
pub struct FeedClient {
    http: Client,
}

impl fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedClient").finish_non_exhaustive()
    }
}

impl FeedClient {
    pub fn new(user_agent: &str, timeout: Option<Duration>) -> Result<Self, FeedError> {
        let mut builder = Client::builder().user_agent(user_agent.to_string());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, FeedError> {
        Self::new(
            &cfg.http.user_agent,
            cfg.http.timeout_secs.map(Duration::from_secs),
        )
    }

    pub fn build_request(&self, url: &Url) -> Result<reqwest::Request, FeedError> {
        Ok(self
            .http
            .get(url.clone())
            .header("Accept", "application/json")
            .build()?)
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch(&self, url: &Url) -> Result<Vec<FeedItem>, FeedError> {
        let request = self.build_request(url)?;
        debug!(url = %url, "fetching feed");

        let res = self.http.execute(request).await.map_err(|err| {
            warn!(url = %url, ?err, "failed to reach feed");
            FeedError::Http(err)
        })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(url = %url, %status, body = %body, "feed returned an error status");
            return Err(FeedError::Status {
                status,
                url: url.to_string(),
            });
        }

        let body = res.text().await?;
        let page: FeedPage = serde_json::from_str(&body).map_err(|err| {
            warn!(url = %url, ?err, "feed payload is not a results page");
            FeedError::Parse(err)
        })?;
        info!(url = %url, items = page.results.len(), "fetched feed");
        Ok(page.results)
    }
}

//! Upstream HTTP fetching for remote repositories
//!
//! Redirects are followed by hand so credentials are only ever sent to the
//! origin of the first request. No retries: a failed fetch is reported to
//! the caller as-is.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::credentials::UpstreamAuth;

/// Default redirect limit per fetch
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

/// Upstream fetch failures
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Too many redirects (max {max})")]
    TooManyRedirects { max: u32 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl UpstreamError {
    /// HTTP status the upstream answered with, if it answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError::Network {
            message: e.to_string(),
        }
    }
}

/// Fetches raw bytes from an upstream URL
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, UpstreamError>;
}

/// reqwest-backed upstream client with redirect protection
pub struct HttpUpstream {
    client: reqwest::Client,
    auth: UpstreamAuth,
    max_redirects: u32,
}

impl HttpUpstream {
    /// Create a client that attaches `auth` by URL scope
    pub fn new(auth: UpstreamAuth, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            // Redirects are handled in `fetch` to keep credentials on their origin
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .user_agent(concat!("depot/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            auth,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        })
    }

    /// Create without credentials (public upstreams)
    pub fn public(timeout: Duration) -> Result<Self, UpstreamError> {
        Self::new(UpstreamAuth::default(), timeout)
    }

    pub fn with_max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, UpstreamError> {
        let original_url = url.to_string();
        let mut current_url = original_url.clone();
        let mut redirects = 0;

        loop {
            let mut request = self.client.get(&current_url);

            if same_origin(&original_url, &current_url) {
                if let Some(auth) = self.auth.for_url(&current_url) {
                    request = request.header(reqwest::header::AUTHORIZATION, auth);
                }
            } else {
                tracing::warn!(
                    "Cross-origin redirect from {} to {} - credentials not forwarded",
                    original_url,
                    current_url
                );
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > self.max_redirects {
                    return Err(UpstreamError::TooManyRedirects {
                        max: self.max_redirects,
                    });
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| UpstreamError::Network {
                        message: format!("Redirect from {} without Location header", current_url),
                    })?;

                current_url = Url::parse(&current_url)?.join(location)?.to_string();
                tracing::debug!(to = %current_url, "following upstream redirect");
                continue;
            }

            if !status.is_success() {
                return Err(UpstreamError::Status {
                    status: status.as_u16(),
                    url: current_url,
                });
            }

            let bytes = response.bytes().await?;
            return Ok(bytes.to_vec());
        }
    }
}

/// Same scheme, host and effective port
fn same_origin(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => {
            a.scheme() == b.scheme()
                && a.host() == b.host()
                && a.port_or_known_default() == b.port_or_known_default()
        }
        _ => false,
    }
}

/// Join a base URL and a repository-relative path with exactly one slash
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use super::cookies::ForwardedCookies;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid loop-back url: {0}")]
    InvalidUrl(String),
    #[error("invalid cookie header: {0}")]
    InvalidHeader(String),
    #[error("loop-back transport error: {0}")]
    Transport(String),
    #[error("loop-back request returned status {status}")]
    Status { status: u16 },
    #[error("loop-back response body was empty")]
    EmptyBody,
}

/// Retrieves a document's template-substituted HTML.
///
/// Implementations issue one request per call, never retry, and report an
/// empty body as [`FetchError::EmptyBody`].
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, cookies: &ForwardedCookies) -> Result<String, FetchError>;
}

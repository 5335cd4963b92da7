use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::{HeaderValue, StatusCode, header};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::application::pdf::{
    ContentFetcher, CookiePolicy, FetchError, ForwardedCookies, compose_cookie_header,
};

const TARGET: &str = "infra::fetch";

/// Loop-back fetcher backed by `reqwest`.
///
/// One GET per call, `Accept: text/html`, no retries. Cookies are replayed
/// only when forwarding is enabled.
#[derive(Debug, Clone)]
pub struct HttpContentFetcher {
    client: Client,
    policy: CookiePolicy,
    forward_cookies: bool,
}

impl HttpContentFetcher {
    pub fn new(
        policy: CookiePolicy,
        forward_cookies: bool,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            policy,
            forward_cookies,
        })
    }

    fn cookie_header(&self, cookies: &ForwardedCookies) -> Result<Option<HeaderValue>, FetchError> {
        if !self.forward_cookies {
            return Ok(None);
        }
        let value = compose_cookie_header(&self.policy, cookies);
        if value.is_empty() {
            return Ok(None);
        }
        HeaderValue::from_str(&value)
            .map(Some)
            .map_err(|err| FetchError::InvalidHeader(err.to_string()))
    }
}

fn user_agent() -> &'static str {
    concat!("stampa-loopback/", env!("CARGO_PKG_VERSION"))
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &Url, cookies: &ForwardedCookies) -> Result<String, FetchError> {
        let started_at = Instant::now();

        let mut request = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "text/html");
        if let Some(cookie) = self.cookie_header(cookies)? {
            request = request.header(header::COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody);
        }

        debug!(
            target = TARGET,
            op = "fetch::loopback",
            result = "ok",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            url = %url,
            body_bytes = body.len(),
            "Loop-back fetch completed"
        );

        Ok(body)
    }
}

//! Blocking HTTP access for the tag feed and release archives.
//!
//! Components take an [`HttpClient`] rather than talking to `reqwest`
//! directly so tests can substitute canned responses.

use std::time::Duration;

use crate::error::{CacheError, CacheResult};

/// User agent sent with every request.
const USER_AGENT: &str = concat!("vengo/", env!("CARGO_PKG_VERSION"));

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Numeric status code.
    pub status: u16,
    /// Canonical reason phrase, possibly empty.
    pub reason: String,
    /// Response body. Left empty for non-success statuses.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Status rendered the way servers send it, e.g. `404 Not Found`.
    #[must_use]
    pub fn status_line(&self) -> String {
        if self.reason.is_empty() {
            self.status.to_string()
        } else {
            format!("{} {}", self.status, self.reason)
        }
    }
}

/// Something that can perform a GET request.
pub trait HttpClient {
    /// Fetches `url`, returning the response whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Network`] on transport failures only.
    fn get(&self, url: &str) -> CacheResult<HttpResponse>;
}

/// [`HttpClient`] backed by `reqwest`'s blocking client.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Builds a client without a request timeout; callers needing one wrap the
    /// whole engine call.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> CacheResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| CacheError::network_with_source("failed to create HTTP client", e))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> CacheResult<HttpResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| CacheError::network_with_source(format!("failed to connect to {url}"), e))?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let body = if status.is_success() {
            response
                .bytes()
                .map_err(|e| {
                    CacheError::network_with_source(format!("failed to read response from {url}"), e)
                })?
                .to_vec()
        } else {
            Vec::new()
        };

        Ok(HttpResponse {
            status: status.as_u16(),
            reason,
            body,
        })
    }
}

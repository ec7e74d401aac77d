// crates/watchtower-providers/src/transport.rs
// ============================================================================
// Module: Transport
// Description: Synchronous request/response seam adapters send GETs through.
// Purpose: Let provider adapters be exercised in tests without sockets.
// Dependencies: reqwest, watchtower-config
// ============================================================================

//! ## Overview
//! [`Transport`] is deliberately a blocking, object-safe trait rather than
//! an async one: adapters call it from inside [`tokio::task::spawn_blocking`]
//! so the outer `fetch` future stays cancellable while the underlying HTTP
//! call runs on a blocking thread, and tests can swap in a fake without
//! pulling in an HTTP mock server crate.

use std::time::Duration;

use watchtower_config::HttpProviderConfig;

/// A single outbound GET request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Fully-qualified request URL.
    pub url: String,
}

impl HttpRequest {
    /// Builds a request for the given URL.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// The response to a [`HttpRequest`].
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// True when the status is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// True when the status indicates a retryable server condition:
    /// HTTP 429 or any 5xx (spec §4.2).
    #[must_use]
    pub const fn is_retryable_status(&self) -> bool {
        self.status == 429 || (self.status >= 500 && self.status < 600)
    }
}

/// A failure transporting a [`HttpRequest`].
///
/// # Invariants
/// - `Network` covers connect failures, timeouts, and TLS errors alike:
///   callers retry on it per spec §4.2's "retry on network error" rule.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent or the connection failed.
    #[error("network error: {0}")]
    Network(String),
}

/// A blocking request sender, implemented for the real network and for
/// test fakes alike.
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the response, or a [`TransportError`] if
    /// the request could not complete at all (not to be confused with a
    /// non-2xx response, which is a successful transport with a bad status).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] on connect failure, timeout, or
    /// any other condition that prevented a response from being received.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// A [`Transport`] backed by a real `reqwest` blocking client.
pub struct ReqwestTransport {
    /// Underlying blocking HTTP client, preconfigured with timeouts and a
    /// stable user agent (spec §4.2).
    client: reqwest::blocking::Client,
}

/// Stable User-Agent sent with every Watchtower provider request.
pub const USER_AGENT: &str = "watchtower-providers/0.1";

impl ReqwestTransport {
    /// Builds a transport from the given provider HTTP configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] when the underlying client
    /// cannot be constructed (e.g. an invalid TLS configuration).
    pub fn new(config: &HttpProviderConfig) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(&request.url)
            .send()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|err| TransportError::Network(err.to_string()))?
            .to_vec();
        Ok(HttpResponse { status, body })
    }
}

/// Returns the backoff delay doubling per zero-based attempt from `base`.
#[must_use]
pub fn backoff_before_attempt(base: Duration, attempt: u32) -> Duration {
    let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(multiplier)
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only panic-based assertions are permitted."
    )]
    use super::*;

    #[test]
    fn success_status_range() {
        let response = HttpResponse { status: 200, body: vec![] };
        assert!(response.is_success());
        let response = HttpResponse { status: 404, body: vec![] };
        assert!(!response.is_success());
    }

    #[test]
    fn retryable_statuses() {
        assert!(HttpResponse { status: 429, body: vec![] }.is_retryable_status());
        assert!(HttpResponse { status: 503, body: vec![] }.is_retryable_status());
        assert!(!HttpResponse { status: 404, body: vec![] }.is_retryable_status());
    }

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_before_attempt(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_before_attempt(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_before_attempt(base, 2), Duration::from_millis(400));
    }
}

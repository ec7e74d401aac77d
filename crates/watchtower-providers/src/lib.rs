// crates/watchtower-providers/src/lib.rs
// ============================================================================
// Module: Watchtower Providers
// Description: One fetch adapter per external feed source.
// Purpose: Normalize FDA recalls, drug shortages, and warning letters into
//          the canonical `FeedItem` model, with retry, backoff, and a
//          primary/fallback URL chain (spec §4.2, C2).
// Dependencies: async-trait, reqwest, regex, tokio, watchtower-config,
//               watchtower-core
// ============================================================================

//! ## Overview
//! Each adapter implements [`Provider`]. `fetch` is `async` so the sync
//! engine can run it under a deadline, but the actual HTTP work happens on
//! a blocking thread via [`tokio::task::spawn_blocking`] through the
//! [`Transport`] seam (see `transport` for why that split exists).

#![forbid(unsafe_code)]

pub mod error;
pub mod recalls;
pub mod shortages;
pub mod transport;
pub mod warning_letters;

pub use error::ProviderError;
pub use recalls::RecallsProvider;
pub use shortages::ShortagesProvider;
pub use transport::HttpRequest;
pub use transport::HttpResponse;
pub use transport::ReqwestTransport;
pub use transport::Transport;
pub use transport::TransportError;
pub use warning_letters::WarningLettersProvider;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use watchtower_config::HttpProviderConfig;
use watchtower_core::FeedItem;
use watchtower_core::SourceId;

/// The result of a successful [`Provider::fetch`].
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Normalized items parsed from whichever source URL answered.
    pub items: Vec<FeedItem>,
    /// The last HTTP status observed while fetching, if any request
    /// reached a server.
    pub http_status: Option<u16>,
}

/// A single feed source's fetch capability (spec §4.2).
///
/// # Invariants
/// - `fetch` never panics; every failure path returns [`ProviderError`].
/// - `cache_ttl` defaults to 900s unless the adapter overrides it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The source this adapter fetches.
    fn source_id(&self) -> SourceId;

    /// The cache TTL this adapter's payload should be stored with.
    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(900)
    }

    /// Fetches and normalizes the current feed for this source.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::AllSourcesFailed`] when every URL in the
    /// primary/fallback chain fails across all retry attempts,
    /// [`ProviderError::Http`] for a single terminal non-retryable HTTP
    /// failure, or [`ProviderError::Parse`] when a response could not be
    /// understood.
    async fn fetch(&self) -> Result<FetchOutcome, ProviderError>;
}

/// Runs the shared retry/fallback algorithm from spec §4.2 against a list
/// of candidate URLs, in order: primary first, then fallbacks.
///
/// For each of `config.max_attempts` rounds, every URL is tried in turn.
/// A URL that yields at least one parsed item short-circuits the whole
/// call with success. A non-retryable 4xx (other than 429) is recorded but
/// does not retry that URL again within the same round; a network error,
/// 429, or 5xx is retried (after the round's backoff) on the next round.
/// Only once every round is exhausted without any URL producing items is
/// [`ProviderError::AllSourcesFailed`] returned.
///
/// # Errors
///
/// Returns [`ProviderError::AllSourcesFailed`] when no URL produced items
/// across all attempts.
pub async fn fetch_with_fallback<F>(
    transport: Arc<dyn Transport>,
    urls: Vec<String>,
    config: HttpProviderConfig,
    parse: F,
) -> Result<FetchOutcome, ProviderError>
where
    F: Fn(&HttpResponse) -> Result<Vec<FeedItem>, ProviderError> + Send + Sync + 'static,
{
    let mut last_status: Option<u16> = None;
    let mut last_message = String::from("no endpoints available");

    for attempt in 0..config.max_attempts {
        for url in &urls {
            let request = HttpRequest::get(url.clone());
            let transport = Arc::clone(&transport);
            let send_result =
                tokio::task::spawn_blocking(move || transport.send(&request))
                    .await
                    .map_err(|join_err| ProviderError::Http {
                        message: format!("fetch task panicked: {join_err}"),
                        http_status: None,
                    });

            let response = match send_result {
                Ok(Ok(response)) => response,
                Ok(Err(TransportError::Network(message))) => {
                    last_message = message;
                    continue;
                }
                Err(err) => return Err(err),
            };

            last_status = Some(response.status);

            if !response.is_success() {
                last_message = format!("HTTP {}", response.status);
                if !response.is_retryable_status() {
                    tracing::warn!(
                        url = %url,
                        status = response.status,
                        "non-retryable status, trying next url"
                    );
                }
                continue;
            }

            match parse(&response) {
                Ok(items) if !items.is_empty() => {
                    return Ok(FetchOutcome { items, http_status: last_status });
                }
                Ok(_) => {
                    tracing::warn!(url = %url, "no items found, trying next url");
                }
                Err(err) => {
                    last_message = err.to_string();
                    tracing::warn!(url = %url, error = %err, "parse failed, trying next url");
                }
            }
        }

        if attempt + 1 < config.max_attempts {
            tokio::time::sleep(config.backoff_before_attempt(attempt)).await;
        }
    }

    Err(ProviderError::AllSourcesFailed(format!(
        "data unavailable, last error: {last_message}"
    )))
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
    use std::sync::Mutex;

    struct ScriptedTransport {
        responses: Mutex<Vec<Result<HttpResponse, TransportError>>>,
    }

    impl Transport for ScriptedTransport {
        fn send(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            let mut guard = self.responses.lock().expect("lock");
            if guard.is_empty() {
                return Err(TransportError::Network("exhausted".to_string()));
            }
            guard.remove(0)
        }
    }

    fn item() -> FeedItem {
        FeedItem::new(
            SourceId::FdaRecalls,
            None,
            "Title".to_string(),
            None,
            None,
            None,
            None,
            None,
            Vec::new(),
            serde_json::json!({}),
            watchtower_core::time::now(),
        )
    }

    #[tokio::test]
    async fn falls_back_to_second_url_on_4xx() {
        let transport = Arc::new(ScriptedTransport {
            responses: Mutex::new(vec![
                Ok(HttpResponse { status: 404, body: vec![] }),
                Ok(HttpResponse { status: 200, body: vec![] }),
            ]),
        });
        let config = HttpProviderConfig { max_attempts: 1, ..HttpProviderConfig::default() };
        let outcome = fetch_with_fallback(
            transport,
            vec!["https://primary".to_string(), "https://fallback".to_string()],
            config,
            |_response| Ok(vec![item()]),
        )
        .await
        .expect("ok");
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.http_status, Some(200));
    }

    #[tokio::test]
    async fn all_sources_failed_when_every_url_errors() {
        let transport = Arc::new(ScriptedTransport { responses: Mutex::new(vec![]) });
        let config = HttpProviderConfig { max_attempts: 2, backoff_base_ms: 1, ..HttpProviderConfig::default() };
        let err = fetch_with_fallback(
            transport,
            vec!["https://primary".to_string()],
            config,
            |_response| Ok(Vec::new()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::AllSourcesFailed(_)));
    }
}

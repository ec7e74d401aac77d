// crates/watchtower-sync/src/lib.rs
// ============================================================================
// Module: Watchtower Sync Engine
// Description: SyncOne/SyncAll orchestration over providers, the cache, and
//              the persistence gateway.
// Purpose: Fetch-or-reuse-cached, persist, and record telemetry for each
//          registered feed source without ever propagating an exception to
//          the caller (spec §4.5, C5).
// Dependencies: watchtower-cache, watchtower-config, watchtower-core,
//               watchtower-providers, watchtower-store-sqlite
// ============================================================================

//! ## Overview
//! [`SyncEngine::sync_one`] is the single place every failure mode in the
//! system (unknown source, cache miss/corrupt/unavailable, provider
//! failure, DB write failure) converges into one structured [`SyncResult`]
//! that is always returned, never thrown. [`SyncEngine::sync_all`]
//! sequences [`SyncEngine::sync_one`] across every registered source with a
//! small inter-source delay (spec §5) and aggregates the outcome.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use watchtower_cache::Cache;
use watchtower_cache::cache_key;
use watchtower_config::SyncEngineConfig;
use watchtower_core::FeedItem;
use watchtower_core::SourceId;
use watchtower_core::SyncStatus;
use watchtower_providers::Provider;
use watchtower_store_sqlite::SqliteStore;

/// The structured, always-returned outcome of [`SyncEngine::sync_one`]
/// (spec §4.5).
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// The source this result concerns.
    pub source: SourceId,
    /// Whether the sync attempt succeeded.
    pub success: bool,
    /// Items observed in the fetched (or cached) payload.
    pub items_fetched: u32,
    /// Items newly persisted (excludes duplicates).
    pub items_added: u32,
    /// Whether this result came from the cache rather than a live fetch.
    pub cached: bool,
    /// Human-readable failure reason, if `success` is false.
    pub error_message: Option<String>,
    /// The last HTTP status observed, if any request reached a server.
    pub last_http_status: Option<u16>,
    /// When this result was produced.
    pub updated_at: DateTime<Utc>,
    /// When this source last succeeded, if ever.
    pub last_success_at: Option<DateTime<Utc>>,
    /// When this source last failed, if ever.
    pub last_error_at: Option<DateTime<Utc>>,
}

/// The aggregated outcome of [`SyncEngine::sync_all`] (spec §4.5).
#[derive(Debug, Clone)]
pub struct SyncAllResult {
    /// `"ok"` if at least one source succeeded, else `"error"`.
    pub status: &'static str,
    /// True iff any source failed.
    pub degraded: bool,
    /// Per-source results, in source-enumeration order.
    pub results: Vec<SyncResult>,
    /// Sum of `items_added` across all results.
    pub total_items_added: u32,
    /// Count of sources with `success == true`.
    pub sources_succeeded: u32,
    /// Count of sources with `success == false`.
    pub sources_failed: u32,
}

/// Orchestrates fetch-or-cache, persist, and telemetry for every registered
/// feed source.
///
/// # Invariants
/// - `sync_one` never panics and never returns `Err`; every failure path is
///   folded into a [`SyncResult`] with `success = false`.
pub struct SyncEngine {
    /// One adapter per registered source.
    providers: HashMap<SourceId, Arc<dyn Provider>>,
    /// Shared short-TTL payload cache.
    cache: Arc<dyn Cache>,
    /// Persistence gateway, the sole writer of feed items and sync status.
    store: Arc<SqliteStore>,
    /// Inter-source delay and per-source budget.
    config: SyncEngineConfig,
}

impl SyncEngine {
    /// Builds a sync engine over the given providers, cache, and store.
    #[must_use]
    pub fn new(
        providers: HashMap<SourceId, Arc<dyn Provider>>,
        cache: Arc<dyn Cache>,
        store: Arc<SqliteStore>,
        config: SyncEngineConfig,
    ) -> Self {
        Self { providers, cache, store, config }
    }

    /// Syncs a single source, never throwing: every failure path is caught,
    /// recorded in the returned [`SyncResult`], and persisted into
    /// [`SyncStatus`] before returning (spec §4.5).
    pub async fn sync_one(&self, source: SourceId, force: bool) -> SyncResult {
        let now = watchtower_core::time::now();
        let previous = self.store.get_sync_status(source).ok().flatten();

        let Some(provider) = self.providers.get(&source) else {
            return self.finish(source, now, previous, SyncAttempt::unknown_source());
        };

        let attempt = self.fetch_or_cache(source, provider.as_ref(), force).await;
        self.finish(source, now, previous, attempt)
    }

    /// Syncs every registered source, in enumeration order, spacing
    /// consecutive sources by `config.inter_source_delay` (spec §4.5, §5).
    pub async fn sync_all(&self, force: bool) -> SyncAllResult {
        let mut results = Vec::with_capacity(SourceId::all().len());
        let sources: Vec<SourceId> =
            SourceId::all().into_iter().filter(|source| self.providers.contains_key(source)).collect();
        for (index, source) in sources.iter().enumerate() {
            results.push(self.sync_one(*source, force).await);
            if index + 1 < sources.len() {
                tokio::time::sleep(self.config.inter_source_delay()).await;
            }
        }

        let sources_succeeded =
            u32::try_from(results.iter().filter(|r| r.success).count()).unwrap_or(u32::MAX);
        let sources_failed =
            u32::try_from(results.iter().filter(|r| !r.success).count()).unwrap_or(u32::MAX);
        let total_items_added = results.iter().map(|r| r.items_added).sum();

        SyncAllResult {
            status: if sources_succeeded > 0 { "ok" } else { "error" },
            degraded: sources_failed > 0,
            results,
            total_items_added,
            sources_succeeded,
            sources_failed,
        }
    }

    /// Attempts the cache-or-fetch step for one source, never propagating
    /// an error: every branch returns a populated [`SyncAttempt`].
    async fn fetch_or_cache(
        &self,
        source: SourceId,
        provider: &dyn Provider,
        force: bool,
    ) -> SyncAttempt {
        if !force {
            match self.cache.get(&cache_key(source.as_str())).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<Vec<FeedItem>>(&bytes) {
                    Ok(items) => return SyncAttempt::cached(items),
                    Err(err) => {
                        tracing::warn!(
                            source = source.as_str(),
                            error = %err,
                            "cached payload corrupt, falling back to live fetch"
                        );
                    }
                },
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(
                        source = source.as_str(),
                        error = %err,
                        "cache unavailable, falling back to live fetch"
                    );
                }
            }
        }

        match provider.fetch().await {
            Ok(outcome) => {
                if let Ok(bytes) = serde_json::to_vec(&outcome.items) {
                    if let Err(err) =
                        self.cache.set_ex(&cache_key(source.as_str()), bytes, provider.cache_ttl()).await
                    {
                        tracing::debug!(source = source.as_str(), error = %err, "cache write failed");
                    }
                }
                SyncAttempt::fetched(outcome.items, outcome.http_status)
            }
            Err(err) => {
                tracing::warn!(source = source.as_str(), error = %err, "fetch failed");
                SyncAttempt::failed(err.to_string(), err.http_status())
            }
        }
    }

    /// Persists items (when the attempt produced any), upserts
    /// [`SyncStatus`], and assembles the final [`SyncResult`].
    fn finish(
        &self,
        source: SourceId,
        now: DateTime<Utc>,
        previous: Option<SyncStatus>,
        attempt: SyncAttempt,
    ) -> SyncResult {
        let items_fetched = u32::try_from(attempt.items.len()).unwrap_or(u32::MAX);
        let items_added = if attempt.items.is_empty() {
            0
        } else {
            self.store.upsert_feed_items(&attempt.items).map_or_else(
                |err| {
                    tracing::warn!(source = source.as_str(), error = %err, "upsert failed");
                    0
                },
                |count| u32::try_from(count).unwrap_or(u32::MAX),
            )
        };

        let success = attempt.error.is_none();
        let last_success_at = if success { Some(now) } else { previous.as_ref().and_then(|p| p.last_success_at) };
        let last_error_at = if success { previous.as_ref().and_then(|p| p.last_error_at) } else { Some(now) };
        let last_error_message = if success { None } else { attempt.error.clone() };

        let status = SyncStatus {
            source,
            last_run_at: now,
            last_success_at,
            last_error_at,
            last_error_message: last_error_message.clone(),
            last_http_status: attempt.http_status,
            items_fetched,
            items_saved: items_added,
        };
        self.store.update_sync_status(&status);

        SyncResult {
            source,
            success,
            items_fetched,
            items_added,
            cached: attempt.cached,
            error_message: last_error_message,
            last_http_status: attempt.http_status,
            updated_at: now,
            last_success_at,
            last_error_at,
        }
    }
}

/// Intermediate outcome of the fetch-or-cache step, before persistence.
struct SyncAttempt {
    /// Items obtained, whether from cache or a live fetch.
    items: Vec<FeedItem>,
    /// Whether `items` came from the cache.
    cached: bool,
    /// The HTTP status observed, if any.
    http_status: Option<u16>,
    /// Failure reason, if this attempt did not succeed.
    error: Option<String>,
}

impl SyncAttempt {
    /// Builds a cache-hit attempt.
    fn cached(items: Vec<FeedItem>) -> Self {
        Self { items, cached: true, http_status: None, error: None }
    }

    /// Builds a successful live-fetch attempt.
    fn fetched(items: Vec<FeedItem>, http_status: Option<u16>) -> Self {
        Self { items, cached: false, http_status, error: None }
    }

    /// Builds a failed attempt with no items.
    fn failed(message: String, http_status: Option<u16>) -> Self {
        Self { items: Vec::new(), cached: false, http_status, error: Some(message) }
    }

    /// Builds the failed attempt used when no adapter is registered for a
    /// requested source.
    fn unknown_source() -> Self {
        Self::failed("no adapter registered for this source".to_string(), None)
    }
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
    use async_trait::async_trait;
    use watchtower_cache::InMemoryCache;
    use watchtower_providers::FetchOutcome;
    use watchtower_providers::ProviderError;

    struct StubProvider {
        source: SourceId,
        outcome: std::sync::Mutex<Option<Result<Vec<FeedItem>, String>>>,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn source_id(&self) -> SourceId {
            self.source
        }

        async fn fetch(&self) -> Result<FetchOutcome, ProviderError> {
            match self.outcome.lock().expect("lock").take() {
                Some(Ok(items)) => Ok(FetchOutcome { items, http_status: Some(200) }),
                Some(Err(message)) => Err(ProviderError::AllSourcesFailed(message)),
                None => Ok(FetchOutcome { items: Vec::new(), http_status: Some(200) }),
            }
        }
    }

    fn item(source: SourceId, external_id: &str) -> FeedItem {
        FeedItem::new(
            source,
            Some(external_id.to_string()),
            "Title",
            None,
            None,
            None,
            None,
            None,
            Vec::new(),
            serde_json::json!({}),
            Utc::now(),
        )
    }

    fn engine(providers: HashMap<SourceId, Arc<dyn Provider>>) -> SyncEngine {
        SyncEngine::new(
            providers,
            Arc::new(InMemoryCache::new()),
            Arc::new(SqliteStore::open_in_memory().expect("open")),
            SyncEngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn sync_one_persists_fetched_items() {
        let mut providers: HashMap<SourceId, Arc<dyn Provider>> = HashMap::new();
        providers.insert(
            SourceId::FdaRecalls,
            Arc::new(StubProvider {
                source: SourceId::FdaRecalls,
                outcome: std::sync::Mutex::new(Some(Ok(vec![item(SourceId::FdaRecalls, "r-1")]))),
            }),
        );
        let engine = engine(providers);
        let result = engine.sync_one(SourceId::FdaRecalls, true).await;
        assert!(result.success);
        assert_eq!(result.items_added, 1);
        assert!(!result.cached);
    }

    #[tokio::test]
    async fn sync_one_reports_unknown_source() {
        let engine = engine(HashMap::new());
        let result = engine.sync_one(SourceId::FdaShortages, true).await;
        assert!(!result.success);
        assert!(result.error_message.is_some());
    }

    #[tokio::test]
    async fn sync_one_never_fails_when_provider_errors() {
        let mut providers: HashMap<SourceId, Arc<dyn Provider>> = HashMap::new();
        providers.insert(
            SourceId::FdaWarningLetters,
            Arc::new(StubProvider {
                source: SourceId::FdaWarningLetters,
                outcome: std::sync::Mutex::new(Some(Err("network down".to_string()))),
            }),
        );
        let engine = engine(providers);
        let result = engine.sync_one(SourceId::FdaWarningLetters, true).await;
        assert!(!result.success);
        assert_eq!(result.items_added, 0);
        assert_eq!(result.error_message.as_deref(), Some("network down"));
    }

    #[tokio::test]
    async fn sync_all_aggregates_degraded_status() {
        let mut providers: HashMap<SourceId, Arc<dyn Provider>> = HashMap::new();
        providers.insert(
            SourceId::FdaRecalls,
            Arc::new(StubProvider {
                source: SourceId::FdaRecalls,
                outcome: std::sync::Mutex::new(Some(Ok(vec![item(SourceId::FdaRecalls, "r-2")]))),
            }),
        );
        providers.insert(
            SourceId::FdaShortages,
            Arc::new(StubProvider {
                source: SourceId::FdaShortages,
                outcome: std::sync::Mutex::new(Some(Err("down".to_string()))),
            }),
        );
        let mut engine = engine(providers);
        engine.config.inter_source_delay_ms = 1;
        let all = engine.sync_all(true).await;
        assert_eq!(all.status, "ok");
        assert!(all.degraded);
        assert_eq!(all.sources_succeeded, 1);
        assert_eq!(all.sources_failed, 1);
        assert_eq!(all.total_items_added, 1);
    }
}

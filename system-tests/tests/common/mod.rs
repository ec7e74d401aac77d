// system-tests/tests/common/mod.rs
// ============================================================================
// Shared fixtures for the end-to-end scenario tests (spec §8).
// ============================================================================

#![allow(
    dead_code,
    reason = "Not every fixture is used by every scenario file that pulls in this module."
)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use watchtower_core::Evidence;
use watchtower_core::EvidenceId;
use watchtower_core::EvidenceStatus;
use watchtower_core::FeedItem;
use watchtower_core::SourceId;
use watchtower_core::TenantId;
use watchtower_providers::FetchOutcome;
use watchtower_providers::Provider;
use watchtower_providers::ProviderError;
use watchtower_store_sqlite::SqliteStore;

/// A scripted source adapter: fetch once, return whatever was configured.
pub struct ScriptedProvider {
    source: SourceId,
    outcome: Mutex<Option<Result<Vec<FeedItem>, String>>>,
}

impl ScriptedProvider {
    /// Builds a provider that returns `items` on its one call to `fetch`.
    #[must_use]
    pub fn succeeding(source: SourceId, items: Vec<FeedItem>) -> Arc<dyn Provider> {
        Arc::new(Self { source, outcome: Mutex::new(Some(Ok(items))) })
    }

    /// Builds a provider whose one call to `fetch` fails with `message`.
    #[must_use]
    pub fn failing(source: SourceId, message: &str) -> Arc<dyn Provider> {
        Arc::new(Self { source, outcome: Mutex::new(Some(Err(message.to_string()))) })
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn source_id(&self) -> SourceId {
        self.source
    }

    async fn fetch(&self) -> Result<FetchOutcome, ProviderError> {
        let outcome = self.outcome.lock().expect("lock").take();
        match outcome {
            Some(Ok(items)) => Ok(FetchOutcome { items, http_status: Some(200) }),
            Some(Err(message)) => Err(ProviderError::AllSourcesFailed(message)),
            None => Ok(FetchOutcome { items: Vec::new(), http_status: Some(200) }),
        }
    }
}

/// Builds a minimal feed item for one source, identified by `external_id`.
#[must_use]
pub fn feed_item(source: SourceId, external_id: &str) -> FeedItem {
    FeedItem::new(
        source,
        Some(external_id.to_string()),
        format!("{} notice {external_id}", source.as_str()),
        None,
        Some(Utc::now()),
        None,
        None,
        None,
        Vec::new(),
        serde_json::json!({}),
        Utc::now(),
    )
}

/// Builds a provider registry keyed by source id, for [`watchtower_sync::SyncEngine`].
#[must_use]
pub fn providers(entries: Vec<Arc<dyn Provider>>) -> HashMap<SourceId, Arc<dyn Provider>> {
    entries.into_iter().map(|provider| (provider.source_id(), provider)).collect()
}

/// Opens a fresh in-memory store and registers one tenant, returning both.
#[must_use]
pub fn tenant_store() -> (SqliteStore, TenantId) {
    let store = SqliteStore::open_in_memory().expect("in-memory store");
    let tenant_id = store.insert_tenant("Acme Pharma Holdings").expect("insert tenant");
    (store, tenant_id)
}

/// Inserts an evidence row with the given status and text, returning its id.
#[must_use]
pub fn insert_evidence(
    store: &SqliteStore,
    tenant_id: TenantId,
    status: EvidenceStatus,
    text: Option<&str>,
) -> EvidenceId {
    store
        .insert_evidence(&Evidence {
            id: EvidenceId::new(std::num::NonZeroU64::new(1).expect("nonzero")),
            tenant_id,
            filename: "inspection-report.pdf".to_string(),
            content_hash: "deadbeef".to_string(),
            extracted_text: text.map(str::to_string),
            status,
            error_message: None,
            processed_at: None,
        })
        .expect("insert evidence")
}

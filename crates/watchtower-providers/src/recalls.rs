// crates/watchtower-providers/src/recalls.rs
// ============================================================================
// Module: Recalls Provider
// Description: Adapter for the FDA drug recall enforcement feed.
// Purpose: Fetch and normalize recall reports into `FeedItem`s.
// Dependencies: watchtower-core, watchtower-config
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use watchtower_config::HttpProviderConfig;
use watchtower_core::FeedItem;
use watchtower_core::SourceId;

use crate::FetchOutcome;
use crate::Provider;
use crate::ProviderError;
use crate::Transport;
use crate::fetch_with_fallback;
use crate::transport::HttpResponse;

/// Primary openFDA drug enforcement endpoint.
pub const PRIMARY_URL: &str =
    "https://api.fda.gov/drug/enforcement.json?search=status:Ongoing&limit=100";
/// Fallback endpoint, queried when the primary is unavailable or returns
/// a non-retryable error.
pub const FALLBACK_URL: &str = "https://api.fda.gov/drug/enforcement.json?limit=100";

/// Adapter for FDA Drug Recalls via the openFDA enforcement API.
pub struct RecallsProvider {
    /// Request sender, swappable with a fake in tests.
    transport: Arc<dyn Transport>,
    /// Shared HTTP behavior (timeouts, retries, backoff).
    config: HttpProviderConfig,
}

impl RecallsProvider {
    /// Builds a recalls adapter over the given transport and HTTP config.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: HttpProviderConfig) -> Self {
        Self { transport, config }
    }
}

#[async_trait]
impl Provider for RecallsProvider {
    fn source_id(&self) -> SourceId {
        SourceId::FdaRecalls
    }

    async fn fetch(&self) -> Result<FetchOutcome, ProviderError> {
        fetch_with_fallback(
            Arc::clone(&self.transport),
            vec![PRIMARY_URL.to_string(), FALLBACK_URL.to_string()],
            self.config,
            parse_enforcement_report,
        )
        .await
    }
}

fn parse_enforcement_report(response: &HttpResponse) -> Result<Vec<FeedItem>, ProviderError> {
    let payload: serde_json::Value = serde_json::from_slice(&response.body)
        .map_err(|err| ProviderError::Parse(err.to_string()))?;
    let results = payload
        .get("results")
        .and_then(serde_json::Value::as_array)
        .cloned()
        .unwrap_or_default();

    Ok(results.iter().filter_map(parse_single_recall).collect())
}

fn parse_single_recall(item: &serde_json::Value) -> Option<FeedItem> {
    let recall_number = item.get("recall_number").and_then(serde_json::Value::as_str);
    let recalling_firm = item.get("recalling_firm").and_then(serde_json::Value::as_str);
    let product_description =
        item.get("product_description").and_then(serde_json::Value::as_str).unwrap_or_default();
    let reason = item.get("reason_for_recall").and_then(serde_json::Value::as_str);
    let classification = item.get("classification").and_then(serde_json::Value::as_str);
    let report_date = item.get("report_date").and_then(serde_json::Value::as_str);
    let status = item.get("status").and_then(serde_json::Value::as_str);

    if product_description.is_empty() {
        return None;
    }

    let published_at = report_date.and_then(parse_yyyymmdd);

    let mut title = if product_description.len() > 100 {
        format!("Recall: {}", &product_description[..100])
    } else {
        format!("Recall: {product_description}")
    };
    if let Some(classification) = classification {
        title = format!("[{classification}] {title}");
    }
    title.truncate(200);

    let mut summary_parts = Vec::new();
    if let Some(firm) = recalling_firm {
        summary_parts.push(format!("Firm: {firm}"));
    }
    if let Some(reason) = reason {
        let truncated: String = reason.chars().take(200).collect();
        summary_parts.push(format!("Reason: {truncated}"));
    }
    if let Some(status) = status {
        summary_parts.push(format!("Status: {status}"));
    }
    let summary = if summary_parts.is_empty() { None } else { Some(summary_parts.join(". ")) };

    let url = recall_number.map(|number| {
        format!(
            "https://www.accessdata.fda.gov/scripts/cdrh/cfdocs/cfRES/res.cfm?id={number}"
        )
    });

    let external_id = recall_number
        .filter(|number| !number.is_empty())
        .map(ToString::to_string);

    Some(FeedItem::new(
        SourceId::FdaRecalls,
        external_id,
        title,
        url,
        published_at,
        summary,
        recalling_firm.map(ToString::to_string),
        None,
        Vec::new(),
        item.clone(),
        watchtower_core::time::now(),
    ))
}

fn parse_yyyymmdd(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let digits = raw.get(0..8)?;
    let date = chrono::NaiveDate::parse_from_str(digits, "%Y%m%d").ok()?;
    let datetime = date.and_hms_opt(0, 0, 0)?;
    Some(chrono::DateTime::from_naive_utc_and_offset(datetime, chrono::Utc))
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
    fn parses_minimal_recall() {
        let body = serde_json::json!({
            "results": [{
                "recall_number": "D-1234-2026",
                "recalling_firm": "Acme Pharma",
                "product_description": "Ibuprofen 200mg Tablets",
                "reason_for_recall": "Subpotent",
                "classification": "Class II",
                "report_date": "20260115",
                "status": "Ongoing",
            }]
        });
        let response = HttpResponse { status: 200, body: serde_json::to_vec(&body).expect("ser") };
        let items = parse_enforcement_report(&response).expect("parse");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].vendor_name.as_deref(), Some("Acme Pharma"));
        assert!(items[0].title.starts_with("[Class II] Recall:"));
        assert!(items[0].published_at.is_some());
    }

    #[test]
    fn skips_items_without_product_description() {
        let body = serde_json::json!({ "results": [{ "recall_number": "X" }] });
        let response = HttpResponse { status: 200, body: serde_json::to_vec(&body).expect("ser") };
        let items = parse_enforcement_report(&response).expect("parse");
        assert!(items.is_empty());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let response = HttpResponse { status: 200, body: b"not json".to_vec() };
        assert!(matches!(parse_enforcement_report(&response), Err(ProviderError::Parse(_))));
    }
}

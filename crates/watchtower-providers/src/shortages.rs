// crates/watchtower-providers/src/shortages.rs
// ============================================================================
// Module: Shortages Provider
// Description: Adapter for the FDA drug shortages feed.
// Purpose: Fetch shortage listings from the openFDA JSON API, falling back
//          to HTML table scraping, normalizing status via the shared
//          closed-set mapping.
// Dependencies: regex, watchtower-core, watchtower-config
// ============================================================================

use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use watchtower_config::HttpProviderConfig;
use watchtower_core::FeedItem;
use watchtower_core::SourceId;
use watchtower_core::normalize::normalize_shortage_status;

use crate::FetchOutcome;
use crate::Provider;
use crate::ProviderError;
use crate::Transport;
use crate::fetch_with_fallback;
use crate::transport::HttpResponse;

/// Primary openFDA drug shortages endpoint.
pub const PRIMARY_URL: &str = "https://api.fda.gov/drug/shortages.json?limit=100";
/// HTML table page consulted when the JSON API is unavailable.
pub const FALLBACK_URL: &str = "https://www.accessdata.fda.gov/scripts/drugshortages/default.cfm";

/// Canonical landing page referenced by every shortage item, matching the
/// upstream source's own convention of linking the overview page rather
/// than a per-item URL.
const SHORTAGE_LANDING_PAGE: &str =
    "https://www.accessdata.fda.gov/scripts/drugshortages/default.cfm";

/// Adapter for FDA Drug Shortages.
pub struct ShortagesProvider {
    /// Request sender, swappable with a fake in tests.
    transport: Arc<dyn Transport>,
    /// Shared HTTP behavior (timeouts, retries, backoff).
    config: HttpProviderConfig,
}

impl ShortagesProvider {
    /// Builds a shortages adapter over the given transport and HTTP config.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: HttpProviderConfig) -> Self {
        Self { transport, config }
    }
}

#[async_trait]
impl Provider for ShortagesProvider {
    fn source_id(&self) -> SourceId {
        SourceId::FdaShortages
    }

    async fn fetch(&self) -> Result<FetchOutcome, ProviderError> {
        fetch_with_fallback(
            Arc::clone(&self.transport),
            vec![PRIMARY_URL.to_string(), FALLBACK_URL.to_string()],
            self.config,
            parse_shortage_response,
        )
        .await
    }
}

fn parse_shortage_response(response: &HttpResponse) -> Result<Vec<FeedItem>, ProviderError> {
    let body = String::from_utf8_lossy(&response.body);
    if let Ok(items) = parse_json(&body)
        && !items.is_empty()
    {
        return Ok(items);
    }
    Ok(parse_html_table(&body))
}

fn parse_json(body: &str) -> Result<Vec<FeedItem>, ProviderError> {
    let payload: serde_json::Value =
        serde_json::from_str(body).map_err(|err| ProviderError::Parse(err.to_string()))?;
    let results = payload
        .get("results")
        .and_then(serde_json::Value::as_array)
        .cloned()
        .unwrap_or_default();
    Ok(results.iter().filter_map(parse_single_shortage).collect())
}

fn parse_single_shortage(item: &serde_json::Value) -> Option<FeedItem> {
    let str_field = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|key| item.get(*key).and_then(serde_json::Value::as_str))
            .map(ToString::to_string)
    };

    let generic_name = str_field(&["generic_name", "drug_name", "product_name", "name"])?;
    if generic_name.is_empty() {
        return None;
    }
    let company_name = str_field(&["company_name", "manufacturer", "labeler", "firm_name"]);
    let raw_status =
        str_field(&["status", "availability", "shortage_status"]).unwrap_or_default();
    let status = normalize_shortage_status(&raw_status);
    let package_ndc = str_field(&["package_ndc", "ndc"]);

    let title = format!("Drug Shortage: {generic_name}");
    let mut summary_parts = Vec::new();
    if let Some(company) = &company_name {
        summary_parts.push(format!("Manufacturer: {company}"));
    }
    if let Some(status) = status {
        summary_parts.push(format!("Status: {status}"));
    }
    let summary = if summary_parts.is_empty() { None } else { Some(summary_parts.join(". ")) };

    let external_id = package_ndc.filter(|ndc| !ndc.is_empty()).map(|ndc| format!("shortage-{ndc}"));

    Some(FeedItem::new(
        SourceId::FdaShortages,
        external_id,
        title,
        Some(SHORTAGE_LANDING_PAGE.to_string()),
        None,
        summary,
        company_name,
        status,
        vec!["shortage".to_string()],
        item.clone(),
        watchtower_core::time::now(),
    ))
}

/// Regex that matches nothing, used as a last-resort fallback for the
/// compile-time-fixed patterns below.
#[allow(clippy::expect_used, reason = "Pattern is a fixed literal; a parse failure here is a compile-time typo, not a runtime condition.")]
fn never_matches() -> Regex {
    Regex::new("$^").expect("empty-match fallback pattern is always valid")
}

#[allow(clippy::expect_used, reason = "Pattern is a fixed literal; a parse failure here is a compile-time typo, not a runtime condition.")]
fn row_regex() -> &'static Regex {
    static ROW: OnceLock<Regex> = OnceLock::new();
    ROW.get_or_init(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").unwrap_or_else(|_| never_matches()))
}

#[allow(clippy::expect_used, reason = "Pattern is a fixed literal; a parse failure here is a compile-time typo, not a runtime condition.")]
fn cell_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"(?is)<t[dh][^>]*>(.*?)</t[dh]>").unwrap_or_else(|_| never_matches()))
}

#[allow(clippy::expect_used, reason = "Pattern is a fixed literal; a parse failure here is a compile-time typo, not a runtime condition.")]
fn tag_strip_regex() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"(?is)<[^>]+>").unwrap_or_else(|_| never_matches()))
}

/// Parses an HTML shortages table into feed items, tolerating markup this
/// provider was never given a formal schema for.
fn parse_html_table(html: &str) -> Vec<FeedItem> {
    let mut items = Vec::new();
    for row_match in row_regex().captures_iter(html).take(50) {
        let Some(row_html) = row_match.get(1) else { continue };
        let cells: Vec<String> = cell_regex()
            .captures_iter(row_html.as_str())
            .filter_map(|capture| capture.get(1))
            .map(|cell| tag_strip_regex().replace_all(cell.as_str(), "").trim().to_string())
            .collect();
        if let Some(item) = parse_table_row(&cells) {
            items.push(item);
        }
    }
    items
}

fn parse_table_row(cells: &[String]) -> Option<FeedItem> {
    if cells.len() < 2 {
        return None;
    }
    let drug_name = cells.first()?.clone();
    if drug_name.is_empty() {
        return None;
    }

    let mut manufacturer: Option<String> = None;
    let mut status = None;
    for cell in &cells[1..] {
        if status.is_none()
            && let Some(found) = normalize_shortage_status(cell)
        {
            status = Some(found);
            continue;
        }
        if manufacturer.is_none() && cell.len() > 3 {
            manufacturer = Some(cell.clone());
        }
    }

    let mut summary_parts = Vec::new();
    if let Some(manufacturer) = &manufacturer {
        summary_parts.push(format!("Manufacturer: {manufacturer}"));
    }
    if let Some(status) = status {
        summary_parts.push(format!("Status: {status}"));
    }
    let summary = if summary_parts.is_empty() { None } else { Some(summary_parts.join(". ")) };

    Some(FeedItem::new(
        SourceId::FdaShortages,
        None,
        format!("Drug Shortage: {drug_name}"),
        Some(SHORTAGE_LANDING_PAGE.to_string()),
        None,
        summary,
        manufacturer,
        status,
        vec!["shortage".to_string()],
        serde_json::json!({ "drug_name": drug_name }),
        watchtower_core::time::now(),
    ))
}

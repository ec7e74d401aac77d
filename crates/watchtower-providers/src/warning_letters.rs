// crates/watchtower-providers/src/warning_letters.rs
// ============================================================================
// Module: Warning Letters Provider
// Description: Adapter for the FDA warning letters feed.
// Purpose: Scrape the FDA warning letters HTML page; no API exists for
//          this source (spec §4.2).
// Dependencies: regex, watchtower-core, watchtower-config
// ============================================================================

use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use watchtower_config::HttpProviderConfig;
use watchtower_core::FeedItem;
use watchtower_core::SourceId;

use crate::FetchOutcome;
use crate::Provider;
use crate::ProviderError;
use crate::Transport;
use crate::fetch_with_fallback;
use crate::transport::HttpResponse;

/// The FDA warning letters listing page. There is no fallback URL because
/// no structured API exists for this source (spec §4.2).
pub const PRIMARY_URL: &str = "https://www.fda.gov/inspections-compliance-enforcement-and-criminal-investigations/compliance-actions-and-activities/warning-letters";

/// Adapter for FDA Warning Letters via HTML page scraping.
pub struct WarningLettersProvider {
    /// Request sender, swappable with a fake in tests.
    transport: Arc<dyn Transport>,
    /// Shared HTTP behavior (timeouts, retries, backoff).
    config: HttpProviderConfig,
}

impl WarningLettersProvider {
    /// Builds a warning-letters adapter over the given transport and HTTP
    /// config.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: HttpProviderConfig) -> Self {
        Self { transport, config }
    }
}

#[async_trait]
impl Provider for WarningLettersProvider {
    fn source_id(&self) -> SourceId {
        SourceId::FdaWarningLetters
    }

    async fn fetch(&self) -> Result<FetchOutcome, ProviderError> {
        fetch_with_fallback(
            Arc::clone(&self.transport),
            vec![PRIMARY_URL.to_string()],
            self.config,
            parse_warning_letters_page,
        )
        .await
    }
}

fn parse_warning_letters_page(response: &HttpResponse) -> Result<Vec<FeedItem>, ProviderError> {
    let html = String::from_utf8_lossy(&response.body);
    let table_items = parse_table(&html);
    if !table_items.is_empty() {
        return Ok(table_items);
    }
    Ok(extract_links(&html))
}

#[allow(clippy::expect_used, reason = "Pattern is a fixed literal; a parse failure here is a compile-time typo, not a runtime condition.")]
fn row_regex() -> &'static Regex {
    static ROW: OnceLock<Regex> = OnceLock::new();
    ROW.get_or_init(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("valid pattern"))
}

#[allow(clippy::expect_used, reason = "Pattern is a fixed literal; a parse failure here is a compile-time typo, not a runtime condition.")]
fn cell_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"(?is)<t[dh][^>]*>(.*?)</t[dh]>").expect("valid pattern"))
}

#[allow(clippy::expect_used, reason = "Pattern is a fixed literal; a parse failure here is a compile-time typo, not a runtime condition.")]
fn tag_strip_regex() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"(?is)<[^>]+>").expect("valid pattern"))
}

#[allow(clippy::expect_used, reason = "Pattern is a fixed literal; a parse failure here is a compile-time typo, not a runtime condition.")]
fn date_regex() -> &'static Regex {
    static DATE: OnceLock<Regex> = OnceLock::new();
    DATE.get_or_init(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").expect("valid pattern"))
}

#[allow(clippy::expect_used, reason = "Pattern is a fixed literal; a parse failure here is a compile-time typo, not a runtime condition.")]
fn link_regex() -> &'static Regex {
    static LINK: OnceLock<Regex> = OnceLock::new();
    LINK.get_or_init(|| {
        Regex::new(r#"(?is)href="(/inspections[^"]*warning-letters[^"]*)"[^>]*>([^<]+)</a>"#)
            .expect("valid pattern")
    })
}

fn parse_table(html: &str) -> Vec<FeedItem> {
    let mut items = Vec::new();
    for row_match in row_regex().captures_iter(html).take(50) {
        let Some(row_html) = row_match.get(1) else { continue };
        let cells: Vec<String> = cell_regex()
            .captures_iter(row_html.as_str())
            .filter_map(|capture| capture.get(1))
            .map(|cell| tag_strip_regex().replace_all(cell.as_str(), "").trim().to_string())
            .collect();
        if let Some(item) = parse_row(&cells) {
            items.push(item);
        }
    }
    items
}

fn parse_row(cells: &[String]) -> Option<FeedItem> {
    if cells.len() < 2 {
        return None;
    }
    let company_name = cells.first()?.clone();
    if company_name.is_empty() {
        return None;
    }

    let mut published_at = None;
    let mut subject = None;
    for cell in &cells[1..] {
        if published_at.is_none()
            && let Some(date) = parse_us_date(cell)
        {
            published_at = Some(date);
            continue;
        }
        if subject.is_none() && cell.len() > 10 {
            subject = Some(cell.clone());
        }
    }

    Some(FeedItem::new(
        SourceId::FdaWarningLetters,
        None,
        format!("Warning Letter: {company_name}"),
        Some(PRIMARY_URL.to_string()),
        published_at,
        subject,
        Some(company_name.clone()),
        None,
        Vec::new(),
        serde_json::json!({ "company": company_name }),
        watchtower_core::time::now(),
    ))
}

fn extract_links(html: &str) -> Vec<FeedItem> {
    link_regex()
        .captures_iter(html)
        .take(50)
        .filter_map(|capture| {
            let href = capture.get(1)?.as_str();
            let text = capture.get(2)?.as_str().trim();
            if text.len() < 3 {
                return None;
            }
            let url = if href.starts_with('/') {
                format!("https://www.fda.gov{href}")
            } else {
                href.to_string()
            };
            let title_text: String = text.chars().take(150).collect();
            Some(FeedItem::new(
                SourceId::FdaWarningLetters,
                None,
                format!("Warning Letter: {title_text}"),
                Some(url),
                None,
                None,
                None,
                None,
                Vec::new(),
                serde_json::json!({ "text": text, "href": href }),
                watchtower_core::time::now(),
            ))
        })
        .collect()
}

fn parse_us_date(text: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let captures = date_regex().captures(text)?;
    let month: u32 = captures.get(1)?.as_str().parse().ok()?;
    let day: u32 = captures.get(2)?.as_str().parse().ok()?;
    let year: i32 = captures.get(3)?.as_str().parse().ok()?;
    let date = chrono::NaiveDate::from_ymd_opt(year, month, day)?;
    let datetime = date.and_hms_opt(0, 0, 0)?;
    Some(chrono::DateTime::from_naive_utc_and_offset(datetime, chrono::Utc))
}

// crates/watchtower-correlation/src/lib.rs
// ============================================================================
// Module: Watchtower Correlation Builder
// Description: Pure feed-health snapshot, vendor matching, and narrative
//              synthesis for one workflow run.
// Purpose: Give the action planner (C8) and the export renderer (C10) a
//          single deterministic view of "what else is going on" alongside a
//          piece of evidence (spec §4.6, C6).
// Dependencies: chrono, regex, serde, serde_json, watchtower-core
// ============================================================================

//! ## Overview
//! [`build_correlation`] is pure: the same evidence, findings, vendor
//! registry, feed items, and sync statuses always produce the same
//! [`Correlation`]. Nothing here performs I/O or reads wall-clock time: the
//! caller supplies `now` so the snapshot timestamp is reproducible in tests.

#![forbid(unsafe_code)]

use std::sync::LazyLock;

use chrono::DateTime;
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use watchtower_core::Category;
use watchtower_core::Evidence;
use watchtower_core::FeedItem;
use watchtower_core::Finding;
use watchtower_core::RiskLevel;
use watchtower_core::Severity;
use watchtower_core::ShortageStatus;
use watchtower_core::SourceId;
use watchtower_core::SyncStatus;
use watchtower_core::Vendor;
use watchtower_core::VendorId;

/// Maximum number of recent feed items retained in [`WatchtowerSnapshot::top_items`].
const TOP_ITEMS_LIMIT: usize = 5;
/// Maximum number of vendor-name candidates considered per run.
const CANDIDATE_LIMIT: usize = 10;
/// Maximum number of unmatched candidates retained in [`Correlation::vendor_matches`].
const UNMATCHED_LIMIT: usize = 5;
/// Shortest candidate length retained when unmatched.
const MIN_UNMATCHED_LEN: usize = 3;

/// A small fixed set of capitalized company-name patterns (spec §4.6): one
/// or more capitalized words followed by a recognizable corporate suffix.
static VENDOR_CANDIDATE_PATTERN: LazyLock<Regex> = LazyLock::new(compile_vendor_pattern);

/// Compiles the fixed vendor-candidate pattern. The pattern is a literal
/// verified by this crate's tests, so compilation cannot fail in practice.
#[allow(clippy::unwrap_used, reason = "Pattern is a fixed literal verified by this crate's tests.")]
fn compile_vendor_pattern() -> Regex {
    Regex::new(
        r"\b(?:[A-Z][A-Za-z&.'-]*\s+){1,4}(?:Pharma|Pharmaceuticals|Labs|Laboratories|Inc|Corp|Corporation|LLC|Ltd)\b",
    )
    .unwrap()
}

/// A trimmed view of a [`FeedItem`] suitable for embedding in a correlation
/// snapshot, without the raw upstream payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItemSummary {
    /// Source this item came from.
    pub source: SourceId,
    /// Display title.
    pub title: String,
    /// Feed category.
    pub category: Category,
    /// Link to the source document, if any.
    pub url: Option<String>,
    /// Upstream publication time, if known.
    pub published_at: Option<DateTime<Utc>>,
}

impl From<&FeedItem> for FeedItemSummary {
    fn from(item: &FeedItem) -> Self {
        Self {
            source: item.source,
            title: item.title.clone(),
            category: item.category,
            url: item.url.clone(),
            published_at: item.published_at,
        }
    }
}

/// One source's health as of the snapshot timestamp (spec §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStatusEntry {
    /// Source this entry concerns.
    pub source: SourceId,
    /// Timestamp of the most recent successful sync, if any.
    pub last_success_at: Option<DateTime<Utc>>,
    /// True iff the most recent outcome for this source was a success.
    pub healthy: bool,
}

/// A snapshot of overall feed health at the time a workflow ran (spec §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchtowerSnapshot {
    /// Total feed items currently stored.
    pub total_feed_items: u32,
    /// Count of feed items considered an active alert (see [`is_active_alert`]).
    pub active_alerts: u32,
    /// Per-source health as of `timestamp`.
    pub sources_status: Vec<SourceStatusEntry>,
    /// Up to five most recently published feed items.
    pub top_items: Vec<FeedItemSummary>,
    /// When this snapshot was built.
    pub timestamp: DateTime<Utc>,
}

/// How a vendor-name candidate was resolved against the tenant's registry
/// (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBasis {
    /// The candidate matched a registered vendor by substring.
    TextContent,
    /// The candidate did not match any registered vendor.
    UnmatchedCandidate,
}

/// A candidate vendor mention extracted from evidence text, filename, or
/// finding entities, resolved (or not) against the tenant's vendor registry
/// (spec §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorMatch {
    /// The matched vendor's identifier, if resolved.
    pub vendor_id: Option<VendorId>,
    /// The candidate or matched vendor's display name.
    pub name: String,
    /// How this match was resolved.
    pub match_basis: MatchBasis,
    /// The matched vendor's risk score, if resolved.
    pub risk_score: Option<u8>,
    /// The matched vendor's risk level, if resolved.
    pub risk_level: Option<RiskLevel>,
}

/// The correlation built for one workflow run (spec §3, §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    /// Overall feed health snapshot.
    pub watchtower_snapshot: WatchtowerSnapshot,
    /// Vendor-name candidates, matched or not.
    pub vendor_matches: Vec<VendorMatch>,
    /// 3-5 deterministic narrative bullets.
    pub narrative: Vec<String>,
}

/// Returns true for feed items that represent an unresolved alert: every
/// recall and warning letter, and any shortage still `current` (spec §4.6
/// does not define this precisely; see `DESIGN.md`).
#[must_use]
pub fn is_active_alert(item: &FeedItem) -> bool {
    match item.category {
        Category::Recall | Category::WarningLetter => true,
        Category::Shortage => matches!(item.status, Some(ShortageStatus::Current)),
    }
}

/// Builds the correlation for one workflow run from the current DB snapshot
/// (spec §4.6, C6). Pure: the same arguments always produce the same
/// [`Correlation`].
#[must_use]
pub fn build_correlation(
    evidence: &Evidence,
    findings: &[Finding],
    vendors: &[Vendor],
    feed_items: &[FeedItem],
    sync_statuses: &[SyncStatus],
    now: DateTime<Utc>,
) -> Correlation {
    let snapshot = build_snapshot(feed_items, sync_statuses, now);
    let candidates = extract_candidates(evidence, findings);
    let vendor_matches = resolve_candidates(&candidates, vendors);
    let narrative = build_narrative(findings, &snapshot, &vendor_matches, feed_items.len());

    Correlation { watchtower_snapshot: snapshot, vendor_matches, narrative }
}

/// Builds the `watchtower_snapshot` portion of a [`Correlation`].
fn build_snapshot(
    feed_items: &[FeedItem],
    sync_statuses: &[SyncStatus],
    now: DateTime<Utc>,
) -> WatchtowerSnapshot {
    let total_feed_items = u32::try_from(feed_items.len()).unwrap_or(u32::MAX);
    let active_alerts = u32::try_from(feed_items.iter().filter(|item| is_active_alert(item)).count())
        .unwrap_or(u32::MAX);

    let sources_status = SourceId::all()
        .into_iter()
        .map(|source| {
            let status = sync_statuses.iter().find(|row| row.source == source);
            let last_success_at = status.and_then(|row| row.last_success_at);
            let healthy = status.is_some_and(|row| match (row.last_success_at, row.last_error_at) {
                (Some(success), Some(error)) => success >= error,
                (Some(_), None) => true,
                (None, _) => false,
            });
            SourceStatusEntry { source, last_success_at, healthy }
        })
        .collect();

    let mut ordered: Vec<&FeedItem> = feed_items.iter().collect();
    ordered.sort_by(|lhs, rhs| rhs.published_at.cmp(&lhs.published_at));
    let top_items = ordered.into_iter().take(TOP_ITEMS_LIMIT).map(FeedItemSummary::from).collect();

    WatchtowerSnapshot { total_feed_items, active_alerts, sources_status, top_items, timestamp: now }
}

/// Extracts up to [`CANDIDATE_LIMIT`] vendor-name candidates from evidence
/// text, filename, and finding entities, in that order, deduplicated.
fn extract_candidates(evidence: &Evidence, findings: &[Finding]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut candidates = Vec::new();

    if let Some(text) = evidence.extracted_text.as_deref() {
        for captured in VENDOR_CANDIDATE_PATTERN.find_iter(text) {
            push_candidate(captured.as_str().trim().to_string(), &mut seen, &mut candidates);
        }
    }
    for captured in VENDOR_CANDIDATE_PATTERN.find_iter(&evidence.filename) {
        push_candidate(captured.as_str().trim().to_string(), &mut seen, &mut candidates);
    }
    for finding in findings {
        for entity in &finding.entities {
            push_candidate(entity.clone(), &mut seen, &mut candidates);
        }
    }

    candidates
}

/// Records `candidate` in `out` if it is not already present (case-insensitive)
/// and `out` has not yet reached [`CANDIDATE_LIMIT`].
fn push_candidate(candidate: String, seen: &mut std::collections::HashSet<String>, out: &mut Vec<String>) {
    if out.len() >= CANDIDATE_LIMIT {
        return;
    }
    let key = candidate.to_lowercase();
    if seen.insert(key) {
        out.push(candidate);
    }
}

/// Resolves each candidate against the vendor registry by case-insensitive
/// substring match, either direction (spec §4.6). Unmatched candidates
/// shorter than [`MIN_UNMATCHED_LEN`] are dropped entirely; the rest are
/// retained up to [`UNMATCHED_LIMIT`].
fn resolve_candidates(candidates: &[String], vendors: &[Vendor]) -> Vec<VendorMatch> {
    let mut matched = Vec::new();
    let mut unmatched = Vec::new();

    for candidate in candidates {
        let lowered = candidate.to_lowercase();
        let hit = vendors.iter().find(|vendor| {
            let name = vendor.name.to_lowercase();
            name.contains(&lowered) || lowered.contains(&name)
        });

        if let Some(vendor) = hit {
            matched.push(VendorMatch {
                vendor_id: Some(vendor.id),
                name: vendor.name.clone(),
                match_basis: MatchBasis::TextContent,
                risk_score: Some(vendor.risk_score),
                risk_level: Some(vendor.risk_level),
            });
        } else if candidate.len() > MIN_UNMATCHED_LEN && unmatched.len() < UNMATCHED_LIMIT {
            unmatched.push(VendorMatch {
                vendor_id: None,
                name: candidate.clone(),
                match_basis: MatchBasis::UnmatchedCandidate,
                risk_score: None,
                risk_level: None,
            });
        }
    }

    matched.extend(unmatched);
    matched
}

/// Builds 3-5 deterministic narrative bullets from finding, alert, and
/// vendor-risk counts (spec §4.6).
fn build_narrative(
    findings: &[Finding],
    snapshot: &WatchtowerSnapshot,
    vendor_matches: &[VendorMatch],
    total_feed_items: usize,
) -> Vec<String> {
    let mut bullets = Vec::new();

    let high_count = findings.iter().filter(|finding| finding.severity == Severity::High).count();
    if high_count > 0 {
        bullets.push(format!("{high_count} high-severity finding(s) identified in this evidence."));
    }

    if snapshot.active_alerts > 0 {
        bullets.push(format!("{} active regulatory alert(s) across monitored feeds.", snapshot.active_alerts));
    }

    let risky_vendor_count = vendor_matches
        .iter()
        .filter(|m| matches!(m.risk_level, Some(RiskLevel::High | RiskLevel::Critical)))
        .count();
    if risky_vendor_count > 0 {
        bullets.push(format!("{risky_vendor_count} matched vendor(s) carry high or critical risk."));
    }

    bullets.push(format!("{total_feed_items} total feed item(s) currently tracked."));

    for filler in FILLER_BULLETS {
        if bullets.len() >= 3 {
            break;
        }
        bullets.push((*filler).to_string());
    }

    bullets.truncate(5);
    bullets
}

/// Fixed filler bullets, used in order to make up any shortfall below the
/// 3-bullet minimum when no high-severity findings, active alerts, or risky
/// vendor matches contributed a bullet of their own.
const FILLER_BULLETS: [&str; 2] = [
    "No elevated risk signals were identified for this evidence.",
    "Routine monitoring continues across all tracked sources.",
];

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
    use std::num::NonZeroU64;
    use watchtower_core::EvidenceId;
    use watchtower_core::EvidenceStatus;
    use watchtower_core::FindingId;
    use watchtower_core::RunId;
    use watchtower_core::TenantId;

    fn tenant_id() -> TenantId {
        TenantId::new(NonZeroU64::new(1).expect("nonzero"))
    }

    fn evidence_id() -> EvidenceId {
        EvidenceId::new(NonZeroU64::new(1).expect("nonzero"))
    }

    fn run_id() -> RunId {
        RunId::new(NonZeroU64::new(1).expect("nonzero"))
    }

    fn evidence(text: &str, filename: &str) -> Evidence {
        Evidence {
            id: evidence_id(),
            tenant_id: tenant_id(),
            filename: filename.to_string(),
            content_hash: "hash".to_string(),
            extracted_text: Some(text.to_string()),
            status: EvidenceStatus::Processed,
            error_message: None,
            processed_at: Some(Utc::now()),
        }
    }

    fn feed_item(source: SourceId, category: Category, published_at: DateTime<Utc>) -> FeedItem {
        let mut item = FeedItem::new(
            source,
            Some(format!("ext-{}", published_at.timestamp())),
            "Title",
            None,
            Some(published_at),
            None,
            None,
            None,
            Vec::new(),
            serde_json::json!({}),
            Utc::now(),
        );
        item.category = category;
        item
    }

    #[test]
    fn extracts_and_matches_vendor_candidates() {
        let evidence = evidence("Manufactured by Acme Pharma Inc under agreement.", "report.pdf");
        let vendor = Vendor::new(
            VendorId::new(NonZeroU64::new(1).expect("nonzero")),
            tenant_id(),
            "Acme Pharma Inc",
            "ACME",
            "US",
            80,
            true,
        );
        let correlation = build_correlation(&evidence, &[], &[vendor], &[], &[], Utc::now());
        assert!(correlation.vendor_matches.iter().any(|m| m.match_basis == MatchBasis::TextContent));
    }

    #[test]
    fn unmatched_candidate_retained_when_no_vendor_matches() {
        let evidence = evidence("Shipped via Globex Logistics Corp for distribution.", "shipment.pdf");
        let correlation = build_correlation(&evidence, &[], &[], &[], &[], Utc::now());
        assert!(correlation.vendor_matches.iter().any(|m| m.match_basis == MatchBasis::UnmatchedCandidate));
    }

    #[test]
    fn snapshot_counts_active_alerts_and_orders_top_items() {
        let early = Utc::now() - chrono::Duration::days(2);
        let late = Utc::now() - chrono::Duration::days(1);
        let items = vec![
            feed_item(SourceId::FdaRecalls, Category::Recall, early),
            feed_item(SourceId::FdaShortages, Category::Shortage, late),
        ];
        let evidence = evidence("No vendor mentions here.", "doc.pdf");
        let correlation = build_correlation(&evidence, &[], &[], &items, &[], Utc::now());
        assert_eq!(correlation.watchtower_snapshot.total_feed_items, 2);
        assert_eq!(correlation.watchtower_snapshot.active_alerts, 1);
        assert_eq!(correlation.watchtower_snapshot.top_items[0].published_at, Some(late));
    }

    #[test]
    fn narrative_has_between_three_and_five_bullets() {
        let evidence = evidence("Plain text with no signals.", "doc.pdf");
        let finding = Finding {
            id: Some(FindingId::new(NonZeroU64::new(1).expect("nonzero"))),
            run_id: run_id(),
            evidence_id: evidence_id(),
            title: "Cold chain deviation".to_string(),
            description: "desc".to_string(),
            severity: Severity::High,
            cfr_refs: vec!["21 CFR 203.32".to_string()],
            citations: vec!["citation".to_string()],
            entities: Vec::new(),
        };
        let correlation = build_correlation(&evidence, &[finding], &[], &[], &[], Utc::now());
        assert!(correlation.narrative.len() >= 3);
        assert!(correlation.narrative.len() <= 5);
    }

    #[test]
    fn same_inputs_produce_same_output() {
        let evidence = evidence("Acme Pharma Inc signed off.", "doc.pdf");
        let now = Utc::now();
        let first = build_correlation(&evidence, &[], &[], &[], &[], now);
        let second = build_correlation(&evidence, &[], &[], &[], &[], now);
        assert_eq!(first, second);
    }
}

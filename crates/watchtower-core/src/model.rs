// crates/watchtower-core/src/model.rs
// ============================================================================
// Module: Watchtower Canonical Model
// Description: The entities from spec §3 (Tenant, Vendor, FeedItem,
//              SyncStatus, Evidence, WorkflowRun, Finding, ActionPlan,
//              AuditEntry) and the closed enumerations they are built from.
// Purpose: Give every component in the workspace one shared, validated
//          representation of the data the system persists.
// Dependencies: chrono, serde
// ============================================================================

//! ## Overview
//! Constructors here enforce only the invariants that do not require a
//! database round trip (closed enum membership, required fields, id
//! derivation). Uniqueness, foreign-key, and lifecycle-transition
//! invariants are enforced by `watchtower-store-sqlite`, the sole writer.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::ids::EvidenceId;
use crate::ids::FindingId;
use crate::ids::RunId;
use crate::ids::TenantId;
use crate::ids::VendorId;
use crate::normalize::derive_external_id;

// ============================================================================
// SECTION: Closed enumerations
// ============================================================================

/// The registered set of feed categories (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Drug recall notice.
    Recall,
    /// Drug shortage notice.
    Shortage,
    /// FDA warning letter.
    WarningLetter,
}

impl Category {
    /// Returns the lowercase wire label for this category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recall => "recall",
            Self::Shortage => "shortage",
            Self::WarningLetter => "warning_letter",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized shortage status (spec §4.1). Total over all upstream inputs
/// via [`crate::normalize::normalize_shortage_status`]; absence is `None`,
/// never the literal string `"Unknown"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortageStatus {
    /// Drug is currently in shortage.
    Current,
    /// Shortage has been resolved.
    Resolved,
    /// Shortage record was terminated (no longer tracked).
    Terminated,
}

impl ShortageStatus {
    /// Returns the lowercase wire label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Resolved => "resolved",
            Self::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for ShortageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered feed source identifiers (spec §2, C2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// FDA drug recalls feed.
    FdaRecalls,
    /// FDA drug shortages feed.
    FdaShortages,
    /// FDA warning letters feed.
    FdaWarningLetters,
}

impl SourceId {
    /// Returns the lowercase wire label for this source.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FdaRecalls => "fda_recalls",
            Self::FdaShortages => "fda_shortages",
            Self::FdaWarningLetters => "fda_warning_letters",
        }
    }

    /// Parses a source id from its wire label.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "fda_recalls" => Some(Self::FdaRecalls),
            "fda_shortages" => Some(Self::FdaShortages),
            "fda_warning_letters" => Some(Self::FdaWarningLetters),
            _ => None,
        }
    }

    /// Returns the category this source's items belong to.
    #[must_use]
    pub const fn category(self) -> Category {
        match self {
            Self::FdaRecalls => Category::Recall,
            Self::FdaShortages => Category::Shortage,
            Self::FdaWarningLetters => Category::WarningLetter,
        }
    }

    /// The full registered set, in enumeration order.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::FdaRecalls, Self::FdaShortages, Self::FdaWarningLetters]
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finding severity (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Low severity.
    Low,
    /// Medium severity.
    Medium,
    /// High severity.
    High,
}

impl Severity {
    /// Returns the uppercase wire label for this severity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vendor risk level, a derived cache of [`Vendor::risk_score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// 0–24.
    Low,
    /// 25–49.
    Medium,
    /// 50–69.
    High,
    /// 70–100.
    Critical,
}

impl RiskLevel {
    /// Derives the risk level for a 0–100 risk score.
    ///
    /// Thresholds (`>=70` critical, `>=50` high, `>=25` medium, else low)
    /// are taken from the original vendor risk-scoring service; see
    /// `DESIGN.md`.
    #[must_use]
    pub const fn for_score(score: u8) -> Self {
        if score >= 70 {
            Self::Critical
        } else if score >= 50 {
            Self::High
        } else if score >= 25 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Returns the lowercase wire label for this risk level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evidence document processing status (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    /// Uploaded, not yet queued for extraction.
    Pending,
    /// Extraction is in progress.
    Processing,
    /// Extraction succeeded; text is available.
    Processed,
    /// Extraction failed.
    Failed,
}

impl EvidenceStatus {
    /// Returns the lowercase wire label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EvidenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow run lifecycle status (spec §3, §4.9).
///
/// # Invariants
/// - `Pending` is transient and never observed by callers outside the store.
/// - `Success` and `Failed` are terminal; no further transition is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    /// Row created, not yet running. Never exposed to callers.
    Pending,
    /// Pipeline is executing.
    Running,
    /// Pipeline completed with findings, correlation, and an action plan.
    Success,
    /// Pipeline aborted; `error_message` is set.
    Failed,
}

impl WorkflowRunStatus {
    /// Returns the lowercase wire label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `Success` and `Failed`, the two terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for WorkflowRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Entities
// ============================================================================

/// Opaque tenant row. Tenants own vendors, evidence, and workflow runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant identifier.
    pub id: TenantId,
    /// Display name.
    pub name: String,
}

/// A tenant's vendor registry entry (spec §3).
///
/// # Invariants
/// - `risk_score` is in `0..=100`.
/// - `risk_level` is always [`RiskLevel::for_score`] of `risk_score`; callers
///   must not construct a mismatched pair directly; use [`Vendor::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    /// Vendor identifier.
    pub id: VendorId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Vendor display name.
    pub name: String,
    /// Short vendor code.
    pub code: String,
    /// ISO country name or code.
    pub country: String,
    /// Risk score, 0–100.
    pub risk_score: u8,
    /// Derived risk level cache of `risk_score`.
    pub risk_level: RiskLevel,
    /// Whether the vendor is approved.
    pub approved: bool,
}

impl Vendor {
    /// Builds a vendor, deriving `risk_level` from `risk_score` so the two
    /// fields can never disagree.
    #[must_use]
    pub fn new(
        id: VendorId,
        tenant_id: TenantId,
        name: impl Into<String>,
        code: impl Into<String>,
        country: impl Into<String>,
        risk_score: u8,
        approved: bool,
    ) -> Self {
        Self {
            id,
            tenant_id,
            name: name.into(),
            code: code.into(),
            country: country.into(),
            risk_score,
            risk_level: RiskLevel::for_score(risk_score),
            approved,
        }
    }
}

/// A normalized item ingested from an external regulatory feed (spec §3, C1).
///
/// # Invariants
/// - `external_id` is non-empty.
/// - `(source, external_id)` is unique across the store (enforced by
///   `watchtower-store-sqlite`, not by this constructor).
/// - `vendor_name`, `status`, and `title` never contain the literal string
///   `"Unknown"` as a placeholder for an absent value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Registered source this item was ingested from.
    pub source: SourceId,
    /// Stable identifier, upstream-provided or derived (spec §4.1).
    pub external_id: String,
    /// Display title.
    pub title: String,
    /// Link to the source document or page.
    pub url: Option<String>,
    /// Upstream publication time.
    pub published_at: Option<DateTime<Utc>>,
    /// Brief description or snippet.
    pub summary: Option<String>,
    /// Feed category, drawn from the closed set.
    pub category: Category,
    /// Manufacturer/vendor name, if the upstream provided one.
    pub vendor_name: Option<String>,
    /// Normalized status label, if applicable (primarily shortages).
    pub status: Option<ShortageStatus>,
    /// Free-form tags for filtering.
    pub tags: Vec<String>,
    /// Original upstream payload, retained for reference.
    pub raw_payload: serde_json::Value,
    /// When this item was fetched by the sync engine.
    pub ingested_at: DateTime<Utc>,
}

impl FeedItem {
    /// Builds a feed item, enforcing that `external_id` is present, deriving
    /// it deterministically via [`derive_external_id`] when the caller has
    /// no stable upstream identifier.
    #[must_use]
    pub fn new(
        source: SourceId,
        external_id: Option<String>,
        title: impl Into<String>,
        url: Option<String>,
        published_at: Option<DateTime<Utc>>,
        summary: Option<String>,
        vendor_name: Option<String>,
        status: Option<ShortageStatus>,
        tags: Vec<String>,
        raw_payload: serde_json::Value,
        ingested_at: DateTime<Utc>,
    ) -> Self {
        let title = title.into();
        let external_id = external_id.filter(|id| !id.is_empty()).unwrap_or_else(|| {
            derive_external_id(source.as_str(), url.as_deref(), published_at, &title)
        });
        Self {
            source,
            external_id,
            title,
            url,
            published_at,
            summary,
            category: source.category(),
            vendor_name,
            status,
            tags,
            raw_payload,
            ingested_at,
        }
    }
}

/// Per-source sync telemetry row (spec §3, §4.5). One row per source,
/// global (not tenant-scoped), upserted on every sync.
///
/// # Invariants
/// - `last_success_at <= last_run_at` and `last_error_at <= last_run_at`
///   whenever those fields are set (enforced by the store on upsert).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Source this telemetry row concerns.
    pub source: SourceId,
    /// Timestamp of the most recent sync attempt.
    pub last_run_at: DateTime<Utc>,
    /// Timestamp of the most recent successful sync, if any.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Timestamp of the most recent failed sync, if any.
    pub last_error_at: Option<DateTime<Utc>>,
    /// Message from the most recent failure, if any.
    pub last_error_message: Option<String>,
    /// HTTP status observed on the most recent attempt, if any.
    pub last_http_status: Option<u16>,
    /// Items fetched on the most recent attempt.
    pub items_fetched: u32,
    /// Items newly persisted on the most recent attempt.
    pub items_saved: u32,
}

/// An uploaded, externally processed evidence document (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Evidence identifier.
    pub id: EvidenceId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Original filename.
    pub filename: String,
    /// Content hash of the uploaded file.
    pub content_hash: String,
    /// Extracted text, present once `status` reaches `processed`.
    pub extracted_text: Option<String>,
    /// Processing status.
    pub status: EvidenceStatus,
    /// Extraction error message, if `status == failed`.
    pub error_message: Option<String>,
    /// When extraction completed, if terminal.
    pub processed_at: Option<DateTime<Utc>>,
}

/// The atomic execution of findings + correlation + action plan for one
/// piece of evidence (spec §3, §4.9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Run identifier.
    pub id: RunId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Evidence this run was executed against.
    pub evidence_id: EvidenceId,
    /// Lifecycle status.
    pub status: WorkflowRunStatus,
    /// When the run was created.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state, if it has.
    pub completed_at: Option<DateTime<Utc>>,
    /// Captured failure message, if `status == failed`.
    pub error_message: Option<String>,
    /// Number of findings attached to this run.
    pub findings_count: u32,
    /// Number of correlations built for this run (always 0 or 1; see
    /// `DESIGN.md` for why this is not always exactly 1 even on success).
    pub correlations_count: u32,
    /// Number of actions in this run's action plan.
    pub actions_count: u32,
}

/// A structured compliance observation with regulatory citations (spec §3, C7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Identifier, assigned by the store, scoped to the owning run.
    pub id: Option<FindingId>,
    /// Owning run.
    pub run_id: RunId,
    /// Evidence the finding was extracted from.
    pub evidence_id: EvidenceId,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Severity.
    pub severity: Severity,
    /// CFR section references.
    pub cfr_refs: Vec<String>,
    /// Human-readable citation strings.
    pub citations: Vec<String>,
    /// Entities (e.g. vendor name candidates) mentioned by this finding.
    pub entities: Vec<String>,
}

/// One recommended action within an [`ActionPlan`] (spec §3, C8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Priority label (`high`, `medium`, `low`).
    pub priority: String,
    /// Role label responsible for the action.
    pub owner: String,
    /// Relative deadline label (e.g. `"within 7 days"`).
    pub deadline: String,
}

/// The prioritized recommendations synthesized from findings + correlation
/// for a successful run (spec §3, C8). Exactly one exists per successful run.
///
/// # Invariants
/// - `correlation_snapshot` is never empty (spec invariant 4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    /// Owning run.
    pub run_id: RunId,
    /// Evidence this plan was synthesized for.
    pub evidence_id: EvidenceId,
    /// Narrative explaining the plan's basis.
    pub rationale: String,
    /// The individual actions.
    pub actions: Vec<ActionItem>,
    /// Deduplicated owners projected from `actions`.
    pub owners: Vec<String>,
    /// Deduplicated deadlines projected from `actions`.
    pub deadlines: Vec<String>,
    /// The correlation snapshot this plan was built against.
    pub correlation_snapshot: serde_json::Value,
}

/// An append-only audit trail entry (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Acting principal, if known.
    pub actor_id: Option<String>,
    /// Action label (e.g. `"workflow_run_completed"`).
    pub action: String,
    /// Entity type this entry concerns, if any.
    pub entity_type: Option<String>,
    /// Entity identifier this entry concerns, if any.
    pub entity_id: Option<String>,
    /// Structured detail payload.
    pub details: serde_json::Value,
    /// When this entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Originating network address, if captured by the request context.
    pub source_address: Option<String>,
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
    fn vendor_risk_level_tracks_score() {
        let v = Vendor::new(
            VendorId::from_raw(1).expect("nonzero"),
            TenantId::from_raw(1).expect("nonzero"),
            "Acme Pharma",
            "ACME",
            "USA",
            72,
            true,
        );
        assert_eq!(v.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn feed_item_derives_external_id_when_absent() {
        let item = FeedItem::new(
            SourceId::FdaRecalls,
            None,
            "Recall of Widget",
            Some("https://example.test/a".to_string()),
            None,
            None,
            None,
            None,
            vec![],
            serde_json::json!({}),
            Utc::now(),
        );
        assert_eq!(item.external_id.len(), 32);
        assert_eq!(item.category, Category::Recall);
    }

    #[test]
    fn feed_item_never_uses_unknown_literal() {
        let item = FeedItem::new(
            SourceId::FdaShortages,
            Some("ext-1".to_string()),
            "Shortage of Widget",
            None,
            None,
            None,
            None,
            None,
            vec![],
            serde_json::json!({}),
            Utc::now(),
        );
        assert!(item.vendor_name.is_none());
        assert!(item.status.is_none());
        assert_ne!(item.title, "Unknown");
    }
}

// crates/watchtower-core/src/error.rs
// ============================================================================
// Module: Watchtower Error Taxonomy
// Description: The closed, stable error identifiers exposed at every public
//              boundary, and a generic wrapper error type components may
//              return directly.
// Purpose: Give callers a programmatically stable `error` tag independent of
//          the human-readable message, per spec §6–§7.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`ErrorKind`] is the closed enumeration from spec §7. Every component
//! error type in this workspace implements `kind(&self) -> ErrorKind` so a
//! caller at the crate boundary can always recover the stable identifier,
//! regardless of which component produced the failure.

use thiserror::Error;

/// Stable, closed set of error identifiers surfaced to callers.
///
/// # Invariants
/// - Variants never change meaning once shipped; new variants may be added.
/// - Serializes as the lowercase `snake_case` tag named in spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Evidence row does not exist or does not belong to the tenant.
    EvidenceNotFound,
    /// Evidence exists but has not completed processing.
    EvidenceNotProcessed,
    /// Evidence status is `pending`.
    EvidencePending,
    /// Evidence status is `processing`.
    EvidenceProcessing,
    /// Evidence status is `failed`.
    EvidenceFailed,
    /// Evidence has no extracted text.
    EvidenceEmpty,
    /// No successful workflow run exists for the evidence.
    NoWorkflowRun,
    /// A referenced workflow run does not exist.
    WorkflowRunNotFound,
    /// A referenced workflow run did not complete successfully.
    WorkflowRunNotSuccessful,
    /// A successful run has no findings.
    FindingsMissing,
    /// A successful run has no action plan.
    ActionPlanMissing,
    /// An action plan has no correlation snapshot.
    CorrelationMissing,
    /// A provider returned a non-2xx response after exhausting retries/fallbacks.
    ProviderHttpError,
    /// A provider payload could not be parsed.
    ProviderParseError,
    /// Every primary and fallback URL for a provider failed.
    ProviderAllSourcesFailed,
    /// The database could not be reached or is read-only.
    DbUnavailable,
    /// A write violated a database constraint (most commonly the feed-item
    /// uniqueness constraint; recovered locally, never surfaced upward).
    DbConstraintViolation,
    /// The cache layer is unavailable; callers degrade to a live fetch.
    CacheUnavailable,
    /// The operation was cancelled before completion.
    Cancelled,
    /// The operation exceeded its configured deadline.
    Timeout,
    /// An unexpected, non-taxonomy failure. Details are logged, not surfaced.
    InternalError,
}

impl ErrorKind {
    /// Returns the stable `snake_case` wire label for this error kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EvidenceNotFound => "evidence_not_found",
            Self::EvidenceNotProcessed => "evidence_not_processed",
            Self::EvidencePending => "evidence_pending",
            Self::EvidenceProcessing => "evidence_processing",
            Self::EvidenceFailed => "evidence_failed",
            Self::EvidenceEmpty => "evidence_empty",
            Self::NoWorkflowRun => "no_workflow_run",
            Self::WorkflowRunNotFound => "workflow_run_not_found",
            Self::WorkflowRunNotSuccessful => "workflow_run_not_successful",
            Self::FindingsMissing => "findings_missing",
            Self::ActionPlanMissing => "action_plan_missing",
            Self::CorrelationMissing => "correlation_missing",
            Self::ProviderHttpError => "provider_http_error",
            Self::ProviderParseError => "provider_parse_error",
            Self::ProviderAllSourcesFailed => "provider_all_sources_failed",
            Self::DbUnavailable => "db_unavailable",
            Self::DbConstraintViolation => "db_constraint_violation",
            Self::CacheUnavailable => "cache_unavailable",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured refusal returned by a public boundary operation.
///
/// # Invariants
/// - `kind` is always one of the closed [`ErrorKind`] variants.
/// - `message` is human-readable and safe to surface to an operator.
#[derive(Debug, Error, Clone)]
#[error("{kind}: {message}")]
pub struct WatchtowerError {
    /// Stable error identifier.
    pub kind: ErrorKind,
    /// Human-readable explanation.
    pub message: String,
    /// Evidence identifier this refusal concerns, if any.
    pub evidence_id: Option<crate::ids::EvidenceId>,
    /// Workflow run identifier this refusal concerns, if any.
    pub run_id: Option<crate::ids::RunId>,
    /// A suggested remediation, surfaced to the caller as `action_required`.
    pub action_required: Option<String>,
}

impl WatchtowerError {
    /// Builds a refusal carrying only a kind and message.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            evidence_id: None,
            run_id: None,
            action_required: None,
        }
    }

    /// Attaches the evidence identifier this refusal concerns.
    #[must_use]
    pub const fn with_evidence(mut self, evidence_id: crate::ids::EvidenceId) -> Self {
        self.evidence_id = Some(evidence_id);
        self
    }

    /// Attaches the run identifier this refusal concerns.
    #[must_use]
    pub const fn with_run(mut self, run_id: crate::ids::RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Attaches a suggested remediation.
    #[must_use]
    pub fn with_action_required(mut self, action: impl Into<String>) -> Self {
        self.action_required = Some(action.into());
        self
    }
}

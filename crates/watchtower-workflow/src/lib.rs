// crates/watchtower-workflow/src/lib.rs
// ============================================================================
// Module: Watchtower Workflow Orchestrator
// Description: Enforces evidence preconditions, then runs findings
//              extraction, correlation, and action planning as one serial
//              unit of work over a persisted `WorkflowRun`.
// Purpose: The single entry point that turns processed evidence into a
//          citable compliance review (spec §4.9, C9).
// Dependencies: chrono, tracing, watchtower-actions, watchtower-core,
//               watchtower-correlation, watchtower-findings,
//               watchtower-store-sqlite
// ============================================================================

//! ## Overview
//! [`run_workflow`] checks three preconditions before it writes anything.
//! Once a [`WorkflowRun`] row exists, every later failure is captured onto
//! that row and returned as [`WorkflowOutcome::Failed`] rather than an
//! error: the run is a first-class, retained artifact, never idempotent.
//! A second call for the same evidence always starts a new run (spec §4.9).

#![forbid(unsafe_code)]

use chrono::DateTime;
use chrono::Utc;
use watchtower_core::ActionPlan;
use watchtower_core::AuditEntry;
use watchtower_core::ErrorKind;
use watchtower_core::EvidenceId;
use watchtower_core::EvidenceStatus;
use watchtower_core::Finding;
use watchtower_core::RunId;
use watchtower_core::TenantId;
use watchtower_core::WatchtowerError;
use watchtower_core::WorkflowRun;
use watchtower_core::WorkflowRunStatus;
use watchtower_store_sqlite::SqliteStore;
use watchtower_store_sqlite::StoreError;

/// The result of a completed `RunWorkflow` call (spec §4.9, C9).
///
/// Unlike the precondition checks, a failure during execution is not an
/// `Err`: the run was already created and is retained for post-mortem, so
/// callers receive it as data.
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    /// Every step completed; the run, its findings, and its action plan are
    /// all persisted.
    Success {
        /// The completed run, in status `success`.
        run: WorkflowRun,
        /// Findings extracted and persisted for this run.
        findings: Vec<Finding>,
        /// The action plan attached to this run.
        action_plan: ActionPlan,
    },
    /// A step after run creation failed; the run is persisted in status
    /// `failed` with `error_message` set.
    Failed {
        /// The failed run, retained for post-mortem.
        run: WorkflowRun,
    },
}

/// Runs the compliance review workflow for one piece of processed evidence
/// (spec §4.9, C9).
///
/// Checks, in order: the evidence exists and belongs to `tenant_id`; its
/// status is `processed`; and it has non-empty extracted text. Any failed
/// precondition returns `Err` before a run is ever created. Once a run
/// exists, extraction, correlation, and action-plan failures are captured
/// onto the run itself rather than returned as an error.
///
/// # Errors
///
/// Returns [`WatchtowerError`] with kind `evidence_not_found`,
/// `evidence_pending`, `evidence_processing`, `evidence_failed`,
/// `evidence_empty`, or `db_unavailable`/`internal_error` if a precondition
/// fails or the store cannot be reached.
pub fn run_workflow(
    store: &SqliteStore,
    tenant_id: TenantId,
    evidence_id: EvidenceId,
    actor_id: Option<String>,
) -> Result<WorkflowOutcome, WatchtowerError> {
    let evidence = store
        .get_evidence(tenant_id, evidence_id)
        .map_err(|err| store_error(err, evidence_id))?
        .ok_or_else(|| {
            WatchtowerError::new(ErrorKind::EvidenceNotFound, "evidence not found").with_evidence(evidence_id)
        })?;

    match evidence.status {
        EvidenceStatus::Processed => {}
        EvidenceStatus::Pending => {
            return Err(WatchtowerError::new(ErrorKind::EvidencePending, "evidence has not been processed yet")
                .with_evidence(evidence_id));
        }
        EvidenceStatus::Processing => {
            return Err(WatchtowerError::new(ErrorKind::EvidenceProcessing, "evidence is still processing")
                .with_evidence(evidence_id));
        }
        EvidenceStatus::Failed => {
            return Err(WatchtowerError::new(ErrorKind::EvidenceFailed, "evidence extraction failed")
                .with_evidence(evidence_id));
        }
    }

    let text = match evidence.extracted_text.as_deref() {
        Some(text) if !text.trim().is_empty() => text,
        _ => {
            return Err(WatchtowerError::new(ErrorKind::EvidenceEmpty, "evidence has no extracted text")
                .with_evidence(evidence_id));
        }
    };

    let started_at = watchtower_core::time::now();
    let run_id = store
        .create_workflow_run(tenant_id, evidence_id, started_at)
        .map_err(|err| store_error(err, evidence_id))?;

    match execute(store, tenant_id, evidence_id, run_id, text) {
        Ok((findings, action_plan)) => {
            let completed_at = watchtower_core::time::now();
            let actions_count = u32::try_from(action_plan.actions.len()).unwrap_or(u32::MAX);
            let findings_count = u32::try_from(findings.len()).unwrap_or(u32::MAX);
            if let Err(err) = store.mark_run_terminal(
                run_id,
                WorkflowRunStatus::Success,
                None,
                completed_at,
                findings_count,
                1,
                actions_count,
            ) {
                tracing::warn!(run_id = %run_id, error = %err, "failed to mark workflow run successful");
            }
            append_audit_entry(store, tenant_id, actor_id, evidence_id, run_id, "workflow_run_completed", completed_at);
            let run = store
                .get_run(tenant_id, run_id)
                .map_err(|err| store_error(err, evidence_id))?
                .ok_or_else(|| {
                    WatchtowerError::new(ErrorKind::InternalError, "run vanished after completion")
                        .with_evidence(evidence_id)
                        .with_run(run_id)
                })?;
            Ok(WorkflowOutcome::Success { run, findings, action_plan })
        }
        Err(message) => {
            let completed_at = watchtower_core::time::now();
            if let Err(err) =
                store.mark_run_terminal(run_id, WorkflowRunStatus::Failed, Some(&message), completed_at, 0, 0, 0)
            {
                tracing::warn!(run_id = %run_id, error = %err, "failed to mark workflow run failed");
            }
            append_audit_entry(store, tenant_id, actor_id, evidence_id, run_id, "workflow_run_failed", completed_at);
            let run = store
                .get_run(tenant_id, run_id)
                .map_err(|err| store_error(err, evidence_id))?
                .ok_or_else(|| {
                    WatchtowerError::new(ErrorKind::InternalError, "run vanished after failure")
                        .with_evidence(evidence_id)
                        .with_run(run_id)
                })?;
            Ok(WorkflowOutcome::Failed { run })
        }
    }
}

/// Runs steps 2 through 5 of the workflow: extract findings, build the
/// correlation snapshot, build the action plan, and persist both. Returns
/// the captured error message on any failure, matching the "thrown
/// exception" language of spec §4.9 without actually unwinding.
fn execute(
    store: &SqliteStore,
    tenant_id: TenantId,
    evidence_id: EvidenceId,
    run_id: RunId,
    text: &str,
) -> Result<(Vec<Finding>, ActionPlan), String> {
    let findings = watchtower_findings::extract_findings(run_id, evidence_id, text);
    let findings = store
        .append_findings(run_id, &findings)
        .map_err(|err| format!("failed to persist findings: {err}"))?;

    let evidence = store
        .get_evidence(tenant_id, evidence_id)
        .map_err(|err| format!("failed to reload evidence: {err}"))?
        .ok_or_else(|| "evidence vanished mid-run".to_string())?;
    let vendors = store.list_vendors(tenant_id).map_err(|err| format!("failed to list vendors: {err}"))?;
    let sync_statuses =
        store.list_sync_statuses().map_err(|err| format!("failed to list sync statuses: {err}"))?;
    let total_feed_items = store.count_feed_items().map_err(|err| format!("failed to count feed items: {err}"))?;
    let feed_limit = u32::try_from(total_feed_items).unwrap_or(u32::MAX);
    let feed_items =
        store.recent_feed_items(feed_limit).map_err(|err| format!("failed to list feed items: {err}"))?;

    let correlation = watchtower_correlation::build_correlation(
        &evidence,
        &findings,
        &vendors,
        &feed_items,
        &sync_statuses,
        watchtower_core::time::now(),
    );

    let action_plan = watchtower_actions::build_action_plan(run_id, evidence_id, &findings, &correlation);
    store
        .attach_action_plan(&action_plan)
        .map_err(|err| format!("failed to persist action plan: {err}"))?;

    Ok((findings, action_plan))
}

/// Maps a [`StoreError`] onto [`WatchtowerError`], attaching `evidence_id`.
fn store_error(err: StoreError, evidence_id: EvidenceId) -> WatchtowerError {
    WatchtowerError::new(err.kind(), err.to_string()).with_evidence(evidence_id)
}

/// Appends the audit entry recording the run's terminal outcome. Never
/// fails the workflow itself: the store already swallows its own write
/// errors (spec §4.4).
fn append_audit_entry(
    store: &SqliteStore,
    tenant_id: TenantId,
    actor_id: Option<String>,
    evidence_id: EvidenceId,
    run_id: RunId,
    action: &str,
    timestamp: DateTime<Utc>,
) {
    store.append_audit_entry(&AuditEntry {
        tenant_id,
        actor_id,
        action: action.to_string(),
        entity_type: Some("workflow_run".to_string()),
        entity_id: Some(run_id.get().to_string()),
        details: serde_json::json!({ "evidence_id": evidence_id.get() }),
        timestamp,
        source_address: None,
    });
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
    use watchtower_core::Evidence;

    fn new_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("in-memory store")
    }

    fn new_tenant(store: &SqliteStore) -> TenantId {
        store.insert_tenant("Acme Pharma Holdings").expect("insert tenant")
    }

    fn insert_evidence(store: &SqliteStore, tenant_id: TenantId, status: EvidenceStatus, text: Option<&str>) -> EvidenceId {
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

    #[test]
    fn rejects_unknown_evidence() {
        let store = new_store();
        let tenant_id = new_tenant(&store);
        let bogus = EvidenceId::new(std::num::NonZeroU64::new(9999).expect("nonzero"));
        let err = run_workflow(&store, tenant_id, bogus, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::EvidenceNotFound);
    }

    #[test]
    fn rejects_evidence_not_yet_processed() {
        let store = new_store();
        let tenant_id = new_tenant(&store);
        let evidence_id = insert_evidence(&store, tenant_id, EvidenceStatus::Pending, None);
        let err = run_workflow(&store, tenant_id, evidence_id, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::EvidencePending);
    }

    #[test]
    fn rejects_processed_evidence_with_empty_text() {
        let store = new_store();
        let tenant_id = new_tenant(&store);
        let evidence_id = insert_evidence(&store, tenant_id, EvidenceStatus::Processed, Some("   "));
        let err = run_workflow(&store, tenant_id, evidence_id, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::EvidenceEmpty);
    }

    #[test]
    fn succeeds_for_processed_evidence_with_text() {
        let store = new_store();
        let tenant_id = new_tenant(&store);
        let evidence_id = insert_evidence(
            &store,
            tenant_id,
            EvidenceStatus::Processed,
            Some("The batch record shows a cold chain temperature excursion during transit."),
        );
        let outcome = run_workflow(&store, tenant_id, evidence_id, Some("inspector-1".to_string())).unwrap();
        match outcome {
            WorkflowOutcome::Success { run, findings, action_plan } => {
                assert_eq!(run.status, WorkflowRunStatus::Success);
                assert!(!findings.is_empty());
                assert!(!action_plan.actions.is_empty());
                assert!(findings.iter().all(|f| f.id.is_some()));
            }
            WorkflowOutcome::Failed { run } => panic!("expected success, got failed run: {run:?}"),
        }
    }

    #[test]
    fn second_run_for_same_evidence_creates_a_new_run() {
        let store = new_store();
        let tenant_id = new_tenant(&store);
        let evidence_id =
            insert_evidence(&store, tenant_id, EvidenceStatus::Processed, Some("Supplier qualification review."));
        let first = run_workflow(&store, tenant_id, evidence_id, None).unwrap();
        let second = run_workflow(&store, tenant_id, evidence_id, None).unwrap();
        let first_id = match first {
            WorkflowOutcome::Success { run, .. } => run.id,
            WorkflowOutcome::Failed { run } => run.id,
        };
        let second_id = match second {
            WorkflowOutcome::Success { run, .. } => run.id,
            WorkflowOutcome::Failed { run } => run.id,
        };
        assert_ne!(first_id, second_id);
    }
}

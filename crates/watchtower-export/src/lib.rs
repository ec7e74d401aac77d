// crates/watchtower-export/src/lib.rs
// ============================================================================
// Module: Watchtower Export Validator & Renderer
// Description: Validates that a workflow run is complete enough to export,
//              then renders a deterministic audit packet from it.
// Purpose: Give an auditor a single, self-contained artifact covering one
//          evidence review (spec §4.10, C10).
// Dependencies: chrono, serde_json, watchtower-core, watchtower-correlation,
//               watchtower-store-sqlite
// ============================================================================

//! ## Overview
//! [`export_audit_packet`] refuses in the exact order spec §4.10 lists: not
//! found, not processed, no run, run not successful, findings missing,
//! action plan missing, correlation missing. Once every check passes the
//! render itself cannot fail: it only ever produces warnings, which are
//! written to the audit log rather than the packet (spec §4.10: no literal
//! `"N/A"`/`"Unknown"` substitutions for missing owner/deadline/CFR refs).

#![forbid(unsafe_code)]

use chrono::DateTime;
use chrono::Utc;
use watchtower_core::ActionPlan;
use watchtower_core::AuditEntry;
use watchtower_core::ErrorKind;
use watchtower_core::Evidence;
use watchtower_core::EvidenceId;
use watchtower_core::EvidenceStatus;
use watchtower_core::Finding;
use watchtower_core::RunId;
use watchtower_core::TenantId;
use watchtower_core::WatchtowerError;
use watchtower_core::WorkflowRun;
use watchtower_core::WorkflowRunStatus;
use watchtower_correlation::Correlation;
use watchtower_store_sqlite::SqliteStore;
use watchtower_store_sqlite::StoreError;

/// Evidence text excerpts are truncated to this many characters (spec §4.10).
const EXCERPT_LIMIT: usize = 500;

/// A rendered audit packet, ready to be written to a response or a file.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    /// The rendered document.
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`.
    pub content_type: String,
    /// Suggested filename for `bytes`.
    pub filename: String,
}

/// Validates and renders the audit packet for one evidence review (spec
/// §4.10, C10).
///
/// When `run_id` is `None`, the latest successful run for `evidence_id` is
/// used. When given, that exact run must exist and have succeeded.
///
/// # Errors
///
/// Returns [`WatchtowerError`] with kind `evidence_not_found`,
/// `evidence_not_processed`, `no_workflow_run`, `workflow_run_not_found`,
/// `workflow_run_not_successful`, `findings_missing`, `action_plan_missing`,
/// `correlation_missing`, or `db_unavailable`/`internal_error`.
pub fn export_audit_packet(
    store: &SqliteStore,
    tenant_id: TenantId,
    evidence_id: EvidenceId,
    run_id: Option<RunId>,
    actor_id: Option<String>,
) -> Result<ExportArtifact, WatchtowerError> {
    let evidence = store
        .get_evidence(tenant_id, evidence_id)
        .map_err(|err| store_error(err, evidence_id))?
        .ok_or_else(|| {
            WatchtowerError::new(ErrorKind::EvidenceNotFound, "evidence not found").with_evidence(evidence_id)
        })?;
    if evidence.status != EvidenceStatus::Processed {
        return Err(WatchtowerError::new(ErrorKind::EvidenceNotProcessed, "evidence has not been processed")
            .with_evidence(evidence_id));
    }

    let run = resolve_run(store, tenant_id, evidence_id, run_id)?;

    let bundle = store
        .read_export_bundle(tenant_id, evidence_id, Some(run.id))
        .map_err(|err| store_error(err, evidence_id).with_run(run.id))?;
    if bundle.findings.is_empty() {
        return Err(WatchtowerError::new(ErrorKind::FindingsMissing, "run has no findings")
            .with_evidence(evidence_id)
            .with_run(run.id));
    }
    let action_plan = bundle.action_plan.ok_or_else(|| {
        WatchtowerError::new(ErrorKind::ActionPlanMissing, "run has no action plan")
            .with_evidence(evidence_id)
            .with_run(run.id)
    })?;
    if is_empty_snapshot(&action_plan.correlation_snapshot) {
        return Err(WatchtowerError::new(ErrorKind::CorrelationMissing, "action plan has no correlation snapshot")
            .with_evidence(evidence_id)
            .with_run(run.id));
    }
    let correlation: Option<Correlation> =
        serde_json::from_value(action_plan.correlation_snapshot.clone()).ok();

    let mut warnings = Vec::new();
    let document = render(
        &bundle.evidence,
        &run,
        &bundle.findings,
        &action_plan,
        correlation.as_ref(),
        &bundle.audit_entries,
        &mut warnings,
    );

    let exported_at = watchtower_core::time::now();
    if !warnings.is_empty() {
        store.append_audit_entry(&AuditEntry {
            tenant_id,
            actor_id: actor_id.clone(),
            action: "export_field_missing".to_string(),
            entity_type: Some("workflow_run".to_string()),
            entity_id: Some(run.id.get().to_string()),
            details: serde_json::json!({ "warnings": warnings }),
            timestamp: exported_at,
            source_address: None,
        });
    }
    store.append_audit_entry(&AuditEntry {
        tenant_id,
        actor_id,
        action: "audit_packet_exported".to_string(),
        entity_type: Some("workflow_run".to_string()),
        entity_id: Some(run.id.get().to_string()),
        details: serde_json::json!({ "evidence_id": evidence_id.get() }),
        timestamp: exported_at,
        source_address: None,
    });

    Ok(ExportArtifact {
        bytes: document.into_bytes(),
        content_type: "text/plain; charset=utf-8".to_string(),
        filename: format!("audit-packet-evidence-{evidence_id}-run-{}.txt", run.id),
    })
}

/// Resolves which run to export: the one named by `run_id`, validated as
/// successful, or the latest successful run when `run_id` is `None`.
fn resolve_run(
    store: &SqliteStore,
    tenant_id: TenantId,
    evidence_id: EvidenceId,
    run_id: Option<RunId>,
) -> Result<WorkflowRun, WatchtowerError> {
    match run_id {
        Some(id) => {
            let run = store
                .get_run(tenant_id, id)
                .map_err(|err| store_error(err, evidence_id))?
                .ok_or_else(|| {
                    WatchtowerError::new(ErrorKind::WorkflowRunNotFound, "workflow run not found")
                        .with_evidence(evidence_id)
                        .with_run(id)
                })?;
            if run.status == WorkflowRunStatus::Success {
                Ok(run)
            } else {
                Err(WatchtowerError::new(
                    ErrorKind::WorkflowRunNotSuccessful,
                    "workflow run did not complete successfully",
                )
                .with_evidence(evidence_id)
                .with_run(id))
            }
        }
        None => store
            .latest_successful_run(tenant_id, evidence_id)
            .map_err(|err| store_error(err, evidence_id))?
            .ok_or_else(|| {
                WatchtowerError::new(ErrorKind::NoWorkflowRun, "no successful workflow run exists")
                    .with_evidence(evidence_id)
                    .with_action_required("run the workflow for this evidence before exporting".to_string())
            }),
    }
}

/// True when `snapshot` is absent in all but name: `null` or an empty object.
fn is_empty_snapshot(snapshot: &serde_json::Value) -> bool {
    match snapshot {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Maps a [`StoreError`] onto [`WatchtowerError`], attaching `evidence_id`.
fn store_error(err: StoreError, evidence_id: EvidenceId) -> WatchtowerError {
    WatchtowerError::new(err.kind(), err.to_string()).with_evidence(evidence_id)
}

/// Renders the deterministic text document described in spec §4.10,
/// appending a human-readable note to `warnings` for every owner, deadline,
/// or CFR reference absence instead of writing a placeholder into the text.
#[allow(clippy::too_many_arguments, reason = "Every section needs its own source; splitting adds indirection, not clarity.")]
fn render(
    evidence: &Evidence,
    run: &WorkflowRun,
    findings: &[Finding],
    action_plan: &ActionPlan,
    correlation: Option<&Correlation>,
    audit_entries: &[AuditEntry],
    warnings: &mut Vec<String>,
) -> String {
    let mut out = String::new();

    out.push_str("WATCHTOWER AUDIT PACKET\n");
    out.push_str("=======================\n\n");
    out.push_str(&format!("Run: {}\n", run.id));
    out.push_str(&format!("Evidence: {}\n", evidence.id));
    out.push_str(&format!("Run status: {}\n", run.status.as_str()));
    out.push_str(&format!("Started: {}\n", run.started_at.to_rfc3339()));
    if let Some(completed_at) = run.completed_at {
        out.push_str(&format!("Completed: {}\n", completed_at.to_rfc3339()));
    }
    out.push('\n');

    out.push_str("EVIDENCE\n--------\n");
    out.push_str(&format!("Filename: {}\n", evidence.filename));
    out.push_str(&format!("Content hash: {}\n", evidence.content_hash));
    let excerpt = evidence.extracted_text.as_deref().unwrap_or_default();
    let excerpt: String = excerpt.chars().take(EXCERPT_LIMIT).collect();
    out.push_str("Text excerpt:\n");
    out.push_str(&excerpt);
    out.push_str("\n\n");

    out.push_str("FINDINGS\n--------\n");
    for finding in findings {
        out.push_str(&format!("- [{}] {}\n", finding.severity.as_str(), finding.title));
        out.push_str(&format!("  {}\n", finding.description));
        if finding.cfr_refs.is_empty() {
            warnings.push(format!("finding '{}' has no CFR references", finding.title));
        } else {
            out.push_str(&format!("  CFR refs: {}\n", finding.cfr_refs.join(", ")));
        }
    }
    out.push('\n');

    if let Some(correlation) = correlation {
        out.push_str("CORRELATION\n-----------\n");
        out.push_str("Sources:\n");
        for entry in &correlation.watchtower_snapshot.sources_status {
            out.push_str(&format!(
                "  {} (healthy: {}, last success: {})\n",
                entry.source.as_str(),
                entry.healthy,
                entry.last_success_at.map(|ts| ts.to_rfc3339()).unwrap_or_default(),
            ));
        }
        out.push_str("Vendor matches:\n");
        for vendor_match in &correlation.vendor_matches {
            out.push_str(&format!("  {} ({:?})\n", vendor_match.name, vendor_match.match_basis));
        }
        out.push_str("Narrative:\n");
        for bullet in &correlation.narrative {
            out.push_str(&format!("  - {bullet}\n"));
        }
        out.push('\n');
    }

    out.push_str("ACTION PLAN\n-----------\n");
    out.push_str(&format!("Rationale: {}\n", action_plan.rationale));
    for action in &action_plan.actions {
        out.push_str(&format!("- [{}] {}\n", action.priority, action.title));
        if action.owner.trim().is_empty() {
            warnings.push(format!("action '{}' has no owner", action.title));
        } else {
            out.push_str(&format!("  Owner: {}\n", action.owner));
        }
        if action.deadline.trim().is_empty() {
            warnings.push(format!("action '{}' has no deadline", action.title));
        } else {
            out.push_str(&format!("  Deadline: {}\n", action.deadline));
        }
    }
    out.push('\n');

    out.push_str("AUDIT TRAIL\n-----------\n");
    for entry in audit_entries {
        out.push_str(&format!("  {}: {}\n", format_timestamp(entry.timestamp), entry.action));
    }

    out
}

/// Formats a timestamp for the audit-trail section in RFC 3339.
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339()
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
    use std::num::NonZeroU64;
    use watchtower_core::ActionItem;

    fn new_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("in-memory store")
    }

    fn setup_successful_run(store: &SqliteStore) -> (TenantId, EvidenceId, RunId) {
        let tenant_id = store.insert_tenant("Acme Pharma Holdings").expect("insert tenant");
        let evidence_id = store
            .insert_evidence(&Evidence {
                id: EvidenceId::new(NonZeroU64::new(1).expect("nonzero")),
                tenant_id,
                filename: "inspection.pdf".to_string(),
                content_hash: "abc123".to_string(),
                extracted_text: Some("Cold chain temperature excursion reported.".to_string()),
                status: EvidenceStatus::Processed,
                error_message: None,
                processed_at: None,
            })
            .expect("insert evidence");
        let run_id = store
            .create_workflow_run(tenant_id, evidence_id, Utc::now())
            .expect("create run");
        let finding = Finding {
            id: None,
            run_id,
            evidence_id,
            title: "Cold Chain Temperature Control".to_string(),
            description: "Evidence references temperature-sensitive handling.".to_string(),
            severity: watchtower_core::Severity::High,
            cfr_refs: vec!["21 CFR 203.32".to_string()],
            citations: vec!["FDA guidance.".to_string()],
            entities: Vec::new(),
        };
        store.append_findings(run_id, std::slice::from_ref(&finding)).expect("append findings");
        let action_plan = ActionPlan {
            run_id,
            evidence_id,
            rationale: "Addresses one high-severity finding.".to_string(),
            actions: vec![ActionItem {
                title: "Remediate cold chain gap".to_string(),
                description: "Investigate the excursion.".to_string(),
                priority: "high".to_string(),
                owner: "Quality Assurance Lead".to_string(),
                deadline: "within 7 days".to_string(),
            }],
            owners: vec!["Quality Assurance Lead".to_string()],
            deadlines: vec!["within 7 days".to_string()],
            correlation_snapshot: serde_json::json!({ "watchtower_snapshot": { "total_feed_items": 0 } }),
        };
        store.attach_action_plan(&action_plan).expect("attach plan");
        store
            .mark_run_terminal(run_id, WorkflowRunStatus::Success, None, Utc::now(), 1, 1, 1)
            .expect("mark terminal");
        (tenant_id, evidence_id, run_id)
    }

    #[test]
    fn refuses_when_evidence_not_processed() {
        let store = new_store();
        let tenant_id = store.insert_tenant("Acme Pharma Holdings").expect("insert tenant");
        let evidence_id = store
            .insert_evidence(&Evidence {
                id: EvidenceId::new(NonZeroU64::new(1).expect("nonzero")),
                tenant_id,
                filename: "inspection.pdf".to_string(),
                content_hash: "abc123".to_string(),
                extracted_text: None,
                status: EvidenceStatus::Pending,
                error_message: None,
                processed_at: None,
            })
            .expect("insert evidence");
        let err = export_audit_packet(&store, tenant_id, evidence_id, None, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::EvidenceNotProcessed);
    }

    #[test]
    fn refuses_when_no_successful_run_exists() {
        let store = new_store();
        let tenant_id = store.insert_tenant("Acme Pharma Holdings").expect("insert tenant");
        let evidence_id = store
            .insert_evidence(&Evidence {
                id: EvidenceId::new(NonZeroU64::new(1).expect("nonzero")),
                tenant_id,
                filename: "inspection.pdf".to_string(),
                content_hash: "abc123".to_string(),
                extracted_text: Some("Some text.".to_string()),
                status: EvidenceStatus::Processed,
                error_message: None,
                processed_at: None,
            })
            .expect("insert evidence");
        let err = export_audit_packet(&store, tenant_id, evidence_id, None, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoWorkflowRun);
    }

    #[test]
    fn renders_complete_packet_for_successful_run() {
        let store = new_store();
        let (tenant_id, evidence_id, run_id) = setup_successful_run(&store);
        let artifact = export_audit_packet(&store, tenant_id, evidence_id, Some(run_id), Some("auditor-1".to_string()))
            .expect("export");
        let text = String::from_utf8(artifact.bytes).expect("utf8");
        assert!(text.contains("WATCHTOWER AUDIT PACKET"));
        assert!(text.contains("Cold Chain Temperature Control"));
        assert!(text.contains("Quality Assurance Lead"));
        assert!(!text.contains("N/A"));
        assert!(!text.contains("Unknown"));
    }

    #[test]
    fn refuses_requested_run_that_failed() {
        let store = new_store();
        let tenant_id = store.insert_tenant("Acme Pharma Holdings").expect("insert tenant");
        let evidence_id = store
            .insert_evidence(&Evidence {
                id: EvidenceId::new(NonZeroU64::new(1).expect("nonzero")),
                tenant_id,
                filename: "inspection.pdf".to_string(),
                content_hash: "abc123".to_string(),
                extracted_text: Some("Some text.".to_string()),
                status: EvidenceStatus::Processed,
                error_message: None,
                processed_at: None,
            })
            .expect("insert evidence");
        let run_id = store.create_workflow_run(tenant_id, evidence_id, Utc::now()).expect("create run");
        store
            .mark_run_terminal(run_id, WorkflowRunStatus::Failed, Some("boom"), Utc::now(), 0, 0, 0)
            .expect("mark terminal");
        let err = export_audit_packet(&store, tenant_id, evidence_id, Some(run_id), None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::WorkflowRunNotSuccessful);
    }
}

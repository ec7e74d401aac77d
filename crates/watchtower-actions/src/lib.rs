// crates/watchtower-actions/src/lib.rs
// ============================================================================
// Module: Watchtower Action Planner
// Description: Pure action-plan synthesizer over findings and correlation.
// Purpose: Turn a run's findings and correlation snapshot into a concrete,
//          assignable remediation plan (spec §4.8, C8).
// Dependencies: serde_json, watchtower-core, watchtower-correlation
// ============================================================================

//! ## Overview
//! [`build_action_plan`] is pure: the same findings and correlation always
//! produce the same [`ActionPlan`]. It never reads the findings or
//! correlation store itself: the workflow orchestrator (C9) supplies both.

#![forbid(unsafe_code)]

use watchtower_core::ActionItem;
use watchtower_core::ActionPlan;
use watchtower_core::EvidenceId;
use watchtower_core::Finding;
use watchtower_core::RiskLevel;
use watchtower_core::RunId;
use watchtower_core::Severity;
use watchtower_correlation::Correlation;

/// Maximum number of HIGH-priority actions synthesized from HIGH findings.
const MAX_HIGH_ACTIONS: usize = 3;
/// Maximum number of MEDIUM-priority actions synthesized from MEDIUM findings.
const MAX_MEDIUM_ACTIONS: usize = 2;

/// Synthesizes the action plan for one successful workflow run (spec §4.8,
/// C8). Pure: the same `findings` and `correlation` always produce the same
/// [`ActionPlan`].
///
/// # Panics
///
/// Panics if `correlation` cannot be serialized to JSON, which would only
/// happen if a future change to [`Correlation`] introduced a non-finite
/// float or other value `serde_json` cannot represent.
#[must_use]
pub fn build_action_plan(
    run_id: RunId,
    evidence_id: EvidenceId,
    findings: &[Finding],
    correlation: &Correlation,
) -> ActionPlan {
    let mut actions = Vec::new();

    let high_findings: Vec<&Finding> = findings.iter().filter(|f| f.severity == Severity::High).collect();
    for finding in high_findings.iter().take(MAX_HIGH_ACTIONS) {
        actions.push(high_priority_action(finding));
    }

    let medium_findings: Vec<&Finding> = findings.iter().filter(|f| f.severity == Severity::Medium).collect();
    for finding in medium_findings.iter().take(MAX_MEDIUM_ACTIONS) {
        actions.push(medium_priority_action(finding));
    }

    let vendor_risk_incorporated = !correlation.vendor_matches.is_empty();
    if vendor_risk_incorporated {
        actions.push(supply_chain_action());
    }

    actions.push(documentation_action());

    let owners = dedup_projection(actions.iter().map(|a| a.owner.clone()));
    let deadlines = dedup_projection(actions.iter().map(|a| a.deadline.clone()));
    let rationale = build_rationale(high_findings.len(), medium_findings.len(), vendor_risk_incorporated);

    #[allow(
        clippy::unwrap_used,
        reason = "Correlation contains only primitives, strings, and timestamps; serialization cannot fail."
    )]
    let correlation_snapshot = serde_json::to_value(correlation).unwrap();

    ActionPlan { run_id, evidence_id, rationale, actions, owners, deadlines, correlation_snapshot }
}

/// Builds a HIGH-priority action remediating one HIGH-severity finding.
fn high_priority_action(finding: &Finding) -> ActionItem {
    ActionItem {
        title: format!("Remediate: {}", finding.title),
        description: format!(
            "Investigate and remediate the high-severity observation: {}",
            finding.description
        ),
        priority: "high".to_string(),
        owner: "Quality Assurance Lead".to_string(),
        deadline: "within 7 days".to_string(),
    }
}

/// Builds a MEDIUM-priority action addressing one MEDIUM-severity finding.
fn medium_priority_action(finding: &Finding) -> ActionItem {
    ActionItem {
        title: format!("Address: {}", finding.title),
        description: format!("Review and address the medium-severity observation: {}", finding.description),
        priority: "medium".to_string(),
        owner: "Compliance Manager".to_string(),
        deadline: "within 30 days".to_string(),
    }
}

/// Builds the supply-chain action emitted whenever any vendor candidate
/// matched the tenant's vendor registry.
fn supply_chain_action() -> ActionItem {
    ActionItem {
        title: "Review Supply Chain Vendor Risk".to_string(),
        description: "One or more vendors referenced in this evidence were matched against the \
            vendor registry; review their current risk ratings and approval status."
            .to_string(),
        priority: "medium".to_string(),
        owner: "Supply Chain Risk Officer".to_string(),
        deadline: "within 14 days".to_string(),
    }
}

/// Builds the fixed low-priority documentation action present on every plan.
fn documentation_action() -> ActionItem {
    ActionItem {
        title: "Update Compliance Documentation".to_string(),
        description: "Record this review's findings and outcomes in the compliance documentation \
            system for audit trail purposes."
            .to_string(),
        priority: "low".to_string(),
        owner: "Documentation Specialist".to_string(),
        deadline: "within 45 days".to_string(),
    }
}

/// Builds the plan's rationale, referencing finding counts and whether
/// vendor risk data was incorporated (spec §4.8).
fn build_rationale(high_count: usize, medium_count: usize, vendor_risk_incorporated: bool) -> String {
    let vendor_clause = if vendor_risk_incorporated {
        "Vendor risk data from the correlation snapshot was incorporated into this plan."
    } else {
        "No vendor matches were available; this plan does not incorporate vendor risk data."
    };
    format!(
        "This plan addresses {high_count} high-severity and {medium_count} medium-severity \
            finding(s) from this review. {vendor_clause}"
    )
}

/// Projects `values` into a deduplicated vector, preserving first-seen order.
fn dedup_projection(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for value in values {
        if seen.insert(value.clone()) {
            out.push(value);
        }
    }
    out
}

/// Counts vendor matches at or above [`RiskLevel::High`] in a correlation,
/// useful for callers that want the same risky-vendor signal this crate
/// uses internally for its rationale text.
#[must_use]
pub fn high_risk_vendor_count(correlation: &Correlation) -> usize {
    correlation
        .vendor_matches
        .iter()
        .filter(|m| matches!(m.risk_level, Some(RiskLevel::High | RiskLevel::Critical)))
        .count()
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
    use chrono::Utc;
    use std::num::NonZeroU64;
    use watchtower_core::SourceId;
    use watchtower_correlation::MatchBasis;
    use watchtower_correlation::SourceStatusEntry;
    use watchtower_correlation::VendorMatch;
    use watchtower_correlation::WatchtowerSnapshot;

    fn run_id() -> RunId {
        RunId::new(NonZeroU64::new(1).expect("nonzero"))
    }

    fn evidence_id() -> EvidenceId {
        EvidenceId::new(NonZeroU64::new(1).expect("nonzero"))
    }

    fn finding(severity: Severity, title: &str) -> Finding {
        Finding {
            id: None,
            run_id: run_id(),
            evidence_id: evidence_id(),
            title: title.to_string(),
            description: "description".to_string(),
            severity,
            cfr_refs: vec!["21 CFR 211.100".to_string()],
            citations: vec!["citation".to_string()],
            entities: Vec::new(),
        }
    }

    fn empty_correlation() -> Correlation {
        Correlation {
            watchtower_snapshot: WatchtowerSnapshot {
                total_feed_items: 0,
                active_alerts: 0,
                sources_status: SourceId::all()
                    .into_iter()
                    .map(|source| SourceStatusEntry { source, last_success_at: None, healthy: false })
                    .collect(),
                top_items: Vec::new(),
                timestamp: Utc::now(),
            },
            vendor_matches: Vec::new(),
            narrative: vec!["No signals.".to_string()],
        }
    }

    #[test]
    fn caps_high_and_medium_actions_and_always_adds_documentation() {
        let findings = vec![
            finding(Severity::High, "A"),
            finding(Severity::High, "B"),
            finding(Severity::High, "C"),
            finding(Severity::High, "D"),
            finding(Severity::Medium, "E"),
            finding(Severity::Medium, "F"),
            finding(Severity::Medium, "G"),
        ];
        let plan = build_action_plan(run_id(), evidence_id(), &findings, &empty_correlation());
        let high_count = plan.actions.iter().filter(|a| a.priority == "high").count();
        let medium_count = plan.actions.iter().filter(|a| a.priority == "medium").count();
        assert_eq!(high_count, 3);
        assert_eq!(medium_count, 2);
        assert!(plan.actions.iter().any(|a| a.priority == "low"));
    }

    #[test]
    fn adds_supply_chain_action_only_when_vendor_matches_exist() {
        let mut correlation = empty_correlation();
        let without = build_action_plan(run_id(), evidence_id(), &[], &correlation);
        assert!(!without.actions.iter().any(|a| a.title.contains("Supply Chain")));

        correlation.vendor_matches.push(VendorMatch {
            vendor_id: None,
            name: "Acme Pharma".to_string(),
            match_basis: MatchBasis::TextContent,
            risk_score: Some(80),
            risk_level: Some(RiskLevel::Critical),
        });
        let with = build_action_plan(run_id(), evidence_id(), &[], &correlation);
        assert!(with.actions.iter().any(|a| a.title.contains("Supply Chain")));
    }

    #[test]
    fn owners_and_deadlines_are_deduplicated() {
        let findings =
            vec![finding(Severity::High, "A"), finding(Severity::High, "B"), finding(Severity::High, "C")];
        let plan = build_action_plan(run_id(), evidence_id(), &findings, &empty_correlation());
        let unique_owners: std::collections::HashSet<_> = plan.owners.iter().collect();
        assert_eq!(unique_owners.len(), plan.owners.len());
    }

    #[test]
    fn correlation_snapshot_is_never_empty() {
        let plan = build_action_plan(run_id(), evidence_id(), &[], &empty_correlation());
        assert!(plan.correlation_snapshot.is_object());
        assert_ne!(plan.correlation_snapshot, serde_json::json!({}));
    }
}

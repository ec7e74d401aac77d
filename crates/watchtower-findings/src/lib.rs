// crates/watchtower-findings/src/lib.rs
// ============================================================================
// Module: Watchtower Findings Extractor
// Description: Keyword-driven compliance findings extractor over evidence
//              text.
// Purpose: Turn free-text evidence into structured, citable compliance
//          observations (spec §4.7, C7).
// Dependencies: watchtower-core
// ============================================================================

//! ## Overview
//! [`extract_findings`] is pure: the same evidence text always produces the
//! same findings. Each keyword group below contributes at most one finding;
//! if fewer than [`MIN_FINDINGS`] keyword groups matched, fixed padding
//! findings are appended so every run has enough material for the action
//! planner (C8) and the export renderer (C10) to work with.

#![forbid(unsafe_code)]

use watchtower_core::EvidenceId;
use watchtower_core::Finding;
use watchtower_core::RunId;
use watchtower_core::Severity;

/// Minimum number of findings a run must produce (spec §4.7).
const MIN_FINDINGS: usize = 3;
/// Maximum number of findings a run may produce (spec §4.7).
const MAX_FINDINGS: usize = 10;

/// One keyword-triggered compliance observation template.
struct KeywordGroup {
    /// Lowercase keywords; any one present in the evidence text triggers
    /// this group.
    keywords: &'static [&'static str],
    /// Finding title.
    title: &'static str,
    /// Finding description.
    description: &'static str,
    /// Finding severity.
    severity: Severity,
    /// Fixed CFR section references for this observation category.
    cfr_refs: &'static [&'static str],
    /// Human-readable citation accompanying the CFR references.
    citation: &'static str,
}

/// The fixed keyword groups scanned over evidence text (spec §4.7).
const GROUPS: [KeywordGroup; 6] = [
    KeywordGroup {
        keywords: &["temperature", "cold chain", "refrigerat", "thermal excursion"],
        title: "Cold Chain Temperature Control",
        description: "Evidence references temperature-sensitive handling or cold chain conditions \
            that must be maintained within validated limits.",
        severity: Severity::High,
        cfr_refs: &["21 CFR 203.32", "21 CFR 205.50"],
        citation: "FDA guidance on storage and distribution of temperature-sensitive products.",
    },
    KeywordGroup {
        keywords: &["cgmp", "good manufacturing practice", "manufacturing process", "batch record"],
        title: "Manufacturing Process Controls",
        description: "Evidence references manufacturing process or batch record practices subject \
            to current good manufacturing practice requirements.",
        severity: Severity::High,
        cfr_refs: &["21 CFR 211.100", "21 CFR 211.192"],
        citation: "21 CFR Part 211, Current Good Manufacturing Practice for Finished Pharmaceuticals.",
    },
    KeywordGroup {
        keywords: &["recall", "deviation", "nonconformance", "corrective action"],
        title: "Recall and Deviation Handling",
        description: "Evidence references a recall, deviation, or nonconformance event requiring \
            documented root cause and corrective action.",
        severity: Severity::High,
        cfr_refs: &["21 CFR 7.40", "21 CFR 7.49"],
        citation: "21 CFR Part 7, Enforcement Policy, recall procedures.",
    },
    KeywordGroup {
        keywords: &["supplier", "vendor", "third-party manufacturer", "contract manufacturer"],
        title: "Supplier and Vendor Qualification",
        description: "Evidence references a supplier or vendor relationship subject to qualification \
            and ongoing oversight requirements.",
        severity: Severity::Medium,
        cfr_refs: &["21 CFR 211.84", "21 CFR 820.50"],
        citation: "21 CFR 211.84 and 21 CFR 820.50, component and supplier controls.",
    },
    KeywordGroup {
        keywords: &["labeling", "label claim", "package insert"],
        title: "Labeling Accuracy",
        description: "Evidence references product labeling content subject to accuracy and approval \
            requirements.",
        severity: Severity::Medium,
        cfr_refs: &["21 CFR 201.1", "21 CFR 202.1"],
        citation: "21 CFR Part 201, Labeling.",
    },
    KeywordGroup {
        keywords: &["serialization", "dscsa", "traceability", "track and trace"],
        title: "Product Serialization and Traceability",
        description: "Evidence references serialization or traceability obligations under drug \
            supply chain security requirements.",
        severity: Severity::Medium,
        cfr_refs: &["21 U.S.C. 360eee", "21 CFR 211.188"],
        citation: "Drug Supply Chain Security Act (DSCSA), traceability requirements.",
    },
];

/// Extracts structured compliance findings from lowercased evidence text
/// (spec §4.7, C7). Pure: the same `text` always produces the same
/// findings, newly numbered for this run (`id` is left unset; the store
/// assigns it on insert).
#[must_use]
pub fn extract_findings(run_id: RunId, evidence_id: EvidenceId, text: &str) -> Vec<Finding> {
    let lowered = text.to_lowercase();
    let mut findings: Vec<Finding> = GROUPS
        .iter()
        .filter_map(|group| finding_for_group(group, &lowered, run_id, evidence_id))
        .collect();

    for padding in &PADDING {
        if findings.len() >= MIN_FINDINGS {
            break;
        }
        findings.push(padding_finding(run_id, evidence_id, padding));
    }

    findings.truncate(MAX_FINDINGS);
    findings
}

/// One fixed padding finding template, drawn on in order until a run has
/// at least [`MIN_FINDINGS`] findings (there are enough entries here to
/// reach the minimum from zero keyword matches).
struct PaddingFinding {
    /// Finding title.
    title: &'static str,
    /// Finding description.
    description: &'static str,
    /// Fixed CFR section references for this padding finding.
    cfr_refs: &'static [&'static str],
}

/// Fixed padding findings, used in order to make up any shortfall below
/// [`MIN_FINDINGS`].
const PADDING: [PaddingFinding; 3] = [
    PaddingFinding {
        title: "General Document Compliance Review",
        description: "A baseline compliance review is recommended for this evidence regardless of \
            keyword matches, to confirm no gaps were missed by automated scanning.",
        cfr_refs: &["21 CFR 211.22"],
    },
    PaddingFinding {
        title: "Record Retention Verification",
        description: "Verify that this evidence and its supporting records are retained for the period \
            required by applicable regulations.",
        cfr_refs: &["21 CFR 211.180", "21 CFR 820.180"],
    },
    PaddingFinding {
        title: "Change Control Documentation Review",
        description: "Confirm that any process or document changes reflected in this evidence were \
            routed through formal change control before being put into effect.",
        cfr_refs: &["21 CFR 211.100"],
    },
];

/// Builds a finding for one keyword group if any of its keywords appear in
/// `lowered`, recording the matched keywords as `entities`.
fn finding_for_group(
    group: &KeywordGroup,
    lowered: &str,
    run_id: RunId,
    evidence_id: EvidenceId,
) -> Option<Finding> {
    let matched: Vec<String> =
        group.keywords.iter().filter(|keyword| lowered.contains(*keyword)).map(|s| (*s).to_string()).collect();
    if matched.is_empty() {
        return None;
    }
    Some(Finding {
        id: None,
        run_id,
        evidence_id,
        title: group.title.to_string(),
        description: group.description.to_string(),
        severity: group.severity,
        cfr_refs: group.cfr_refs.iter().map(|s| (*s).to_string()).collect(),
        citations: vec![group.citation.to_string()],
        entities: matched,
    })
}

/// Builds a fixed low-severity padding finding used to reach [`MIN_FINDINGS`].
fn padding_finding(run_id: RunId, evidence_id: EvidenceId, padding: &PaddingFinding) -> Finding {
    Finding {
        id: None,
        run_id,
        evidence_id,
        title: padding.title.to_string(),
        description: padding.description.to_string(),
        severity: Severity::Low,
        cfr_refs: padding.cfr_refs.iter().map(|s| (*s).to_string()).collect(),
        citations: vec!["Baseline compliance documentation review.".to_string()],
        entities: Vec::new(),
    }
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

    fn run_id() -> RunId {
        RunId::new(NonZeroU64::new(1).expect("nonzero"))
    }

    fn evidence_id() -> EvidenceId {
        EvidenceId::new(NonZeroU64::new(1).expect("nonzero"))
    }

    #[test]
    fn pads_to_minimum_three_when_no_keywords_match() {
        let findings = extract_findings(run_id(), evidence_id(), "Nothing relevant here at all.");
        assert_eq!(findings.len(), 3);
        assert!(findings.iter().any(|f| f.title == "General Document Compliance Review"));
        assert!(findings.iter().any(|f| f.title == "Record Retention Verification"));
    }

    #[test]
    fn emits_one_finding_per_matched_group() {
        let text = "The cold chain temperature log showed a recall-triggering deviation in the \
            cGMP manufacturing process.";
        let findings = extract_findings(run_id(), evidence_id(), text);
        assert!(findings.iter().any(|f| f.title == "Cold Chain Temperature Control"));
        assert!(findings.iter().any(|f| f.title == "Recall and Deviation Handling"));
        assert!(findings.iter().any(|f| f.title == "Manufacturing Process Controls"));
        assert!(findings.len() >= 3);
    }

    #[test]
    fn caps_output_at_ten_findings() {
        let text = "temperature cold chain cgmp manufacturing process recall deviation supplier \
            vendor labeling label claim serialization dscsa traceability";
        let findings = extract_findings(run_id(), evidence_id(), text);
        assert!(findings.len() <= MAX_FINDINGS);
    }

    #[test]
    fn same_text_produces_same_findings() {
        let text = "Supplier qualification and labeling review were documented.";
        let first = extract_findings(run_id(), evidence_id(), text);
        let second = extract_findings(run_id(), evidence_id(), text);
        assert_eq!(first, second);
    }
}

// crates/watchtower-core/src/lib.rs
// ============================================================================
// Module: Watchtower Core
// Description: Canonical data model, identifiers, and error taxonomy shared
//              across the Watchtower feed-ingestion and Golden Workflow
//              subsystems.
// Purpose: Give every other crate in the workspace one place to agree on
//          what a feed item, a workflow run, and a refusal look like.
// Dependencies: chrono, serde, serde_json, sha2, thiserror
// ============================================================================

//! ## Overview
//! This crate defines the entities in spec §3 (`Tenant`, `Vendor`,
//! `FeedItem`, `SyncStatus`, `Evidence`, `WorkflowRun`, `Finding`,
//! `ActionPlan`, `AuditEntry`), the closed enumerations they are built
//! from, and the stable [`ErrorKind`] taxonomy every component's error
//! type resolves to. It has no I/O: constructors here only enforce the
//! invariants that do not require a database round trip.

#![forbid(unsafe_code)]

pub mod error;
pub mod ids;
pub mod model;
pub mod normalize;
pub mod time;

pub use error::ErrorKind;
pub use error::WatchtowerError;
pub use ids::ActionPlanId;
pub use ids::AuditEntryId;
pub use ids::EvidenceId;
pub use ids::FindingId;
pub use ids::RunId;
pub use ids::TenantId;
pub use ids::VendorId;
pub use model::ActionItem;
pub use model::ActionPlan;
pub use model::AuditEntry;
pub use model::Category;
pub use model::Evidence;
pub use model::EvidenceStatus;
pub use model::FeedItem;
pub use model::Finding;
pub use model::RiskLevel;
pub use model::Severity;
pub use model::ShortageStatus;
pub use model::SourceId;
pub use model::SyncStatus;
pub use model::Tenant;
pub use model::Vendor;
pub use model::WorkflowRun;
pub use model::WorkflowRunStatus;

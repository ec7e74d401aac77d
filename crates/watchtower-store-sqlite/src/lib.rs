// crates/watchtower-store-sqlite/src/lib.rs
// ============================================================================
// Module: Watchtower SQLite Store
// Description: Transactional persistence gateway for feed items, sync
//              status, workflow artifacts, and the audit log.
// Purpose: Sole writer for every entity in watchtower-core::model; enforces
//          the (source, external_id) uniqueness invariant and the
//          best-effort semantics of status/audit writes (spec §4.4, C4).
// Dependencies: rusqlite, watchtower-core
// ============================================================================

//! ## Overview
//! [`SqliteStore`] wraps a single `SQLite` connection (WAL journal mode)
//! behind a mutex. Every public method opens its own transaction or
//! savepoint; there are no cross-call transactions, matching the
//! concurrency model in spec §5 ("every unit of work uses its own
//! transaction"). `UpdateSyncStatus` and `AppendAuditEntry` never return
//! their own database errors to the caller: failures there are logged and
//! swallowed, per spec §4.4.

#![forbid(unsafe_code)]

mod schema;

use std::path::Path;
use std::sync::Mutex;

use chrono::DateTime;
use chrono::Utc;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;
use watchtower_core::ActionItem;
use watchtower_core::ActionPlan;
use watchtower_core::AuditEntry;
use watchtower_core::ErrorKind;
use watchtower_core::Evidence;
use watchtower_core::EvidenceId;
use watchtower_core::EvidenceStatus;
use watchtower_core::FeedItem;
use watchtower_core::Finding;
use watchtower_core::FindingId;
use watchtower_core::RunId;
use watchtower_core::Severity;
use watchtower_core::ShortageStatus;
use watchtower_core::SourceId;
use watchtower_core::SyncStatus;
use watchtower_core::TenantId;
use watchtower_core::Vendor;
use watchtower_core::VendorId;
use watchtower_core::WorkflowRun;
use watchtower_core::WorkflowRunStatus;

/// Errors returned by [`SqliteStore`].
///
/// # Invariants
/// - Messages never embed feed-item `raw_payload` or evidence text.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// The database file could not be opened or is unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A query or statement failed against an open connection.
    #[error("store query failed: {0}")]
    Query(String),
    /// A row read back from the database violated an entity invariant.
    #[error("store row invalid: {0}")]
    Invalid(String),
    /// The requested row does not exist.
    #[error("store row not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Maps this error onto the shared [`ErrorKind`] taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::DbUnavailable,
            Self::Query(_) | Self::Invalid(_) | Self::NotFound(_) => ErrorKind::InternalError,
        }
    }
}

/// Everything [`SqliteStore::read_export_bundle`] needs in one read.
#[derive(Debug, Clone)]
pub struct ExportBundle {
    /// The evidence document the bundle concerns.
    pub evidence: Evidence,
    /// The workflow run selected (latest successful, or the one requested).
    pub run: WorkflowRun,
    /// Findings attached to `run`.
    pub findings: Vec<Finding>,
    /// The action plan attached to `run`, if any.
    pub action_plan: Option<ActionPlan>,
    /// Audit entries naming this evidence or this run.
    pub audit_entries: Vec<AuditEntry>,
}

/// `SQLite`-backed implementation of the Watchtower persistence gateway.
///
/// # Invariants
/// - A single connection is shared across all methods behind a mutex;
///   there is no cross-call transaction (spec §5).
pub struct SqliteStore {
    /// Guarded connection. `SQLite` itself serializes writers; the mutex
    /// only protects the `rusqlite::Connection` handle from concurrent use
    /// within this process.
    connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if absent) a `SQLite`-backed store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file cannot be opened or
    /// the schema cannot be initialized.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let connection =
            Connection::open(path).map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Self::configure_and_init(&connection)?;
        Ok(Self { connection: Mutex::new(connection) })
    }

    /// Opens an in-memory store, primarily for tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the schema cannot be
    /// initialized.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection =
            Connection::open_in_memory().map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Self::configure_and_init(&connection)?;
        Ok(Self { connection: Mutex::new(connection) })
    }

    /// Applies pragmas and creates the schema if it does not already exist.
    fn configure_and_init(connection: &Connection) -> Result<(), StoreError> {
        connection
            .execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        connection
            .execute_batch(schema::SCHEMA_SQL)
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(())
    }

    /// Locks the shared connection, mapping mutex poisoning to
    /// [`StoreError::Unavailable`] rather than panicking.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::Unavailable("store connection mutex poisoned".to_string()))
    }

    /// Inserts each item in its own savepoint, skipping any item whose
    /// `(source, external_id)` already exists. A single bad item never
    /// poisons the batch (spec §4.4).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the connection cannot be
    /// locked or a savepoint cannot be opened; individual item failures are
    /// swallowed and excluded from the returned count.
    pub fn upsert_feed_items(&self, items: &[FeedItem]) -> Result<usize, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let mut new_count = 0usize;
        for item in items {
            let savepoint =
                tx.savepoint().map_err(|err| StoreError::Unavailable(err.to_string()))?;
            let result = savepoint.execute(
                "INSERT INTO feed_items \
                 (source, external_id, title, url, published_at, summary, category, \
                  vendor_name, status, tags, raw_payload, ingested_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    item.source.as_str(),
                    item.external_id,
                    item.title,
                    item.url,
                    item.published_at.map(|ts| ts.to_rfc3339()),
                    item.summary,
                    item.category.as_str(),
                    item.vendor_name,
                    item.status.map(ShortageStatus::as_str),
                    serde_json::to_string(&item.tags).unwrap_or_else(|_| "[]".to_string()),
                    item.raw_payload.to_string(),
                    item.ingested_at.to_rfc3339(),
                ],
            );
            match result {
                Ok(_) => {
                    savepoint.commit().map_err(|err| StoreError::Unavailable(err.to_string()))?;
                    new_count += 1;
                }
                Err(err) => {
                    if is_unique_violation(&err) {
                        tracing::debug!(
                            source = item.source.as_str(),
                            external_id = %item.external_id,
                            "duplicate feed item skipped"
                        );
                    } else {
                        tracing::warn!(error = %err, "feed item insert failed");
                    }
                    savepoint.rollback().map_err(|err| StoreError::Unavailable(err.to_string()))?;
                }
            }
        }
        tx.commit().map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(new_count)
    }

    /// Upserts the single per-source sync status row, logging and
    /// swallowing any database error rather than propagating it (spec
    /// §4.4): sync telemetry must never fail the caller's sync operation.
    pub fn update_sync_status(&self, status: &SyncStatus) {
        let result = (|| -> Result<(), StoreError> {
            let guard = self.lock()?;
            guard
                .execute(
                    "INSERT INTO sync_status \
                     (source, last_run_at, last_success_at, last_error_at, \
                      last_error_message, last_http_status, items_fetched, items_saved) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                     ON CONFLICT(source) DO UPDATE SET \
                       last_run_at = excluded.last_run_at, \
                       last_success_at = excluded.last_success_at, \
                       last_error_at = excluded.last_error_at, \
                       last_error_message = excluded.last_error_message, \
                       last_http_status = excluded.last_http_status, \
                       items_fetched = excluded.items_fetched, \
                       items_saved = excluded.items_saved",
                    params![
                        status.source.as_str(),
                        status.last_run_at.to_rfc3339(),
                        status.last_success_at.map(|ts| ts.to_rfc3339()),
                        status.last_error_at.map(|ts| ts.to_rfc3339()),
                        status.last_error_message,
                        status.last_http_status,
                        status.items_fetched,
                        status.items_saved,
                    ],
                )
                .map_err(|err| StoreError::Query(err.to_string()))?;
            Ok(())
        })();
        if let Err(err) = result {
            tracing::warn!(source = status.source.as_str(), error = %err, "sync status update failed");
        }
    }

    /// Reads the sync status row for `source`, if one has ever been
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the connection cannot be
    /// locked, or [`StoreError::Query`] if the read fails.
    pub fn get_sync_status(&self, source: SourceId) -> Result<Option<SyncStatus>, StoreError> {
        let guard = self.lock()?;
        guard
            .query_row(
                "SELECT source, last_run_at, last_success_at, last_error_at, \
                 last_error_message, last_http_status, items_fetched, items_saved \
                 FROM sync_status WHERE source = ?1",
                params![source.as_str()],
                row_to_sync_status,
            )
            .optional()
            .map_err(|err| StoreError::Query(err.to_string()))
    }

    /// Lists every sync status row, in source-enumeration order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the underlying read fails.
    pub fn list_sync_statuses(&self) -> Result<Vec<SyncStatus>, StoreError> {
        SourceId::all()
            .into_iter()
            .filter_map(|source| self.get_sync_status(source).transpose())
            .collect()
    }

    /// Inserts a tenant row, returning its assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the insert fails.
    pub fn insert_tenant(&self, name: &str) -> Result<TenantId, StoreError> {
        let guard = self.lock()?;
        guard
            .execute("INSERT INTO tenants (name) VALUES (?1)", params![name])
            .map_err(|err| StoreError::Query(err.to_string()))?;
        let id = guard.last_insert_rowid();
        TenantId::from_raw(row_id_to_u64(id))
            .ok_or_else(|| StoreError::Invalid("tenant id was zero".to_string()))
    }

    /// Inserts a vendor row, returning its assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the insert fails.
    pub fn insert_vendor(&self, vendor: &Vendor) -> Result<VendorId, StoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO vendors \
                 (tenant_id, name, code, country, risk_score, risk_level, approved) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    vendor.tenant_id.get(),
                    vendor.name,
                    vendor.code,
                    vendor.country,
                    vendor.risk_score,
                    vendor.risk_level.as_str(),
                    vendor.approved,
                ],
            )
            .map_err(|err| StoreError::Query(err.to_string()))?;
        let id = guard.last_insert_rowid();
        VendorId::from_raw(row_id_to_u64(id))
            .ok_or_else(|| StoreError::Invalid("vendor id was zero".to_string()))
    }

    /// Lists every vendor registered to `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the underlying read fails.
    pub fn list_vendors(&self, tenant_id: TenantId) -> Result<Vec<Vendor>, StoreError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare(
                "SELECT id, tenant_id, name, code, country, risk_score, approved \
                 FROM vendors WHERE tenant_id = ?1 ORDER BY id",
            )
            .map_err(|err| StoreError::Query(err.to_string()))?;
        let rows = stmt
            .query_map(params![tenant_id.get()], row_to_vendor)
            .map_err(|err| StoreError::Query(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Query(err.to_string()))
    }

    /// Inserts an evidence row, returning its assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the insert fails.
    pub fn insert_evidence(&self, evidence: &Evidence) -> Result<EvidenceId, StoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO evidence \
                 (tenant_id, filename, content_hash, extracted_text, status, \
                  error_message, processed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    evidence.tenant_id.get(),
                    evidence.filename,
                    evidence.content_hash,
                    evidence.extracted_text,
                    evidence.status.as_str(),
                    evidence.error_message,
                    evidence.processed_at.map(|ts| ts.to_rfc3339()),
                ],
            )
            .map_err(|err| StoreError::Query(err.to_string()))?;
        let id = guard.last_insert_rowid();
        EvidenceId::from_raw(row_id_to_u64(id))
            .ok_or_else(|| StoreError::Invalid("evidence id was zero".to_string()))
    }

    /// Reads an evidence row, scoped to `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the underlying read fails.
    pub fn get_evidence(
        &self,
        tenant_id: TenantId,
        evidence_id: EvidenceId,
    ) -> Result<Option<Evidence>, StoreError> {
        let guard = self.lock()?;
        guard
            .query_row(
                "SELECT id, tenant_id, filename, content_hash, extracted_text, status, \
                 error_message, processed_at FROM evidence WHERE id = ?1 AND tenant_id = ?2",
                params![evidence_id.get(), tenant_id.get()],
                row_to_evidence,
            )
            .optional()
            .map_err(|err| StoreError::Query(err.to_string()))
    }

    /// Creates a new `WorkflowRun` in the `running` state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the insert fails.
    pub fn create_workflow_run(
        &self,
        tenant_id: TenantId,
        evidence_id: EvidenceId,
        started_at: DateTime<Utc>,
    ) -> Result<RunId, StoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO workflow_runs \
                 (tenant_id, evidence_id, status, started_at, completed_at, error_message, \
                  findings_count, correlations_count, actions_count) \
                 VALUES (?1, ?2, ?3, ?4, NULL, NULL, 0, 0, 0)",
                params![
                    tenant_id.get(),
                    evidence_id.get(),
                    WorkflowRunStatus::Running.as_str(),
                    started_at.to_rfc3339(),
                ],
            )
            .map_err(|err| StoreError::Query(err.to_string()))?;
        let id = guard.last_insert_rowid();
        RunId::from_raw(row_id_to_u64(id))
            .ok_or_else(|| StoreError::Invalid("run id was zero".to_string()))
    }

    /// Appends findings to `run_id`, assigning each a [`FindingId`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if any insert fails.
    pub fn append_findings(
        &self,
        run_id: RunId,
        findings: &[Finding],
    ) -> Result<Vec<Finding>, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let mut saved = Vec::with_capacity(findings.len());
        for finding in findings {
            tx.execute(
                "INSERT INTO findings \
                 (run_id, evidence_id, title, description, severity, cfr_refs, citations, entities) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    run_id.get(),
                    finding.evidence_id.get(),
                    finding.title,
                    finding.description,
                    finding.severity.as_str(),
                    serde_json::to_string(&finding.cfr_refs).unwrap_or_else(|_| "[]".to_string()),
                    serde_json::to_string(&finding.citations).unwrap_or_else(|_| "[]".to_string()),
                    serde_json::to_string(&finding.entities).unwrap_or_else(|_| "[]".to_string()),
                ],
            )
            .map_err(|err| StoreError::Query(err.to_string()))?;
            let id = FindingId::from_raw(row_id_to_u64(tx.last_insert_rowid()))
                .ok_or_else(|| StoreError::Invalid("finding id was zero".to_string()))?;
            saved.push(Finding { id: Some(id), ..finding.clone() });
        }
        tx.commit().map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(saved)
    }

    /// Attaches the (singular) action plan to its owning run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the insert fails.
    pub fn attach_action_plan(&self, plan: &ActionPlan) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO action_plans \
                 (run_id, evidence_id, rationale, actions, owners, deadlines, correlation_snapshot) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    plan.run_id.get(),
                    plan.evidence_id.get(),
                    plan.rationale,
                    serde_json::to_string(&plan.actions).unwrap_or_else(|_| "[]".to_string()),
                    serde_json::to_string(&plan.owners).unwrap_or_else(|_| "[]".to_string()),
                    serde_json::to_string(&plan.deadlines).unwrap_or_else(|_| "[]".to_string()),
                    plan.correlation_snapshot.to_string(),
                ],
            )
            .map_err(|err| StoreError::Query(err.to_string()))?;
        Ok(())
    }

    /// Marks a run as `success` or `failed`, recording final counts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the update fails.
    pub fn mark_run_terminal(
        &self,
        run_id: RunId,
        status: WorkflowRunStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
        findings_count: u32,
        correlations_count: u32,
        actions_count: u32,
    ) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "UPDATE workflow_runs SET status = ?1, completed_at = ?2, error_message = ?3, \
                 findings_count = ?4, correlations_count = ?5, actions_count = ?6 WHERE id = ?7",
                params![
                    status.as_str(),
                    completed_at.to_rfc3339(),
                    error_message,
                    findings_count,
                    correlations_count,
                    actions_count,
                    run_id.get(),
                ],
            )
            .map_err(|err| StoreError::Query(err.to_string()))?;
        Ok(())
    }

    /// Reads a workflow run, scoped to `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the underlying read fails.
    pub fn get_run(
        &self,
        tenant_id: TenantId,
        run_id: RunId,
    ) -> Result<Option<WorkflowRun>, StoreError> {
        let guard = self.lock()?;
        guard
            .query_row(
                "SELECT id, tenant_id, evidence_id, status, started_at, completed_at, \
                 error_message, findings_count, correlations_count, actions_count \
                 FROM workflow_runs WHERE id = ?1 AND tenant_id = ?2",
                params![run_id.get(), tenant_id.get()],
                row_to_workflow_run,
            )
            .optional()
            .map_err(|err| StoreError::Query(err.to_string()))
    }

    /// Finds the most recent successful run for `evidence_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the underlying read fails.
    pub fn latest_successful_run(
        &self,
        tenant_id: TenantId,
        evidence_id: EvidenceId,
    ) -> Result<Option<WorkflowRun>, StoreError> {
        let guard = self.lock()?;
        guard
            .query_row(
                "SELECT id, tenant_id, evidence_id, status, started_at, completed_at, \
                 error_message, findings_count, correlations_count, actions_count \
                 FROM workflow_runs \
                 WHERE tenant_id = ?1 AND evidence_id = ?2 AND status = 'success' \
                 ORDER BY completed_at DESC LIMIT 1",
                params![tenant_id.get(), evidence_id.get()],
                row_to_workflow_run,
            )
            .optional()
            .map_err(|err| StoreError::Query(err.to_string()))
    }

    /// Reads every piece of data an audit export needs in one call: the
    /// evidence, the selected run (latest successful when `run_id` is
    /// `None`), its findings and action plan, and every audit entry naming
    /// either the evidence or the run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the evidence or run does not
    /// exist, otherwise [`StoreError::Query`] on read failure.
    pub fn read_export_bundle(
        &self,
        tenant_id: TenantId,
        evidence_id: EvidenceId,
        run_id: Option<RunId>,
    ) -> Result<ExportBundle, StoreError> {
        let evidence = self
            .get_evidence(tenant_id, evidence_id)?
            .ok_or_else(|| StoreError::NotFound("evidence not found".to_string()))?;
        let run = match run_id {
            Some(id) => self
                .get_run(tenant_id, id)?
                .ok_or_else(|| StoreError::NotFound("run not found".to_string()))?,
            None => self
                .latest_successful_run(tenant_id, evidence_id)?
                .ok_or_else(|| StoreError::NotFound("no successful run".to_string()))?,
        };
        let findings = self.findings_for_run(run.id)?;
        let action_plan = self.action_plan_for_run(run.id)?;
        let audit_entries = self.audit_entries_for(tenant_id, evidence_id, run.id)?;
        Ok(ExportBundle { evidence, run, findings, action_plan, audit_entries })
    }

    /// Lists findings attached to `run_id`, in insertion order.
    fn findings_for_run(&self, run_id: RunId) -> Result<Vec<Finding>, StoreError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare(
                "SELECT id, run_id, evidence_id, title, description, severity, cfr_refs, \
                 citations, entities FROM findings WHERE run_id = ?1 ORDER BY id",
            )
            .map_err(|err| StoreError::Query(err.to_string()))?;
        let rows = stmt
            .query_map(params![run_id.get()], row_to_finding)
            .map_err(|err| StoreError::Query(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Query(err.to_string()))
    }

    /// Reads the action plan attached to `run_id`, if any.
    fn action_plan_for_run(&self, run_id: RunId) -> Result<Option<ActionPlan>, StoreError> {
        let guard = self.lock()?;
        guard
            .query_row(
                "SELECT run_id, evidence_id, rationale, actions, owners, deadlines, \
                 correlation_snapshot FROM action_plans WHERE run_id = ?1",
                params![run_id.get()],
                row_to_action_plan,
            )
            .optional()
            .map_err(|err| StoreError::Query(err.to_string()))
    }

    /// Lists audit entries naming `evidence_id` or `run_id`, newest first.
    fn audit_entries_for(
        &self,
        tenant_id: TenantId,
        evidence_id: EvidenceId,
        run_id: RunId,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare(
                "SELECT tenant_id, actor_id, action, entity_type, entity_id, details, \
                 timestamp, source_address FROM audit_log \
                 WHERE tenant_id = ?1 \
                   AND ((entity_type = 'evidence' AND entity_id = ?2) \
                     OR (entity_type = 'workflow_run' AND entity_id = ?3)) \
                 ORDER BY timestamp DESC",
            )
            .map_err(|err| StoreError::Query(err.to_string()))?;
        let rows = stmt
            .query_map(
                params![tenant_id.get(), evidence_id.get().to_string(), run_id.get().to_string()],
                row_to_audit_entry,
            )
            .map_err(|err| StoreError::Query(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Query(err.to_string()))
    }

    /// Appends an audit log entry, logging and swallowing any failure: an
    /// audit write must never fail the operation it is auditing (spec
    /// §4.4).
    pub fn append_audit_entry(&self, entry: &AuditEntry) {
        let result = (|| -> Result<(), StoreError> {
            let guard = self.lock()?;
            guard
                .execute(
                    "INSERT INTO audit_log \
                     (tenant_id, actor_id, action, entity_type, entity_id, details, \
                      timestamp, source_address) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        entry.tenant_id.get(),
                        entry.actor_id,
                        entry.action,
                        entry.entity_type,
                        entry.entity_id,
                        entry.details.to_string(),
                        entry.timestamp.to_rfc3339(),
                        entry.source_address,
                    ],
                )
                .map_err(|err| StoreError::Query(err.to_string()))?;
            Ok(())
        })();
        if let Err(err) = result {
            tracing::warn!(action = %entry.action, error = %err, "audit entry write failed");
        }
    }

    /// Returns the total number of feed items stored, for correlation
    /// snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the underlying read fails.
    pub fn count_feed_items(&self) -> Result<u64, StoreError> {
        let guard = self.lock()?;
        guard
            .query_row("SELECT COUNT(*) FROM feed_items", [], |row| row.get::<_, i64>(0))
            .map(row_id_to_u64)
            .map_err(|err| StoreError::Query(err.to_string()))
    }

    /// Returns the `limit` most recently published feed items.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the underlying read fails.
    pub fn recent_feed_items(&self, limit: u32) -> Result<Vec<FeedItem>, StoreError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare(
                "SELECT source, external_id, title, url, published_at, summary, vendor_name, \
                 status, tags, raw_payload, ingested_at FROM feed_items \
                 ORDER BY published_at DESC LIMIT ?1",
            )
            .map_err(|err| StoreError::Query(err.to_string()))?;
        let rows = stmt
            .query_map(params![limit], row_to_feed_item)
            .map_err(|err| StoreError::Query(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Query(err.to_string()))
    }
}

/// Returns true when `err` is a `SQLite` unique-constraint violation.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Converts a non-negative `SQLite` row id/count into `u64`, clamping to 0
/// for the (unreachable in practice) negative case rather than panicking.
fn row_id_to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn row_to_sync_status(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncStatus> {
    let source: String = row.get(0)?;
    let last_run_at: String = row.get(1)?;
    let last_success_at: Option<String> = row.get(2)?;
    let last_error_at: Option<String> = row.get(3)?;
    Ok(SyncStatus {
        source: parse_source(&source)?,
        last_run_at: parse_timestamp(&last_run_at)?,
        last_success_at: last_success_at.map(|raw| parse_timestamp(&raw)).transpose()?,
        last_error_at: last_error_at.map(|raw| parse_timestamp(&raw)).transpose()?,
        last_error_message: row.get(4)?,
        last_http_status: row.get(5)?,
        items_fetched: row.get(6)?,
        items_saved: row.get(7)?,
    })
}

fn row_to_vendor(row: &rusqlite::Row<'_>) -> rusqlite::Result<Vendor> {
    let id: i64 = row.get(0)?;
    let tenant_id: i64 = row.get(1)?;
    let risk_score: u8 = row.get(5)?;
    Ok(Vendor {
        id: id_or_invalid(id)?,
        tenant_id: id_or_invalid(tenant_id)?,
        name: row.get(2)?,
        code: row.get(3)?,
        country: row.get(4)?,
        risk_score,
        risk_level: watchtower_core::RiskLevel::for_score(risk_score),
        approved: row.get(6)?,
    })
}

fn row_to_evidence(row: &rusqlite::Row<'_>) -> rusqlite::Result<Evidence> {
    let id: i64 = row.get(0)?;
    let tenant_id: i64 = row.get(1)?;
    let status: String = row.get(5)?;
    let processed_at: Option<String> = row.get(7)?;
    Ok(Evidence {
        id: id_or_invalid(id)?,
        tenant_id: id_or_invalid(tenant_id)?,
        filename: row.get(2)?,
        content_hash: row.get(3)?,
        extracted_text: row.get(4)?,
        status: parse_evidence_status(&status)?,
        error_message: row.get(6)?,
        processed_at: processed_at.map(|raw| parse_timestamp(&raw)).transpose()?,
    })
}

fn row_to_workflow_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkflowRun> {
    let id: i64 = row.get(0)?;
    let tenant_id: i64 = row.get(1)?;
    let evidence_id: i64 = row.get(2)?;
    let status: String = row.get(3)?;
    let started_at: String = row.get(4)?;
    let completed_at: Option<String> = row.get(5)?;
    Ok(WorkflowRun {
        id: id_or_invalid(id)?,
        tenant_id: id_or_invalid(tenant_id)?,
        evidence_id: id_or_invalid(evidence_id)?,
        status: parse_run_status(&status)?,
        started_at: parse_timestamp(&started_at)?,
        completed_at: completed_at.map(|raw| parse_timestamp(&raw)).transpose()?,
        error_message: row.get(6)?,
        findings_count: row.get(7)?,
        correlations_count: row.get(8)?,
        actions_count: row.get(9)?,
    })
}

fn row_to_finding(row: &rusqlite::Row<'_>) -> rusqlite::Result<Finding> {
    let id: Option<i64> = row.get(0)?;
    let run_id: i64 = row.get(1)?;
    let evidence_id: i64 = row.get(2)?;
    let severity: String = row.get(5)?;
    let cfr_refs: String = row.get(6)?;
    let citations: String = row.get(7)?;
    let entities: String = row.get(8)?;
    Ok(Finding {
        id: id.map(row_id_to_u64).and_then(watchtower_core::FindingId::from_raw),
        run_id: id_or_invalid(run_id)?,
        evidence_id: id_or_invalid(evidence_id)?,
        title: row.get(3)?,
        description: row.get(4)?,
        severity: parse_severity(&severity)?,
        cfr_refs: parse_json_strings(&cfr_refs),
        citations: parse_json_strings(&citations),
        entities: parse_json_strings(&entities),
    })
}

fn row_to_action_plan(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActionPlan> {
    let run_id: i64 = row.get(0)?;
    let evidence_id: i64 = row.get(1)?;
    let actions: String = row.get(3)?;
    let owners: String = row.get(4)?;
    let deadlines: String = row.get(5)?;
    let snapshot: String = row.get(6)?;
    Ok(ActionPlan {
        run_id: id_or_invalid(run_id)?,
        evidence_id: id_or_invalid(evidence_id)?,
        rationale: row.get(2)?,
        actions: serde_json::from_str::<Vec<ActionItem>>(&actions).unwrap_or_default(),
        owners: parse_json_strings(&owners),
        deadlines: parse_json_strings(&deadlines),
        correlation_snapshot: serde_json::from_str(&snapshot)
            .unwrap_or_else(|_| serde_json::json!({})),
    })
}

fn row_to_audit_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    let tenant_id: i64 = row.get(0)?;
    let details: String = row.get(5)?;
    let timestamp: String = row.get(6)?;
    Ok(AuditEntry {
        tenant_id: id_or_invalid(tenant_id)?,
        actor_id: row.get(1)?,
        action: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        details: serde_json::from_str(&details).unwrap_or_else(|_| serde_json::json!({})),
        timestamp: parse_timestamp(&timestamp)?,
        source_address: row.get(7)?,
    })
}

fn row_to_feed_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<FeedItem> {
    let source: String = row.get(0)?;
    let published_at: Option<String> = row.get(4)?;
    let status: Option<String> = row.get(7)?;
    let tags: String = row.get(8)?;
    let raw_payload: String = row.get(9)?;
    let ingested_at: String = row.get(10)?;
    let source = parse_source(&source)?;
    Ok(FeedItem {
        source,
        external_id: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        published_at: published_at.map(|raw| parse_timestamp(&raw)).transpose()?,
        summary: row.get(5)?,
        category: source.category(),
        vendor_name: row.get(6)?,
        status: status.map(|raw| parse_shortage_status(&raw)).transpose()?,
        tags: parse_json_strings(&tags),
        raw_payload: serde_json::from_str(&raw_payload).unwrap_or_else(|_| serde_json::json!({})),
        ingested_at: parse_timestamp(&ingested_at)?,
    })
}

fn parse_json_strings(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| column_error(err.to_string()))
}

fn parse_source(raw: &str) -> rusqlite::Result<SourceId> {
    SourceId::parse(raw).ok_or_else(|| column_error(format!("unknown source: {raw}")))
}

fn parse_evidence_status(raw: &str) -> rusqlite::Result<EvidenceStatus> {
    match raw {
        "pending" => Ok(EvidenceStatus::Pending),
        "processing" => Ok(EvidenceStatus::Processing),
        "processed" => Ok(EvidenceStatus::Processed),
        "failed" => Ok(EvidenceStatus::Failed),
        other => Err(column_error(format!("unknown evidence status: {other}"))),
    }
}

fn parse_run_status(raw: &str) -> rusqlite::Result<WorkflowRunStatus> {
    match raw {
        "pending" => Ok(WorkflowRunStatus::Pending),
        "running" => Ok(WorkflowRunStatus::Running),
        "success" => Ok(WorkflowRunStatus::Success),
        "failed" => Ok(WorkflowRunStatus::Failed),
        other => Err(column_error(format!("unknown run status: {other}"))),
    }
}

fn parse_severity(raw: &str) -> rusqlite::Result<Severity> {
    match raw {
        "LOW" => Ok(Severity::Low),
        "MEDIUM" => Ok(Severity::Medium),
        "HIGH" => Ok(Severity::High),
        other => Err(column_error(format!("unknown severity: {other}"))),
    }
}

fn parse_shortage_status(raw: &str) -> rusqlite::Result<ShortageStatus> {
    match raw {
        "current" => Ok(ShortageStatus::Current),
        "resolved" => Ok(ShortageStatus::Resolved),
        "terminated" => Ok(ShortageStatus::Terminated),
        other => Err(column_error(format!("unknown shortage status: {other}"))),
    }
}

fn id_or_invalid<T>(raw: i64) -> rusqlite::Result<T>
where
    T: TryIdFromRaw,
{
    T::try_from_raw(row_id_to_u64(raw)).ok_or_else(|| column_error("id was zero".to_string()))
}

/// Bridges the workspace's `NonZeroU64`-backed id newtypes into the row
/// decoders above without repeating the same `from_raw`/`ok_or_else` shape
/// per entity.
trait TryIdFromRaw: Sized {
    /// Attempts to build this id type from a raw row value.
    fn try_from_raw(raw: u64) -> Option<Self>;
}

macro_rules! impl_try_id_from_raw {
    ($ty:ty) => {
        impl TryIdFromRaw for $ty {
            fn try_from_raw(raw: u64) -> Option<Self> {
                Self::from_raw(raw)
            }
        }
    };
}

impl_try_id_from_raw!(TenantId);
impl_try_id_from_raw!(VendorId);
impl_try_id_from_raw!(EvidenceId);
impl_try_id_from_raw!(RunId);

fn column_error(message: String) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(0, message, rusqlite::types::Type::Text)
}

// crates/watchtower-store-sqlite/src/schema.rs
// ============================================================================
// Module: Watchtower Schema
// Description: DDL for the Watchtower persistence gateway.
// Purpose: One `CREATE TABLE IF NOT EXISTS` statement per entity in spec §3.
// Dependencies: none (plain SQL text)
// ============================================================================

//! ## Overview
//! Timestamps are stored as RFC 3339 text rather than `SQLite`'s integer
//! `unixepoch`, matching how [`chrono::DateTime<chrono::Utc>`] round-trips
//! through `to_rfc3339`/`parse_from_rfc3339` elsewhere in this crate.
//! List-valued fields (`tags`, `cfr_refs`, `citations`, `entities`,
//! `actions`, `owners`, `deadlines`) and the raw JSON payloads are stored as
//! serialized JSON text columns.

/// The full schema, applied with `execute_batch` on every open.
pub(crate) const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS tenants (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vendors (
    id         INTEGER PRIMARY KEY,
    tenant_id  INTEGER NOT NULL REFERENCES tenants(id),
    name       TEXT NOT NULL,
    code       TEXT NOT NULL,
    country    TEXT NOT NULL,
    risk_score INTEGER NOT NULL,
    risk_level TEXT NOT NULL,
    approved   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_vendors_tenant ON vendors(tenant_id);

CREATE TABLE IF NOT EXISTS feed_items (
    id            INTEGER PRIMARY KEY,
    source        TEXT NOT NULL,
    external_id   TEXT NOT NULL,
    title         TEXT NOT NULL,
    url           TEXT,
    published_at  TEXT,
    summary       TEXT,
    category      TEXT NOT NULL,
    vendor_name   TEXT,
    status        TEXT,
    tags          TEXT NOT NULL,
    raw_payload   TEXT NOT NULL,
    ingested_at   TEXT NOT NULL,
    UNIQUE(source, external_id)
);

CREATE INDEX IF NOT EXISTS idx_feed_items_published ON feed_items(published_at);

CREATE TABLE IF NOT EXISTS sync_status (
    source              TEXT PRIMARY KEY,
    last_run_at         TEXT NOT NULL,
    last_success_at     TEXT,
    last_error_at       TEXT,
    last_error_message  TEXT,
    last_http_status    INTEGER,
    items_fetched       INTEGER NOT NULL,
    items_saved         INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS evidence (
    id              INTEGER PRIMARY KEY,
    tenant_id       INTEGER NOT NULL REFERENCES tenants(id),
    filename        TEXT NOT NULL,
    content_hash    TEXT NOT NULL,
    extracted_text  TEXT,
    status          TEXT NOT NULL,
    error_message   TEXT,
    processed_at    TEXT
);

CREATE INDEX IF NOT EXISTS idx_evidence_tenant ON evidence(tenant_id);

CREATE TABLE IF NOT EXISTS workflow_runs (
    id                  INTEGER PRIMARY KEY,
    tenant_id           INTEGER NOT NULL REFERENCES tenants(id),
    evidence_id         INTEGER NOT NULL REFERENCES evidence(id),
    status              TEXT NOT NULL,
    started_at          TEXT NOT NULL,
    completed_at        TEXT,
    error_message       TEXT,
    findings_count      INTEGER NOT NULL,
    correlations_count  INTEGER NOT NULL,
    actions_count       INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_workflow_runs_evidence ON workflow_runs(evidence_id);
CREATE INDEX IF NOT EXISTS idx_workflow_runs_tenant ON workflow_runs(tenant_id);

CREATE TABLE IF NOT EXISTS findings (
    id            INTEGER PRIMARY KEY,
    run_id        INTEGER NOT NULL REFERENCES workflow_runs(id),
    evidence_id   INTEGER NOT NULL REFERENCES evidence(id),
    title         TEXT NOT NULL,
    description   TEXT NOT NULL,
    severity      TEXT NOT NULL,
    cfr_refs      TEXT NOT NULL,
    citations     TEXT NOT NULL,
    entities      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_findings_run ON findings(run_id);

CREATE TABLE IF NOT EXISTS action_plans (
    run_id                INTEGER PRIMARY KEY REFERENCES workflow_runs(id),
    evidence_id           INTEGER NOT NULL REFERENCES evidence(id),
    rationale             TEXT NOT NULL,
    actions               TEXT NOT NULL,
    owners                TEXT NOT NULL,
    deadlines             TEXT NOT NULL,
    correlation_snapshot  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id             INTEGER PRIMARY KEY,
    tenant_id      INTEGER NOT NULL REFERENCES tenants(id),
    actor_id       TEXT,
    action         TEXT NOT NULL,
    entity_type    TEXT,
    entity_id      TEXT,
    details        TEXT NOT NULL,
    timestamp      TEXT NOT NULL,
    source_address TEXT
);

CREATE INDEX IF NOT EXISTS idx_audit_log_entity ON audit_log(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_audit_log_tenant ON audit_log(tenant_id);
";

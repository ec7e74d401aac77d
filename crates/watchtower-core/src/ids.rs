// crates/watchtower-core/src/ids.rs
// ============================================================================
// Module: Watchtower Identifiers
// Description: Strongly typed, 1-based identifiers for tenant-scoped rows.
// Purpose: Prevent accidental mixing of tenant, vendor, evidence, run, and
//          finding identifiers at call sites.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every persisted row owned by the [`crate::model`] entities is addressed
//! by one of these identifiers. They are opaque 1-based integers assigned
//! by the persistence gateway (never by callers), mirroring how the rows
//! are actually stored (`SQLite` `INTEGER PRIMARY KEY`).

use std::fmt;
use std::num::NonZeroU64;

use serde::Deserialize;
use serde::Serialize;

/// Generates a 1-based opaque identifier newtype around [`NonZeroU64`].
macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Creates an identifier from a non-zero value.
            #[must_use]
            pub const fn new(value: NonZeroU64) -> Self {
                Self(value)
            }

            /// Creates an identifier from a raw value, returning `None` when zero.
            #[must_use]
            pub fn from_raw(raw: u64) -> Option<Self> {
                NonZeroU64::new(raw).map(Self)
            }

            /// Returns the raw identifier value (always >= 1).
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.get().fmt(f)
            }
        }
    };
}

id_type! {
    /// Tenant identifier. Every vendor, evidence row, and workflow run is
    /// scoped to exactly one tenant.
    TenantId
}

id_type! {
    /// Vendor identifier, scoped to a tenant's vendor registry.
    VendorId
}

id_type! {
    /// Evidence document identifier, scoped to a tenant.
    EvidenceId
}

id_type! {
    /// Workflow run identifier, scoped to a tenant.
    RunId
}

id_type! {
    /// Finding identifier, scoped to a workflow run.
    FindingId
}

id_type! {
    /// Action plan identifier. Exactly one exists per successful run.
    ActionPlanId
}

id_type! {
    /// Audit log entry identifier.
    AuditEntryId
}

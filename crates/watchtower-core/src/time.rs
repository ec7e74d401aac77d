// crates/watchtower-core/src/time.rs
// ============================================================================
// Module: Watchtower Time
// Description: The single seam through which this crate reads wall-clock time.
// Purpose: Let callers inject deterministic clocks in tests without threading
//          a generic `Clock` trait through every component.
// Dependencies: chrono
// ============================================================================

//! ## Overview
//! Components that need "now" call [`now`] rather than `chrono::Utc::now()`
//! directly. Tests that need deterministic timestamps construct
//! [`chrono::DateTime<chrono::Utc>`] values by hand and pass them in instead
//! of calling this function.

use chrono::DateTime;
use chrono::Utc;

/// Returns the current wall-clock time.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

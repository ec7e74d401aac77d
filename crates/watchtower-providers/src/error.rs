// crates/watchtower-providers/src/error.rs
// ============================================================================
// Module: Provider Error
// Description: Error type surfaced by a provider adapter's fetch operation.
// Purpose: Give the sync engine enough detail to populate `SyncStatus`
//          telemetry without leaking transport internals.
// Dependencies: thiserror, watchtower-core
// ============================================================================

use watchtower_core::ErrorKind;

/// A failure fetching or parsing a feed source.
///
/// # Invariants
/// - `http_status`, when present, is the last status observed before the
///   error was raised, for sync-status telemetry (spec §4.2).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Every URL in the primary and fallback chain failed after retries.
    #[error("provider http error: {message}")]
    Http {
        /// Human-readable cause, folded in from the last transport error.
        message: String,
        /// Last HTTP status observed, if any request reached the server.
        http_status: Option<u16>,
    },
    /// A response body could not be parsed into feed items.
    #[error("provider parse error: {0}")]
    Parse(String),
    /// The primary source and every configured fallback failed.
    #[error("all sources failed: {0}")]
    AllSourcesFailed(String),
}

impl ProviderError {
    /// Maps this error onto the stable, closed error taxonomy (spec §7).
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Http { .. } => ErrorKind::ProviderHttpError,
            Self::Parse(_) => ErrorKind::ProviderParseError,
            Self::AllSourcesFailed(_) => ErrorKind::ProviderAllSourcesFailed,
        }
    }

    /// Returns the last observed HTTP status, if any.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { http_status, .. } => *http_status,
            Self::Parse(_) | Self::AllSourcesFailed(_) => None,
        }
    }
}

// crates/watchtower-config/src/lib.rs
// ============================================================================
// Module: Watchtower Config
// Description: Serde configuration models for providers, the sync engine,
//              and the workflow orchestrator, with the spec's defaults.
// Purpose: Give every component a typed, TOML-loadable configuration struct
//          instead of scattering magic numbers across the codebase.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! This is a configuration *model*, not a CLI flag parser: the CLI
//! entrypoint is out of scope for this crate (spec §1). Callers load a
//! [`WatchtowerConfig`] from TOML via [`WatchtowerConfig::load_from_str`]
//! or construct `Default::default()` to get the numeric defaults spec §4
//! calls for.

#![forbid(unsafe_code)]

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Errors loading or parsing a [`WatchtowerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("config parse failure: {0}")]
    Parse(#[from] toml::de::Error),
}

/// HTTP behavior shared by every provider adapter (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpProviderConfig {
    /// Per-request timeout, milliseconds. Spec default: 15 000 (<=15s).
    pub timeout_ms: u64,
    /// Connect timeout, milliseconds. Spec default: 5 000 (<=5s).
    pub connect_timeout_ms: u64,
    /// Maximum fetch attempts (initial + retries). Spec default: 3.
    pub max_attempts: u32,
    /// Backoff base, milliseconds, doubled per attempt. Spec default: 1 000.
    pub backoff_base_ms: u64,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            connect_timeout_ms: 5_000,
            max_attempts: 3,
            backoff_base_ms: 1_000,
        }
    }
}

impl HttpProviderConfig {
    /// Returns the per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the backoff delay before the given zero-based retry attempt.
    #[must_use]
    pub fn backoff_before_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(multiplier))
    }
}

/// Cache layer configuration (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Default TTL, seconds. Spec default: 900 (15 minutes).
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 900,
        }
    }
}

impl CacheConfig {
    /// Returns the default TTL as a [`Duration`].
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }
}

/// Sync engine configuration (spec §4.5, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncEngineConfig {
    /// Delay between consecutive sources in `SyncAll`, milliseconds.
    /// Spec default: 500.
    pub inter_source_delay_ms: u64,
    /// Total budget for one source's sync, seconds. Spec default: 60.
    pub per_source_budget_seconds: u64,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            inter_source_delay_ms: 500,
            per_source_budget_seconds: 60,
        }
    }
}

impl SyncEngineConfig {
    /// Returns the inter-source delay as a [`Duration`].
    #[must_use]
    pub const fn inter_source_delay(&self) -> Duration {
        Duration::from_millis(self.inter_source_delay_ms)
    }

    /// Returns the per-source budget as a [`Duration`].
    #[must_use]
    pub const fn per_source_budget(&self) -> Duration {
        Duration::from_secs(self.per_source_budget_seconds)
    }
}

/// Workflow orchestrator configuration (spec §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Total budget for one workflow run, seconds. Spec default: 120.
    pub per_run_budget_seconds: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            per_run_budget_seconds: 120,
        }
    }
}

impl WorkflowConfig {
    /// Returns the per-run budget as a [`Duration`].
    #[must_use]
    pub const fn per_run_budget(&self) -> Duration {
        Duration::from_secs(self.per_run_budget_seconds)
    }
}

/// Top-level configuration aggregating every component's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchtowerConfig {
    /// HTTP provider settings.
    pub http: HttpProviderConfig,
    /// Cache layer settings.
    pub cache: CacheConfig,
    /// Sync engine settings.
    pub sync: SyncEngineConfig,
    /// Workflow orchestrator settings.
    pub workflow: WorkflowConfig,
}

impl WatchtowerConfig {
    /// Parses a [`WatchtowerConfig`] from a TOML document, falling back to
    /// defaults for any section or field the document omits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document is not valid TOML.
    pub fn load_from_str(toml_source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_source)?)
    }
}

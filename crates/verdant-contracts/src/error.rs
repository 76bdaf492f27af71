//! Runtime error taxonomy for the verdant policy engine.
//!
//! All fallible operations across the workspace return `EngineResult<T>`.
//! The taxonomy is ordered by when an error can occur: `Validation` and
//! `Permission` are rejected before any side effect, `Transport` is terminal
//! for the current lifecycle operation, and `BlockRuntime` is always caught
//! at the block boundary and converted into an error event — it never
//! crashes the engine.

use thiserror::Error;

use crate::validation::ValidationReport;

/// The unified error type for the verdant engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input rejected before any side effect: malformed version,
    /// non-increasing version, duplicate version, empty config.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// The caller is not allowed to perform the operation: wrong owner,
    /// non-registry user requesting a virtual identity, role lacks access.
    #[error("permission denied: {reason}")]
    Permission { reason: String },

    /// Unknown policy, block, tag, or unregistered uuid.
    #[error("not found: {reason}")]
    NotFound { reason: String },

    /// One or more blocks failed semantic validation. Publish and dry-run
    /// refuse to proceed and return the per-block report instead.
    #[error("policy validation failed: {} invalid block(s)", report.invalid_count())]
    BlockValidation { report: ValidationReport },

    /// A ledger send or fetch failed. Terminal for the current lifecycle
    /// operation; no partial state is considered published.
    #[error("ledger transport failure: {reason}")]
    Transport { reason: String },

    /// The document store could not persist or read a record.
    #[error("storage failure: {reason}")]
    Storage { reason: String },

    /// An error inside a block's own get/set logic, caught at the block
    /// boundary and converted into a block-scoped error event.
    #[error("block runtime error in '{block_type}': {reason}")]
    BlockRuntime { block_type: String, reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl EngineError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation { reason: reason.into() }
    }

    pub fn permission(reason: impl Into<String>) -> Self {
        Self::Permission { reason: reason.into() }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound { reason: reason.into() }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport { reason: reason.into() }
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage { reason: reason.into() }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config { reason: reason.into() }
    }

    pub fn block_runtime(block_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BlockRuntime {
            block_type: block_type.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the verdant crates.
pub type EngineResult<T> = Result<T, EngineError>;

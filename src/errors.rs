//! Error types for the fairness engine
//!
//! One root error with severity classification, plus the storage and
//! configuration sub-errors it wraps.

use crate::seed_vault::SeedId;
use thiserror::Error;

/// How callers are expected to react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Stop accepting rounds; never fall back.
    Fatal,
    /// Reject the request; no state was changed.
    Recoverable,
    /// Normal condition, try again later.
    Expected,
    /// Escalate to the operator alert path.
    Critical,
}

/// Root error type for all engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Entropy source failure: {0}")]
    EntropyFailure(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Seed {seed_id} already has rounds bound to it")]
    SeedAlreadyInUse { seed_id: SeedId },

    #[error("Seed {seed_id} is retired and cannot accept rounds")]
    SeedRetired { seed_id: SeedId },

    #[error("Seed {seed_id} is still active and cannot be revealed")]
    SeedStillActive { seed_id: SeedId },

    #[error("Seed {seed_id} has {pending} unsettled round(s)")]
    UnsettledRounds { seed_id: SeedId, pending: usize },

    #[error("Server seed for round {round_number} has not been revealed yet")]
    SeedNotYetRevealed { round_number: u64 },

    #[error("Round {0} has not been settled")]
    RoundNotSettled(u64),

    #[error("Round {round_number} cannot move from {from} to {to}")]
    InvalidTransition {
        round_number: u64,
        from: String,
        to: String,
    },

    #[error("Integrity mismatch on round {round_number}: {detail}")]
    IntegrityMismatch { round_number: u64, detail: String },

    #[error("Seed {0} not found")]
    SeedNotFound(SeedId),

    #[error("Round {0} not found")]
    RoundNotFound(u64),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl EngineError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EngineError::EntropyFailure(_) => ErrorSeverity::Fatal,
            EngineError::SeedNotYetRevealed { .. } | EngineError::RoundNotSettled(_) => {
                ErrorSeverity::Expected
            }
            EngineError::IntegrityMismatch { .. } | EngineError::Storage(_) => {
                ErrorSeverity::Critical
            }
            EngineError::Configuration(_) => ErrorSeverity::Fatal,
            EngineError::InvalidParameters(_)
            | EngineError::SeedAlreadyInUse { .. }
            | EngineError::SeedRetired { .. }
            | EngineError::SeedStillActive { .. }
            | EngineError::UnsettledRounds { .. }
            | EngineError::InvalidTransition { .. }
            | EngineError::SeedNotFound(_)
            | EngineError::RoundNotFound(_) => ErrorSeverity::Recoverable,
        }
    }

    pub fn invalid_parameters(msg: impl Into<String>) -> Self {
        EngineError::InvalidParameters(msg.into())
    }
}

/// Round storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("Duplicate round number {0}")]
    DuplicateRound(u64),
}

/// Configuration and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for EngineError {
    fn from(e: rocksdb::Error) -> Self {
        EngineError::Storage(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::CorruptedData(e.to_string())
    }
}

/// Convenience type alias for Results
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = EngineError::SeedNotYetRevealed { round_number: 7 };
        assert!(err.to_string().contains("round 7"));

        let err = EngineError::UnsettledRounds { seed_id: 3, pending: 2 };
        assert!(err.to_string().contains("2 unsettled"));
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(
            EngineError::EntropyFailure("os rng".into()).severity(),
            ErrorSeverity::Fatal
        );
        assert_eq!(
            EngineError::invalid_parameters("mines_count").severity(),
            ErrorSeverity::Recoverable
        );
        assert_eq!(
            EngineError::SeedNotYetRevealed { round_number: 1 }.severity(),
            ErrorSeverity::Expected
        );
        assert_eq!(
            EngineError::IntegrityMismatch {
                round_number: 1,
                detail: "outcome".into()
            }
            .severity(),
            ErrorSeverity::Critical
        );
    }

    #[test]
    fn test_error_conversion() {
        let err: EngineError = StorageError::DuplicateRound(9).into();
        match err {
            EngineError::Storage(StorageError::DuplicateRound(9)) => {}
            other => panic!("Expected storage error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_source() {
        let err: EngineError = ConfigurationError::ValidationFailed("test".into()).into();
        assert!(err.source().is_some());
    }
}

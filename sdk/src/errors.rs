//! Error types and handling
//!
//! This module provides the error types used throughout the Elicit engine.
//! All errors implement the `EngineErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! Degraded turn paths (detector timeouts, empty candidate sets, corrupt
//! tracker snapshots) are not errors: the engine records them on the turn
//! outcome and keeps going. The variants here cover the cases a caller has
//! to act on.

use thiserror::Error;

/// Trait for engine error extensions
///
/// Provides additional context for errors, including user-friendly hints and
/// recoverability information.
pub trait EngineErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors affect a single turn or a single signal. Non-recoverable
    /// errors mean the session cannot proceed without operator intervention.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Tracker**: Mutations that reference concepts the tracker never saw
/// - **Snapshot**: Persisted state that cannot be decoded
/// - **Store**: Persistence collaborator failures
/// - **Quality detector**: Response-quality collaborator failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, EngineErrorExt};
///
/// let error = EngineError::UnknownConcept("c-42".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::Config("no strategies".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Tracker errors
    #[error("Unknown concept: {0}")]
    UnknownConcept(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    // Snapshot errors
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    SnapshotVersion { found: u32, expected: u32 },

    // Persistence errors
    #[error("Session store error: {0}")]
    Store(String),

    // Response-quality collaborator errors
    #[error("Quality detector error: {0}")]
    QualityDetector(String),

    #[error("Quality detector timed out after {0}ms")]
    QualityTimeout(u64),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Snapshot(err.to_string())
    }
}

impl EngineErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::UnknownConcept(_) => "The concept is not tracked yet. Apply graph mutations first",
            Self::UnknownStrategy(_) => "Strategy is not defined in the configuration",

            Self::Snapshot(_) => "Persisted session state could not be decoded",
            Self::SnapshotVersion { .. } => "Persisted session state was written by another version",

            Self::Store(_) => "Session store operation failed. Check the data directory",

            Self::QualityDetector(_) => "Response scoring failed. Neutral scores were used",
            Self::QualityTimeout(_) => "Response scoring took too long. Neutral scores were used",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_not_recoverable() {
        let err = EngineError::Config("bad".to_string());
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "Configuration error: bad");
    }

    #[test]
    fn test_snapshot_version_message() {
        let err = EngineError::SnapshotVersion {
            found: 7,
            expected: 1,
        };
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("version 7"));
    }

    #[test]
    fn test_serde_error_maps_to_snapshot() {
        let parse: Result<u32, _> = serde_json::from_str("not json");
        let err: EngineError = parse.unwrap_err().into();
        assert!(matches!(err, EngineError::Snapshot(_)));
    }
}

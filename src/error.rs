//! Error types
//!
//! Configuration errors fail fast before any step runs. The marker errors at
//! the bottom travel through test bodies but never become issues themselves.

use std::path::PathBuf;
use thiserror::Error;

/// Errors detected while building a configuration, filter or plan
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unsupported ABI version {requested} (supported: {minimum}..={maximum})")]
    UnsupportedAbiVersion {
        requested: u32,
        minimum: u32,
        maximum: u32,
    },

    #[error("Invalid polling options: {0}")]
    InvalidPolling(String),

    #[error("Invalid repetition policy: {0}")]
    InvalidRepetition(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors produced while encoding or decoding ABI records
#[derive(Error, Debug)]
pub enum AbiError {
    #[error("Malformed ABI record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported ABI record version {0}")]
    UnsupportedVersion(u32),

    #[error("Expected a {expected} record, found {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Unknown event kind '{0}'")]
    UnknownEventKind(String),
}

/// Errors raised while preparing, launching or re-entering an exit test
#[derive(Error, Debug)]
pub enum ExitTestError {
    #[error("No exit test handler is configured")]
    HandlerMissing,

    #[error("No exit test registered with id '{0}'")]
    NotFound(String),

    #[error("Failed to spawn exit test process {}: {source}", executable.display())]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode captured value '{name}': {source}")]
    CaptureEncode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode captured value '{name}': {source}")]
    CaptureDecode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Captured value '{0}' is missing")]
    CaptureMissing(String),

    #[error("Malformed capture blob: {0}")]
    CaptureBlob(#[source] serde_json::Error),

    #[error("Exit test was cancelled")]
    Cancelled,

    #[error("Exit test I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Returned by `require` after the failed expectation was already recorded.
///
/// The runner recognises it and records nothing further.
#[derive(Error, Debug, Clone, Default)]
#[error("Expectation failed")]
pub struct ExpectationFailedError {
    pub description: Option<String>,
}

/// Returned by `cancel_test` and `cancel_case`; ends a body without an issue.
#[derive(Error, Debug, Clone, Default)]
#[error("Test cancelled{}", .comment.as_deref().map(|c| format!(": {c}")).unwrap_or_default())]
pub struct CancellationError {
    pub comment: Option<String>,
}

/// True if `error` only signals control flow (cancellation or an already
/// recorded `require` failure) and must not become an issue.
pub fn is_control_flow(error: &anyhow::Error) -> bool {
    error.is::<CancellationError>() || error.is::<ExpectationFailedError>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_flow_errors() {
        assert!(is_control_flow(&anyhow::Error::new(CancellationError::default())));
        assert!(is_control_flow(&anyhow::Error::new(
            ExpectationFailedError::default()
        )));
        assert!(!is_control_flow(&anyhow::anyhow!("boom")));
    }

    #[test]
    fn test_cancellation_message() {
        let err = CancellationError {
            comment: Some("flaky network".to_string()),
        };
        assert_eq!(err.to_string(), "Test cancelled: flaky network");
        assert_eq!(CancellationError::default().to_string(), "Test cancelled");
    }

    #[test]
    fn test_abi_version_message() {
        let err = ConfigError::UnsupportedAbiVersion {
            requested: 9,
            minimum: 0,
            maximum: 1,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported ABI version 9 (supported: 0..=1)"
        );
    }
}

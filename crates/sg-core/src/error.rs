//! Error types for sg-core

use serde::Serialize;
use thiserror::Error;

use crate::capability::BackendId;

/// Main error type for sg-core plumbing (configuration, I/O, tools)
#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability error: {0}")]
    Capability(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for sg-core
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong inside a backend adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    /// Binary, library or OS service is missing
    NotInstalled,
    /// API key or region not configured
    CredentialMissing,
    /// Service could not be reached
    Network,
    /// Service refused because of rate limits or billing
    QuotaExceeded,
    /// The requested voice does not exist on this backend
    UnsupportedVoice,
    /// The requested language is not spoken by this backend
    UnsupportedLanguage,
    /// The backend does not implement this operation (e.g. transcription)
    UnsupportedOperation,
    /// Any other reported synthesis/recognition failure
    Rejected,
}

/// Typed error returned by backend adapters
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind:?}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_installed(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::NotInstalled, message)
    }

    pub fn credential_missing(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::CredentialMissing, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Network, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Rejected, message)
    }

    pub fn unsupported_operation(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::UnsupportedOperation, message)
    }

    /// Executor-level classification of this error
    pub fn failure_kind(&self) -> FailureKind {
        match self.kind {
            BackendErrorKind::NotInstalled
            | BackendErrorKind::CredentialMissing
            | BackendErrorKind::Network => FailureKind::EngineUnavailable,
            _ => FailureKind::EngineRejected,
        }
    }
}

/// Classification of one failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    EngineUnavailable,
    EngineTimeout,
    EngineRejected,
}

/// One candidate's failure, recorded by the fallback executor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateFailure {
    pub backend: BackendId,
    pub native_language: String,
    pub voice: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

impl std::fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?}): {}", self.backend, self.kind, self.message)
    }
}

/// Error surfaced to callers for a single job
///
/// Cloneable so that one computed result can be handed to every caller
/// waiting on the same fingerprint.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("Unsupported language: no backend supports '{0}'")]
    UnsupportedLanguage(String),

    #[error("No matching voice '{voice}' for language '{language}'")]
    NoMatchingVoice { voice: String, language: String },

    #[error("Engine unavailable: {backend}: {reason}")]
    EngineUnavailable { backend: String, reason: String },

    #[error("Engine timed out: {backend} after {timeout_ms}ms")]
    EngineTimeout { backend: String, timeout_ms: u64 },

    #[error("Engine rejected request: {backend}: {reason}")]
    EngineRejected { backend: String, reason: String },

    #[error("All {} candidates failed: {}", .failures.len(), summarize(.failures))]
    PlanExhausted { failures: Vec<CandidateFailure> },

    #[error("Job timed out after {timeout_ms}ms ({} attempts failed)", .failures.len())]
    JobTimeout {
        timeout_ms: u64,
        failures: Vec<CandidateFailure>,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Speech context has been shut down")]
    ShutDown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Per-candidate failures carried by this error, if any
    pub fn failures(&self) -> &[CandidateFailure] {
        match self {
            Self::PlanExhausted { failures } | Self::JobTimeout { failures, .. } => failures,
            _ => &[],
        }
    }

    /// Stable machine-readable name of the variant
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedLanguage(_) => "unsupported_language",
            Self::NoMatchingVoice { .. } => "no_matching_voice",
            Self::EngineUnavailable { .. } => "engine_unavailable",
            Self::EngineTimeout { .. } => "engine_timeout",
            Self::EngineRejected { .. } => "engine_rejected",
            Self::PlanExhausted { .. } => "plan_exhausted",
            Self::JobTimeout { .. } => "job_timeout",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ShutDown => "shut_down",
            Self::Internal(_) => "internal",
        }
    }

    /// Surface a single candidate failure directly (explicit-engine requests)
    pub fn from_failure(failure: &CandidateFailure, timeout_ms: u64) -> Self {
        let backend = failure.backend.to_string();
        match failure.kind {
            FailureKind::EngineUnavailable => Self::EngineUnavailable {
                backend,
                reason: failure.message.clone(),
            },
            FailureKind::EngineTimeout => Self::EngineTimeout {
                backend,
                timeout_ms,
            },
            FailureKind::EngineRejected => Self::EngineRejected {
                backend,
                reason: failure.message.clone(),
            },
        }
    }
}

fn summarize(failures: &[CandidateFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(backend: &str, kind: FailureKind) -> CandidateFailure {
        CandidateFailure {
            backend: BackendId::new(backend),
            native_language: "yue".to_string(),
            voice: None,
            kind,
            message: format!("{} broke", backend),
        }
    }

    #[test]
    fn test_backend_error_classification() {
        assert_eq!(
            BackendError::not_installed("espeak").failure_kind(),
            FailureKind::EngineUnavailable
        );
        assert_eq!(
            BackendError::credential_missing("key").failure_kind(),
            FailureKind::EngineUnavailable
        );
        assert_eq!(
            BackendError::new(BackendErrorKind::QuotaExceeded, "429").failure_kind(),
            FailureKind::EngineRejected
        );
        assert_eq!(
            BackendError::new(BackendErrorKind::UnsupportedVoice, "nope").failure_kind(),
            FailureKind::EngineRejected
        );
    }

    #[test]
    fn test_plan_exhausted_lists_every_failure() {
        let err = JobError::PlanExhausted {
            failures: vec![
                failure("gtts", FailureKind::EngineTimeout),
                failure("espeak", FailureKind::EngineRejected),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("All 2 candidates failed"));
        assert!(message.contains("gtts"));
        assert!(message.contains("espeak"));
        assert_eq!(err.failures().len(), 2);
        assert_eq!(err.code(), "plan_exhausted");
    }

    #[test]
    fn test_from_failure_keeps_kind() {
        let err = JobError::from_failure(&failure("say", FailureKind::EngineTimeout), 500);
        assert_eq!(
            err,
            JobError::EngineTimeout {
                backend: "say".to_string(),
                timeout_ms: 500
            }
        );

        let err = JobError::from_failure(&failure("say", FailureKind::EngineUnavailable), 500);
        assert_eq!(err.code(), "engine_unavailable");
    }
}

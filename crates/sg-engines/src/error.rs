//! Error types for sg-engines

use sg_core::BackendError;
use thiserror::Error;

/// Adapter-internal error, mapped into [`BackendError`] at the trait boundary
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Process failed: {0}")]
    Process(String),

    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<EngineError> for BackendError {
    fn from(err: EngineError) -> Self {
        use sg_core::BackendErrorKind as Kind;

        let message = err.to_string();
        let kind = match &err {
            EngineError::Api { status, .. } => match status {
                401 | 403 => Kind::CredentialMissing,
                429 => Kind::QuotaExceeded,
                500..=599 => Kind::Network,
                _ => Kind::Rejected,
            },
            EngineError::Http(_) => Kind::Network,
            EngineError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => Kind::NotInstalled,
            EngineError::Config(_) => Kind::CredentialMissing,
            EngineError::Process(_) | EngineError::InvalidFormat(_) | EngineError::Json(_) | EngineError::Io(_) => {
                Kind::Rejected
            }
        };
        BackendError::new(kind, message)
    }
}

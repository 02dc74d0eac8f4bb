//! Backend adapter seam
//!
//! Every speech engine is reached through [`SpeechBackend`]. Adapters
//! describe themselves, answer a health probe, and perform synthesis or
//! transcription, failing with a typed [`BackendError`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::capability::{BackendId, CapabilityDescriptor};
use crate::error::BackendError;

/// Encoded audio container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
    Aiff,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Aiff => "aiff",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::Aiff => "audio/aiff",
        }
    }

    /// Guess from a file name extension
    pub fn from_filename(filename: &str) -> Option<Self> {
        let extension = filename.rsplit_once('.')?.1.to_lowercase();
        match extension.as_str() {
            "wav" => Some(Self::Wav),
            "mp3" => Some(Self::Mp3),
            "aif" | "aiff" => Some(Self::Aiff),
            _ => None,
        }
    }
}

/// Audio produced by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub data: Arc<[u8]>,
    pub format: AudioFormat,
}

impl AudioArtifact {
    pub fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        Self {
            data: Arc::from(data),
            format,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Text recognized from audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    pub text: String,
    /// Detected language, when the backend reports one
    pub language: Option<String>,
}

/// Input for one synthesis call, already in the backend's vocabulary
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub native_language: String,
    pub voice: Option<String>,
    /// Words per minute
    pub speed: u32,
}

/// Input for one transcription call
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub audio: Arc<[u8]>,
    pub filename: String,
    pub native_language: String,
}

/// A synthesis/recognition engine
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Identifier matching the descriptor
    fn id(&self) -> BackendId;

    /// Report capabilities (may list voices from the local system)
    async fn describe(&self) -> Result<CapabilityDescriptor, BackendError>;

    /// Check that the engine is installed, reachable and authenticated
    async fn probe(&self) -> Result<(), BackendError>;

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioArtifact, BackendError>;

    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcript, BackendError> {
        let _ = request;
        Err(BackendError::unsupported_operation(format!(
            "{} does not support transcription",
            self.id()
        )))
    }
}

/// A backend together with the descriptor discovered for it
#[derive(Clone)]
pub struct RegisteredBackend {
    pub descriptor: CapabilityDescriptor,
    pub backend: Arc<dyn SpeechBackend>,
}

impl std::fmt::Debug for RegisteredBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredBackend")
            .field("id", &self.descriptor.id)
            .finish_non_exhaustive()
    }
}

/// Declarative registration of backends
#[async_trait]
pub trait CapabilitySource: Send + Sync {
    /// Return every registered backend, in declaration order
    async fn discover(&self) -> crate::Result<Vec<RegisteredBackend>>;
}

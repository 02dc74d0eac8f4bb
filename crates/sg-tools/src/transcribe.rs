//! Speech-to-text tool

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sg_core::{Artifact, BackendId, CandidateFailure, Constraints, Job, JobError, Result, SpeechContext, Tool, ToolResult};
use tokio::fs;

use crate::output::{to_json, ErrorOutput};
use crate::synthesize::default_auto;

/// Transcribe an audio file (or base64 audio) to text
pub struct TranscribeAudioTool {
    context: Arc<SpeechContext>,
}

impl TranscribeAudioTool {
    pub fn new(context: Arc<SpeechContext>) -> Self {
        Self { context }
    }
}

#[derive(Debug, Deserialize)]
struct TranscribeInput {
    #[serde(default)]
    file_path: Option<String>,
    /// Inline audio, used when no file path is given
    #[serde(default)]
    audio_base64: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default = "default_auto")]
    language: String,
    #[serde(default = "default_auto")]
    engine: String,
}

#[derive(Debug, Serialize)]
struct TranscriptionOutput {
    status: &'static str,
    text: String,
    engine: BackendId,
    /// Hint sent to the recognizer; absent when it detected the language
    language: Option<String>,
    detected_language: Option<String>,
    attempts: usize,
    cached: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fallbacks: Vec<CandidateFailure>,
}

impl TranscribeInput {
    /// Audio bytes and the file name reported to the engine
    async fn audio(&self) -> std::result::Result<(Vec<u8>, String), String> {
        if let Some(path) = &self.file_path {
            let data = fs::read(path)
                .await
                .map_err(|e| format!("Failed to read audio file '{}': {}", path, e))?;
            let filename = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "audio".to_string());
            return Ok((data, filename));
        }
        if let Some(encoded) = &self.audio_base64 {
            let data = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| format!("Invalid base64 audio: {}", e))?;
            return Ok((data, self.filename.clone().unwrap_or_else(|| "audio.wav".to_string())));
        }
        Err("Either 'file_path' or 'audio_base64' is required".to_string())
    }
}

#[async_trait]
impl Tool for TranscribeAudioTool {
    fn name(&self) -> &str {
        "transcribe_audio"
    }

    fn description(&self) -> &str {
        "Transcribe speech in an audio file to text using an engine that supports recognition."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the audio file"
                },
                "audio_base64": {
                    "type": "string",
                    "description": "Base64-encoded audio (alternative to file_path)"
                },
                "filename": {
                    "type": "string",
                    "description": "File name for base64 audio, used to detect the format"
                },
                "language": {
                    "type": "string",
                    "description": "Spoken language code or name (default: auto)",
                    "default": "auto"
                },
                "engine": {
                    "type": "string",
                    "description": "Engine to use or auto",
                    "default": "auto"
                }
            }
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let input: TranscribeInput = serde_json::from_value(input)
            .map_err(|e| sg_core::Error::ToolExecution(format!("Invalid input: {}", e)))?;

        let (data, filename) = match input.audio().await {
            Ok(audio) => audio,
            Err(message) => return Ok(ToolResult::error(message)),
        };

        let mut job = Job::transcription(data, filename).with_language(input.language.as_str());
        job.constraints.explicit_engine = Constraints::engine_pin(Some(&input.engine));

        tracing::debug!(job_id = %job.id, engine = %input.engine, language = %input.language, "Transcribing audio");

        let success = match self.context.submit(job).await.outcome {
            Ok(success) => success,
            Err(e) => return Ok(ToolResult::error(to_json(&ErrorOutput::from(&e)))),
        };
        let transcript = match &success.artifact {
            Artifact::Transcript(t) => t.clone(),
            Artifact::Audio(_) => {
                let e = JobError::Internal("transcription produced audio".to_string());
                return Ok(ToolResult::error(to_json(&ErrorOutput::from(&e))));
            }
        };

        let output = TranscriptionOutput {
            status: "success",
            text: transcript.text,
            engine: success.backend,
            language: Some(success.native_language).filter(|l| !l.is_empty()),
            detected_language: transcript.language,
            attempts: success.attempts,
            cached: success.cached,
            fallbacks: success.failures,
        };
        Ok(ToolResult::success(to_json(&output)))
    }
}

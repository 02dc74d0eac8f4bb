//! Text-to-speech tools

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sg_core::job::DEFAULT_SPEED;
use sg_core::{
    Artifact, AudioArtifact, BackendId, CandidateFailure, Constraints, Job, JobError, JobSuccess, Result,
    SpeechContext, Tool, ToolResult,
};

use crate::output::{self, to_json, ErrorOutput};

/// Convert one text to an audio file
pub struct SynthesizeSpeechTool {
    context: Arc<SpeechContext>,
    output_dir: PathBuf,
}

impl SynthesizeSpeechTool {
    pub fn new(context: Arc<SpeechContext>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            context,
            output_dir: output_dir.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SynthesizeInput {
    text: String,
    #[serde(default = "default_auto")]
    engine: String,
    #[serde(default)]
    voice: Option<String>,
    #[serde(default = "default_speed")]
    speed: u32,
    #[serde(default = "default_auto")]
    language: String,
    #[serde(default)]
    output_file: Option<String>,
    #[serde(default)]
    offline_only: bool,
    #[serde(default)]
    online_only: bool,
}

pub(crate) fn default_auto() -> String {
    "auto".to_string()
}

pub(crate) fn default_speed() -> u32 {
    DEFAULT_SPEED
}

/// Settings shared by single and batch synthesis
pub(crate) struct SynthesisOptions<'a> {
    pub engine: &'a str,
    pub language: &'a str,
    pub voice: Option<&'a str>,
    pub speed: u32,
    pub offline_only: bool,
    pub online_only: bool,
}

impl SynthesisOptions<'_> {
    pub fn job(&self, text: &str) -> Job {
        let mut job = Job::synthesis(text).with_language(self.language).with_speed(self.speed);
        if let Some(voice) = self.voice {
            job = job.with_voice(voice);
        }
        job.constraints = Constraints {
            explicit_engine: Constraints::engine_pin(Some(self.engine)),
            offline_only: self.offline_only,
            online_only: self.online_only,
            ..Constraints::default()
        };
        job
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SynthesisOutput {
    pub status: &'static str,
    pub text: String,
    pub engine: BackendId,
    pub output_file: PathBuf,
    pub file_size_bytes: u64,
    pub format: &'static str,
    pub language: String,
    pub voice: Option<String>,
    pub speed: u32,
    pub attempts: usize,
    pub cached: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<CandidateFailure>,
}

pub(crate) fn audio_of(success: &JobSuccess) -> std::result::Result<&AudioArtifact, JobError> {
    match &success.artifact {
        Artifact::Audio(audio) => Ok(audio),
        Artifact::Transcript(_) => Err(JobError::Internal("synthesis produced a transcript".to_string())),
    }
}

/// Write a successful synthesis and describe it
pub(crate) async fn save(
    success: JobSuccess,
    text: &str,
    speed: u32,
    path: &Path,
    audio: &AudioArtifact,
) -> std::io::Result<SynthesisOutput> {
    let file_size_bytes = output::write_audio(path, audio).await?;
    Ok(SynthesisOutput {
        status: "success",
        text: text.to_string(),
        engine: success.backend,
        output_file: path.to_path_buf(),
        file_size_bytes,
        format: audio.format.extension(),
        language: success.native_language,
        voice: success.voice,
        speed,
        attempts: success.attempts,
        cached: success.cached,
        fallbacks: success.failures,
    })
}

#[async_trait]
impl Tool for SynthesizeSpeechTool {
    fn name(&self) -> &str {
        "synthesize_speech"
    }

    fn description(&self) -> &str {
        "Convert text to speech. Picks the best engine for the language (including Cantonese and Mandarin) and falls back to the next engine on failure."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "Text to convert to speech"
                },
                "engine": {
                    "type": "string",
                    "description": "Engine to use (say, espeak, gtts, azure, openai) or auto",
                    "default": "auto"
                },
                "voice": {
                    "type": "string",
                    "description": "Voice id or name (optional)"
                },
                "speed": {
                    "type": "integer",
                    "description": "Speech speed in words per minute",
                    "default": 150,
                    "minimum": 50,
                    "maximum": 500
                },
                "language": {
                    "type": "string",
                    "description": "Language code or name, e.g. en, zh-HK, cantonese, mandarin (default: auto)",
                    "default": "auto"
                },
                "output_file": {
                    "type": "string",
                    "description": "Output file path (optional, auto-generated if not provided)"
                },
                "offline_only": {
                    "type": "boolean",
                    "description": "Only use engines that run locally",
                    "default": false
                },
                "online_only": {
                    "type": "boolean",
                    "description": "Only use cloud engines",
                    "default": false
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let input: SynthesizeInput = serde_json::from_value(input)
            .map_err(|e| sg_core::Error::ToolExecution(format!("Invalid input: {}", e)))?;

        let options = SynthesisOptions {
            engine: &input.engine,
            language: &input.language,
            voice: input.voice.as_deref(),
            speed: input.speed,
            offline_only: input.offline_only,
            online_only: input.online_only,
        };
        let job = options.job(&input.text);

        tracing::debug!(
            job_id = %job.id,
            engine = %input.engine,
            language = %input.language,
            chars = input.text.len(),
            "Synthesizing speech"
        );

        let success = match self.context.submit(job).await.outcome {
            Ok(success) => success,
            Err(e) => return Ok(ToolResult::error(to_json(&ErrorOutput::from(&e)))),
        };
        let audio = match audio_of(&success) {
            Ok(audio) => audio.clone(),
            Err(e) => return Ok(ToolResult::error(to_json(&ErrorOutput::from(&e)))),
        };
        let path = match &input.output_file {
            Some(file) => PathBuf::from(file),
            None => output::single_file_name(&self.output_dir, &audio),
        };

        match save(success, &input.text, input.speed, &path, &audio).await {
            Ok(out) => {
                tracing::info!(file = %path.display(), bytes = out.file_size_bytes, engine = %out.engine, "Speech synthesized");
                Ok(ToolResult::success(to_json(&out)))
            }
            Err(e) => Ok(ToolResult::error(format!(
                "Failed to write audio file '{}': {}",
                path.display(),
                e
            ))),
        }
    }
}

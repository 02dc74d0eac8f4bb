//! OpenAI speech adapter
//!
//! Synthesis through `/audio/speech` and recognition through the Whisper
//! `/audio/transcriptions` endpoint. Both need `OPENAI_API_KEY`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sg_core::capability::top_level_code;
use sg_core::{
    AudioArtifact, AudioFormat, BackendError, BackendId, CapabilityDescriptor, Quality, ServiceLimits,
    SpeechBackend, SynthesisRequest, Transcript, TranscriptionRequest, VoiceInfo,
};
use tracing::{debug, info};

use crate::http;

pub const ID: &str = "openai";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SPEECH_MODEL: &str = "tts-1";
const TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Longest `input` accepted by `/audio/speech`
pub const MAX_INPUT_CHARS: usize = 4096;

const LANGUAGES: &[&str] = &["en", "zh", "es", "fr", "de", "it", "ja", "ko", "pt", "ru", "nl", "pl", "tr", "hi"];

/// Available OpenAI TTS voices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAiVoice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl OpenAiVoice {
    pub const ALL: [OpenAiVoice; 6] = [
        Self::Alloy,
        Self::Echo,
        Self::Fable,
        Self::Onyx,
        Self::Nova,
        Self::Shimmer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Echo => "echo",
            Self::Fable => "fable",
            Self::Onyx => "onyx",
            Self::Nova => "nova",
            Self::Shimmer => "shimmer",
        }
    }
}

impl std::fmt::Display for OpenAiVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whisper `verbose_json` response, reduced to what callers use
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    language: Option<String>,
}

pub struct OpenAiBackend {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(client: Client, api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn api_key(&self) -> Result<&str, BackendError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| BackendError::credential_missing("OPENAI_API_KEY is not set"))
    }
}

/// 150 wpm maps to speed 1.0; the API accepts 0.25 - 4.0
pub fn speed_factor(words_per_minute: u32) -> f32 {
    (words_per_minute as f32 / 150.0).clamp(0.25, 4.0)
}

/// Whisper takes ISO-639-1 codes; no hint lets it detect the language
pub fn language_hint(native_language: &str) -> Option<String> {
    let code = top_level_code(native_language);
    (!code.is_empty()).then_some(code)
}

#[async_trait]
impl SpeechBackend for OpenAiBackend {
    fn id(&self) -> BackendId {
        BackendId::new(ID)
    }

    async fn describe(&self) -> Result<CapabilityDescriptor, BackendError> {
        let voices = OpenAiVoice::ALL
            .iter()
            .map(|v| VoiceInfo::new(v.as_str(), v.as_str(), LANGUAGES))
            .collect();
        Ok(CapabilityDescriptor::new(ID, false)
            .with_description("OpenAI speech and Whisper (online, API key)")
            .with_languages(LANGUAGES)
            .with_voices(voices)
            .with_transcription(true)
            .with_quality(Quality::Excellent)
            .with_limits(ServiceLimits {
                max_chars_per_request: Some(MAX_INPUT_CHARS),
                free_tier: None,
                pricing: Some("$15.00 per million characters (tts-1), $0.006 per minute (whisper-1)".to_string()),
                rate_limit: Some("Depends on the account's usage tier".to_string()),
                notes: Some("Transcription uploads are limited to 25 MB".to_string()),
            }))
    }

    async fn probe(&self) -> Result<(), BackendError> {
        let key = self.api_key()?;
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", key))
            .send()
            .await
            .map_err(crate::EngineError::from)?;
        http::check_status(response).await?;
        Ok(())
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioArtifact, BackendError> {
        let key = self.api_key()?;
        let chars = request.text.chars().count();
        if chars > MAX_INPUT_CHARS {
            return Err(BackendError::rejected(format!(
                "text has {} characters, the limit is {}",
                chars, MAX_INPUT_CHARS
            )));
        }
        let voice = request.voice.as_deref().unwrap_or(OpenAiVoice::default().as_str());

        info!(chars = request.text.len(), voice, "Synthesizing speech using OpenAI");

        let body = serde_json::json!({
            "model": SPEECH_MODEL,
            "input": request.text,
            "voice": voice,
            "response_format": AudioFormat::Mp3.extension(),
            "speed": speed_factor(request.speed),
        });

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", key))
            .json(&body)
            .send()
            .await
            .map_err(crate::EngineError::from)?;
        let audio = http::audio_bytes(response).await?;

        debug!(bytes = audio.len(), "OpenAI synthesis complete");
        Ok(AudioArtifact::new(audio, AudioFormat::Mp3))
    }

    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcript, BackendError> {
        let key = self.api_key()?;
        let mime = AudioFormat::from_filename(&request.filename)
            .map(|f| f.content_type())
            .unwrap_or("application/octet-stream");

        info!(bytes = request.audio.len(), filename = %request.filename, "Transcribing audio using Whisper");

        let part = reqwest::multipart::Part::bytes(request.audio.to_vec())
            .file_name(request.filename.clone())
            .mime_str(mime)
            .map_err(|e| crate::EngineError::InvalidFormat(format!("Failed to set mime type: {}", e)))?;
        let mut form = reqwest::multipart::Form::new()
            .text("model", TRANSCRIPTION_MODEL)
            .text("response_format", "verbose_json");
        if let Some(language) = language_hint(&request.native_language) {
            form = form.text("language", language);
        }
        let form = form.part("file", part);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", key))
            .multipart(form)
            .send()
            .await
            .map_err(crate::EngineError::from)?;
        let parsed: TranscriptionResponse = http::check_status(response)
            .await?
            .json()
            .await
            .map_err(crate::EngineError::from)?;

        debug!(chars = parsed.text.len(), language = ?parsed.language, "Transcription complete");
        Ok(Transcript {
            text: parsed.text,
            language: parsed.language,
        })
    }
}

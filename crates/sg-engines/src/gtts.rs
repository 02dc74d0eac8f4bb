//! Google Translate TTS adapter
//!
//! Online, key-less synthesis through the `translate_tts` endpoint. The
//! endpoint caps each request at 100 characters, so text is split into
//! chunks and the MP3 frames are concatenated.

use async_trait::async_trait;
use reqwest::Client;
use sg_core::{
    AudioArtifact, AudioFormat, BackendError, BackendId, CapabilityDescriptor, Quality, ServiceLimits,
    SpeechBackend, SynthesisRequest,
};
use tracing::debug;

use crate::http;

pub const ID: &str = "gtts";

pub const DEFAULT_BASE_URL: &str = "https://translate.google.com";

/// Longest text accepted by one request
pub const MAX_CHUNK_CHARS: usize = 100;

const LANGUAGES: &[&str] = &[
    "yue", "zh-CN", "zh-TW", "zh", "en", "es", "fr", "de", "it", "ja", "ko", "pt", "ru", "nl", "pl", "sv",
    "tr", "hi", "ar", "vi", "th", "id",
];

/// Below this many words per minute the slow voice is used
const SLOW_BELOW_WPM: u32 = 110;

const BREAK_CHARS: &[char] = &['.', ',', '!', '?', ';', ':', '。', '，', '！', '？', '；', '：', '、'];

pub struct GttsBackend {
    client: Client,
    base_url: String,
}

impl GttsBackend {
    pub fn new(client: Client, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    async fn fetch_chunk(&self, chunk: &str, index: usize, total: usize, lang: &str, speed: &str) -> crate::Result<Vec<u8>> {
        let url = format!("{}/translate_tts", self.base_url);
        let index = index.to_string();
        let total = total.to_string();
        let textlen = chunk.chars().count().to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("q", chunk),
                ("tl", lang),
                ("ttsspeed", speed),
                ("total", total.as_str()),
                ("idx", index.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await?;
        http::audio_bytes(response).await
    }
}

#[async_trait]
impl SpeechBackend for GttsBackend {
    fn id(&self) -> BackendId {
        BackendId::new(ID)
    }

    async fn describe(&self) -> Result<CapabilityDescriptor, BackendError> {
        Ok(CapabilityDescriptor::new(ID, false)
            .with_description("Google Translate TTS (online, free)")
            .with_languages(LANGUAGES)
            .with_quality(Quality::Good)
            .with_limits(ServiceLimits {
                max_chars_per_request: Some(MAX_CHUNK_CHARS),
                free_tier: Some("Unlimited (rate limited)".to_string()),
                pricing: Some("Free".to_string()),
                rate_limit: Some("Reasonable use policy".to_string()),
                notes: Some("Longer text is split into several requests".to_string()),
            }))
    }

    async fn probe(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .head(&self.base_url)
            .send()
            .await
            .map_err(|e| BackendError::network(format!("{} unreachable: {}", self.base_url, e)))?;
        if response.status().is_server_error() {
            return Err(BackendError::network(format!("{} returned {}", self.base_url, response.status())));
        }
        Ok(())
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioArtifact, BackendError> {
        let chunks = split_chunks(&request.text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(BackendError::rejected("nothing to speak"));
        }
        let speed = if request.speed < SLOW_BELOW_WPM { "0.24" } else { "1" };
        debug!(lang = %request.native_language, chunks = chunks.len(), "Requesting gTTS audio");

        let mut audio = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let bytes = self
                .fetch_chunk(chunk, index, chunks.len(), &request.native_language, speed)
                .await?;
            audio.extend_from_slice(&bytes);
        }
        Ok(AudioArtifact::new(audio, AudioFormat::Mp3))
    }
}

/// Split text into pieces of at most `max_chars` characters
///
/// Prefers to cut after whitespace or punctuation (ASCII and CJK); text
/// without any break is cut at the limit.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest: Vec<char> = text.trim().chars().collect();

    while rest.len() > max_chars {
        let window = &rest[..max_chars];
        let cut = window
            .iter()
            .rposition(|c| c.is_whitespace() || BREAK_CHARS.contains(c))
            .map(|i| i + 1)
            .unwrap_or(max_chars);
        let chunk: String = rest.drain(..cut).collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        while rest.first().is_some_and(|c| c.is_whitespace()) {
            rest.remove(0);
        }
    }

    let tail: String = rest.into_iter().collect();
    if !tail.trim().is_empty() {
        chunks.push(tail.trim().to_string());
    }
    chunks
}

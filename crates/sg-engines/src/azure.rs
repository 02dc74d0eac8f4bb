//! Azure Speech adapter
//!
//! Neural voices through the Cognitive Services REST API. Requests are SSML
//! with a prosody rate derived from the job's words per minute.

use async_trait::async_trait;
use reqwest::Client;
use sg_core::capability::codes_equal;
use sg_core::{
    AudioArtifact, AudioFormat, BackendError, BackendErrorKind, BackendId, CapabilityDescriptor, Quality,
    ServiceLimits, SpeechBackend, SynthesisRequest, VoiceInfo,
};
use tracing::debug;

use crate::http;

pub const ID: &str = "azure";

const OUTPUT_FORMAT: &str = "audio-16khz-128kbitrate-mono-mp3";

/// Words per minute treated as 0% prosody rate
const NEUTRAL_WPM: i64 = 150;

/// (voice id, display name, locale)
const VOICES: &[(&str, &str, &str)] = &[
    ("zh-HK-HiuMaanNeural", "HiuMaan", "zh-HK"),
    ("zh-HK-WanLungNeural", "WanLung", "zh-HK"),
    ("zh-HK-HiuGaaiNeural", "HiuGaai", "zh-HK"),
    ("zh-CN-XiaoxiaoNeural", "Xiaoxiao", "zh-CN"),
    ("zh-CN-YunxiNeural", "Yunxi", "zh-CN"),
    ("zh-TW-HsiaoChenNeural", "HsiaoChen", "zh-TW"),
    ("en-US-JennyNeural", "Jenny", "en-US"),
    ("en-US-GuyNeural", "Guy", "en-US"),
    ("en-GB-SoniaNeural", "Sonia", "en-GB"),
    ("es-ES-ElviraNeural", "Elvira", "es-ES"),
    ("fr-FR-DeniseNeural", "Denise", "fr-FR"),
    ("de-DE-KatjaNeural", "Katja", "de-DE"),
    ("it-IT-ElsaNeural", "Elsa", "it-IT"),
    ("ja-JP-NanamiNeural", "Nanami", "ja-JP"),
    ("ko-KR-SunHiNeural", "SunHi", "ko-KR"),
    ("pt-BR-FranciscaNeural", "Francisca", "pt-BR"),
    ("ru-RU-SvetlanaNeural", "Svetlana", "ru-RU"),
];

pub struct AzureBackend {
    client: Client,
    key: Option<String>,
    region: Option<String>,
    base_url: Option<String>,
}

impl AzureBackend {
    pub fn new(client: Client, key: Option<String>, region: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client,
            key: key.filter(|k| !k.is_empty()),
            region: region.filter(|r| !r.is_empty()),
            base_url,
        }
    }

    fn credentials(&self) -> Result<(&str, String), BackendError> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| BackendError::credential_missing("AZURE_SPEECH_KEY is not set"))?;
        let base_url = match (&self.base_url, &self.region) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(region)) => format!("https://{}.tts.speech.microsoft.com", region),
            (None, None) => return Err(BackendError::credential_missing("AZURE_SPEECH_REGION is not set")),
        };
        Ok((key, base_url))
    }

    /// Default voice for a locale when the caller gave none
    fn default_voice(locale: &str) -> Option<&'static str> {
        VOICES
            .iter()
            .find(|(_, _, voice_locale)| codes_equal(voice_locale, locale))
            .map(|(id, _, _)| *id)
    }
}

#[async_trait]
impl SpeechBackend for AzureBackend {
    fn id(&self) -> BackendId {
        BackendId::new(ID)
    }

    async fn describe(&self) -> Result<CapabilityDescriptor, BackendError> {
        let voices = VOICES
            .iter()
            .map(|(id, name, locale)| VoiceInfo::new(*id, *name, &[*locale]))
            .collect();
        Ok(CapabilityDescriptor::new(ID, false)
            .with_description("Azure Speech (online, neural voices)")
            .with_voices(voices)
            .with_voice_languages()
            .with_preferred_voice("zh-HK", "zh-HK-HiuMaanNeural")
            .with_preferred_voice("zh-CN", "zh-CN-XiaoxiaoNeural")
            .with_preferred_voice("en-US", "en-US-JennyNeural")
            .with_quality(Quality::Excellent)
            .with_limits(ServiceLimits {
                max_chars_per_request: None,
                free_tier: Some("0.5 million characters per month (F0 tier)".to_string()),
                pricing: Some("$16.00 per million characters (neural voices)".to_string()),
                rate_limit: Some("20 transactions per 60 seconds (F0 tier)".to_string()),
                notes: Some("Each request may produce at most 10 minutes of audio".to_string()),
            }))
    }

    async fn probe(&self) -> Result<(), BackendError> {
        let (key, base_url) = self.credentials()?;
        let response = self
            .client
            .get(format!("{}/cognitiveservices/voices/list", base_url))
            .header("Ocp-Apim-Subscription-Key", key)
            .send()
            .await
            .map_err(crate::EngineError::from)?;
        http::check_status(response).await?;
        Ok(())
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioArtifact, BackendError> {
        let (key, base_url) = self.credentials()?;
        let voice = match request.voice.as_deref() {
            Some(voice) => voice,
            None => Self::default_voice(&request.native_language).ok_or_else(|| {
                BackendError::new(
                    BackendErrorKind::UnsupportedVoice,
                    format!("no Azure voice for {}", request.native_language),
                )
            })?,
        };
        let ssml = build_ssml(&request.text, &request.native_language, voice, request.speed);
        debug!(voice, chars = request.text.len(), "Requesting Azure synthesis");

        let response = self
            .client
            .post(format!("{}/cognitiveservices/v1", base_url))
            .header("Ocp-Apim-Subscription-Key", key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .body(ssml)
            .send()
            .await
            .map_err(crate::EngineError::from)?;
        let audio = http::audio_bytes(response).await?;
        Ok(AudioArtifact::new(audio, AudioFormat::Mp3))
    }
}

/// Prosody rate relative to 150 wpm, e.g. `+20%`
pub fn prosody_rate(speed: u32) -> String {
    let percent = (i64::from(speed) - NEUTRAL_WPM) * 100 / NEUTRAL_WPM;
    format!("{:+}%", percent)
}

pub fn build_ssml(text: &str, locale: &str, voice: &str, speed: u32) -> String {
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{locale}'>\
<voice name='{voice}'><prosody rate='{rate}'>{text}</prosody></voice></speak>",
        locale = escape_xml(locale),
        voice = escape_xml(voice),
        rate = prosody_rate(speed),
        text = escape_xml(text),
    )
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

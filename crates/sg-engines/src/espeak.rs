//! eSpeak adapter
//!
//! Offline formant synthesis through the `espeak`/`espeak-ng` binary.
//! Audio is read from `--stdout` as WAV; voices come from `--voices`.

use std::sync::RwLock;

use async_trait::async_trait;
use sg_core::capability::codes_equal;
use sg_core::{
    AudioArtifact, AudioFormat, BackendError, BackendId, CapabilityDescriptor, Quality, ServiceLimits, SpeechBackend,
    SynthesisRequest, VoiceInfo,
};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::process;

pub const ID: &str = "espeak";

/// Binary used when none is configured
pub const DEFAULT_BINARY: &str = "espeak";

/// Languages advertised when the voice listing is unavailable
const BASE_LANGUAGES: &[&str] = &[
    "en", "yue", "cmn", "es", "fr", "de", "it", "ja", "ko", "pt", "ru", "sw",
];

/// Classic espeak names for codes espeak-ng uses
const CODE_ALIASES: &[(&str, &str)] = &[("zh-yue", "yue"), ("zh", "cmn")];

const SPEED_RANGE: std::ops::RangeInclusive<u32> = 80..=450;

pub struct EspeakBackend {
    binary: String,
    voices: RwLock<Vec<VoiceInfo>>,
}

impl EspeakBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            voices: RwLock::new(Vec::new()),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn base_descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(ID, true)
            .with_description("eSpeak (offline, formant synthesis)")
            .with_quality(Quality::Basic)
            .with_limits(ServiceLimits::local())
    }

    /// Voice id to pass to `-v`
    fn voice_for(&self, request: &SynthesisRequest) -> String {
        if let Some(voice) = &request.voice {
            return voice.clone();
        }
        let voices = self.voices.read().unwrap_or_else(|e| e.into_inner());
        voices
            .iter()
            .find(|v| v.languages.iter().any(|l| codes_equal(l, &request.native_language)))
            .map(|v| v.id.clone())
            .unwrap_or_else(|| request.native_language.clone())
    }

    async fn list_voices(&self) -> crate::Result<Vec<VoiceInfo>> {
        let mut command = Command::new(&self.binary);
        command.arg("--voices");
        let stdout = process::run(command, None).await?;
        Ok(parse_voices(&String::from_utf8_lossy(&stdout)))
    }
}

#[async_trait]
impl SpeechBackend for EspeakBackend {
    fn id(&self) -> BackendId {
        BackendId::new(ID)
    }

    async fn describe(&self) -> Result<CapabilityDescriptor, BackendError> {
        match self.list_voices().await {
            Ok(voices) if !voices.is_empty() => {
                debug!(count = voices.len(), "Listed espeak voices");
                *self.voices.write().unwrap_or_else(|e| e.into_inner()) = voices.clone();
                Ok(self.base_descriptor().with_voices(voices).with_voice_languages())
            }
            Ok(_) => Ok(self.base_descriptor().with_languages(BASE_LANGUAGES)),
            Err(e) => {
                warn!(binary = %self.binary, error = %e, "Could not list espeak voices");
                Ok(self.base_descriptor().with_languages(BASE_LANGUAGES))
            }
        }
    }

    async fn probe(&self) -> Result<(), BackendError> {
        let mut command = Command::new(&self.binary);
        command.arg("--version");
        process::run(command, None).await.map_err(|e| match e {
            crate::EngineError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => BackendError::not_installed(
                format!("{} not found (install with: apt-get install espeak-ng)", self.binary),
            ),
            other => other.into(),
        })?;
        Ok(())
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioArtifact, BackendError> {
        let voice = self.voice_for(request);
        let speed = request.speed.clamp(*SPEED_RANGE.start(), *SPEED_RANGE.end());
        debug!(voice = %voice, speed, chars = request.text.len(), "Running espeak");

        let mut command = Command::new(&self.binary);
        command
            .arg("-v")
            .arg(&voice)
            .arg("-s")
            .arg(speed.to_string())
            .arg("--stdout")
            .arg("--stdin");
        let wav = process::run(command, Some(&request.text)).await?;

        if !wav.starts_with(b"RIFF") {
            return Err(crate::EngineError::InvalidFormat("espeak did not produce WAV output".to_string()).into());
        }
        Ok(AudioArtifact::new(wav, AudioFormat::Wav))
    }
}

/// Parse `espeak --voices` output
///
/// Handles both the classic (`M`) and espeak-ng (`--/M`) gender column.
/// Codes from the trailing "other languages" column are added to the voice.
pub fn parse_voices(output: &str) -> Vec<VoiceInfo> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 || fields[0].parse::<u32>().is_err() {
                return None;
            }
            let code = fields[1];
            let mut languages = vec![code.to_string()];
            let others = fields.get(5..).unwrap_or_default().join(" ");
            for part in others.split('(').skip(1) {
                if let Some(other) = part.split_whitespace().next() {
                    languages.push(other.trim_end_matches(')').to_string());
                }
            }
            for (classic, modern) in CODE_ALIASES {
                if languages.iter().any(|l| l == classic) && !languages.iter().any(|l| l == modern) {
                    languages.push(modern.to_string());
                }
            }
            Some(VoiceInfo {
                id: code.to_string(),
                name: fields[3].replace('_', " "),
                languages,
            })
        })
        .collect()
}

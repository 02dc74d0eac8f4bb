//! macOS `say` adapter
//!
//! Offline synthesis with the system voices. `say` writes AIFF to a file,
//! so every call goes through a temporary file. The speech service does not
//! take concurrent requests well, hence `supports_batch = false`.

use async_trait::async_trait;
use sg_core::{
    AudioArtifact, AudioFormat, BackendError, BackendId, CapabilityDescriptor, Quality, ServiceLimits, SpeechBackend,
    SynthesisRequest, VoiceInfo,
};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::process;

pub const ID: &str = "say";

/// Binary used when none is configured
pub const DEFAULT_BINARY: &str = "say";

const SPEED_RANGE: std::ops::RangeInclusive<u32> = 50..=500;

pub struct SayBackend {
    binary: String,
}

impl SayBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn base_descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(ID, true)
            .with_description("macOS say (offline, system voices)")
            .with_quality(Quality::Good)
            .with_batch(false)
            .with_limits(ServiceLimits::local())
    }

    async fn list_voices(&self) -> crate::Result<Vec<VoiceInfo>> {
        let mut command = Command::new(&self.binary);
        command.arg("-v").arg("?");
        let stdout = process::run(command, None).await?;
        Ok(parse_voices(&String::from_utf8_lossy(&stdout)))
    }
}

#[async_trait]
impl SpeechBackend for SayBackend {
    fn id(&self) -> BackendId {
        BackendId::new(ID)
    }

    async fn describe(&self) -> Result<CapabilityDescriptor, BackendError> {
        let voices = match self.list_voices().await {
            Ok(voices) => voices,
            Err(e) => {
                warn!(error = %e, "Could not list say voices");
                Vec::new()
            }
        };
        debug!(count = voices.len(), "Listed say voices");
        Ok(self.base_descriptor().with_voices(voices).with_voice_languages())
    }

    async fn probe(&self) -> Result<(), BackendError> {
        self.list_voices().await.map_err(|e| match e {
            crate::EngineError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                BackendError::not_installed("say is only available on macOS")
            }
            other => other.into(),
        })?;
        Ok(())
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioArtifact, BackendError> {
        let output = tempfile::Builder::new()
            .prefix("say_")
            .suffix(".aiff")
            .tempfile()
            .map_err(crate::EngineError::from)?;
        let rate = request.speed.clamp(*SPEED_RANGE.start(), *SPEED_RANGE.end());
        debug!(voice = ?request.voice, rate, chars = request.text.len(), "Running say");

        let mut command = Command::new(&self.binary);
        command.arg("-o").arg(output.path()).arg("-r").arg(rate.to_string());
        if let Some(voice) = &request.voice {
            command.arg("-v").arg(voice);
        }
        command.arg("-f").arg("-");
        process::run(command, Some(&request.text)).await?;

        let data = tokio::fs::read(output.path()).await.map_err(crate::EngineError::from)?;
        if data.is_empty() {
            return Err(crate::EngineError::InvalidFormat("say produced an empty file".to_string()).into());
        }
        Ok(AudioArtifact::new(data, AudioFormat::Aiff))
    }
}

/// Parse `say -v ?` output
///
/// Lines look like `Sinji               zh_HK    # 你好，我叫善怡。`; voice
/// names may contain spaces, the locale is the last field before `#`.
pub fn parse_voices(output: &str) -> Vec<VoiceInfo> {
    output
        .lines()
        .filter_map(|line| {
            let head = line.split('#').next()?.trim_end();
            let (name, locale) = head.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() || !locale.contains('_') {
                return None;
            }
            Some(VoiceInfo::new(name, name, &[locale]))
        })
        .collect()
}

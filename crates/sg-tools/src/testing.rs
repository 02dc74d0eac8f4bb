//! Fake engines for tool tests

use std::sync::Arc;

use async_trait::async_trait;
use sg_core::{
    AudioArtifact, AudioFormat, BackendError, BackendId, CapabilityDescriptor, CapabilitySource, Config,
    RegisteredBackend, ServiceLimits, SpeechBackend, SpeechContext, SynthesisRequest, Transcript, TranscriptionRequest,
    VoiceInfo,
};

pub struct FakeBackend {
    descriptor: CapabilityDescriptor,
    broken: bool,
}

impl FakeBackend {
    pub fn new(descriptor: CapabilityDescriptor) -> Self {
        Self {
            descriptor,
            broken: false,
        }
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }
}

#[async_trait]
impl SpeechBackend for FakeBackend {
    fn id(&self) -> BackendId {
        self.descriptor.id.clone()
    }

    async fn describe(&self) -> Result<CapabilityDescriptor, BackendError> {
        Ok(self.descriptor.clone())
    }

    async fn probe(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioArtifact, BackendError> {
        if self.broken {
            return Err(BackendError::rejected("synthesis failed"));
        }
        let data = format!("{}:{}:{}", self.descriptor.id, request.native_language, request.text);
        Ok(AudioArtifact::new(data.into_bytes(), AudioFormat::Wav))
    }

    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcript, BackendError> {
        Ok(Transcript {
            text: format!("{} bytes from {}", request.audio.len(), request.filename),
            language: Some(request.native_language.clone()),
        })
    }
}

struct FakeSource(Vec<Arc<FakeBackend>>);

#[async_trait]
impl CapabilitySource for FakeSource {
    async fn discover(&self) -> sg_core::Result<Vec<RegisteredBackend>> {
        Ok(self
            .0
            .iter()
            .map(|b| RegisteredBackend {
                descriptor: b.descriptor.clone(),
                backend: b.clone(),
            })
            .collect())
    }
}

pub fn espeak() -> CapabilityDescriptor {
    CapabilityDescriptor::new("espeak", true)
        .with_languages(&["en", "yue", "cmn"])
        .with_voices(vec![VoiceInfo::new("en", "english", &["en"]), VoiceInfo::new("yue", "cantonese", &["yue"])])
}

pub fn openai() -> CapabilityDescriptor {
    CapabilityDescriptor::new("openai", false)
        .with_languages(&["en", "zh"])
        .with_voices(vec![VoiceInfo::new("alloy", "alloy", &["en", "zh"])])
        .with_transcription(true)
        .with_limits(ServiceLimits {
            max_chars_per_request: Some(4096),
            pricing: Some("$15.00 per million characters".to_string()),
            ..Default::default()
        })
}

pub async fn context(backends: Vec<FakeBackend>) -> Arc<SpeechContext> {
    let source = FakeSource(backends.into_iter().map(Arc::new).collect());
    match SpeechContext::initialize(&Config::default(), Arc::new(source)).await {
        Ok(context) => context,
        Err(e) => panic!("context failed to initialize: {}", e),
    }
}

//! Scripted backends and fixtures shared by the unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{
    AudioArtifact, AudioFormat, CapabilitySource, RegisteredBackend, SpeechBackend,
    SynthesisRequest, Transcript, TranscriptionRequest,
};
use crate::capability::{BackendId, CapabilityDescriptor, CapabilitySet, Quality, VoiceInfo};
use crate::error::BackendError;
use crate::probe::{ProbeReport, ProbeStatus};

/// What one call to a [`MockBackend`] does
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(BackendError),
    /// Sleep, then succeed
    Delay(Duration),
}

/// Backend whose calls follow a script
pub struct MockBackend {
    id: BackendId,
    descriptor: Option<CapabilityDescriptor>,
    health: Result<(), String>,
    script: Mutex<VecDeque<Behavior>>,
    fallback: Behavior,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl MockBackend {
    pub fn new(id: &str) -> Self {
        Self {
            id: BackendId::new(id),
            descriptor: None,
            health: Ok(()),
            script: Mutex::new(VecDeque::new()),
            fallback: Behavior::Succeed,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_descriptor(mut self, descriptor: CapabilityDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn unhealthy(mut self, reason: &str) -> Self {
        self.health = Err(reason.to_string());
        self
    }

    /// Behaviour once the script is exhausted
    pub fn always(mut self, behavior: Behavior) -> Self {
        self.fallback = behavior;
        self
    }

    pub fn failing(self, error: BackendError) -> Self {
        self.always(Behavior::Fail(error))
    }

    pub fn delayed(self, delay: Duration) -> Self {
        self.always(Behavior::Delay(delay))
    }

    /// Behaviours consumed one per call before falling back
    pub fn then(self, behavior: Behavior) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(behavior);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping calls observed
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn run(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        let behavior = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let outcome = match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(error) => Err(error),
            Behavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

#[async_trait]
impl SpeechBackend for MockBackend {
    fn id(&self) -> BackendId {
        self.id.clone()
    }

    async fn describe(&self) -> Result<CapabilityDescriptor, BackendError> {
        Ok(self
            .descriptor
            .clone()
            .unwrap_or_else(|| CapabilityDescriptor::new(self.id.clone(), true)))
    }

    async fn probe(&self) -> Result<(), BackendError> {
        self.health.clone().map_err(BackendError::not_installed)
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioArtifact, BackendError> {
        self.run().await?;
        let body = format!("{}:{}:{}", self.id, request.native_language, request.text);
        Ok(AudioArtifact::new(body.into_bytes(), AudioFormat::Wav))
    }

    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcript, BackendError> {
        self.run().await?;
        Ok(Transcript {
            text: format!("{} heard {} bytes", self.id, request.audio.len()),
            language: Some(request.native_language.clone()),
        })
    }
}

/// Capability source over a swappable backend list
#[derive(Default)]
pub struct MockSource {
    backends: Mutex<Vec<RegisteredBackend>>,
}

impl MockSource {
    pub fn new(backends: Vec<(CapabilityDescriptor, Arc<dyn SpeechBackend>)>) -> Self {
        let source = Self::default();
        source.replace(backends);
        source
    }

    pub fn replace(&self, backends: Vec<(CapabilityDescriptor, Arc<dyn SpeechBackend>)>) {
        *self.backends.lock().unwrap_or_else(|e| e.into_inner()) = backends
            .into_iter()
            .map(|(descriptor, backend)| RegisteredBackend { descriptor, backend })
            .collect();
    }
}

#[async_trait]
impl CapabilitySource for MockSource {
    async fn discover(&self) -> crate::Result<Vec<RegisteredBackend>> {
        Ok(self.backends.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

pub fn azure_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new("azure", false)
        .with_languages(&[
            "zh-HK", "zh-CN", "zh-TW", "en-US", "es-ES", "fr-FR", "de-DE", "it-IT", "ja-JP",
            "ko-KR", "pt-BR", "ru-RU",
        ])
        .with_voices(vec![
            VoiceInfo::new("zh-HK-HiuMaanNeural", "HiuMaan", &["zh-HK"]),
            VoiceInfo::new("zh-HK-WanLungNeural", "WanLung", &["zh-HK"]),
            VoiceInfo::new("zh-CN-XiaoxiaoNeural", "Xiaoxiao", &["zh-CN"]),
            VoiceInfo::new("zh-TW-HsiaoChenNeural", "HsiaoChen", &["zh-TW"]),
            VoiceInfo::new("en-US-JennyNeural", "Jenny", &["en-US"]),
        ])
        .with_quality(Quality::Excellent)
}

pub fn gtts_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new("gtts", false).with_languages(&[
        "yue", "zh-CN", "zh-TW", "zh", "en", "es", "fr", "de", "it", "ja", "ko", "pt", "ru",
    ])
}

pub fn say_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new("say", true)
        .with_voices(vec![
            VoiceInfo::new("com.apple.voice.compact.zh-HK.Sinji", "Sinji", &["zh_HK"]),
            VoiceInfo::new("com.apple.voice.compact.zh-CN.Tingting", "Tingting", &["zh_CN"]),
            VoiceInfo::new("com.apple.voice.compact.zh-TW.Meijia", "Meijia", &["zh_TW"]),
            VoiceInfo::new("com.apple.voice.compact.en-US.Samantha", "Samantha", &["en_US"]),
        ])
        .with_voice_languages()
        .with_batch(false)
}

pub fn espeak_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new("espeak", true)
        .with_languages(&["en", "yue", "cmn", "es", "fr", "de", "sw"])
        .with_voices(vec![
            VoiceInfo::new("en", "english", &["en"]),
            VoiceInfo::new("yue", "cantonese", &["yue"]),
            VoiceInfo::new("cmn", "mandarin", &["cmn"]),
        ])
        .with_quality(Quality::Basic)
}

pub fn openai_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new("openai", false)
        .with_languages(&["en", "zh", "es", "fr", "de", "it", "ja", "ko", "pt", "ru"])
        .with_voices(vec![
            VoiceInfo::new("alloy", "Alloy", &[]),
            VoiceInfo::new("nova", "Nova", &[]),
        ])
        .with_transcription(true)
}

/// azure, gtts, say, espeak, openai (in that declaration order)
pub fn sample_descriptors() -> Vec<CapabilityDescriptor> {
    vec![
        azure_descriptor(),
        gtts_descriptor(),
        say_descriptor(),
        espeak_descriptor(),
        openai_descriptor(),
    ]
}

pub fn sample_capabilities() -> CapabilitySet {
    CapabilitySet::new(sample_descriptors()).unwrap()
}

pub fn all_healthy() -> ProbeReport {
    ProbeReport::new(
        sample_capabilities()
            .ids()
            .into_iter()
            .map(|id| (id, ProbeStatus::Healthy))
            .collect(),
    )
}

//! Capability descriptors
//!
//! Static or discovered metadata per backend. A [`CapabilitySet`] is built
//! once per discovery and is read-only afterwards; its declaration order is
//! the tie-breaker used by the resolver.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::job::JobKind;

/// Identifier of one synthesis/recognition backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Rough output quality tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Basic,
    #[default]
    Good,
    Excellent,
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Good => write!(f, "good"),
            Self::Excellent => write!(f, "excellent"),
        }
    }
}

/// A voice offered by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    /// Native voice identifier passed back to the backend
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Native language codes this voice speaks
    pub languages: Vec<String>,
}

impl VoiceInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, languages: &[&str]) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            languages: languages.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Whether `pattern` occurs in the id or name, ignoring case
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        let pattern = pattern.to_lowercase();
        self.id.to_lowercase().contains(&pattern) || self.name.to_lowercase().contains(&pattern)
    }
}

/// Usage limits and pricing of a service, as published by its vendor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLimits {
    /// Longest text accepted by one request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_chars_per_request: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ServiceLimits {
    /// Limits of an engine that runs on this machine
    pub fn local() -> Self {
        Self {
            free_tier: Some("Unlimited".to_string()),
            pricing: Some("Free".to_string()),
            notes: Some("Runs locally; no network or account needed".to_string()),
            ..Default::default()
        }
    }
}

/// Per-backend capability metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub id: BackendId,
    pub description: String,
    /// Native language codes, in the backend's own vocabulary
    pub languages: Vec<String>,
    pub voices: Vec<VoiceInfo>,
    /// Native language -> preferred native voice ids
    pub preferred_voices: BTreeMap<String, Vec<String>>,
    pub is_offline: bool,
    pub supports_batch: bool,
    pub supports_synthesis: bool,
    pub supports_transcription: bool,
    pub typical_latency_ms: u64,
    pub quality: Quality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ServiceLimits>,
}

impl CapabilityDescriptor {
    /// Start a descriptor for a synthesis-only backend
    pub fn new(id: impl Into<BackendId>, is_offline: bool) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            languages: Vec::new(),
            voices: Vec::new(),
            preferred_voices: BTreeMap::new(),
            is_offline,
            supports_batch: true,
            supports_synthesis: true,
            supports_transcription: false,
            typical_latency_ms: if is_offline { 300 } else { 1200 },
            quality: Quality::Good,
            limits: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_voices(mut self, voices: Vec<VoiceInfo>) -> Self {
        self.voices = voices;
        self
    }

    pub fn with_preferred_voice(mut self, language: &str, voice: &str) -> Self {
        self.preferred_voices
            .entry(language.to_string())
            .or_default()
            .push(voice.to_string());
        self
    }

    pub fn with_batch(mut self, supports_batch: bool) -> Self {
        self.supports_batch = supports_batch;
        self
    }

    pub fn with_transcription(mut self, supports_transcription: bool) -> Self {
        self.supports_transcription = supports_transcription;
        self
    }

    pub fn with_synthesis(mut self, supports_synthesis: bool) -> Self {
        self.supports_synthesis = supports_synthesis;
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.typical_latency_ms = latency_ms;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_limits(mut self, limits: ServiceLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Add voice languages to the language list (deduplicated, order kept)
    pub fn with_voice_languages(mut self) -> Self {
        let extra: Vec<String> = self
            .voices
            .iter()
            .flat_map(|v| v.languages.iter().cloned())
            .collect();
        for code in extra {
            if !self.languages.iter().any(|l| codes_equal(l, &code)) {
                self.languages.push(code);
            }
        }
        self
    }

    /// The declared native code equal to `code`, if any
    pub fn native_code(&self, code: &str) -> Option<&str> {
        self.languages
            .iter()
            .find(|l| codes_equal(l, code))
            .map(|l| l.as_str())
    }

    pub fn supports(&self, kind: JobKind) -> bool {
        match kind {
            JobKind::Synthesis => self.supports_synthesis,
            JobKind::Transcription => self.supports_transcription,
        }
    }

    /// First preferred voice for a native language
    pub fn preferred_voice(&self, language: &str) -> Option<&str> {
        self.preferred_voices
            .iter()
            .find(|(code, _)| codes_equal(code, language))
            .and_then(|(_, voices)| voices.first())
            .map(|v| v.as_str())
    }

    /// Voices speaking a native language
    pub fn voices_for(&self, language: &str) -> impl Iterator<Item = &VoiceInfo> {
        let language = language.to_string();
        self.voices
            .iter()
            .filter(move |v| v.languages.iter().any(|l| codes_equal(l, &language)))
    }
}

/// Compare two language codes ignoring case and `_`/`-` spelling
pub fn codes_equal(a: &str, b: &str) -> bool {
    normalize_code(a) == normalize_code(b)
}

/// Case-fold and unify separators of a language code
pub fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase().replace('_', "-")
}

/// Top-level part of a language code (`zh-HK` -> `zh`)
pub fn top_level_code(code: &str) -> String {
    let normalized = normalize_code(code);
    normalized
        .split('-')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Ordered, read-only collection of descriptors
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    descriptors: Vec<CapabilityDescriptor>,
    index: HashMap<BackendId, usize>,
}

impl CapabilitySet {
    /// Build a set, keeping declaration order
    ///
    /// # Errors
    /// Returns an error if two descriptors share a BackendId
    pub fn new(descriptors: Vec<CapabilityDescriptor>) -> Result<Self> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (position, descriptor) in descriptors.iter().enumerate() {
            if index.insert(descriptor.id.clone(), position).is_some() {
                return Err(Error::Capability(format!(
                    "Duplicate backend id: {}",
                    descriptor.id
                )));
            }
        }
        Ok(Self { descriptors, index })
    }

    pub fn get(&self, id: &BackendId) -> Option<&CapabilityDescriptor> {
        self.index.get(id).map(|&i| &self.descriptors[i])
    }

    pub fn contains(&self, id: &BackendId) -> bool {
        self.index.contains_key(id)
    }

    /// Declaration position of a backend
    pub fn order(&self, id: &BackendId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.descriptors.iter()
    }

    pub fn ids(&self) -> Vec<BackendId> {
        self.descriptors.iter().map(|d| d.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

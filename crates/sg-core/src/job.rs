//! Jobs, constraints and results

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::backend::{AudioArtifact, Transcript};
use crate::capability::BackendId;
use crate::error::{CandidateFailure, JobError};
use crate::language::LanguageFamily;

/// Default speaking rate in words per minute
pub const DEFAULT_SPEED: u32 = 150;

/// Accepted speaking-rate range
pub const SPEED_RANGE: std::ops::RangeInclusive<u32> = 50..=500;

/// Job identifier (UUID v7, time ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Synthesis,
    Transcription,
}

#[derive(Debug, Clone)]
pub enum JobPayload {
    Text(String),
    Audio { data: Arc<[u8]>, filename: String },
}

/// Caller constraints on backend selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    /// Pin to one backend; never redirected
    pub explicit_engine: Option<BackendId>,
    pub offline_only: bool,
    pub online_only: bool,
    /// Overrides the configured per-attempt timeout
    pub attempt_timeout: Option<Duration>,
    /// Whole-job deadline
    pub job_timeout: Option<Duration>,
}

impl Constraints {
    /// Parse an engine argument; `auto` and empty mean no pin
    pub fn engine_pin(engine: Option<&str>) -> Option<BackendId> {
        engine
            .map(str::trim)
            .filter(|e| !e.is_empty() && !e.eq_ignore_ascii_case("auto"))
            .map(|e| BackendId::new(e.to_lowercase()))
    }
}

/// One unit of work
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: JobPayload,
    /// Caller-facing alias, e.g. "zh-HK", "cantonese", "auto"
    pub language: String,
    pub voice: Option<String>,
    /// Words per minute
    pub speed: u32,
    pub constraints: Constraints,
}

impl Job {
    pub fn synthesis(text: impl Into<String>) -> Self {
        Self::with_payload(JobKind::Synthesis, JobPayload::Text(text.into()))
    }

    pub fn transcription(data: Vec<u8>, filename: impl Into<String>) -> Self {
        Self::with_payload(
            JobKind::Transcription,
            JobPayload::Audio {
                data: Arc::from(data),
                filename: filename.into(),
            },
        )
    }

    fn with_payload(kind: JobKind, payload: JobPayload) -> Self {
        Self {
            id: JobId::new(),
            kind,
            payload,
            language: "auto".to_string(),
            voice: None,
            speed: DEFAULT_SPEED,
            constraints: Constraints::default(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_speed(mut self, speed: u32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_engine(mut self, engine: impl Into<BackendId>) -> Self {
        self.constraints.explicit_engine = Some(engine.into());
        self
    }

    pub fn offline_only(mut self) -> Self {
        self.constraints.offline_only = true;
        self
    }

    pub fn online_only(mut self) -> Self {
        self.constraints.online_only = true;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.constraints.attempt_timeout = Some(timeout);
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.constraints.job_timeout = Some(timeout);
        self
    }

    /// Reject malformed jobs before any resolution happens
    pub fn validate(&self) -> Result<(), JobError> {
        match (&self.kind, &self.payload) {
            (JobKind::Synthesis, JobPayload::Text(text)) => {
                if text.trim().is_empty() {
                    return Err(JobError::InvalidRequest("text is empty".to_string()));
                }
            }
            (JobKind::Transcription, JobPayload::Audio { data, .. }) => {
                if data.is_empty() {
                    return Err(JobError::InvalidRequest("audio is empty".to_string()));
                }
            }
            _ => {
                return Err(JobError::InvalidRequest(
                    "payload does not match job kind".to_string(),
                ));
            }
        }

        if self.constraints.offline_only && self.constraints.online_only {
            return Err(JobError::InvalidRequest(
                "offline_only and online_only are mutually exclusive".to_string(),
            ));
        }
        if !SPEED_RANGE.contains(&self.speed) {
            return Err(JobError::InvalidRequest(format!(
                "speed {} outside {}..={} words per minute",
                self.speed,
                SPEED_RANGE.start(),
                SPEED_RANGE.end()
            )));
        }
        if matches!(self.constraints.attempt_timeout, Some(t) if t.is_zero()) {
            return Err(JobError::InvalidRequest("attempt timeout is zero".to_string()));
        }
        Ok(())
    }

    /// Normalized request fingerprint used as the cache key
    pub fn fingerprint(&self, family: &LanguageFamily) -> Fingerprint {
        let mut hasher = Sha256::new();
        let mut field = |bytes: &[u8]| {
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };

        match &self.payload {
            JobPayload::Text(text) => {
                field(b"synthesis".as_slice());
                field(normalize_text(text).as_bytes());
            }
            JobPayload::Audio { data, .. } => {
                field(b"transcription".as_slice());
                field(&data[..]);
            }
        }
        field(family.to_string().as_bytes());
        let voice = self.voice.as_deref().map(|v| v.trim().to_lowercase());
        field(voice.unwrap_or_default().as_bytes());
        let engine = self.constraints.explicit_engine.as_ref().map(BackendId::as_str);
        field(engine.unwrap_or_default().as_bytes());
        let flags = [
            self.constraints.offline_only as u8,
            self.constraints.online_only as u8,
        ];
        field(flags.as_slice());
        field(self.speed.to_le_bytes().as_slice());

        Fingerprint(hex::encode(hasher.finalize()))
    }
}

/// Collapse whitespace runs and trim
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 of a normalized request, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a successful job produced
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Audio(AudioArtifact),
    Transcript(Transcript),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobSuccess {
    pub backend: BackendId,
    pub voice: Option<String>,
    pub native_language: String,
    pub artifact: Artifact,
    /// Failures of earlier candidates, in attempt order
    pub failures: Vec<CandidateFailure>,
    pub attempts: usize,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub job_id: JobId,
    pub outcome: Result<JobSuccess, JobError>,
}

impl JobResult {
    pub fn success(job_id: JobId, success: JobSuccess) -> Self {
        Self {
            job_id,
            outcome: Ok(success),
        }
    }

    pub fn failure(job_id: JobId, error: JobError) -> Self {
        Self {
            job_id,
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Copy of a shared result, attributed to another job
    pub fn relabel(&self, job_id: JobId, cached: bool) -> Self {
        let mut result = self.clone();
        result.job_id = job_id;
        if let Ok(success) = &mut result.outcome {
            success.cached = cached;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_defaults() {
        let job = Job::synthesis("hello");
        assert_eq!(job.kind, JobKind::Synthesis);
        assert_eq!(job.language, "auto");
        assert_eq!(job.speed, DEFAULT_SPEED);
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_jobs() {
        assert!(Job::synthesis("   ").validate().is_err());
        assert!(Job::transcription(vec![], "a.wav").validate().is_err());
        assert!(Job::synthesis("hi").offline_only().online_only().validate().is_err());
        assert!(Job::synthesis("hi").with_speed(0).validate().is_err());
        assert!(Job::synthesis("hi").with_attempt_timeout(Duration::ZERO).validate().is_err());

        let mut mismatched = Job::synthesis("hi");
        mismatched.kind = JobKind::Transcription;
        assert_eq!(
            mismatched.validate().unwrap_err().code(),
            "invalid_request"
        );
    }

    #[test]
    fn test_fingerprint_normalizes_text_and_voice() {
        let family = LanguageFamily::Cantonese;
        let a = Job::synthesis("  你好   世界 ").with_voice("Sinji");
        let b = Job::synthesis("你好 世界").with_voice(" sinji");
        assert_eq!(a.fingerprint(&family), b.fingerprint(&family));
        assert_eq!(a.fingerprint(&family).as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_distinguishes_constraints() {
        let family = LanguageFamily::English;
        let base = Job::synthesis("hello");
        let offline = Job::synthesis("hello").offline_only();
        let pinned = Job::synthesis("hello").with_engine("espeak");
        let faster = Job::synthesis("hello").with_speed(200);

        let fp = base.fingerprint(&family);
        assert_ne!(fp, offline.fingerprint(&family));
        assert_ne!(fp, pinned.fingerprint(&family));
        assert_ne!(fp, faster.fingerprint(&family));
        assert_ne!(fp, base.fingerprint(&LanguageFamily::Spanish));
    }

    #[test]
    fn test_engine_pin_parsing() {
        assert_eq!(Constraints::engine_pin(Some("auto")), None);
        assert_eq!(Constraints::engine_pin(Some(" ")), None);
        assert_eq!(Constraints::engine_pin(None), None);
        assert_eq!(
            Constraints::engine_pin(Some("eSpeak")),
            Some(BackendId::new("espeak"))
        );
    }

    #[test]
    fn test_relabel_marks_cached() {
        let original = JobResult::success(
            JobId::new(),
            JobSuccess {
                backend: BackendId::new("espeak"),
                voice: None,
                native_language: "en".to_string(),
                artifact: Artifact::Transcript(Transcript {
                    text: "hi".to_string(),
                    language: None,
                }),
                failures: vec![],
                attempts: 1,
                cached: false,
            },
        );

        let other = JobId::new();
        let copy = original.relabel(other, true);
        assert_eq!(copy.job_id, other);
        assert!(copy.outcome.unwrap().cached);
    }
}

//! sg-core: Speech Gateway Core Library
//!
//! Engine selection and fallback orchestration for text-to-speech and
//! speech-to-text jobs. Language and voice resolution, selection policy,
//! fallback execution, batching and result caching live here; concrete
//! engine adapters live in `sg-engines`.

pub mod backend;
pub mod batch;
pub mod cache;
pub mod capability;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod job;
pub mod language;
pub mod policy;
pub mod probe;
pub mod tool;

#[cfg(test)]
mod testing;

pub use backend::{
    AudioArtifact, AudioFormat, CapabilitySource, RegisteredBackend, SpeechBackend, SynthesisRequest, Transcript,
    TranscriptionRequest,
};
pub use batch::BatchCoordinator;
pub use cache::ResultCache;
pub use capability::{BackendId, CapabilityDescriptor, CapabilitySet, Quality, ServiceLimits, VoiceInfo};
pub use config::{CacheConfig, Config, EngineConfig, OutputConfig, RoutingConfig};
pub use context::{EngineReport, EngineStatus, SpeechContext};
pub use error::{BackendError, BackendErrorKind, CandidateFailure, Error, FailureKind, JobError, Result};
pub use executor::FallbackExecutor;
pub use job::{Artifact, Constraints, Job, JobId, JobKind, JobPayload, JobResult, JobSuccess};
pub use language::{LanguageFamily, PreferenceTable, ResolvedCandidate, Resolver};
pub use policy::{PolicyOptions, RecencyMemo, SelectionPlan, SelectionPolicy};
pub use probe::{ProbeReport, ProbeStatus};
pub use tool::{Tool, ToolDefinition, ToolManager, ToolResult};

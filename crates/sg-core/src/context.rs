//! Speech Context
//!
//! Process-scoped owner of the capability snapshot, probe report, recency
//! memo and result cache. Lifecycle: [`SpeechContext::initialize`],
//! [`SpeechContext::reload`], [`SpeechContext::shutdown`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backend::{CapabilitySource, SpeechBackend};
use crate::batch::BatchCoordinator;
use crate::cache::ResultCache;
use crate::capability::{BackendId, CapabilityDescriptor, CapabilitySet, Quality, VoiceInfo};
use crate::config::Config;
use crate::error::{Error, JobError, Result};
use crate::executor::FallbackExecutor;
use crate::job::{Constraints, Job, JobResult};
use crate::language::{PreferenceTable, Resolver};
use crate::policy::{PolicyOptions, RecencyMemo, SelectionPolicy};
use crate::probe::{ProbeReport, ProbeStatus, probe_all};

/// Recommendation order: local engines first, then cloud services
pub const RECOMMENDATION_ORDER: &[&str] = &["say", "espeak", "gtts", "azure", "openai"];

/// Settings captured from [`Config`] at initialization
#[derive(Debug, Clone)]
struct Settings {
    default_language: String,
    offline_only: bool,
    online_only: bool,
    attempt_timeout: Duration,
    job_timeout: Option<Duration>,
    max_concurrency: usize,
    policy: PolicyOptions,
    preferences: PreferenceTable,
}

impl Settings {
    fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let preferences = PreferenceTable::builtin().with_overrides(&config.preferences)?;
        Ok(Self {
            default_language: config.routing.default_language.clone(),
            offline_only: config.routing.offline_only,
            online_only: config.routing.online_only,
            attempt_timeout: config.routing.attempt_timeout(),
            job_timeout: config.routing.job_timeout(),
            max_concurrency: config.routing.max_concurrency,
            policy: PolicyOptions {
                prefer_offline: config.routing.prefer_offline,
                default_engine: Constraints::engine_pin(config.routing.default_engine.as_deref()),
            },
            preferences,
        })
    }
}

/// Immutable view built by one discovery + probe pass
struct Snapshot {
    capabilities: Arc<CapabilitySet>,
    resolver: Resolver,
    policy: SelectionPolicy,
    executor: FallbackExecutor,
    probes: ProbeReport,
}

/// One engine in the environment report
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub id: BackendId,
    pub description: String,
    pub is_offline: bool,
    pub healthy: bool,
    pub reason: Option<String>,
    pub quality: Quality,
    pub typical_latency_ms: u64,
    pub supports_batch: bool,
    pub supports_transcription: bool,
    pub languages: Vec<String>,
    pub voice_count: usize,
}

/// Engines, health and recommendation
#[derive(Debug, Clone, Serialize)]
pub struct EngineReport {
    pub engines: Vec<EngineStatus>,
    pub total: usize,
    pub offline: usize,
    pub online: usize,
    pub healthy: usize,
    pub recommended: Option<BackendId>,
    pub default_language: String,
    pub probed_at: DateTime<Utc>,
}

pub struct SpeechContext {
    source: Arc<dyn CapabilitySource>,
    settings: Settings,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    memo: RecencyMemo,
    cache: ResultCache,
}

impl SpeechContext {
    /// Discover backends, probe them and build the resolver
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, discovery fails or
    /// two backends share an id
    pub async fn initialize(config: &Config, source: Arc<dyn CapabilitySource>) -> Result<Arc<Self>> {
        let settings = Settings::from_config(config)?;
        let snapshot = build_snapshot(source.as_ref(), &settings).await?;

        info!(
            backends = snapshot.capabilities.len(),
            healthy = snapshot.probes.healthy_count(),
            default_language = %settings.default_language,
            "Speech context initialized"
        );

        Ok(Arc::new(Self {
            source,
            memo: RecencyMemo::new(config.routing.recency_capacity),
            cache: ResultCache::new(config.cache.ttl(), config.cache.enabled),
            snapshot: RwLock::new(Some(Arc::new(snapshot))),
            settings,
        }))
    }

    /// Rediscover and reprobe, then swap the snapshot atomically
    pub async fn reload(&self) -> Result<()> {
        if self.snapshot.read().await.is_none() {
            return Err(Error::Other("speech context has been shut down".to_string()));
        }

        let snapshot = build_snapshot(self.source.as_ref(), &self.settings).await?;
        let (backends, healthy) = (snapshot.capabilities.len(), snapshot.probes.healthy_count());
        {
            let mut current = self.snapshot.write().await;
            if current.is_none() {
                return Err(Error::Other("speech context has been shut down".to_string()));
            }
            *current = Some(Arc::new(snapshot));
        }
        self.cache.clear();
        self.memo.clear();

        info!(backends, healthy, "Speech context reloaded");
        Ok(())
    }

    /// Drop all state; later submissions fail with `ShutDown`
    pub async fn shutdown(&self) {
        self.snapshot.write().await.take();
        self.cache.clear();
        self.memo.clear();
        info!("Speech context shut down");
    }

    pub async fn is_shut_down(&self) -> bool {
        self.snapshot.read().await.is_none()
    }

    async fn current(&self) -> std::result::Result<Arc<Snapshot>, JobError> {
        self.snapshot.read().await.clone().ok_or(JobError::ShutDown)
    }

    /// Run one job through resolve -> plan -> cache -> execute
    pub async fn submit(&self, job: Job) -> JobResult {
        let job_id = job.id;
        match self.run_pipeline(job).await {
            Ok(result) => result,
            Err(e) => {
                debug!(job_id = %job_id, error = %e, "Job rejected before execution");
                JobResult::failure(job_id, e)
            }
        }
    }

    async fn run_pipeline(&self, mut job: Job) -> std::result::Result<JobResult, JobError> {
        let snapshot = self.current().await?;

        job.constraints.offline_only |= self.settings.offline_only;
        job.constraints.online_only |= self.settings.online_only;
        job.validate()?;

        let (family, candidates) =
            snapshot
                .resolver
                .resolve_checked(job.kind, &job.language, job.voice.as_deref())?;
        let plan = snapshot.policy.plan(
            candidates,
            &job.constraints,
            &snapshot.probes,
            &family,
            job.kind,
            &self.memo,
        )?;

        if job.constraints.job_timeout.is_none() {
            job.constraints.job_timeout = self.settings.job_timeout;
        }
        let attempt_timeout = job
            .constraints
            .attempt_timeout
            .unwrap_or(self.settings.attempt_timeout);

        let fingerprint = job.fingerprint(&family);
        let result = self
            .cache
            .get_or_compute(fingerprint, job.id, || {
                snapshot.executor.execute(&plan, &job, attempt_timeout)
            })
            .await;

        if let Ok(success) = &result.outcome {
            if !success.cached {
                self.memo.record(&family, job.kind, &success.backend);
            }
        }
        Ok(result)
    }

    /// Run many jobs with bounded concurrency; results keep input order
    pub async fn run_batch(self: &Arc<Self>, jobs: Vec<Job>, max_concurrency: Option<usize>) -> Vec<JobResult> {
        let coordinator = BatchCoordinator::new(max_concurrency.unwrap_or(self.settings.max_concurrency));
        let context = Arc::clone(self);
        coordinator
            .run_batch(jobs, move |job| {
                let context = context.clone();
                async move { context.submit(job).await }
            })
            .await
    }

    /// Descriptors, probe status and recommendation
    pub async fn engine_report(&self) -> std::result::Result<EngineReport, JobError> {
        let snapshot = self.current().await?;
        let engines: Vec<EngineStatus> = snapshot
            .capabilities
            .iter()
            .map(|d| engine_status(d, &snapshot.probes.status(&d.id)))
            .collect();

        let offline = engines.iter().filter(|e| e.is_offline).count();
        Ok(EngineReport {
            total: engines.len(),
            offline,
            online: engines.len() - offline,
            healthy: engines.iter().filter(|e| e.healthy).count(),
            recommended: recommend(&snapshot.capabilities, &snapshot.probes),
            default_language: self.settings.default_language.clone(),
            probed_at: snapshot.probes.probed_at,
            engines,
        })
    }

    /// Descriptor of one backend
    pub async fn descriptor(&self, backend: &BackendId) -> std::result::Result<CapabilityDescriptor, JobError> {
        let snapshot = self.current().await?;
        snapshot
            .capabilities
            .get(backend)
            .cloned()
            .ok_or_else(|| JobError::EngineUnavailable {
                backend: backend.to_string(),
                reason: "unknown engine".to_string(),
            })
    }

    /// Voice list of one backend
    pub async fn voices(&self, backend: &BackendId) -> std::result::Result<Vec<VoiceInfo>, JobError> {
        self.descriptor(backend).await.map(|d| d.voices)
    }

    /// Ids of all registered backends, in declaration order
    pub async fn backend_ids(&self) -> Vec<BackendId> {
        match self.current().await {
            Ok(snapshot) => snapshot.capabilities.ids(),
            Err(_) => Vec::new(),
        }
    }

    pub fn default_language(&self) -> &str {
        &self.settings.default_language
    }

    /// Remove expired cache entries
    pub fn purge_cache(&self) -> usize {
        self.cache.purge_expired()
    }
}

async fn build_snapshot(source: &dyn CapabilitySource, settings: &Settings) -> Result<Snapshot> {
    let registered = source.discover().await?;
    for entry in &registered {
        if entry.descriptor.id != entry.backend.id() {
            return Err(Error::Capability(format!(
                "Descriptor id {} does not match backend id {}",
                entry.descriptor.id,
                entry.backend.id()
            )));
        }
    }

    let capabilities = Arc::new(CapabilitySet::new(
        registered.iter().map(|r| r.descriptor.clone()).collect(),
    )?);
    if capabilities.is_empty() {
        warn!("No speech backends registered");
    }

    let adapters: Vec<Arc<dyn SpeechBackend>> = registered.iter().map(|r| r.backend.clone()).collect();
    let probes = probe_all(&adapters).await;
    let backends: HashMap<BackendId, Arc<dyn SpeechBackend>> = registered
        .into_iter()
        .map(|r| (r.descriptor.id, r.backend))
        .collect();

    Ok(Snapshot {
        resolver: Resolver::new(
            capabilities.clone(),
            settings.preferences.clone(),
            settings.default_language.clone(),
        ),
        policy: SelectionPolicy::new(capabilities.clone(), settings.policy.clone()),
        executor: FallbackExecutor::new(&capabilities, backends),
        capabilities,
        probes,
    })
}

fn engine_status(descriptor: &CapabilityDescriptor, status: &ProbeStatus) -> EngineStatus {
    EngineStatus {
        id: descriptor.id.clone(),
        description: descriptor.description.clone(),
        is_offline: descriptor.is_offline,
        healthy: status.is_healthy(),
        reason: status.reason().map(str::to_string),
        quality: descriptor.quality,
        typical_latency_ms: descriptor.typical_latency_ms,
        supports_batch: descriptor.supports_batch,
        supports_transcription: descriptor.supports_transcription,
        languages: descriptor.languages.clone(),
        voice_count: descriptor.voices.len(),
    }
}

/// First healthy backend in [`RECOMMENDATION_ORDER`], then declaration order
fn recommend(capabilities: &CapabilitySet, probes: &ProbeReport) -> Option<BackendId> {
    RECOMMENDATION_ORDER
        .iter()
        .map(|id| BackendId::new(*id))
        .filter(|id| capabilities.contains(id))
        .chain(capabilities.ids())
        .find(|id| probes.is_healthy(id))
}

//! Fallback Executor
//!
//! Walks a [`SelectionPlan`] in order until one candidate succeeds.
//!
//! ```text
//! Pending -> Attempting(i) -> Succeeded
//!                          -> Attempting(i + 1)
//!                          -> Exhausted
//!                          -> Cancelled (job deadline)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::backend::{SpeechBackend, SynthesisRequest, TranscriptionRequest};
use crate::capability::{BackendId, CapabilitySet};
use crate::error::{BackendError, CandidateFailure, FailureKind, JobError};
use crate::job::{Artifact, Job, JobPayload, JobResult, JobSuccess};
use crate::language::ResolvedCandidate;
use crate::policy::SelectionPlan;

/// Default per-attempt timeout
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct FallbackExecutor {
    backends: HashMap<BackendId, Arc<dyn SpeechBackend>>,
    /// One permit per backend that cannot run calls concurrently
    gates: HashMap<BackendId, Arc<Semaphore>>,
}

impl FallbackExecutor {
    pub fn new(capabilities: &CapabilitySet, backends: HashMap<BackendId, Arc<dyn SpeechBackend>>) -> Self {
        let gates = capabilities
            .iter()
            .filter(|d| !d.supports_batch)
            .map(|d| (d.id.clone(), Arc::new(Semaphore::new(1))))
            .collect();
        Self { backends, gates }
    }

    /// Try each candidate of `plan` once, in order
    pub async fn execute(&self, plan: &SelectionPlan, job: &Job, attempt_timeout: Duration) -> JobResult {
        let deadline = job.constraints.job_timeout.map(|t| Instant::now() + t);
        let mut failures: Vec<CandidateFailure> = Vec::with_capacity(plan.len());

        for (index, candidate) in plan.candidates().iter().enumerate() {
            // Queueing for a gated backend is bounded by the job deadline only
            let _permit = match self.gates.get(&candidate.backend) {
                Some(gate) => {
                    let acquire = Arc::clone(gate).acquire_owned();
                    let acquired = match deadline {
                        Some(deadline) => match timeout_at(deadline, acquire).await {
                            Ok(acquired) => acquired,
                            Err(_) => return self.job_timeout(job, failures),
                        },
                        None => acquire.await,
                    };
                    // gates are never closed
                    acquired.ok()
                }
                None => None,
            };

            let (budget, bounded_by_deadline) = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return self.job_timeout(job, failures);
                    }
                    (attempt_timeout.min(left), left <= attempt_timeout)
                }
                None => (attempt_timeout, false),
            };

            debug!(
                job_id = %job.id,
                attempt = index + 1,
                backend = %candidate.backend,
                language = %candidate.native_language,
                "Attempting candidate"
            );

            let (failure_kind, message) = match timeout(budget, self.attempt(candidate, job)).await {
                Ok(Ok(artifact)) => {
                    info!(
                        job_id = %job.id,
                        backend = %candidate.backend,
                        attempts = index + 1,
                        "Job succeeded"
                    );
                    return JobResult::success(
                        job.id,
                        JobSuccess {
                            backend: candidate.backend.clone(),
                            voice: candidate.voice.clone(),
                            native_language: candidate.native_language.clone(),
                            artifact,
                            failures,
                            attempts: index + 1,
                            cached: false,
                        },
                    );
                }
                Ok(Err(e)) => (e.failure_kind(), e.message),
                Err(_) if bounded_by_deadline => return self.job_timeout(job, failures),
                Err(_) => (
                    FailureKind::EngineTimeout,
                    format!("no response within {}ms", budget.as_millis()),
                ),
            };

            warn!(
                job_id = %job.id,
                backend = %candidate.backend,
                kind = ?failure_kind,
                error = %message,
                "Candidate failed"
            );
            failures.push(CandidateFailure {
                backend: candidate.backend.clone(),
                native_language: candidate.native_language.clone(),
                voice: candidate.voice.clone(),
                kind: failure_kind,
                message,
            });
        }

        if plan.is_pinned() {
            if let Some(last) = failures.last() {
                let error = JobError::from_failure(last, attempt_timeout.as_millis() as u64);
                return JobResult::failure(job.id, error);
            }
        }
        JobResult::failure(job.id, JobError::PlanExhausted { failures })
    }

    async fn attempt(&self, candidate: &ResolvedCandidate, job: &Job) -> Result<Artifact, BackendError> {
        let backend = self.backends.get(&candidate.backend).ok_or_else(|| {
            BackendError::not_installed(format!("{} is not registered", candidate.backend))
        })?;

        match &job.payload {
            JobPayload::Text(text) => {
                let request = SynthesisRequest {
                    text: text.clone(),
                    native_language: candidate.native_language.clone(),
                    voice: candidate.voice.clone(),
                    speed: job.speed,
                };
                backend.synthesize(&request).await.map(Artifact::Audio)
            }
            JobPayload::Audio { data, filename } => {
                let request = TranscriptionRequest {
                    audio: data.clone(),
                    filename: filename.clone(),
                    native_language: candidate.native_language.clone(),
                };
                backend.transcribe(&request).await.map(Artifact::Transcript)
            }
        }
    }

    fn job_timeout(&self, job: &Job, failures: Vec<CandidateFailure>) -> JobResult {
        let timeout_ms = job
            .constraints
            .job_timeout
            .map(|t| t.as_millis() as u64)
            .unwrap_or_default();
        warn!(job_id = %job.id, timeout_ms, attempts = failures.len(), "Job deadline reached");
        JobResult::failure(job.id, JobError::JobTimeout { timeout_ms, failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityDescriptor;
    use crate::language::LanguageFamily;
    use crate::job::JobKind;
    use crate::testing::{Behavior, MockBackend};

    struct Harness {
        executor: FallbackExecutor,
        mocks: Vec<Arc<MockBackend>>,
    }

    fn harness(mocks: Vec<MockBackend>, batch: bool) -> Harness {
        let mocks: Vec<Arc<MockBackend>> = mocks.into_iter().map(Arc::new).collect();
        let descriptors = mocks
            .iter()
            .map(|m| CapabilityDescriptor::new(m.id(), true).with_batch(batch))
            .collect();
        let capabilities = CapabilitySet::new(descriptors).unwrap();
        let backends = mocks
            .iter()
            .map(|m| (m.id(), m.clone() as Arc<dyn SpeechBackend>))
            .collect();
        Harness {
            executor: FallbackExecutor::new(&capabilities, backends),
            mocks,
        }
    }

    fn plan(ids: &[&str], pinned: bool) -> SelectionPlan {
        let candidates = ids
            .iter()
            .enumerate()
            .map(|(rank, id)| ResolvedCandidate {
                backend: BackendId::new(*id),
                native_language: "yue".to_string(),
                voice: None,
                rank,
            })
            .collect();
        SelectionPlan::new(LanguageFamily::Cantonese, JobKind::Synthesis, candidates, pinned).unwrap()
    }

    fn rejected() -> BackendError {
        BackendError::rejected("synthesis failed")
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let h = harness(vec![MockBackend::new("a"), MockBackend::new("b")], true);
        let result = h
            .executor
            .execute(&plan(&["a", "b"], false), &Job::synthesis("你好"), DEFAULT_ATTEMPT_TIMEOUT)
            .await;

        let success = result.outcome.unwrap();
        assert_eq!(success.backend.as_str(), "a");
        assert_eq!(success.attempts, 1);
        assert_eq!(h.mocks[1].calls(), 0);
    }

    #[tokio::test]
    async fn test_last_candidate_serves_after_failures() {
        let h = harness(
            vec![
                MockBackend::new("a").failing(rejected()),
                MockBackend::new("b").failing(BackendError::network("offline")),
                MockBackend::new("c"),
            ],
            true,
        );
        let result = h
            .executor
            .execute(&plan(&["a", "b", "c"], false), &Job::synthesis("hi"), DEFAULT_ATTEMPT_TIMEOUT)
            .await;

        let success = result.outcome.unwrap();
        assert_eq!(success.backend.as_str(), "c");
        assert_eq!(success.attempts, 3);
        assert_eq!(success.failures.len(), 2);
        assert_eq!(success.failures[0].kind, FailureKind::EngineRejected);
        assert_eq!(success.failures[1].kind, FailureKind::EngineUnavailable);
        for mock in &h.mocks {
            assert_eq!(mock.calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_all_failing_plan_is_exhausted() {
        let h = harness(
            vec![
                MockBackend::new("a").failing(rejected()),
                MockBackend::new("b").failing(rejected()),
            ],
            true,
        );
        let result = h
            .executor
            .execute(&plan(&["a", "b"], false), &Job::synthesis("hi"), DEFAULT_ATTEMPT_TIMEOUT)
            .await;

        match result.outcome {
            Err(JobError::PlanExhausted { failures }) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].backend.as_str(), "a");
                assert_eq!(failures[1].backend.as_str(), "b");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pinned_failure_is_surfaced_directly() {
        let h = harness(vec![MockBackend::new("a").failing(rejected())], true);
        let result = h
            .executor
            .execute(&plan(&["a"], true), &Job::synthesis("hi"), DEFAULT_ATTEMPT_TIMEOUT)
            .await;

        assert_eq!(
            result.outcome.unwrap_err(),
            JobError::EngineRejected {
                backend: "a".to_string(),
                reason: "synthesis failed".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_advances() {
        let h = harness(
            vec![
                MockBackend::new("slow").delayed(Duration::from_secs(60)),
                MockBackend::new("fast"),
            ],
            true,
        );
        let result = h
            .executor
            .execute(&plan(&["slow", "fast"], false), &Job::synthesis("hi"), Duration::from_secs(1))
            .await;

        let success = result.outcome.unwrap();
        assert_eq!(success.backend.as_str(), "fast");
        assert_eq!(success.failures[0].kind, FailureKind::EngineTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_deadline_stops_the_plan() {
        let h = harness(
            vec![
                MockBackend::new("a").failing(rejected()),
                MockBackend::new("slow").delayed(Duration::from_secs(60)),
                MockBackend::new("never"),
            ],
            true,
        );
        let job = Job::synthesis("hi").with_job_timeout(Duration::from_secs(2));
        let result = h
            .executor
            .execute(&plan(&["a", "slow", "never"], false), &job, Duration::from_secs(10))
            .await;

        match result.outcome {
            Err(JobError::JobTimeout { timeout_ms, failures }) => {
                assert_eq!(timeout_ms, 2000);
                assert_eq!(failures.len(), 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(h.mocks[2].calls(), 0);
    }

    #[tokio::test]
    async fn test_transcription_payload() {
        let h = harness(vec![MockBackend::new("a")], true);
        let job = Job::transcription(vec![0u8; 16], "clip.wav");
        let candidates = vec![ResolvedCandidate {
            backend: BackendId::new("a"),
            native_language: "en".to_string(),
            voice: None,
            rank: 0,
        }];
        let plan =
            SelectionPlan::new(LanguageFamily::English, JobKind::Transcription, candidates, false).unwrap();

        let success = h.executor.execute(&plan, &job, DEFAULT_ATTEMPT_TIMEOUT).await.outcome.unwrap();
        match success.artifact {
            Artifact::Transcript(t) => assert_eq!(t.text, "a heard 16 bytes"),
            other => panic!("unexpected artifact: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_batch_backend_is_serialized() {
        let h = harness(
            vec![MockBackend::new("say").delayed(Duration::from_millis(100))],
            false,
        );
        let executor = Arc::new(h.executor);
        let plan = plan(&["say"], false);

        let runs = (0..4).map(|_| {
            let executor = executor.clone();
            let plan = plan.clone();
            async move {
                executor
                    .execute(&plan, &Job::synthesis("hi"), DEFAULT_ATTEMPT_TIMEOUT)
                    .await
            }
        });
        let results = futures::future::join_all(runs).await;

        assert!(results.iter().all(JobResult::is_success));
        assert_eq!(h.mocks[0].calls(), 4);
        assert_eq!(h.mocks[0].peak_concurrency(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_wait_is_not_an_attempt_timeout() {
        let h = harness(
            vec![MockBackend::new("say").delayed(Duration::from_millis(600))],
            false,
        );
        let executor = Arc::new(h.executor);
        let plan = plan(&["say"], false);

        let runs = (0..3).map(|_| {
            let executor = executor.clone();
            let plan = plan.clone();
            async move {
                executor
                    .execute(&plan, &Job::synthesis("hi"), Duration::from_secs(1))
                    .await
            }
        });
        let results = futures::future::join_all(runs).await;

        for result in &results {
            let success = result.outcome.as_ref().unwrap();
            assert!(success.failures.is_empty());
        }
        assert_eq!(h.mocks[0].calls(), 3);
        assert_eq!(h.mocks[0].peak_concurrency(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_deadline_bounds_gate_wait() {
        let h = harness(
            vec![MockBackend::new("say").delayed(Duration::from_secs(3))],
            false,
        );
        let plan = plan(&["say"], false);
        let holder = Job::synthesis("first");
        let waiter = Job::synthesis("second").with_job_timeout(Duration::from_secs(1));

        let (first, second) = tokio::join!(
            h.executor.execute(&plan, &holder, DEFAULT_ATTEMPT_TIMEOUT),
            h.executor.execute(&plan, &waiter, DEFAULT_ATTEMPT_TIMEOUT),
        );

        assert!(first.is_success());
        match second.outcome {
            Err(JobError::JobTimeout { timeout_ms, failures }) => {
                assert_eq!(timeout_ms, 1000);
                assert!(failures.is_empty());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(h.mocks[0].calls(), 1);
    }

    #[tokio::test]
    async fn test_scripted_recovery() {
        let h = harness(
            vec![MockBackend::new("a").then(Behavior::Fail(rejected()))],
            true,
        );
        let plan = plan(&["a"], false);

        let first = h.executor.execute(&plan, &Job::synthesis("hi"), DEFAULT_ATTEMPT_TIMEOUT).await;
        assert!(!first.is_success());
        let second = h.executor.execute(&plan, &Job::synthesis("hi"), DEFAULT_ATTEMPT_TIMEOUT).await;
        assert!(second.is_success());
    }
}

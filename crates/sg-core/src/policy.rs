//! Selection Policy
//!
//! Turns resolved candidates into an ordered, non-empty attempt sequence
//! according to caller constraints, probe results and recent successes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::capability::{BackendId, CapabilitySet};
use crate::error::JobError;
use crate::job::{Constraints, JobKind};
use crate::language::{LanguageFamily, ResolvedCandidate};
use crate::probe::ProbeReport;

/// Default number of (family, kind) keys remembered
pub const DEFAULT_RECENCY_CAPACITY: usize = 64;

/// Ordered attempt sequence for one job. Never empty.
#[derive(Debug, Clone)]
pub struct SelectionPlan {
    family: LanguageFamily,
    kind: JobKind,
    candidates: Vec<ResolvedCandidate>,
    pinned: bool,
}

impl SelectionPlan {
    /// `None` when `candidates` is empty
    pub fn new(
        family: LanguageFamily,
        kind: JobKind,
        candidates: Vec<ResolvedCandidate>,
        pinned: bool,
    ) -> Option<Self> {
        if candidates.is_empty() {
            return None;
        }
        Some(Self {
            family,
            kind,
            candidates,
            pinned,
        })
    }

    pub fn family(&self) -> &LanguageFamily {
        &self.family
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn candidates(&self) -> &[ResolvedCandidate] {
        &self.candidates
    }

    pub fn primary(&self) -> &ResolvedCandidate {
        &self.candidates[0]
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether the caller named an explicit engine
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }
}

/// Most recently successful backend per (family, kind)
///
/// Bounded; the least recently updated key is evicted first.
#[derive(Debug)]
pub struct RecencyMemo {
    capacity: usize,
    entries: Mutex<VecDeque<((LanguageFamily, JobKind), BackendId)>>,
}

impl RecencyMemo {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(&self, family: &LanguageFamily, kind: JobKind, backend: &BackendId) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|((f, k), _)| !(f == family && *k == kind));
        entries.push_back(((family.clone(), kind), backend.clone()));
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn get(&self, family: &LanguageFamily, kind: JobKind) -> Option<BackendId> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .find(|((f, k), _)| f == family && *k == kind)
            .map(|(_, backend)| backend.clone())
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecencyMemo {
    fn default() -> Self {
        Self::new(DEFAULT_RECENCY_CAPACITY)
    }
}

/// Routing options that apply to every job
#[derive(Debug, Clone, Default)]
pub struct PolicyOptions {
    /// Move offline candidates ahead of online ones
    pub prefer_offline: bool,
    /// Backend moved to the front of unpinned plans
    pub default_engine: Option<BackendId>,
}

#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    capabilities: Arc<CapabilitySet>,
    options: PolicyOptions,
}

impl SelectionPolicy {
    pub fn new(capabilities: Arc<CapabilitySet>, options: PolicyOptions) -> Self {
        Self {
            capabilities,
            options,
        }
    }

    /// Pick the attempt sequence
    ///
    /// # Errors
    /// - `EngineUnavailable` when a pinned engine is unknown, unhealthy or
    ///   cannot serve the family, or when every candidate is unhealthy
    /// - `UnsupportedLanguage` when offline/online filtering leaves nothing
    pub fn plan(
        &self,
        candidates: Vec<ResolvedCandidate>,
        constraints: &Constraints,
        probes: &ProbeReport,
        family: &LanguageFamily,
        kind: JobKind,
        memo: &RecencyMemo,
    ) -> Result<SelectionPlan, JobError> {
        let mut candidates = candidates;
        let pinned = constraints.explicit_engine.is_some();

        if let Some(engine) = &constraints.explicit_engine {
            if !self.capabilities.contains(engine) {
                return Err(JobError::EngineUnavailable {
                    backend: engine.to_string(),
                    reason: "unknown engine".to_string(),
                });
            }
            if let Some(reason) = probes.status(engine).reason() {
                return Err(JobError::EngineUnavailable {
                    backend: engine.to_string(),
                    reason: reason.to_string(),
                });
            }
            candidates.retain(|c| &c.backend == engine);
            if candidates.is_empty() {
                return Err(JobError::EngineUnavailable {
                    backend: engine.to_string(),
                    reason: format!("does not support {}", family),
                });
            }
        }

        if constraints.offline_only {
            candidates.retain(|c| self.is_offline(&c.backend));
            if candidates.is_empty() {
                return Err(JobError::UnsupportedLanguage(format!("{} (offline only)", family)));
            }
        }
        if constraints.online_only {
            candidates.retain(|c| !self.is_offline(&c.backend));
            if candidates.is_empty() {
                return Err(JobError::UnsupportedLanguage(format!("{} (online only)", family)));
            }
        }

        let (healthy, unhealthy): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| probes.is_healthy(&c.backend));
        if healthy.is_empty() {
            let names: Vec<&str> = unhealthy.iter().map(|c| c.backend.as_str()).collect();
            return Err(JobError::EngineUnavailable {
                backend: names.join(", "),
                reason: format!("no healthy backend for {}", family),
            });
        }
        let mut candidates = healthy;

        if !pinned {
            if self.options.prefer_offline {
                let (offline, online): (Vec<_>, Vec<_>) = candidates
                    .into_iter()
                    .partition(|c| self.is_offline(&c.backend));
                candidates = offline.into_iter().chain(online).collect();
            }
            if let Some(default) = &self.options.default_engine {
                promote(&mut candidates, default);
            }
            if let Some(recent) = memo.get(family, kind) {
                debug!(family = %family, backend = %recent, "Promoting recently successful backend");
                promote(&mut candidates, &recent);
            }
        }

        SelectionPlan::new(family.clone(), kind, candidates, pinned)
            .ok_or_else(|| JobError::Internal("empty selection plan".to_string()))
    }

    fn is_offline(&self, id: &BackendId) -> bool {
        self.capabilities.get(id).is_some_and(|d| d.is_offline)
    }
}

/// Move the candidate for `backend` to the front, keeping the rest in order
fn promote(candidates: &mut Vec<ResolvedCandidate>, backend: &BackendId) {
    if let Some(position) = candidates.iter().position(|c| &c.backend == backend) {
        let candidate = candidates.remove(position);
        candidates.insert(0, candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{PreferenceTable, Resolver};
    use crate::probe::ProbeStatus;
    use crate::testing::{all_healthy, sample_capabilities};
    use std::collections::HashMap;

    struct Fixture {
        resolver: Resolver,
        policy: SelectionPolicy,
        memo: RecencyMemo,
    }

    fn fixture(options: PolicyOptions) -> Fixture {
        let capabilities = Arc::new(sample_capabilities());
        Fixture {
            resolver: Resolver::new(capabilities.clone(), PreferenceTable::builtin(), "en"),
            policy: SelectionPolicy::new(capabilities, options),
            memo: RecencyMemo::default(),
        }
    }

    impl Fixture {
        fn plan(
            &self,
            alias: &str,
            constraints: &Constraints,
            probes: &ProbeReport,
        ) -> Result<SelectionPlan, JobError> {
            let family = self.resolver.family(alias);
            let candidates = self.resolver.resolve(alias, None);
            self.policy
                .plan(candidates, constraints, probes, &family, JobKind::Synthesis, &self.memo)
        }
    }

    fn order(plan: &SelectionPlan) -> Vec<&str> {
        plan.candidates().iter().map(|c| c.backend.as_str()).collect()
    }

    fn with_unhealthy(ids: &[&str]) -> ProbeReport {
        let mut statuses: HashMap<BackendId, ProbeStatus> = sample_capabilities()
            .ids()
            .into_iter()
            .map(|id| (id, ProbeStatus::Healthy))
            .collect();
        for id in ids {
            statuses.insert(BackendId::new(*id), ProbeStatus::Unavailable("down".to_string()));
        }
        ProbeReport::new(statuses)
    }

    #[test]
    fn test_cantonese_auto_prefers_online() {
        let f = fixture(PolicyOptions::default());
        let plan = f.plan("zh-HK", &Constraints::default(), &all_healthy()).unwrap();
        assert_eq!(order(&plan), vec!["azure", "gtts", "say", "espeak"]);
        assert!(!plan.is_pinned());
        assert_eq!(plan.family(), &LanguageFamily::Cantonese);
    }

    #[test]
    fn test_cantonese_without_online_falls_to_best_offline() {
        let f = fixture(PolicyOptions::default());
        let probes = with_unhealthy(&["azure", "gtts"]);
        let plan = f.plan("zh-HK", &Constraints::default(), &probes).unwrap();
        assert_eq!(plan.primary().backend.as_str(), "say");
        assert_eq!(order(&plan), vec!["say", "espeak"]);
    }

    #[test]
    fn test_offline_only_drops_online() {
        let f = fixture(PolicyOptions::default());
        let constraints = Constraints {
            offline_only: true,
            ..Default::default()
        };
        let plan = f.plan("cantonese", &constraints, &all_healthy()).unwrap();
        assert_eq!(order(&plan), vec!["say", "espeak"]);
    }

    #[test]
    fn test_offline_only_without_offline_candidates() {
        let f = fixture(PolicyOptions::default());
        let constraints = Constraints {
            offline_only: true,
            ..Default::default()
        };
        // no offline backend in the sample set speaks Korean
        let err = f.plan("ko", &constraints, &all_healthy()).unwrap_err();
        assert_eq!(err.code(), "unsupported_language");
    }

    #[test]
    fn test_online_only_drops_offline() {
        let f = fixture(PolicyOptions::default());
        let constraints = Constraints {
            online_only: true,
            ..Default::default()
        };
        let plan = f.plan("zh-HK", &constraints, &all_healthy()).unwrap();
        assert_eq!(order(&plan), vec!["azure", "gtts"]);
    }

    #[test]
    fn test_pinned_engine_is_never_redirected() {
        let f = fixture(PolicyOptions::default());
        let constraints = Constraints {
            explicit_engine: Some(BackendId::new("openai")),
            ..Default::default()
        };
        // openai has no Cantonese synthesis
        let err = f.plan("zh-HK", &constraints, &all_healthy()).unwrap_err();
        assert!(matches!(err, JobError::EngineUnavailable { ref backend, .. } if backend == "openai"));

        let constraints = Constraints {
            explicit_engine: Some(BackendId::new("say")),
            ..Default::default()
        };
        let plan = f.plan("zh-HK", &constraints, &all_healthy()).unwrap();
        assert_eq!(order(&plan), vec!["say"]);
        assert!(plan.is_pinned());
    }

    #[test]
    fn test_pinned_unhealthy_engine_reports_probe_reason() {
        let f = fixture(PolicyOptions::default());
        let constraints = Constraints {
            explicit_engine: Some(BackendId::new("azure")),
            ..Default::default()
        };
        let err = f.plan("zh-HK", &constraints, &with_unhealthy(&["azure"])).unwrap_err();
        assert_eq!(
            err,
            JobError::EngineUnavailable {
                backend: "azure".to_string(),
                reason: "down".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_pinned_engine() {
        let f = fixture(PolicyOptions::default());
        let constraints = Constraints {
            explicit_engine: Some(BackendId::new("polly")),
            ..Default::default()
        };
        let err = f.plan("en", &constraints, &all_healthy()).unwrap_err();
        assert_eq!(err.code(), "engine_unavailable");
    }

    #[test]
    fn test_all_unhealthy() {
        let f = fixture(PolicyOptions::default());
        let probes = with_unhealthy(&["azure", "gtts", "say", "espeak", "openai"]);
        let err = f.plan("zh-HK", &Constraints::default(), &probes).unwrap_err();
        assert_eq!(err.code(), "engine_unavailable");
    }

    #[test]
    fn test_prefer_offline_partitions_stably() {
        let f = fixture(PolicyOptions {
            prefer_offline: true,
            default_engine: None,
        });
        let plan = f.plan("zh-HK", &Constraints::default(), &all_healthy()).unwrap();
        assert_eq!(order(&plan), vec!["say", "espeak", "azure", "gtts"]);
    }

    #[test]
    fn test_recent_success_is_promoted() {
        let f = fixture(PolicyOptions::default());
        f.memo
            .record(&LanguageFamily::Cantonese, JobKind::Synthesis, &BackendId::new("espeak"));
        let plan = f.plan("yue", &Constraints::default(), &all_healthy()).unwrap();
        assert_eq!(order(&plan), vec!["espeak", "azure", "gtts", "say"]);

        // other families are untouched
        let plan = f.plan("zh-CN", &Constraints::default(), &all_healthy()).unwrap();
        assert_eq!(plan.primary().backend.as_str(), "azure");
    }

    #[test]
    fn test_default_engine_is_promoted() {
        let f = fixture(PolicyOptions {
            prefer_offline: false,
            default_engine: Some(BackendId::new("gtts")),
        });
        let plan = f.plan("zh-HK", &Constraints::default(), &all_healthy()).unwrap();
        assert_eq!(order(&plan), vec!["gtts", "azure", "say", "espeak"]);
    }

    #[test]
    fn test_recency_memo_evicts_oldest() {
        let memo = RecencyMemo::new(2);
        let espeak = BackendId::new("espeak");
        memo.record(&LanguageFamily::English, JobKind::Synthesis, &espeak);
        memo.record(&LanguageFamily::French, JobKind::Synthesis, &espeak);
        memo.record(&LanguageFamily::English, JobKind::Synthesis, &BackendId::new("say"));
        memo.record(&LanguageFamily::German, JobKind::Synthesis, &espeak);

        assert_eq!(memo.len(), 2);
        assert_eq!(memo.get(&LanguageFamily::French, JobKind::Synthesis), None);
        assert_eq!(
            memo.get(&LanguageFamily::English, JobKind::Synthesis),
            Some(BackendId::new("say"))
        );
        assert_eq!(memo.get(&LanguageFamily::English, JobKind::Transcription), None);

        memo.clear();
        assert!(memo.is_empty());
    }

    #[test]
    fn test_plan_is_never_empty() {
        assert!(SelectionPlan::new(LanguageFamily::English, JobKind::Synthesis, vec![], false).is_none());
    }
}

//! Result Cache
//!
//! Single-flight cache keyed by request fingerprint. Only successful results
//! are kept, for a fixed TTL. Nothing is persisted.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::job::{Fingerprint, JobId, JobResult};

/// Default time-to-live for cached results
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

struct Completed {
    result: JobResult,
    at: Instant,
}

#[derive(Default)]
struct Slot {
    cell: OnceCell<Completed>,
}

pub struct ResultCache {
    entries: DashMap<Fingerprint, Arc<Slot>>,
    ttl: Duration,
    enabled: bool,
}

impl ResultCache {
    pub fn new(ttl: Duration, enabled: bool) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            enabled,
        }
    }

    pub fn disabled() -> Self {
        Self::new(DEFAULT_TTL, false)
    }

    /// Return the cached result for `fingerprint`, or run `compute` once
    ///
    /// Concurrent callers with the same fingerprint wait for the first
    /// caller's computation. Callers that did not compute receive a copy
    /// re-labelled with their own `job_id`.
    pub async fn get_or_compute<F, Fut>(&self, fingerprint: Fingerprint, job_id: JobId, compute: F) -> JobResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = JobResult>,
    {
        if !self.enabled {
            return compute().await;
        }

        let slot = loop {
            let slot = self
                .entries
                .entry(fingerprint.clone())
                .or_default()
                .value()
                .clone();
            match slot.cell.get() {
                Some(done) if done.at.elapsed() >= self.ttl => {
                    self.entries.remove_if(&fingerprint, |_, s| Arc::ptr_eq(s, &slot));
                }
                Some(done) => {
                    debug!(fingerprint = %fingerprint, "Cache hit");
                    return done.result.relabel(job_id, true);
                }
                None => break slot,
            }
        };

        let mut computed_here = false;
        let done = slot
            .cell
            .get_or_init(|| async {
                computed_here = true;
                let result = compute().await;
                Completed {
                    result,
                    at: Instant::now(),
                }
            })
            .await;

        if !done.result.is_success() {
            // failures go to concurrent waiters only
            self.entries.remove_if(&fingerprint, |_, s| Arc::ptr_eq(s, &slot));
        }

        if computed_here {
            done.result.clone()
        } else {
            debug!(fingerprint = %fingerprint, "Joined in-flight computation");
            done.result.relabel(job_id, true)
        }
    }

    /// Drop every entry. In-flight computations still reach their callers.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove entries older than the TTL
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, slot| slot.cell.get().is_none_or(|done| done.at.elapsed() < self.ttl));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, true)
    }
}

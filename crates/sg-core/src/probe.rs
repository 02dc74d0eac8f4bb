//! Engine Probe
//!
//! Health checks run once at startup and on reload, never per request.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::SpeechBackend;
use crate::capability::BackendId;

/// Outcome of probing one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum ProbeStatus {
    Healthy,
    Unavailable(String),
}

impl ProbeStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Healthy => None,
            Self::Unavailable(reason) => Some(reason),
        }
    }
}

/// Probe results for a whole capability snapshot
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    statuses: HashMap<BackendId, ProbeStatus>,
    pub probed_at: DateTime<Utc>,
}

impl ProbeReport {
    pub fn new(statuses: HashMap<BackendId, ProbeStatus>) -> Self {
        Self {
            statuses,
            probed_at: Utc::now(),
        }
    }

    /// Unprobed backends count as unavailable
    pub fn status(&self, id: &BackendId) -> ProbeStatus {
        self.statuses
            .get(id)
            .cloned()
            .unwrap_or_else(|| ProbeStatus::Unavailable("not probed".to_string()))
    }

    pub fn is_healthy(&self, id: &BackendId) -> bool {
        self.statuses.get(id).is_some_and(ProbeStatus::is_healthy)
    }

    pub fn healthy_count(&self) -> usize {
        self.statuses.values().filter(|s| s.is_healthy()).count()
    }
}

/// Probe every backend concurrently
pub async fn probe_all(backends: &[Arc<dyn SpeechBackend>]) -> ProbeReport {
    let checks = backends.iter().map(|backend| async move {
        let id = backend.id();
        let status = match backend.probe().await {
            Ok(()) => {
                debug!(backend = %id, "Probe succeeded");
                ProbeStatus::Healthy
            }
            Err(e) => {
                warn!(backend = %id, error = %e, "Backend unavailable");
                ProbeStatus::Unavailable(e.message)
            }
        };
        (id, status)
    });

    ProbeReport::new(join_all(checks).await.into_iter().collect())
}

//! Declarative engine registration
//!
//! Builds the adapters enabled in [`Config`] and asks each one to describe
//! itself. Health is not checked here; the context probes after discovery.

use std::sync::Arc;

use async_trait::async_trait;
use sg_core::{CapabilitySource, Config, RegisteredBackend, SpeechBackend};
use tracing::{debug, info, warn};

use crate::azure::AzureBackend;
use crate::espeak::EspeakBackend;
use crate::gtts::GttsBackend;
use crate::openai::OpenAiBackend;
use crate::say::SayBackend;
use crate::{azure, espeak, gtts, http, openai, say};

struct Entry {
    backend: Arc<dyn SpeechBackend>,
    latency_override: Option<u64>,
}

/// [`CapabilitySource`] over the built-in adapters
pub struct EngineDiscovery {
    entries: Vec<Entry>,
}

impl EngineDiscovery {
    /// Register every enabled engine, offline engines first
    ///
    /// `say` is registered on macOS, or elsewhere only when it has its own
    /// `[engines.say]` section.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let client = http::client()?;
        let mut entries = Vec::new();
        let mut push = |id: &str, backend: Arc<dyn SpeechBackend>| {
            let settings = config.engine(id);
            if settings.enabled {
                entries.push(Entry {
                    backend,
                    latency_override: settings.typical_latency_ms,
                });
            } else {
                debug!(engine = id, "Engine disabled by configuration");
            }
        };

        if cfg!(target_os = "macos") || config.engines.contains_key(say::ID) {
            let binary = config.engine(say::ID).binary;
            push(say::ID, Arc::new(SayBackend::new(binary.unwrap_or_else(|| say::DEFAULT_BINARY.to_string()))));
        }

        let binary = config.engine(espeak::ID).binary;
        push(
            espeak::ID,
            Arc::new(EspeakBackend::new(binary.unwrap_or_else(|| espeak::DEFAULT_BINARY.to_string()))),
        );

        push(gtts::ID, Arc::new(GttsBackend::new(client.clone(), config.engine(gtts::ID).base_url)));

        let settings = config.engine(azure::ID);
        push(
            azure::ID,
            Arc::new(AzureBackend::new(client.clone(), settings.api_key, settings.region, settings.base_url)),
        );

        let settings = config.engine(openai::ID);
        push(openai::ID, Arc::new(OpenAiBackend::new(client, settings.api_key, settings.base_url)));

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CapabilitySource for EngineDiscovery {
    async fn discover(&self) -> sg_core::Result<Vec<RegisteredBackend>> {
        let mut registered = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let id = entry.backend.id();
            match entry.backend.describe().await {
                Ok(mut descriptor) => {
                    if let Some(latency) = entry.latency_override {
                        descriptor = descriptor.with_latency_ms(latency);
                    }
                    debug!(
                        engine = %id,
                        languages = descriptor.languages.len(),
                        voices = descriptor.voices.len(),
                        "Engine described"
                    );
                    registered.push(RegisteredBackend {
                        descriptor,
                        backend: entry.backend.clone(),
                    });
                }
                Err(e) => warn!(engine = %id, error = %e, "Engine could not describe itself; skipping"),
            }
        }
        info!(count = registered.len(), "Discovered speech engines");
        Ok(registered)
    }
}

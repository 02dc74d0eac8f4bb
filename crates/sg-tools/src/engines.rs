//! Engine inspection tools

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sg_core::{BackendId, Constraints, Result, ServiceLimits, SpeechContext, Tool, ToolResult, VoiceInfo};

use crate::output::{to_json, ErrorOutput};

/// Report registered engines, their health and the recommended default
pub struct GetAvailableEnginesTool {
    context: Arc<SpeechContext>,
}

impl GetAvailableEnginesTool {
    pub fn new(context: Arc<SpeechContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Tool for GetAvailableEnginesTool {
    fn name(&self) -> &str {
        "get_available_engines"
    }

    fn description(&self) -> &str {
        "List the available speech engines with offline/online status, health and the recommended engine."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _input: Value) -> Result<ToolResult> {
        match self.context.engine_report().await {
            Ok(report) => Ok(ToolResult::success(to_json(&report))),
            Err(e) => Ok(ToolResult::error(to_json(&ErrorOutput::from(&e)))),
        }
    }
}

/// List voices for one engine or for all of them
pub struct ListVoicesTool {
    context: Arc<SpeechContext>,
}

impl ListVoicesTool {
    pub fn new(context: Arc<SpeechContext>) -> Self {
        Self { context }
    }
}

#[derive(Debug, Deserialize)]
struct ListVoicesInput {
    /// Engine id; omitted or "auto" lists every engine
    #[serde(default)]
    engine: Option<String>,
}

#[derive(Debug, Serialize)]
struct EngineVoices {
    engine: BackendId,
    count: usize,
    voices: Vec<VoiceInfo>,
}

#[async_trait]
impl Tool for ListVoicesTool {
    fn name(&self) -> &str {
        "list_voices"
    }

    fn description(&self) -> &str {
        "List the voices and languages each speech engine provides."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "engine": {
                    "type": "string",
                    "description": "Engine to list (e.g. say, espeak, gtts, azure, openai). Omit to list all."
                }
            }
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let input: ListVoicesInput = serde_json::from_value(input)
            .map_err(|e| sg_core::Error::ToolExecution(format!("Invalid input: {}", e)))?;

        let engines = match Constraints::engine_pin(input.engine.as_deref()) {
            Some(engine) => vec![engine],
            None => self.context.backend_ids().await,
        };

        tracing::debug!(engines = engines.len(), "Listing voices");

        let mut listed = Vec::with_capacity(engines.len());
        for engine in engines {
            match self.context.voices(&engine).await {
                Ok(voices) => listed.push(EngineVoices {
                    engine,
                    count: voices.len(),
                    voices,
                }),
                Err(e) => return Ok(ToolResult::error(to_json(&ErrorOutput::from(&e)))),
            }
        }
        Ok(ToolResult::success(to_json(&listed)))
    }
}

/// Usage limits and pricing per engine
pub struct GetServiceLimitsTool {
    context: Arc<SpeechContext>,
}

impl GetServiceLimitsTool {
    pub fn new(context: Arc<SpeechContext>) -> Self {
        Self { context }
    }
}

#[derive(Debug, Deserialize)]
struct ServiceLimitsInput {
    #[serde(default)]
    service: Option<String>,
}

#[derive(Debug, Serialize)]
struct EngineLimits {
    service: BackendId,
    is_offline: bool,
    /// `null` when the engine publishes no limits
    limits: Option<ServiceLimits>,
}

#[async_trait]
impl Tool for GetServiceLimitsTool {
    fn name(&self) -> &str {
        "get_service_limits"
    }

    fn description(&self) -> &str {
        "Get per-request character limits, free tier, pricing and rate limits of the speech engines."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "service": {
                    "type": "string",
                    "description": "Engine to check (e.g. gtts, azure, openai). Omit to list all."
                }
            }
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let input: ServiceLimitsInput = serde_json::from_value(input)
            .map_err(|e| sg_core::Error::ToolExecution(format!("Invalid input: {}", e)))?;

        let pinned = Constraints::engine_pin(input.service.as_deref());
        let services = match &pinned {
            Some(service) => vec![service.clone()],
            None => self.context.backend_ids().await,
        };

        let mut listed = Vec::with_capacity(services.len());
        for service in services {
            match self.context.descriptor(&service).await {
                Ok(descriptor) => listed.push(EngineLimits {
                    service,
                    is_offline: descriptor.is_offline,
                    limits: descriptor.limits,
                }),
                Err(e) => return Ok(ToolResult::error(to_json(&ErrorOutput::from(&e)))),
            }
        }

        let output = match listed.as_slice() {
            [one] if pinned.is_some() => to_json(one),
            _ => to_json(&json!({ "services": listed })),
        };
        Ok(ToolResult::success(output))
    }
}

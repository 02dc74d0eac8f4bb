//! Speech tool contract
//!
//! A tool takes JSON arguments and answers with JSON text. Two failure
//! channels exist:
//!
//! - a job that ran and failed (unsupported language, every engine down,
//!   ...) is a normal answer: `Ok(ToolResult::error(..))` carrying the
//!   serialized [`JobError`](crate::JobError), so the caller sees the
//!   per-engine failures;
//! - arguments that do not decode, or plumbing that breaks before a job
//!   exists, are `Err(Error::ToolExecution)`.
//!
//! Protocol listeners map the first to an error result and the second to
//! an invalid-params reply.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::Result;
use crate::tool::ToolDefinition;

/// Answer of one tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    /// JSON text
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// A job that ran and failed
    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }
}

/// A named operation callers can invoke with JSON arguments
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable snake_case name, e.g. `synthesize_speech`
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema (`"type": "object"`) of the arguments
    fn input_schema(&self) -> JsonValue;

    /// What listeners advertise for this tool
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }

    async fn execute(&self, input: JsonValue) -> Result<ToolResult>;
}

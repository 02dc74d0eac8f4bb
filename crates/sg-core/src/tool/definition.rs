//! Tool definitions advertised to protocol listeners

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Name, description and JSON schema of one tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: JsonValue) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Schema as a JSON object map (empty when the schema is not an object)
    pub fn schema_object(&self) -> serde_json::Map<String, JsonValue> {
        match &self.input_schema {
            JsonValue::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        }
    }
}

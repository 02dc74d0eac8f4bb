//! MCP server over stdio
//!
//! ToolManagerのツールをMCPのtools/list・tools/callに対応付ける

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
    model::{
        CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult, PaginatedRequestParams,
        ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use sg_core::{Result, ToolManager};

const INSTRUCTIONS: &str = "Text-to-speech and speech-to-text with automatic engine selection. \
Languages may be given as codes or names (en, zh-HK, cantonese, mandarin); \
use get_available_engines to see which engines are healthy.";

/// MCP server exposing a [`ToolManager`]
#[derive(Clone)]
pub struct SpeechServer {
    tools: Arc<ToolManager>,
}

impl SpeechServer {
    pub fn new(tools: Arc<ToolManager>) -> Self {
        Self { tools }
    }

    /// Serve on stdin/stdout until the client disconnects
    pub async fn serve_stdio(self) -> Result<()> {
        info!(tools = self.tools.len(), "Starting MCP server on stdio");
        let service = self
            .serve(rmcp::transport::stdio())
            .await
            .map_err(|e| sg_core::Error::Mcp(format!("Failed to start server: {}", e)))?;
        service
            .waiting()
            .await
            .map_err(|e| sg_core::Error::Mcp(format!("Server stopped abnormally: {}", e)))?;
        info!("MCP client disconnected");
        Ok(())
    }

    /// Tool list in MCP form
    pub fn tool_list(&self) -> Vec<Tool> {
        self.tools
            .definitions()
            .into_iter()
            .map(|def| {
                let schema = Arc::new(def.schema_object());
                Tool::new(def.name, def.description, schema)
            })
            .collect()
    }

    /// Run one tool call
    ///
    /// Unknown tools and malformed arguments are protocol errors; failures
    /// reported by the tool itself come back as an error result.
    pub async fn dispatch(&self, name: &str, arguments: Option<serde_json::Map<String, JsonValue>>) -> std::result::Result<CallToolResult, McpError> {
        if !self.tools.contains(name) {
            return Err(McpError::invalid_params(format!("Unknown tool: {}", name), None));
        }
        let input = JsonValue::Object(arguments.unwrap_or_default());
        debug!(tool = name, "Calling tool");

        match self.tools.execute(name, input).await {
            Ok(result) if result.is_error => {
                warn!(tool = name, "Tool reported an error");
                Ok(CallToolResult::error(vec![Content::text(result.output)]))
            }
            Ok(result) => Ok(CallToolResult::success(vec![Content::text(result.output)])),
            Err(sg_core::Error::ToolExecution(message)) => Err(McpError::invalid_params(message, None)),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }
}

impl ServerHandler for SpeechServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tool_list(),
            next_cursor: None,
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.dispatch(&request.name, request.arguments).await
    }
}

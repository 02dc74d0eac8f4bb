//! sg-mcp: MCP listener for speech-gateway
//!
//! rmcpを使用して、ToolManagerに登録された音声ツールを
//! stdio上のMCPサーバーとして公開します。

pub mod server;

pub use server::SpeechServer;

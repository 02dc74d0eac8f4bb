//! Tool system
//!
//! Tool-call style operations over the speech context. Each tool takes a
//! JSON argument object and returns text, so that any protocol listener
//! (MCP today) can expose them without knowing their semantics.

pub mod definition;
pub mod manager;
pub mod traits;

pub use definition::ToolDefinition;
pub use manager::ToolManager;
pub use traits::{Tool, ToolResult};

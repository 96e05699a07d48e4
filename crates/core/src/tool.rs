//! Shared types for the tool surface (definitions, calls, results). The
//! concrete tool implementations and the registry live in the `tools`
//! crate; this crate only defines the shapes the LLM adapter and the tool
//! executor both need to agree on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool as advertised to the main-layer language model, in the
/// name/description/JSON-schema shape most tool-calling chat APIs expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One tool invocation requested by the model mid-generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

/// The result handed back to the model to continue generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub output: Value,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, output: Value) -> Self {
        Self {
            call_id: call_id.into(),
            output,
        }
    }

    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: serde_json::json!({ "error": message.into() }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("tool {tool} timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },
    #[error("tool {tool} failed: {reason}")]
    Execution { tool: String, reason: String },
}

//! Tool registry: name-keyed lookup plus per-tool timeout enforcement.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use voice_gateway_core::{ToolDefinition, ToolError};

/// One callable tool. `timeout` lets memory-backed tools (fast, local)
/// differ from domain callouts (a network hop) without a shared constant.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn definition(&self) -> ToolDefinition;
    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value, ToolError>;
    fn list_definitions(&self) -> Vec<ToolDefinition>;
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        metrics::counter!("voice_gateway_memory_ops_total", "op" => name.to_string()).increment(1);

        match tokio::time::timeout(tool.timeout(), tool.call(arguments)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ToolError::Timeout {
                tool: name.to_string(),
                timeout_ms: tool.timeout().as_millis() as u64,
            }),
        }
    }

    fn list_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "echoes its input".to_string(),
                input_schema: serde_json::json!({"type": "object"}),
            }
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(20)
        }

        async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
            Ok(arguments)
        }
    }

    struct HangingTool;

    #[async_trait]
    impl Tool for HangingTool {
        fn name(&self) -> &str {
            "hang"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "hang".to_string(),
                description: "never returns".to_string(),
                input_schema: serde_json::json!({"type": "object"}),
            }
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(10)
        }

        async fn call(&self, _arguments: Value) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nope", Value::Null).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn registered_tool_executes() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let result = registry.execute("echo", serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(result, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(HangingTool));
        let err = registry.execute("hang", Value::Null).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }
}

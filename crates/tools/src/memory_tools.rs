//! The memory-engine-backed tools from spec §4.7: `search_memory`,
//! `remember`, `add_observation`, `create_relation`, `get_memory_summary`,
//! `get_recent_conversation`.
//!
//! Every argument object carries `user_id` explicitly rather than relying
//! on ambient session state, per §9 ("replace ambient per-user singletons
//! with an explicit `MemoryHandle` passed into each tool call").

use crate::registry::Tool;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use voice_gateway_core::{ToolDefinition, ToolError};
use voice_gateway_memory::{EntityType, MemoryEngine, MemorySummaryView};

fn invalid(tool: &str, reason: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: reason.into(),
    }
}

fn execution_failed(tool: &str, err: impl std::fmt::Display) -> ToolError {
    ToolError::Execution {
        tool: tool.to_string(),
        reason: err.to_string(),
    }
}

pub struct SearchMemoryTool {
    memory: Arc<MemoryEngine>,
}

impl SearchMemoryTool {
    pub fn new(memory: Arc<MemoryEngine>) -> Self {
        Self { memory }
    }
}

#[derive(Deserialize)]
struct SearchMemoryArgs {
    user_id: String,
    query: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    10
}

#[async_trait]
impl Tool for SearchMemoryTool {
    fn name(&self) -> &str {
        "search_memory"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Search the user's knowledge graph by name or observation substring".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "default": 10}
                },
                "required": ["user_id", "query"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: SearchMemoryArgs =
            serde_json::from_value(arguments).map_err(|e| invalid(self.name(), e.to_string()))?;
        let entities = self
            .memory
            .search_memory(&args.user_id, &args.query, args.limit)
            .await
            .map_err(|e| execution_failed(self.name(), e))?;
        Ok(serde_json::json!({
            "entities": entities.into_iter().map(|e| serde_json::json!({
                "name": e.name,
                "type": e.entity_type.as_str(),
                "observations": e.observations,
            })).collect::<Vec<_>>()
        }))
    }
}

pub struct RememberTool {
    memory: Arc<MemoryEngine>,
}

impl RememberTool {
    pub fn new(memory: Arc<MemoryEngine>) -> Self {
        Self { memory }
    }
}

#[derive(Deserialize)]
struct RememberArgs {
    user_id: String,
    name: String,
    #[serde(rename = "type")]
    entity_type: String,
    observations: Vec<String>,
    #[serde(default)]
    is_user_edit: bool,
}

#[async_trait]
impl Tool for RememberTool {
    fn name(&self) -> &str {
        "remember"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Create or upsert an entity in the user's knowledge graph".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "name": {"type": "string"},
                    "type": {
                        "type": "string",
                        "enum": ["person", "organization", "fleet", "ship", "location", "concept", "event", "preference"]
                    },
                    "observations": {"type": "array", "items": {"type": "string"}},
                    "is_user_edit": {"type": "boolean", "default": false}
                },
                "required": ["user_id", "name", "type", "observations"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: RememberArgs =
            serde_json::from_value(arguments).map_err(|e| invalid(self.name(), e.to_string()))?;
        let entity_type = EntityType::parse(&args.entity_type)
            .ok_or_else(|| invalid(self.name(), format!("unknown entity type: {}", args.entity_type)))?;
        let entity = self
            .memory
            .remember(&args.user_id, &args.name, entity_type, args.observations, args.is_user_edit)
            .await
            .map_err(|e| execution_failed(self.name(), e))?;
        Ok(serde_json::json!({ "name": entity.name, "observations": entity.observations }))
    }
}

pub struct AddObservationTool {
    memory: Arc<MemoryEngine>,
}

impl AddObservationTool {
    pub fn new(memory: Arc<MemoryEngine>) -> Self {
        Self { memory }
    }
}

#[derive(Deserialize)]
struct AddObservationArgs {
    user_id: String,
    entity_name: String,
    facts: Vec<String>,
    #[serde(default)]
    is_user_edit: bool,
}

#[async_trait]
impl Tool for AddObservationTool {
    fn name(&self) -> &str {
        "add_observation"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Append facts to an existing entity; fails silently if it doesn't exist".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "entity_name": {"type": "string"},
                    "facts": {"type": "array", "items": {"type": "string"}},
                    "is_user_edit": {"type": "boolean", "default": false}
                },
                "required": ["user_id", "entity_name", "facts"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: AddObservationArgs =
            serde_json::from_value(arguments).map_err(|e| invalid(self.name(), e.to_string()))?;
        let added = self
            .memory
            .add_observation(&args.user_id, &args.entity_name, args.facts, args.is_user_edit)
            .await
            .map_err(|e| execution_failed(self.name(), e))?;
        Ok(serde_json::json!({ "added": added }))
    }
}

pub struct CreateRelationTool {
    memory: Arc<MemoryEngine>,
}

impl CreateRelationTool {
    pub fn new(memory: Arc<MemoryEngine>) -> Self {
        Self { memory }
    }
}

#[derive(Deserialize)]
struct CreateRelationArgs {
    user_id: String,
    from: String,
    to: String,
    #[serde(rename = "type")]
    relation_type: String,
}

#[async_trait]
impl Tool for CreateRelationTool {
    fn name(&self) -> &str {
        "create_relation"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Create a directed relation between two existing entities".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "from": {"type": "string"},
                    "to": {"type": "string"},
                    "type": {"type": "string"}
                },
                "required": ["user_id", "from", "to", "type"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: CreateRelationArgs =
            serde_json::from_value(arguments).map_err(|e| invalid(self.name(), e.to_string()))?;
        let created = self
            .memory
            .create_relation(&args.user_id, &args.from, &args.to, &args.relation_type)
            .await
            .map_err(|e| execution_failed(self.name(), e))?;
        Ok(serde_json::json!({ "created": created.is_some() }))
    }
}

pub struct GetMemorySummaryTool {
    memory: Arc<MemoryEngine>,
}

impl GetMemorySummaryTool {
    pub fn new(memory: Arc<MemoryEngine>) -> Self {
        Self { memory }
    }
}

#[derive(Deserialize)]
struct GetMemorySummaryArgs {
    user_id: String,
}

#[async_trait]
impl Tool for GetMemorySummaryTool {
    fn name(&self) -> &str {
        "get_memory_summary"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Return the fresh summary, or a quick entity listing if none is fresh".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"user_id": {"type": "string"}},
                "required": ["user_id"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: GetMemorySummaryArgs =
            serde_json::from_value(arguments).map_err(|e| invalid(self.name(), e.to_string()))?;
        let view = self
            .memory
            .get_memory_summary(&args.user_id, 10)
            .await
            .map_err(|e| execution_failed(self.name(), e))?;
        Ok(match view {
            MemorySummaryView::Fresh(summary) => serde_json::json!({
                "kind": "summary",
                "text": summary.prose_text,
            }),
            MemorySummaryView::QuickListing(entities) => serde_json::json!({
                "kind": "quick_listing",
                "entities": entities.into_iter().map(|e| e.name).collect::<Vec<_>>(),
            }),
        })
    }
}

pub struct GetRecentConversationTool {
    memory: Arc<MemoryEngine>,
}

impl GetRecentConversationTool {
    pub fn new(memory: Arc<MemoryEngine>) -> Self {
        Self { memory }
    }
}

#[derive(Deserialize)]
struct GetRecentConversationArgs {
    user_id: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

#[async_trait]
impl Tool for GetRecentConversationTool {
    fn name(&self) -> &str {
        "get_recent_conversation"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Return the last N conversation turns by recency".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "limit": {"type": "integer", "default": 10}
                },
                "required": ["user_id"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: GetRecentConversationArgs =
            serde_json::from_value(arguments).map_err(|e| invalid(self.name(), e.to_string()))?;
        let turns = self
            .memory
            .get_recent_conversation(&args.user_id, args.limit)
            .await
            .map_err(|e| execution_failed(self.name(), e))?;
        Ok(serde_json::json!({
            "turns": turns.into_iter().map(|t| serde_json::json!({
                "role": t.role,
                "content": t.content,
            })).collect::<Vec<_>>()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    async fn memory() -> (Arc<MemoryEngine>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let engine = MemoryEngine::open(dir.path().to_str().unwrap(), StdDuration::from_secs(48 * 3600)).unwrap();
        (Arc::new(engine), dir)
    }

    #[tokio::test]
    async fn remember_then_search_tool_round_trip() {
        let (memory, _dir) = memory().await;
        let remember = RememberTool::new(memory.clone());
        remember
            .call(serde_json::json!({
                "user_id": "alice",
                "name": "The Armada",
                "type": "fleet",
                "observations": ["has 4 ships"]
            }))
            .await
            .unwrap();

        let search = SearchMemoryTool::new(memory);
        let result = search
            .call(serde_json::json!({"user_id": "alice", "query": "armada", "limit": 10}))
            .await
            .unwrap();
        assert_eq!(result["entities"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn add_observation_to_missing_entity_reports_zero_added() {
        let (memory, _dir) = memory().await;
        let tool = AddObservationTool::new(memory);
        let result = tool
            .call(serde_json::json!({"user_id": "alice", "entity_name": "Ghost", "facts": ["x"]}))
            .await
            .unwrap();
        assert_eq!(result["added"], 0);
    }

    #[tokio::test]
    async fn create_relation_tool_reports_failure_on_missing_entities() {
        let (memory, _dir) = memory().await;
        let tool = CreateRelationTool::new(memory);
        let result = tool
            .call(serde_json::json!({"user_id": "alice", "from": "A", "to": "B", "type": "commands"}))
            .await
            .unwrap();
        assert_eq!(result["created"], false);
    }
}

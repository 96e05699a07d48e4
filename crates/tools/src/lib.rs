//! The tool surface the main-layer language model can call mid-generation:
//! the memory tools (§4.7) plus opaque domain callouts.

pub mod domain;
pub mod memory_tools;
pub mod registry;

pub use domain::DomainCalloutTool;
pub use memory_tools::{
    AddObservationTool, CreateRelationTool, GetMemorySummaryTool, GetRecentConversationTool,
    RememberTool, SearchMemoryTool,
};
pub use registry::{Tool, ToolExecutor, ToolRegistry};

use std::sync::Arc;
use voice_gateway_memory::MemoryEngine;

/// Builds the registry with the fixed memory-tool set wired to `memory`.
/// Domain callouts, if any are configured, are registered separately by
/// the caller since their endpoints come from deployment config rather
/// than from this crate.
pub fn build_memory_tool_registry(memory: Arc<MemoryEngine>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SearchMemoryTool::new(memory.clone())));
    registry.register(Arc::new(RememberTool::new(memory.clone())));
    registry.register(Arc::new(AddObservationTool::new(memory.clone())));
    registry.register(Arc::new(CreateRelationTool::new(memory.clone())));
    registry.register(Arc::new(GetMemorySummaryTool::new(memory.clone())));
    registry.register(Arc::new(GetRecentConversationTool::new(memory)));
    registry
}

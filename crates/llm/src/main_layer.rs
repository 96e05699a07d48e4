//! The authoritative streaming generator with tool use (spec §4.7/§9: "a
//! stateless function over `(session_id, user_text, tools)`"). Bounded to a
//! fixed number of tool-call rounds so a model that keeps calling tools
//! can't wedge a turn open indefinitely.

use async_stream::try_stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use voice_gateway_core::{GenerationEvent, GenerationRequest, LanguageModel, LlmError, ToolResult};
use voice_gateway_tools::ToolExecutor;

const MAX_TOOL_ITERATIONS: usize = 4;

pub struct MainLayer {
    model: Arc<dyn LanguageModel>,
    tools: Arc<dyn ToolExecutor>,
}

impl MainLayer {
    pub fn new(model: Arc<dyn LanguageModel>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self { model, tools }
    }

    /// Drives the model to completion, executing any tool calls it makes
    /// along the way, and yields text as it's produced. Text from earlier
    /// rounds (before a tool call) and later rounds (after tool results are
    /// folded back in) arrive on the same stream, in order.
    pub fn generate_turn(&self, request: GenerationRequest) -> BoxStream<'static, Result<String, LlmError>> {
        let model = self.model.clone();
        let tools = self.tools.clone();

        Box::pin(try_stream! {
            let mut stream = model.generate(request.clone()).await?;
            let mut iteration = 0usize;

            loop {
                let mut pending_calls = Vec::new();
                while let Some(event) = stream.next().await {
                    match event? {
                        GenerationEvent::Text(text) => yield text,
                        GenerationEvent::ToolCalls(calls) => pending_calls.extend(calls),
                    }
                }

                if pending_calls.is_empty() || iteration >= MAX_TOOL_ITERATIONS {
                    break;
                }
                iteration += 1;

                let mut results = Vec::with_capacity(pending_calls.len());
                for call in pending_calls {
                    let output = match tools.execute(&call.name, call.arguments.clone()).await {
                        Ok(output) => output,
                        Err(err) => {
                            tracing::warn!(tool = %call.name, error = %err, "tool call failed, returning error payload to model");
                            serde_json::json!({ "error": err.to_string() })
                        }
                    };
                    results.push(ToolResult::ok(call.call_id, output));
                }

                stream = model.continue_with_tool_results(request.clone(), results).await?;
            }
        })
    }
}

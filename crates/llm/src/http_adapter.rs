//! `LanguageModel` implementation over a plain HTTP NDJSON streaming
//! endpoint. The fast layer and the main layer both use this adapter,
//! pointed at different endpoints (`LLM_FAST_ENDPOINT` / `LLM_MAIN_ENDPOINT`);
//! the protocol between the gateway and the model service is the same
//! either way.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use voice_gateway_core::{
    GenerationEvent, GenerationRequest, LanguageModel, LlmError, ToolCallRequest, ToolResult,
};

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    system_prompt: &'a str,
    messages: Vec<WireMessage>,
    tools: &'a [voice_gateway_core::ToolDefinition],
    tool_results: Vec<WireToolResult>,
}

#[derive(Debug, Serialize)]
struct WireToolResult {
    call_id: String,
    output: serde_json::Value,
}

/// One line of the NDJSON response stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Text { text: String },
    ToolCalls { calls: Vec<ToolCallRequest> },
    Done,
}

pub struct HttpLanguageModel {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLanguageModel {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder with a timeout never fails");
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    fn build_request(request: &GenerationRequest, tool_results: Vec<WireToolResult>) -> WireRequest<'_> {
        WireRequest {
            system_prompt: &request.system_prompt,
            messages: request
                .history
                .iter()
                .map(|turn| WireMessage {
                    role: match turn.role {
                        voice_gateway_core::TurnRole::User => "user",
                        voice_gateway_core::TurnRole::Assistant => "assistant",
                    },
                    content: turn.content.clone(),
                })
                .collect(),
            tools: &request.tools,
            tool_results,
        }
    }

    async fn stream(
        &self,
        wire_request: WireRequest<'_>,
    ) -> Result<BoxStream<'static, Result<GenerationEvent, LlmError>>, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&wire_request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        if response.status().is_server_error() {
            return Err(LlmError::Transient(format!("upstream returned {}", response.status())));
        }
        if !response.status().is_success() {
            return Err(LlmError::Fatal(format!("upstream returned {}", response.status())));
        }

        Ok(Box::pin(try_stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(classify_reqwest_error)?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    if line.is_empty() {
                        continue;
                    }
                    let event: WireEvent = serde_json::from_str(&line)
                        .map_err(|e| LlmError::MalformedToolCall(e.to_string()))?;
                    match event {
                        WireEvent::Text { text } => yield GenerationEvent::Text(text),
                        WireEvent::ToolCalls { calls } => yield GenerationEvent::ToolCalls(calls),
                        WireEvent::Done => break,
                    }
                }
            }
        }))
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else if err.is_connect() {
        LlmError::Transient(err.to_string())
    } else {
        LlmError::Fatal(err.to_string())
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<BoxStream<'static, Result<GenerationEvent, LlmError>>, LlmError> {
        let wire_request = Self::build_request(&request, vec![]);
        self.stream(wire_request).await
    }

    async fn continue_with_tool_results(
        &self,
        request: GenerationRequest,
        results: Vec<ToolResult>,
    ) -> Result<BoxStream<'static, Result<GenerationEvent, LlmError>>, LlmError> {
        let wire_results = results
            .into_iter()
            .map(|r| WireToolResult {
                call_id: r.call_id,
                output: r.output,
            })
            .collect();
        let wire_request = Self::build_request(&request, wire_results);
        self.stream(wire_request).await
    }
}

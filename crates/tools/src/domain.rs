//! Domain callouts: opaque outbound adapters (wallet balance, fleet
//! status, ...) that return human-readable text, per spec §4.7. The
//! gateway treats these as a black box over HTTP; it doesn't know or care
//! what's behind the endpoint.

use crate::registry::Tool;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use voice_gateway_core::{ToolDefinition, ToolError};

/// A single domain callout backed by a POST to a fixed endpoint. The
/// response body is treated as plain human-readable text to hand back to
/// the model, not structured data the gateway needs to parse.
pub struct DomainCalloutTool {
    name: String,
    description: String,
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl DomainCalloutTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(3),
        }
    }
}

#[async_trait]
impl Tool for DomainCalloutTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"user_id": {"type": "string"}},
                "required": ["user_id"],
                "additionalProperties": true
            }),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&arguments)
            .send()
            .await
            .map_err(|e| ToolError::Execution {
                tool: self.name.clone(),
                reason: e.to_string(),
            })?;

        let text = response.text().await.map_err(|e| ToolError::Execution {
            tool: self.name.clone(),
            reason: e.to_string(),
        })?;

        Ok(serde_json::json!({ "text": text }))
    }
}

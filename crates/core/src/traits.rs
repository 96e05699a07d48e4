//! Adapter contracts for the external speech-to-text, text-to-speech, and
//! language model backends. These are black boxes per the spec: this crate
//! only pins down the shape the rest of the gateway programs against, not
//! any particular vendor.

use crate::audio::AudioFrame;
use crate::conversation::Turn;
use crate::tool::{ToolCallRequest, ToolDefinition, ToolResult};
use async_trait::async_trait;
use futures::stream::BoxStream;

#[derive(Debug, thiserror::Error)]
pub enum SttError {
    #[error("speech-to-text upstream timed out")]
    Timeout,
    #[error("speech-to-text upstream transient failure: {0}")]
    Transient(String),
    #[error("speech-to-text upstream fatal failure: {0}")]
    Fatal(String),
}

/// One increment of a streaming transcription. `is_final` marks the point
/// at which the text will not be revised further for this utterance.
#[derive(Debug, Clone)]
pub struct TranscriptChunk {
    pub text: String,
    pub is_final: bool,
}

/// Converts a stream of inbound audio frames into a stream of transcript
/// increments. Implementations own their own reconnection and backoff;
/// callers only see `SttError::Transient` (retry upstream) versus
/// `SttError::Fatal` (give up, surface to the client).
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(
        &self,
        audio: BoxStream<'static, AudioFrame>,
    ) -> Result<BoxStream<'static, Result<TranscriptChunk, SttError>>, SttError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    #[error("text-to-speech upstream timed out")]
    Timeout,
    #[error("text-to-speech upstream transient failure: {0}")]
    Transient(String),
    #[error("text-to-speech upstream fatal failure: {0}")]
    Fatal(String),
}

/// Synthesizes a chunk of text into a stream of audio frames. `exaggeration`
/// and `speech_rate` are passed through from the voice style / SYNTHESIZE
/// payload; implementations may ignore parameters they don't support.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        exaggeration: f32,
        speech_rate: f32,
    ) -> Result<BoxStream<'static, Result<AudioFrame, TtsError>>, TtsError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("language model upstream timed out")]
    Timeout,
    #[error("language model upstream transient failure: {0}")]
    Transient(String),
    #[error("language model upstream fatal failure: {0}")]
    Fatal(String),
    #[error("language model returned a malformed tool call: {0}")]
    MalformedToolCall(String),
}

/// One increment of a streaming model turn: either more text, or a request
/// to invoke one or more tools before the model can continue.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
}

/// A request to generate the next assistant turn, given the recent
/// conversation and a system prompt already assembled by the caller.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub history: Vec<Turn>,
    pub tools: Vec<ToolDefinition>,
}

/// Streaming, tool-calling language model adapter. Implementations cover
/// both the fast layer (small model, short prompt, no tools) and the main
/// layer (full history, tool loop) behind the same trait; the session
/// orchestrator decides which instance to drive for which purpose.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<BoxStream<'static, Result<GenerationEvent, LlmError>>, LlmError>;

    /// Continues a turn after tool results have been computed. Default
    /// implementations that don't support multi-step tool loops can treat
    /// this identically to `generate` with the results folded into history.
    async fn continue_with_tool_results(
        &self,
        request: GenerationRequest,
        results: Vec<ToolResult>,
    ) -> Result<BoxStream<'static, Result<GenerationEvent, LlmError>>, LlmError>;
}

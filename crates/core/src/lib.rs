//! Core types and traits for the voice gateway.
//!
//! This crate has no business logic of its own. It defines the wire
//! protocol, the audio frame representation, the conversation/turn types,
//! the pluggable backend traits (STT, TTS, LLM, tools), and the shared
//! error taxonomy that every other crate in the workspace builds on.

pub mod audio;
pub mod conversation;
pub mod error;
pub mod tool;
pub mod traits;
pub mod voice_style;
pub mod wire;

pub use audio::{AudioFrame, CaptureBuffer, CaptureOverflow, Channels, SampleRateHz};
pub use conversation::{Turn, TurnRole};
pub use error::{ErrorCode, GatewayError, Result};
pub use tool::{ToolCallRequest, ToolDefinition, ToolError, ToolResult};
pub use traits::{
    GenerationEvent, GenerationRequest, LanguageModel, LlmError, SpeechToText, SttError,
    TextToSpeech, TranscriptChunk, TtsError,
};
pub use voice_style::{FeedbackLevel, Prosody, VoiceStyle, VoiceStyleId};
pub use wire::{CodecError, FrameFlags, MessageType, WireFrame};

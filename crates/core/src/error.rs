//! Shared error taxonomy.
//!
//! Every crate defines its own `thiserror` error enum at its boundary
//! (`CodecError`, `MemoryError`, `ToolError`, `SttError`, `TtsError`,
//! `LlmError`, `SessionError`, ...); this module defines the top-level
//! `GatewayError` the orchestrator converts all of them into, since that's
//! the one type that needs a stable `{code, message}` projection for the
//! wire `ERROR` frame.

use crate::wire::CodecError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// The error kinds from spec §7, each mapped to a wire error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Protocol,
    InputTooLong,
    InputInvalidRate,
    Upstream,
    UpstreamFatal,
    Internal,
    SlowClient,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Protocol => "PROTOCOL",
            ErrorCode::InputTooLong => "INPUT_TOO_LONG",
            ErrorCode::InputInvalidRate => "INPUT_INVALID_RATE",
            ErrorCode::Upstream => "UPSTREAM",
            ErrorCode::UpstreamFatal => "UPSTREAM_FATAL",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::SlowClient => "SLOW_CLIENT",
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("capture buffer exceeded max duration")]
    InputTooLong,

    #[error("declared sample rate out of range: {0}")]
    InputInvalidRate(u32),

    #[error("upstream transient failure: {0}")]
    Upstream(String),

    #[error("upstream fatal failure: {0}")]
    UpstreamFatal(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("outbound queue stalled, turn aborted")]
    SlowClient,
}

impl GatewayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::Protocol(_) => ErrorCode::Protocol,
            GatewayError::InputTooLong => ErrorCode::InputTooLong,
            GatewayError::InputInvalidRate(_) => ErrorCode::InputInvalidRate,
            GatewayError::Upstream(_) => ErrorCode::Upstream,
            GatewayError::UpstreamFatal(_) => ErrorCode::UpstreamFatal,
            GatewayError::Internal(_) => ErrorCode::Internal,
            GatewayError::SlowClient => ErrorCode::SlowClient,
        }
    }

    /// Redacted message safe to put on the wire. Internal errors are never
    /// shown verbatim to the client (they're logged instead).
    pub fn wire_message(&self) -> String {
        match self {
            GatewayError::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<CodecError> for GatewayError {
    fn from(err: CodecError) -> Self {
        GatewayError::Protocol(err.to_string())
    }
}

//! Binary wire protocol: a 2-byte header (`[message_type, flags]`) followed
//! by a type-dependent payload. See spec table; this module is the single
//! source of truth both the server's binary reader/writer and its JSON
//! fallback project onto.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Message type byte. `TryFrom<u8>` rejects anything outside the table,
/// which the orchestrator turns into `ERROR{code: PROTOCOL}` + close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(clippy::upper_case_acronyms)]
pub enum MessageType {
    AudioStart = 0x01,
    AudioChunk = 0x02,
    AudioEnd = 0x03,
    Transcription = 0x04,
    LlmChunk = 0x05,
    TtsAudio = 0x06,
    Error = 0x07,
    Ready = 0x08,
    Done = 0x09,
    Synthesize = 0x0A,
    Ping = 0x0B,
    Pong = 0x0C,
}

impl MessageType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use MessageType::*;
        Ok(match value {
            0x01 => AudioStart,
            0x02 => AudioChunk,
            0x03 => AudioEnd,
            0x04 => Transcription,
            0x05 => LlmChunk,
            0x06 => TtsAudio,
            0x07 => Error,
            0x08 => Ready,
            0x09 => Done,
            0x0A => Synthesize,
            0x0B => Ping,
            0x0C => Pong,
            other => return Err(CodecError::UnknownType(other)),
        })
    }
}

/// The two flag bits defined by the protocol. Two bits don't justify
/// pulling in the `bitflags` crate; a thin newtype over `u8` is enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(pub u8);

impl FrameFlags {
    pub const NONE: FrameFlags = FrameFlags(0);
    pub const IS_FINAL: FrameFlags = FrameFlags(0x01);
    pub const NEEDS_FOLLOWUP: FrameFlags = FrameFlags(0x02);

    pub fn is_final(self) -> bool {
        self.0 & Self::IS_FINAL.0 != 0
    }

    pub fn needs_followup(self) -> bool {
        self.0 & Self::NEEDS_FOLLOWUP.0 != 0
    }

    pub fn with(self, other: FrameFlags) -> FrameFlags {
        FrameFlags(self.0 | other.0)
    }
}

/// A decoded (but not payload-parsed) wire frame: header plus raw bytes.
/// Zero-copy over the input slice — the payload is a `Bytes` slice view,
/// never reallocated on decode.
#[derive(Debug, Clone)]
pub struct WireFrame {
    pub message_type: MessageType,
    pub flags: FrameFlags,
    pub payload: Bytes,
}

impl WireFrame {
    pub fn new(message_type: MessageType, flags: FrameFlags, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            flags,
            payload: payload.into(),
        }
    }

    pub fn control(message_type: MessageType) -> Self {
        Self::new(message_type, FrameFlags::NONE, Bytes::new())
    }

    /// Parse the 2-byte header + payload out of a received binary message.
    pub fn decode(mut bytes: Bytes) -> Result<Self, CodecError> {
        if bytes.len() < 2 {
            return Err(CodecError::Truncated);
        }
        let message_type = MessageType::try_from(bytes.get_u8())?;
        let flags = FrameFlags(bytes.get_u8());
        Ok(Self {
            message_type,
            flags,
            payload: bytes,
        })
    }

    /// Serialize header + payload into one contiguous buffer ready to send
    /// as a single WebSocket binary message.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.payload.len());
        buf.put_u8(self.message_type.as_u8());
        buf.put_u8(self.flags.0);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame shorter than the 2-byte header")]
    Truncated,
    #[error("unknown message type byte: 0x{0:02X}")]
    UnknownType(u8),
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed base64 payload: {0}")]
    Base64(String),
}

/// Payload of `AUDIO_START` (both directions use the same shape for the
/// client->server declaration).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStartPayload {
    #[serde(rename = "sampleRate")]
    pub sample_rate: u32,
    pub channels: u8,
}

/// Payload of `SYNTHESIZE` (client asking the gateway to speak arbitrary
/// text outside of a model turn, e.g. reading back a confirmation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizePayload {
    pub text: String,
    #[serde(default = "default_exaggeration")]
    pub exaggeration: f32,
    #[serde(rename = "speechRate", default = "default_speech_rate")]
    pub speech_rate: f32,
}

fn default_exaggeration() -> f32 {
    0.5
}

fn default_speech_rate() -> f32 {
    1.0
}

/// Payload of `ERROR`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

/// The JSON fallback wire format (`binary=false`, the default). Same
/// message set as the binary table, tagged by `"type"`; audio payloads are
/// base64-encoded strings instead of raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    AudioStart {
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
        channels: u8,
    },
    AudioChunk {
        data: String,
    },
    AudioEnd,
    Transcription {
        text: String,
        #[serde(rename = "isFinal")]
        is_final: bool,
    },
    LlmChunk {
        text: String,
    },
    TtsAudio {
        data: String,
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
    },
    Error {
        code: String,
        message: String,
    },
    Ready,
    Done,
    Synthesize {
        text: String,
        #[serde(default = "default_exaggeration")]
        exaggeration: f32,
        #[serde(rename = "speechRate", default = "default_speech_rate")]
        speech_rate: f32,
    },
    Ping,
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let frame = WireFrame::new(
            MessageType::Transcription,
            FrameFlags::IS_FINAL,
            Bytes::from_static(b"check my fleet"),
        );
        let encoded = frame.encode();
        let decoded = WireFrame::decode(encoded).unwrap();
        assert_eq!(decoded.message_type, MessageType::Transcription);
        assert!(decoded.flags.is_final());
        assert_eq!(&decoded.payload[..], b"check my fleet");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let bytes = Bytes::from_static(&[0xFF, 0x00]);
        let err = WireFrame::decode(bytes).unwrap_err();
        assert!(matches!(err, CodecError::UnknownType(0xFF)));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let bytes = Bytes::from_static(&[0x01]);
        assert!(matches!(WireFrame::decode(bytes), Err(CodecError::Truncated)));
    }

    #[test]
    fn flags_combine() {
        let flags = FrameFlags::IS_FINAL.with(FrameFlags::NEEDS_FOLLOWUP);
        assert!(flags.is_final());
        assert!(flags.needs_followup());
    }

    #[test]
    fn json_fallback_tags_audio_chunk() {
        let msg = JsonMessage::AudioChunk {
            data: "YWJj".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"audio_chunk\""));
    }
}

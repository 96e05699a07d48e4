//! Audio/text pipeline: STT and TTS HTTP adapters, and the text chunker
//! that splits streamed model text into TTS-sized segments.

pub mod chunker;
pub mod stt;
pub mod tts;

pub use chunker::{ChunkMode, ChunkerConfig, TextChunker};
pub use stt::HttpSpeechToText;
pub use tts::HttpTextToSpeech;

//! Per-connection session orchestration: the state machine, the bounded
//! outbound writer, and the per-turn pipeline that ties STT, the fast/main
//! language model layers, the text chunker, and TTS together.

pub mod outbound;
pub mod orchestrator;
pub mod state;
pub mod turn;

pub use orchestrator::{Session, SessionConfig};
pub use outbound::{run_outbound_writer, OutboundError, OutboundQueue, OutboundSink};
pub use state::{next_state, SessionEvent, SessionState};
pub use turn::{run_turn, TurnDeps, TurnSignal};

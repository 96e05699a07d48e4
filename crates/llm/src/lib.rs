//! Fast-layer and main-layer language model orchestration.
//!
//! The fast layer (`fast_layer`) is a rule-based prefilter with a
//! small-model fallback, targeting sub-200ms acknowledgments. The main
//! layer (`main_layer`) is the authoritative streaming generator with a
//! bounded tool-call loop. Both drive the same `LanguageModel` trait from
//! `voice-gateway-core`, typically pointed at different endpoints via
//! `http_adapter::HttpLanguageModel`.

pub mod fast_layer;
pub mod http_adapter;
pub mod main_layer;
pub mod prompt;

pub use fast_layer::{FastLayer, PatternRule};
pub use http_adapter::HttpLanguageModel;
pub use main_layer::MainLayer;
pub use prompt::{acknowledgment_priming_line, build_system_prompt};

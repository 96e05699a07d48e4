//! Application state: the backends a connection's `TurnDeps` are assembled
//! from, built once at startup from `Settings` and shared across every
//! WebSocket connection behind `Arc`s.

use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use voice_gateway_config::Settings;
use voice_gateway_llm::{FastLayer, HttpLanguageModel, MainLayer};
use voice_gateway_memory::MemoryEngine;
use voice_gateway_pipeline::{HttpSpeechToText, HttpTextToSpeech};
use voice_gateway_session::TurnDeps;
use voice_gateway_tools::{build_memory_tool_registry, ToolExecutor};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub turn_deps: Arc<TurnDeps>,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// Builds every backend from `settings`: HTTP adapters for STT/TTS and
    /// the fast/main language models, the on-disk memory engine, and the
    /// memory-tool registry. Domain callouts, if configured, are registered
    /// into the returned registry by the caller before it's wrapped in
    /// `TurnDeps` — there's no fixed set of those, unlike the memory tools.
    pub fn new(settings: Settings, metrics_handle: PrometheusHandle) -> Result<Self, voice_gateway_memory::MemoryError> {
        let upstream = &settings.upstream;
        let fast_timeout = Duration::from_millis(upstream.fast_layer_timeout_ms);

        let stt = Arc::new(HttpSpeechToText::new(upstream.stt_endpoint.clone(), Duration::from_secs(10)));
        let tts = Arc::new(HttpTextToSpeech::new(upstream.tts_endpoint.clone(), Duration::from_secs(15)));

        let fast_model = Arc::new(HttpLanguageModel::new(upstream.llm_fast_endpoint.clone(), fast_timeout));
        let main_model = Arc::new(HttpLanguageModel::new(upstream.llm_main_endpoint.clone(), Duration::from_secs(30)));

        let memory = Arc::new(MemoryEngine::open(
            &settings.memory.db_path,
            Duration::from_secs(settings.memory.conversation_ttl_hours * 3600),
        )?);

        let tools: Arc<dyn ToolExecutor> = Arc::new(build_memory_tool_registry(memory.clone()));
        let fast_layer = Arc::new(FastLayer::new(Some(fast_model), upstream.fast_layer_timeout_ms));
        let main_layer = Arc::new(MainLayer::new(main_model, tools.clone()));

        let turn_deps = Arc::new(TurnDeps {
            stt,
            tts,
            fast_layer,
            main_layer,
            memory,
            tools,
        });

        Ok(Self {
            settings: Arc::new(settings),
            turn_deps,
            metrics_handle,
        })
    }
}

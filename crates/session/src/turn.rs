//! The per-turn pipeline (spec §4, §5, §8 P2): STT, the fast/main dual
//! pipeline with its enqueue barrier, and the text chunker + TTS fan-out
//! that feeds the outbound queue.

use crate::outbound::OutboundQueue;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use voice_gateway_core::wire::{ErrorPayload, FrameFlags, JsonMessage, MessageType, WireFrame};
use voice_gateway_core::{
    AudioFrame, CaptureBuffer, Channels, GatewayError, GenerationRequest, SpeechToText, SttError,
    TextToSpeech, Turn, TurnRole, VoiceStyle,
};
use voice_gateway_llm::{acknowledgment_priming_line, build_system_prompt, FastLayer, MainLayer};
use voice_gateway_memory::MemoryEngine;
use voice_gateway_pipeline::{ChunkMode, ChunkerConfig, TextChunker};
use voice_gateway_tools::ToolExecutor;

const STT_TIMEOUT: Duration = Duration::from_secs(8);
const MAIN_FIRST_TOKEN_TIMEOUT: Duration = Duration::from_secs(15);
const MAIN_TOTAL_TURN_TIMEOUT: Duration = Duration::from_secs(60);
const TTS_CHUNK_TIMEOUT: Duration = Duration::from_secs(10);
const TOOL_DEFINITION_LIMIT: usize = 16;
const MEMORY_CONTEXT_LIMIT: usize = 10;
const RECENT_CONVERSATION_LIMIT: usize = 20;

/// A short acknowledgment is flushed as a single chunk regardless of length,
/// so the fast layer's own chunker config has no min length to wait on.
const ACK_CHUNKER_CONFIG: ChunkerConfig = ChunkerConfig {
    mode: ChunkMode::Sentence,
    min_chunk_len: 1,
    max_chunk_len: 500,
};

/// State transitions the turn pipeline reports back to the orchestrator, so
/// it alone owns the `SessionState` field (spec §4.10).
#[derive(Debug)]
pub enum TurnSignal {
    EnteredGenerating,
    EnteredSpeaking,
    Finished,
    SttEmpty,
}

/// The fixed dependencies a turn pipeline runs against; shared (`Arc`)
/// across the session's lifetime, unlike the per-turn state below.
pub struct TurnDeps {
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub fast_layer: Arc<FastLayer>,
    pub main_layer: Arc<MainLayer>,
    pub memory: Arc<MemoryEngine>,
    pub tools: Arc<dyn ToolExecutor>,
}

/// Runs one turn to completion or until `cancel` fires (barge-in, per P4:
/// dropping this future drops every child await, so no further frame from a
/// cancelled turn reaches the outbound queue).
pub async fn run_turn(
    deps: Arc<TurnDeps>,
    user_id: String,
    capture: CaptureBuffer,
    style: VoiceStyle,
    chunk_mode: ChunkMode,
    outbound: OutboundQueue,
    signals: mpsc::Sender<TurnSignal>,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!(user_id = %user_id, "turn cancelled before completion");
        }
        _ = run_turn_inner(deps, user_id, capture, style, chunk_mode, outbound, signals, cancel.clone()) => {}
    }
}

async fn run_turn_inner(
    deps: Arc<TurnDeps>,
    user_id: String,
    capture: CaptureBuffer,
    style: VoiceStyle,
    chunk_mode: ChunkMode,
    outbound: OutboundQueue,
    signals: mpsc::Sender<TurnSignal>,
    cancel: CancellationToken,
) {
    metrics::counter!("voice_gateway_turns_total").increment(1);

    let stt_started = std::time::Instant::now();
    let transcript = match transcribe(&deps, &capture).await {
        Ok(text) => text,
        Err(err) => {
            record_stage_latency("stt", stt_started.elapsed());
            send_error(&outbound, &err).await;
            return;
        }
    };
    record_stage_latency("stt", stt_started.elapsed());

    if transcript.trim().is_empty() {
        let _ = signals.send(TurnSignal::SttEmpty).await;
        let _ = outbound.send(WireFrame::control(MessageType::Done)).await;
        return;
    }

    let _ = outbound
        .send(WireFrame::new(
            MessageType::Transcription,
            FrameFlags::IS_FINAL,
            json_bytes(&JsonMessage::Transcription {
                text: transcript.clone(),
                is_final: true,
            }),
        ))
        .await;
    let _ = signals.send(TurnSignal::EnteredGenerating).await;

    let first_audio = Arc::new(AtomicBool::new(true));
    let (fast_done_tx, fast_done_rx) = oneshot::channel::<()>();

    let entities = deps
        .memory
        .search_memory(&user_id, "", MEMORY_CONTEXT_LIMIT)
        .await
        .unwrap_or_default();
    let summary = deps.memory.get_memory_summary(&user_id, MEMORY_CONTEXT_LIMIT).await.ok();
    let system_prompt = build_system_prompt(&entities, summary.as_ref(), style.id);

    // Resolved up front (not inside `run_fast_pipeline`) so the main layer's
    // prompt can be primed with what was actually spoken, per §4.6.
    let ack_text = deps.fast_layer.acknowledge(&transcript, &style).await;

    let mut history = deps
        .memory
        .get_recent_conversation(&user_id, RECENT_CONVERSATION_LIMIT)
        .await
        .unwrap_or_default();
    if let Some(ack) = &ack_text {
        history.push(acknowledgment_priming_line(ack));
    }
    history.push(Turn::new(&user_id, TurnRole::User, &transcript));

    let request = GenerationRequest {
        system_prompt,
        history,
        tools: deps.tools.list_definitions().into_iter().take(TOOL_DEFINITION_LIMIT).collect(),
    };

    let fast_task = tokio::spawn(run_fast_pipeline(
        deps.clone(),
        ack_text,
        style,
        outbound.clone(),
        first_audio.clone(),
        signals.clone(),
        fast_done_tx,
    ));

    let main_started = std::time::Instant::now();
    let main_result = tokio::time::timeout(
        MAIN_TOTAL_TURN_TIMEOUT,
        run_main_pipeline(deps.clone(), request, style, chunk_mode, outbound.clone(), first_audio, fast_done_rx, signals.clone(), cancel.clone()),
    )
    .await;
    record_stage_latency("main", main_started.elapsed());

    let _ = fast_task.await;

    if let Err(err) = deps.memory.record_turn(&Turn::new(&user_id, TurnRole::User, &transcript)).await {
        tracing::warn!(error = %err, "failed to persist user turn");
    }

    match main_result {
        Ok(Ok(answer)) => {
            if let Err(err) = deps.memory.record_turn(&Turn::new(&user_id, TurnRole::Assistant, &answer)).await {
                tracing::warn!(error = %err, "failed to persist assistant turn");
            }
        }
        Ok(Err(err)) => send_error(&outbound, &err).await,
        Err(_) => {
            send_error(&outbound, &GatewayError::Upstream("main layer total-turn timeout".to_string())).await;
        }
    }

    if !cancel.is_cancelled() {
        let _ = outbound.send(WireFrame::control(MessageType::AudioEnd)).await;
        let _ = outbound.send(WireFrame::control(MessageType::Done)).await;
    }
    let _ = signals.send(TurnSignal::Finished).await;
}

async fn transcribe(deps: &TurnDeps, capture: &CaptureBuffer) -> Result<String, GatewayError> {
    let frame = AudioFrame::new(capture.samples().to_vec(), capture.sample_rate(), Channels::Mono, 0);
    let audio_stream: BoxStream<'static, AudioFrame> = Box::pin(stream::once(async move { frame }));

    match tokio::time::timeout(STT_TIMEOUT, collect_final_transcript(deps.stt.as_ref(), audio_stream)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(err)) => Err(classify_stt_error(err)),
        Err(_) => Err(GatewayError::Upstream("stt timed out".to_string())),
    }
}

async fn collect_final_transcript(stt: &dyn SpeechToText, audio: BoxStream<'static, AudioFrame>) -> Result<String, SttError> {
    let mut stream = stt.transcribe(audio).await?;
    let mut final_text = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if chunk.is_final {
            final_text = chunk.text;
        }
    }
    Ok(final_text)
}

fn classify_stt_error(err: SttError) -> GatewayError {
    match err {
        SttError::Fatal(reason) => GatewayError::UpstreamFatal(reason),
        other => GatewayError::Upstream(other.to_string()),
    }
}

/// The fast-layer acknowledgment: a single short phrase, synthesized and
/// pushed to the outbound queue as soon as it's ready. Whichever of
/// fast/main produces audio first emits the bracketing `AUDIO_START(S→C)`
/// and the `EnteredSpeaking` signal. Always signals `fast_done` on exit,
/// whether or not it produced any audio, so the main pipeline's barrier
/// resolves even when there's nothing to acknowledge (empty-ack case).
async fn run_fast_pipeline(
    deps: Arc<TurnDeps>,
    ack_text: Option<String>,
    style: VoiceStyle,
    outbound: OutboundQueue,
    first_audio: Arc<AtomicBool>,
    signals: mpsc::Sender<TurnSignal>,
    fast_done: oneshot::Sender<()>,
) {
    let started = std::time::Instant::now();
    if let Some(ack_text) = ack_text {
        record_stage_latency("fast_ack", started.elapsed());
        let mut chunker = TextChunker::new(ACK_CHUNKER_CONFIG.clone());
        let mut chunks = chunker.push(&ack_text);
        if let Some(last) = chunker.flush() {
            chunks.push(last);
        }

        for chunk in chunks {
            synthesize_and_enqueue(&deps.tts, &chunk, style.prosody.exaggeration, style.prosody.speech_rate, &outbound, &first_audio, &signals).await;
        }
    }
    let _ = fast_done.send(());
}

/// The main-layer answer: streams text deltas (mirrored to the client as
/// `LLM_CHUNK` frames as they arrive) through the chunker, synthesizing
/// each completed chunk as soon as it's ready — but never enqueuing audio
/// until `fast_done` resolves (the enqueue barrier from spec §9).
async fn run_main_pipeline(
    deps: Arc<TurnDeps>,
    request: GenerationRequest,
    style: VoiceStyle,
    chunk_mode: ChunkMode,
    outbound: OutboundQueue,
    first_audio: Arc<AtomicBool>,
    fast_done: oneshot::Receiver<()>,
    signals: mpsc::Sender<TurnSignal>,
    cancel: CancellationToken,
) -> Result<String, GatewayError> {
    let mut stream = deps.main_layer.generate_turn(request);
    let mut chunker = TextChunker::new(ChunkerConfig {
        mode: chunk_mode,
        min_chunk_len: 10,
        max_chunk_len: 500,
    });
    let mut first_token_seen = false;
    let mut ready_chunks = Vec::new();
    let mut answer = String::new();

    loop {
        let next = if first_token_seen {
            stream.next().await
        } else {
            match tokio::time::timeout(MAIN_FIRST_TOKEN_TIMEOUT, stream.next()).await {
                Ok(item) => item,
                Err(_) => return Err(GatewayError::Upstream("main layer first-token timeout".to_string())),
            }
        };

        let Some(item) = next else { break };
        let text = item.map_err(|e| GatewayError::Upstream(e.to_string()))?;
        first_token_seen = true;

        let _ = outbound
            .send(WireFrame::new(MessageType::LlmChunk, FrameFlags::NONE, text.clone().into_bytes()))
            .await;
        answer.push_str(&text);
        ready_chunks.extend(chunker.push(&text));
    }

    if let Some(last) = chunker.flush() {
        ready_chunks.push(last);
    }

    // Fast's audio, if any, must reach the wire before main's first frame.
    let _ = fast_done.await;

    for chunk in ready_chunks {
        if cancel.is_cancelled() {
            break;
        }
        synthesize_and_enqueue(&deps.tts, &chunk, style.prosody.exaggeration, style.prosody.speech_rate, &outbound, &first_audio, &signals).await;
    }

    Ok(answer)
}

async fn synthesize_and_enqueue(
    tts: &Arc<dyn TextToSpeech>,
    text: &str,
    exaggeration: f32,
    speech_rate: f32,
    outbound: &OutboundQueue,
    first_audio: &Arc<AtomicBool>,
    signals: &mpsc::Sender<TurnSignal>,
) {
    let tts_started = std::time::Instant::now();
    let stream = match tokio::time::timeout(TTS_CHUNK_TIMEOUT, tts.synthesize(text, exaggeration, speech_rate)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => {
            record_stage_latency("tts", tts_started.elapsed());
            tracing::warn!(error = %err, "tts synthesis failed for chunk");
            return;
        }
        Err(_) => {
            record_stage_latency("tts", tts_started.elapsed());
            tracing::warn!("tts synthesis timed out for chunk");
            return;
        }
    };
    record_stage_latency("tts", tts_started.elapsed());

    let mut stream = stream;
    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "tts stream error mid-chunk");
                break;
            }
        };

        if first_audio.swap(false, Ordering::SeqCst) {
            let _ = outbound.send(WireFrame::control(MessageType::AudioStart)).await;
            let _ = signals.send(TurnSignal::EnteredSpeaking).await;
        }

        let _ = outbound
            .send(WireFrame::new(MessageType::TtsAudio, FrameFlags::NONE, frame.to_pcm16()))
            .await;
    }
}

fn json_bytes(message: &JsonMessage) -> Vec<u8> {
    serde_json::to_vec(message).unwrap_or_default()
}

fn record_stage_latency(stage: &'static str, elapsed: Duration) {
    metrics::histogram!("voice_gateway_stage_latency_ms", "stage" => stage).record(elapsed.as_millis() as f64);
}

async fn send_error(outbound: &OutboundQueue, err: &GatewayError) {
    let payload = ErrorPayload {
        code: err.code().as_str().to_string(),
        message: err.wire_message(),
    };
    let bytes = serde_json::to_vec(&payload).unwrap_or_default();
    let _ = outbound.send(WireFrame::new(MessageType::Error, FrameFlags::NONE, bytes)).await;
    let _ = outbound.send(WireFrame::control(MessageType::Done)).await;
}

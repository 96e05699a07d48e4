//! The per-connection session orchestrator (spec §4.10): owns the
//! `SessionState`, the in-flight capture buffer, and the cancellation scope
//! for whatever turn is currently running. `Session::run` is the whole
//! connection lifecycle — it drives the state machine off two event
//! sources (inbound wire frames, turn-pipeline signals) until the socket
//! closes or a fatal error ends it.

use crate::outbound::OutboundQueue;
use crate::state::{next_state, SessionEvent, SessionState};
use crate::turn::{run_turn, TurnDeps, TurnSignal};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use voice_gateway_core::wire::{
    AudioStartPayload, ErrorPayload, FrameFlags, MessageType, SynthesizePayload, WireFrame,
};
use voice_gateway_core::{AudioFrame, CaptureBuffer, Channels, GatewayError, SampleRateHz, VoiceStyle};
use voice_gateway_pipeline::ChunkMode;

const SIGNAL_CHANNEL_CAPACITY: usize = 8;

/// Per-connection configuration that doesn't change for the life of the
/// session, distinct from `TurnDeps` (which is about backends, not policy).
pub struct SessionConfig {
    pub user_id: String,
    pub style: VoiceStyle,
    pub chunk_mode: ChunkMode,
    pub capture_max_duration: Duration,
}

pub struct Session {
    deps: Arc<TurnDeps>,
    config: SessionConfig,
    outbound: OutboundQueue,
    state: SessionState,
    capture: Option<CaptureBuffer>,
    turn_cancel: Option<CancellationToken>,
    sequence: u64,
}

impl Session {
    pub fn new(deps: Arc<TurnDeps>, config: SessionConfig, outbound: OutboundQueue) -> Self {
        Self {
            deps,
            config,
            outbound,
            state: SessionState::Idle,
            capture: None,
            turn_cancel: None,
            sequence: 0,
        }
    }

    /// Drives the connection to completion. `inbound` yields decoded wire
    /// frames regardless of whether the client is in binary or JSON mode —
    /// that projection happens in the server crate, upstream of here.
    pub async fn run(mut self, mut inbound: BoxStream<'static, Result<WireFrame, GatewayError>>) {
        let (signal_tx, mut signal_rx) = mpsc::channel::<TurnSignal>(SIGNAL_CHANNEL_CAPACITY);

        loop {
            tokio::select! {
                frame = inbound.next() => {
                    match frame {
                        Some(Ok(frame)) => self.handle_frame(frame, &signal_tx).await,
                        Some(Err(err)) => {
                            self.send_error(&err).await;
                            break;
                        }
                        None => break,
                    }
                    if self.state.is_terminal() {
                        break;
                    }
                }
                signal = signal_rx.recv() => {
                    match signal {
                        Some(signal) => self.apply_signal(signal),
                        None => continue,
                    }
                }
            }
        }

        if let Some(cancel) = self.turn_cancel.take() {
            cancel.cancel();
        }
    }

    async fn handle_frame(&mut self, frame: WireFrame, signals: &mpsc::Sender<TurnSignal>) {
        match frame.message_type {
            MessageType::AudioStart => self.on_audio_start(&frame).await,
            MessageType::AudioChunk => self.on_audio_chunk(&frame).await,
            MessageType::AudioEnd => self.on_audio_end(signals).await,
            MessageType::Synthesize => self.on_synthesize(&frame).await,
            MessageType::Ping => {
                let _ = self.outbound.send(WireFrame::control(MessageType::Pong)).await;
            }
            _ => {
                self.protocol_violation(&format!("unexpected client-to-server message type {:?}", frame.message_type)).await;
            }
        }
    }

    async fn on_audio_start(&mut self, frame: &WireFrame) {
        let declared: AudioStartPayload = match serde_json::from_slice(&frame.payload) {
            Ok(payload) => payload,
            Err(err) => {
                self.protocol_violation(&format!("malformed AUDIO_START payload: {err}")).await;
                return;
            }
        };
        let Some(channels) = Channels::from_count(declared.channels) else {
            self.protocol_violation(&format!("unsupported channel count: {}", declared.channels)).await;
            return;
        };
        if channels != Channels::Mono {
            self.protocol_violation("only mono capture is supported").await;
            return;
        }

        match next_state(self.state, SessionEvent::AudioStart) {
            Some(next) => {
                if let Some(cancel) = self.turn_cancel.take() {
                    metrics::counter!("voice_gateway_barge_ins_total").increment(1);
                    cancel.cancel();
                }
                self.capture = Some(CaptureBuffer::new(
                    SampleRateHz(declared.sample_rate),
                    self.config.capture_max_duration,
                ));
                self.state = next;
            }
            None => self.protocol_violation("AUDIO_START not valid in the current state").await,
        }
    }

    async fn on_audio_chunk(&mut self, frame: &WireFrame) {
        if self.state != SessionState::Listening {
            self.protocol_violation("AUDIO_CHUNK outside of an active capture").await;
            return;
        }
        let Some(capture) = self.capture.as_mut() else {
            self.protocol_violation("AUDIO_CHUNK with no capture buffer open").await;
            return;
        };

        self.sequence += 1;
        let frame = AudioFrame::from_pcm16(&frame.payload, capture.sample_rate(), Channels::Mono, self.sequence);
        if let Err(overflow) = capture.push(&frame) {
            tracing::warn!(max_secs = overflow.max_secs, "capture buffer overflowed");
            self.send_error(&GatewayError::InputTooLong).await;
            self.capture = None;
            self.state = SessionState::Idle;
            return;
        }

        if let Some(next) = next_state(self.state, SessionEvent::AudioChunk) {
            self.state = next;
        }
    }

    async fn on_audio_end(&mut self, signals: &mpsc::Sender<TurnSignal>) {
        let Some(next) = next_state(self.state, SessionEvent::AudioEnd) else {
            self.protocol_violation("AUDIO_END outside of an active capture").await;
            return;
        };
        let Some(capture) = self.capture.take() else {
            self.protocol_violation("AUDIO_END with no capture buffer open").await;
            return;
        };
        self.state = next;

        let cancel = CancellationToken::new();
        self.turn_cancel = Some(cancel.clone());

        tokio::spawn(run_turn(
            self.deps.clone(),
            self.config.user_id.clone(),
            capture,
            self.config.style,
            self.config.chunk_mode,
            self.outbound.clone(),
            signals.clone(),
            cancel,
        ));
    }

    /// `SYNTHESIZE` requests speech outside of a model turn (e.g. reading
    /// back a confirmation) and doesn't participate in the turn state
    /// machine at all — it's valid whenever the session isn't capturing.
    async fn on_synthesize(&mut self, frame: &WireFrame) {
        if self.state == SessionState::Listening {
            self.protocol_violation("SYNTHESIZE not valid while capturing audio").await;
            return;
        }
        let request: SynthesizePayload = match serde_json::from_slice(&frame.payload) {
            Ok(payload) => payload,
            Err(err) => {
                self.protocol_violation(&format!("malformed SYNTHESIZE payload: {err}")).await;
                return;
            }
        };

        let tts = self.deps.tts.clone();
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            let stream = match tts.synthesize(&request.text, request.exaggeration, request.speech_rate).await {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!(error = %err, "synthesize request failed");
                    return;
                }
            };
            let _ = outbound.send(WireFrame::control(MessageType::AudioStart)).await;
            let mut stream = stream;
            while let Some(frame) = stream.next().await {
                let Ok(frame) = frame else { break };
                let _ = outbound.send(WireFrame::new(MessageType::TtsAudio, FrameFlags::NONE, frame.to_pcm16())).await;
            }
            let _ = outbound.send(WireFrame::control(MessageType::AudioEnd)).await;
            let _ = outbound.send(WireFrame::control(MessageType::Done)).await;
        });
    }

    fn apply_signal(&mut self, signal: TurnSignal) {
        let event = match signal {
            TurnSignal::EnteredGenerating => SessionEvent::SttFinal,
            TurnSignal::SttEmpty => SessionEvent::SttEmpty,
            TurnSignal::EnteredSpeaking => SessionEvent::FirstTtsAudioReady,
            TurnSignal::Finished => SessionEvent::MainStreamEndAndTtsDrained,
        };

        let from = self.state;
        match next_state(self.state, event) {
            Some(next) => self.state = next,
            None => tracing::warn!(state = ?from, event = ?event, "turn signal did not match a valid state transition"),
        }

        if signal_settles_turn(event) && self.state == SessionState::Idle {
            self.turn_cancel = None;
        }
    }

    async fn protocol_violation(&mut self, reason: &str) {
        tracing::warn!(reason, "protocol violation");
        self.send_error(&GatewayError::Protocol(reason.to_string())).await;
        if let Some(next) = next_state(self.state, SessionEvent::FatalError) {
            self.state = next;
        }
        if let Some(cancel) = self.turn_cancel.take() {
            cancel.cancel();
        }
        self.capture = None;
    }

    async fn send_error(&self, err: &GatewayError) {
        let payload = ErrorPayload {
            code: err.code().as_str().to_string(),
            message: err.wire_message(),
        };
        let bytes = serde_json::to_vec(&payload).unwrap_or_default();
        let _ = self.outbound.send(WireFrame::new(MessageType::Error, FrameFlags::NONE, bytes)).await;
    }
}

fn signal_settles_turn(event: SessionEvent) -> bool {
    matches!(event, SessionEvent::SttEmpty | SessionEvent::MainStreamEndAndTtsDrained)
}

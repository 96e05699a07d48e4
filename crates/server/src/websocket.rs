//! WebSocket handler: upgrades the connection, projects `axum`'s message
//! stream into the `WireFrame` stream `Session::run` expects (binary or
//! JSON per spec §6's `?binary=` query param), and drives the session to
//! completion.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use voice_gateway_core::wire::{JsonMessage, MessageType, WireFrame};
use voice_gateway_core::{GatewayError, VoiceStyleId};
use voice_gateway_pipeline::ChunkMode;
use voice_gateway_session::{run_outbound_writer, OutboundError, OutboundQueue, OutboundSink, Session, SessionConfig};

use crate::rate_limit::{RateDecision, RateLimiter};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    binary: bool,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    style: Option<VoiceStyleId>,
    #[serde(default)]
    chunk_mode: Option<ChunkModeQuery>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ChunkModeQuery {
    Sentence,
    Paragraph,
}

impl From<ChunkModeQuery> for ChunkMode {
    fn from(mode: ChunkModeQuery) -> Self {
        match mode {
            ChunkModeQuery::Sentence => ChunkMode::Sentence,
            ChunkModeQuery::Paragraph => ChunkMode::Paragraph,
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: AppState, query: WsQuery) {
    metrics::gauge!("voice_gateway_connections_active").increment(1.0);
    let (ws_sender, ws_receiver) = socket.split();

    let outbound_capacity = state.settings.server.outbound_queue_capacity;
    let (outbound, outbound_rx) = OutboundQueue::new(outbound_capacity);
    let binary = query.binary;
    let writer = tokio::spawn(run_outbound_writer(outbound_rx, WsSink { sender: ws_sender, binary }));

    let rate_limiter = RateLimiter::new(state.settings.rate_limit.clone());
    let inbound = decode_inbound(ws_receiver, binary, rate_limiter, outbound.clone());

    let style = query.style.unwrap_or_default().style();
    let chunk_mode = query.chunk_mode.map(ChunkMode::from).unwrap_or(match state.settings.chunk_mode_default {
        voice_gateway_config::ChunkModeDefault::Sentence => ChunkMode::Sentence,
        voice_gateway_config::ChunkModeDefault::Paragraph => ChunkMode::Paragraph,
    });
    let config = SessionConfig {
        user_id: query.user_id.unwrap_or_else(|| "anonymous".to_string()),
        style,
        chunk_mode,
        capture_max_duration: Duration::from_secs(state.settings.capture.max_seconds),
    };

    let _ = outbound.send(WireFrame::control(MessageType::Ready)).await;
    let session = Session::new(state.turn_deps.clone(), config, outbound);
    session.run(inbound).await;

    let _ = writer.await;
    metrics::gauge!("voice_gateway_connections_active").decrement(1.0);
}

/// Projects the raw `axum` message stream into decoded wire frames, folding
/// in per-connection rate limiting: a frame over the window limit is
/// reported as `GatewayError::Protocol` and ends the stream rather than
/// being silently dropped, so the client sees why the connection closed.
fn decode_inbound(
    mut receiver: futures::stream::SplitStream<WebSocket>,
    binary: bool,
    mut rate_limiter: RateLimiter,
    outbound: OutboundQueue,
) -> BoxStream<'static, Result<WireFrame, GatewayError>> {
    Box::pin(async_stream::stream! {
        while let Some(message) = receiver.next().await {
            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    yield Err(GatewayError::Internal(err.to_string()));
                    break;
                }
            };

            let (frame, frame_len) = match decode_message(message, binary) {
                Some(Ok(frame)) => {
                    let len = frame.payload.len();
                    (frame, len)
                }
                Some(Err(err)) => {
                    yield Err(err);
                    break;
                }
                None => continue,
            };

            if rate_limiter.check(frame_len) == RateDecision::Drop {
                metrics::counter!("voice_gateway_rate_limit_drops_total").increment(1);
                tracing::warn!("connection exceeded its rate limit, closing");
                let _ = outbound.send(WireFrame::control(MessageType::Error)).await;
                yield Err(GatewayError::Protocol("rate limit exceeded".to_string()));
                break;
            }

            yield Ok(frame);
        }
    })
}

/// Returns `None` for frame types that don't carry a `WireFrame` at all
/// (ping/pong/close handled by `axum` itself).
fn decode_message(message: Message, binary: bool) -> Option<Result<WireFrame, GatewayError>> {
    match message {
        Message::Binary(bytes) if binary => Some(WireFrame::decode(bytes.into()).map_err(GatewayError::from)),
        Message::Text(text) if !binary => Some(json_to_wire_frame(&text)),
        Message::Binary(_) | Message::Text(_) => {
            Some(Err(GatewayError::Protocol("message framing does not match the negotiated mode".to_string())))
        }
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}

fn json_to_wire_frame(text: &str) -> Result<WireFrame, GatewayError> {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

    let message: JsonMessage = serde_json::from_str(text).map_err(voice_gateway_core::wire::CodecError::from)?;
    let frame = match message {
        JsonMessage::AudioStart { sample_rate, channels } => WireFrame::new(
            MessageType::AudioStart,
            Default::default(),
            serde_json::to_vec(&voice_gateway_core::wire::AudioStartPayload { sample_rate, channels }).unwrap_or_default(),
        ),
        JsonMessage::AudioChunk { data } => {
            let pcm = BASE64
                .decode(data)
                .map_err(|e| voice_gateway_core::wire::CodecError::Base64(e.to_string()))?;
            WireFrame::new(MessageType::AudioChunk, Default::default(), pcm)
        }
        JsonMessage::AudioEnd => WireFrame::control(MessageType::AudioEnd),
        JsonMessage::Synthesize { text, exaggeration, speech_rate } => WireFrame::new(
            MessageType::Synthesize,
            Default::default(),
            serde_json::to_vec(&voice_gateway_core::wire::SynthesizePayload { text, exaggeration, speech_rate }).unwrap_or_default(),
        ),
        JsonMessage::Ping => WireFrame::control(MessageType::Ping),
        JsonMessage::Pong => WireFrame::control(MessageType::Pong),
        other => {
            return Err(GatewayError::Protocol(format!(
                "{other:?} is not a valid client-to-server message"
            )))
        }
    };
    Ok(frame)
}

struct WsSink {
    sender: futures::stream::SplitSink<WebSocket, Message>,
    binary: bool,
}

#[async_trait]
impl OutboundSink for WsSink {
    async fn send_frame(&mut self, frame: WireFrame) -> Result<(), OutboundError> {
        let message = if self.binary {
            Message::Binary(frame.encode().to_vec())
        } else {
            Message::Text(serde_json::to_string(&wire_to_json_message(&frame)).unwrap_or_default())
        };
        self.sender.send(message).await.map_err(|_| OutboundError::Closed)
    }
}

fn wire_to_json_message(frame: &WireFrame) -> JsonMessage {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

    match frame.message_type {
        MessageType::Transcription => {
            serde_json::from_slice(&frame.payload).unwrap_or(JsonMessage::Transcription {
                text: String::new(),
                is_final: true,
            })
        }
        MessageType::LlmChunk => JsonMessage::LlmChunk {
            text: String::from_utf8_lossy(&frame.payload).to_string(),
        },
        MessageType::TtsAudio => JsonMessage::TtsAudio {
            data: BASE64.encode(&frame.payload),
            sample_rate: 24_000,
        },
        MessageType::Error => {
            let payload: voice_gateway_core::wire::ErrorPayload =
                serde_json::from_slice(&frame.payload).unwrap_or(voice_gateway_core::wire::ErrorPayload {
                    code: "INTERNAL".to_string(),
                    message: "malformed error payload".to_string(),
                });
            JsonMessage::Error { code: payload.code, message: payload.message }
        }
        MessageType::Ready => JsonMessage::Ready,
        MessageType::Done => JsonMessage::Done,
        MessageType::AudioStart => JsonMessage::AudioStart { sample_rate: 0, channels: 1 },
        MessageType::AudioEnd => JsonMessage::AudioEnd,
        MessageType::Ping => JsonMessage::Ping,
        MessageType::Pong => JsonMessage::Pong,
        MessageType::AudioChunk | MessageType::Synthesize => JsonMessage::Done,
    }
}

//! Speech-to-text adapter over a plain HTTP endpoint (spec §6: "STT adapter
//! (ingress): `(pcm_bytes, sample_rate) -> stream of (text, is_final)`").
//!
//! The inbound audio stream is buffered once up front (the caller already
//! has the whole utterance by the time `AUDIO_END` arrives) so a transient
//! failure can be retried against the same bytes, per spec §7: STT alone
//! gets one retry with a 200-500ms backoff; everything else fails fast.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use voice_gateway_core::{AudioFrame, SpeechToText, SttError, TranscriptChunk};

const RETRY_BACKOFF: Duration = Duration::from_millis(350);

#[derive(Debug, Deserialize)]
struct WireTranscriptChunk {
    text: String,
    #[serde(default)]
    is_final: bool,
}

pub struct HttpSpeechToText {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSpeechToText {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder with a timeout never fails");
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn attempt(
        &self,
        frames: &[AudioFrame],
    ) -> Result<BoxStream<'static, Result<TranscriptChunk, SttError>>, SttError> {
        let sample_rate = frames.first().map(|f| f.sample_rate.as_u32()).unwrap_or(16_000);
        let pcm: Vec<u8> = frames.iter().flat_map(|f| f.to_pcm16()).collect();

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Sample-Rate", sample_rate.to_string())
            .header("Content-Type", "application/octet-stream")
            .body(pcm)
            .send()
            .await
            .map_err(classify_error)?;

        if response.status().is_server_error() {
            return Err(SttError::Transient(format!("upstream returned {}", response.status())));
        }
        if !response.status().is_success() {
            return Err(SttError::Fatal(format!("upstream returned {}", response.status())));
        }

        Ok(Box::pin(try_stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(classify_error)?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    if line.is_empty() {
                        continue;
                    }
                    let wire: WireTranscriptChunk = serde_json::from_str(&line)
                        .map_err(|e| SttError::Fatal(format!("malformed transcript chunk: {e}")))?;
                    yield TranscriptChunk { text: wire.text, is_final: wire.is_final };
                }
            }
        }))
    }
}

fn classify_error(err: reqwest::Error) -> SttError {
    if err.is_timeout() {
        SttError::Timeout
    } else if err.is_connect() {
        SttError::Transient(err.to_string())
    } else {
        SttError::Fatal(err.to_string())
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechToText {
    async fn transcribe(
        &self,
        audio: BoxStream<'static, AudioFrame>,
    ) -> Result<BoxStream<'static, Result<TranscriptChunk, SttError>>, SttError> {
        let frames: Vec<AudioFrame> = audio.collect().await;

        match self.attempt(&frames).await {
            Ok(stream) => Ok(stream),
            Err(SttError::Transient(reason)) => {
                tracing::warn!(reason = %reason, "stt call failed transiently, retrying once");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.attempt(&frames).await
            }
            Err(other) => Err(other),
        }
    }
}

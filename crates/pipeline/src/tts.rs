//! Text-to-speech adapter over a plain HTTP endpoint (spec §6: "TTS adapter
//! (egress): `synthesize(text, exaggeration, speech_rate) -> stream of
//! (pcm_bytes, sample_rate)`"). Unlike STT, a TTS failure fails fast —
//! there's no single buffered utterance to safely retry against once audio
//! has started streaming to the client.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use voice_gateway_core::{AudioFrame, Channels, SampleRateHz, TextToSpeech, TtsError};

const DEFAULT_TTS_SAMPLE_RATE: u32 = 24_000;
const FRAME_BYTES: usize = 3200; // 100ms @16kHz mono s16le; rescaled per declared rate below.

pub struct HttpTextToSpeech {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTextToSpeech {
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
}

fn classify_error(err: reqwest::Error) -> TtsError {
    if err.is_timeout() {
        TtsError::Timeout
    } else if err.is_connect() {
        TtsError::Transient(err.to_string())
    } else {
        TtsError::Fatal(err.to_string())
    }
}

#[async_trait]
impl TextToSpeech for HttpTextToSpeech {
    async fn synthesize(
        &self,
        text: &str,
        exaggeration: f32,
        speech_rate: f32,
    ) -> Result<BoxStream<'static, Result<AudioFrame, TtsError>>, TtsError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "text": text,
                "exaggeration": exaggeration,
                "speechRate": speech_rate,
            }))
            .send()
            .await
            .map_err(classify_error)?;

        if response.status().is_server_error() {
            return Err(TtsError::Transient(format!("upstream returned {}", response.status())));
        }
        if !response.status().is_success() {
            return Err(TtsError::Fatal(format!("upstream returned {}", response.status())));
        }

        let sample_rate = response
            .headers()
            .get("X-Sample-Rate")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_TTS_SAMPLE_RATE);

        Ok(Box::pin(try_stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut sequence = 0u64;

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(classify_error)?;
                buffer.extend_from_slice(&chunk);

                while buffer.len() >= FRAME_BYTES {
                    let frame_bytes: Vec<u8> = buffer.drain(..FRAME_BYTES).collect();
                    yield AudioFrame::from_pcm16(&frame_bytes, SampleRateHz(sample_rate), Channels::Mono, sequence);
                    sequence += 1;
                }
            }

            if !buffer.is_empty() {
                yield AudioFrame::from_pcm16(&buffer, SampleRateHz(sample_rate), Channels::Mono, sequence);
            }
        }))
    }
}

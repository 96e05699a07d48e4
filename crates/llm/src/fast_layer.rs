//! The fast acknowledgment path (spec §4.6): a rule-based prefilter backed
//! by a small-model fallback, targeting ~200ms so the user hears *something*
//! well before the main layer's answer is ready.

use futures::StreamExt;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use voice_gateway_core::{FeedbackLevel, GenerationEvent, GenerationRequest, LanguageModel, Turn, TurnRole, VoiceStyle};

/// §4.5: transcripts shorter than this never get a fast-layer acknowledgment.
const MIN_ACKNOWLEDGABLE_LEN: usize = 5;

const FAST_LAYER_PERSONA: &str = "You produce a single short acknowledgment (under 8 words) \
that shows you heard the user and are working on their request. Do not answer the question.";

/// One entry in the rule-based prefilter: a regex over the transcript and
/// the acknowledgment text to emit when it matches. Checked in order;
/// first match wins.
pub struct PatternRule {
    pub pattern: Regex,
    pub acknowledgment: String,
}

pub struct FastLayer {
    patterns: Vec<PatternRule>,
    short_greeting: Regex,
    model: Option<Arc<dyn LanguageModel>>,
    timeout: Duration,
    fallback: String,
}

impl FastLayer {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, timeout_ms: u64) -> Self {
        Self {
            patterns: default_pattern_table(),
            short_greeting: Regex::new(r"(?i)^(hi|hey|hello|yes|no|ok|thanks|bye)[\s!?.]*$")
                .expect("static pattern is valid regex"),
            model,
            timeout: Duration::from_millis(timeout_ms),
            fallback: "One moment.".to_string(),
        }
    }

    /// The §4.5 gate: false when the style disables feedback, the transcript
    /// is too short to be worth acknowledging, or it's a bare greeting/filler
    /// word that doesn't warrant a spoken "I heard you".
    fn needs_acknowledgment(&self, transcript: &str, style: &VoiceStyle) -> bool {
        if style.feedback_level == FeedbackLevel::None {
            return false;
        }
        if transcript.len() < MIN_ACKNOWLEDGABLE_LEN {
            return false;
        }
        if self.short_greeting.is_match(transcript) {
            return false;
        }
        true
    }

    /// Produces an acknowledgment for a final (or, per the open question in
    /// §9, possibly partial) transcript, or `None` if the §4.5 gate
    /// suppresses it for this transcript/style (including the empty
    /// transcript of spec S2, which never warrants a spoken ack).
    pub async fn acknowledge(&self, transcript: &str, style: &VoiceStyle) -> Option<String> {
        let transcript = transcript.trim();
        if !self.needs_acknowledgment(transcript, style) {
            return None;
        }

        if let Some(rule) = self.patterns.iter().find(|rule| rule.pattern.is_match(transcript)) {
            return Some(rule.acknowledgment.clone());
        }

        match &self.model {
            Some(model) => Some(self.ask_small_model(model.as_ref(), transcript).await),
            None => Some(self.fallback.clone()),
        }
    }

    async fn ask_small_model(&self, model: &dyn LanguageModel, transcript: &str) -> String {
        let request = GenerationRequest {
            system_prompt: FAST_LAYER_PERSONA.to_string(),
            history: vec![Turn::new("user", TurnRole::User, transcript)],
            tools: vec![],
        };

        let generation = tokio::time::timeout(self.timeout, async {
            let mut stream = model.generate(request).await.ok()?;
            let mut text = String::new();
            while let Some(event) = stream.next().await {
                if let Ok(GenerationEvent::Text(chunk)) = event {
                    text.push_str(&chunk);
                }
            }
            Some(text)
        })
        .await;

        match generation {
            Ok(Some(text)) if !text.trim().is_empty() => text.trim().to_string(),
            _ => {
                tracing::debug!("fast layer small model unavailable or empty, using fallback ack");
                self.fallback.clone()
            }
        }
    }
}

fn default_pattern_table() -> Vec<PatternRule> {
    let rules: &[(&str, &str)] = &[
        (r"(?i)\bfleet\b", "Checking your fleet."),
        (r"(?i)\bbalance\b|\bwallet\b", "Looking up your balance."),
        (r"(?i)\bweather\b", "Checking the weather."),
        (r"(?i)\bremind\b|\bremember\b", "Got it, noting that down."),
    ];
    rules
        .iter()
        .map(|(pattern, ack)| PatternRule {
            pattern: Regex::new(pattern).expect("static pattern is valid regex"),
            acknowledgment: ack.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_style() -> VoiceStyle {
        voice_gateway_core::VoiceStyleId::Normal.style()
    }

    #[tokio::test]
    async fn empty_transcript_yields_no_acknowledgment() {
        let fast_layer = FastLayer::new(None, 600);
        assert!(fast_layer.acknowledge("", &standard_style()).await.is_none());
    }

    #[tokio::test]
    async fn rule_match_short_circuits_the_model() {
        let fast_layer = FastLayer::new(None, 600);
        let ack = fast_layer.acknowledge("check my fleet status", &standard_style()).await.unwrap();
        assert!(ack.to_lowercase().contains("fleet"));
    }

    #[tokio::test]
    async fn unmatched_text_without_a_model_falls_back() {
        let fast_layer = FastLayer::new(None, 600);
        let ack = fast_layer.acknowledge("tell me about quantum gravity", &standard_style()).await.unwrap();
        assert_eq!(ack, "One moment.");
    }

    #[tokio::test]
    async fn short_greeting_is_suppressed() {
        let fast_layer = FastLayer::new(None, 600);
        assert!(fast_layer.acknowledge("hi!", &standard_style()).await.is_none());
        assert!(fast_layer.acknowledge("ok", &standard_style()).await.is_none());
    }

    #[tokio::test]
    async fn below_minimum_length_is_suppressed() {
        let fast_layer = FastLayer::new(None, 600);
        assert!(fast_layer.acknowledge("hm", &standard_style()).await.is_none());
    }

    #[tokio::test]
    async fn feedback_none_style_disables_acknowledgment() {
        let fast_layer = FastLayer::new(None, 600);
        let mut style = standard_style();
        style.feedback_level = FeedbackLevel::None;
        assert!(fast_layer.acknowledge("check my fleet status", &style).await.is_none());
    }
}

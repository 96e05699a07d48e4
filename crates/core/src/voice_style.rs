//! The closed set of voice styles (spec §4.11). Each style is a fixed
//! bundle of prosody defaults and a feedback verbosity level; there is no
//! open extension point, matching the spec's closed five-style set.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VoiceStyleId {
    #[default]
    Normal,
    Formal,
    Concise,
    Immersive,
    Learning,
}

/// How much the fast layer narrates progress (spec §4.11: `feedback ∈
/// {none, minimal, verbose}`). `None` disables the fast layer outright for
/// the style; `Verbose` styles (e.g. `Learning`) favor more frequent
/// acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackLevel {
    None,
    Minimal,
    Verbose,
}

/// TTS-facing prosody defaults for a style. These seed the `SYNTHESIZE`
/// payload's `exaggeration`/`speech_rate` fields when the session, rather
/// than the client, originates the speech request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prosody {
    pub exaggeration: f32,
    pub speech_rate: f32,
}

/// The full behavioral bundle for one style: prosody, feedback verbosity,
/// and the chunker mode it prefers (see `pipeline::chunker`).
#[derive(Debug, Clone, Copy)]
pub struct VoiceStyle {
    pub id: VoiceStyleId,
    pub prosody: Prosody,
    pub feedback_level: FeedbackLevel,
}

impl VoiceStyleId {
    pub fn style(self) -> VoiceStyle {
        match self {
            VoiceStyleId::Normal => VoiceStyle {
                id: self,
                prosody: Prosody {
                    exaggeration: 0.5,
                    speech_rate: 1.0,
                },
                feedback_level: FeedbackLevel::Minimal,
            },
            VoiceStyleId::Formal => VoiceStyle {
                id: self,
                prosody: Prosody {
                    exaggeration: 0.3,
                    speech_rate: 0.95,
                },
                feedback_level: FeedbackLevel::Minimal,
            },
            // Concise disables the fast layer outright: a user who asked for
            // terse output doesn't want a spoken "one moment" on every turn.
            VoiceStyleId::Concise => VoiceStyle {
                id: self,
                prosody: Prosody {
                    exaggeration: 0.4,
                    speech_rate: 1.1,
                },
                feedback_level: FeedbackLevel::None,
            },
            VoiceStyleId::Immersive => VoiceStyle {
                id: self,
                prosody: Prosody {
                    exaggeration: 0.8,
                    speech_rate: 1.0,
                },
                feedback_level: FeedbackLevel::Verbose,
            },
            VoiceStyleId::Learning => VoiceStyle {
                id: self,
                prosody: Prosody {
                    exaggeration: 0.6,
                    speech_rate: 0.85,
                },
                feedback_level: FeedbackLevel::Verbose,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_style_id_resolves_to_a_style() {
        for id in [
            VoiceStyleId::Normal,
            VoiceStyleId::Formal,
            VoiceStyleId::Concise,
            VoiceStyleId::Immersive,
            VoiceStyleId::Learning,
        ] {
            assert_eq!(id.style().id, id);
        }
    }

    #[test]
    fn concise_is_faster_than_formal() {
        assert!(VoiceStyleId::Concise.style().prosody.speech_rate > VoiceStyleId::Formal.style().prosody.speech_rate);
    }
}

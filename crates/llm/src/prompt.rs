//! System prompt construction (spec §4.8). The build is pure: identical
//! inputs produce identical prompts, so it's plain data-in/string-out
//! rather than a stateful builder.

use voice_gateway_core::{Turn, VoiceStyleId};
use voice_gateway_memory::{Entity, MemorySummaryView};

const PERSONA_PREAMBLE: &str = "You are a helpful voice assistant. Keep responses concise \
and natural to speak aloud. You have already spoken a short acknowledgment to the user; \
continue naturally rather than re-greeting them.";

fn style_modifier(style: VoiceStyleId) -> &'static str {
    match style {
        VoiceStyleId::Normal => "Speak naturally, as you would in an ordinary conversation.",
        VoiceStyleId::Formal => "Speak formally and precisely; avoid contractions and slang.",
        VoiceStyleId::Concise => "Be as brief as possible; favor short sentences and skip pleasantries.",
        VoiceStyleId::Immersive => "Speak with warmth and narrative color, as a storyteller would.",
        VoiceStyleId::Learning => "Explain your reasoning step by step, as a patient tutor would.",
    }
}

fn user_context_block(entities: &[Entity], summary: Option<&MemorySummaryView>) -> String {
    let mut block = String::new();

    match summary {
        Some(MemorySummaryView::Fresh(summary)) => {
            block.push_str("What you remember about this user:\n");
            block.push_str(&summary.prose_text);
            block.push('\n');
        }
        Some(MemorySummaryView::QuickListing(_)) | None => {
            if !entities.is_empty() {
                block.push_str("Known entities:\n");
                for entity in entities {
                    block.push_str(&format!("- {} ({}): {}\n", entity.name, entity.entity_type.as_str(), entity.observations.join("; ")));
                }
            }
        }
    }

    block
}

/// Assembles the three-part system prompt: persona preamble, user-context
/// block, voice-style modifier.
pub fn build_system_prompt(entities: &[Entity], summary: Option<&MemorySummaryView>, style: VoiceStyleId) -> String {
    let context = user_context_block(entities, summary);
    let mut prompt = String::new();
    prompt.push_str(PERSONA_PREAMBLE);
    prompt.push('\n');
    if !context.is_empty() {
        prompt.push('\n');
        prompt.push_str(&context);
    }
    prompt.push('\n');
    prompt.push_str(style_modifier(style));
    prompt
}

/// Folds the fast-layer acknowledgment into the first line the main layer
/// sees, per §4.6 prompt priming, so it continues naturally.
pub fn acknowledgment_priming_line(ack_text: &str) -> Turn {
    Turn::new("system", voice_gateway_core::TurnRole::Assistant, ack_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_gateway_memory::EntityType;

    #[test]
    fn build_is_pure() {
        let entities = vec![Entity::new("alice", "The Armada", EntityType::Fleet)];
        let a = build_system_prompt(&entities, None, VoiceStyleId::Normal);
        let b = build_system_prompt(&entities, None, VoiceStyleId::Normal);
        assert_eq!(a, b);
    }

    #[test]
    fn different_styles_produce_different_prompts() {
        let entities = vec![];
        let normal = build_system_prompt(&entities, None, VoiceStyleId::Normal);
        let concise = build_system_prompt(&entities, None, VoiceStyleId::Concise);
        assert_ne!(normal, concise);
    }
}

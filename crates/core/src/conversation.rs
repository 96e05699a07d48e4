//! Conversation turn types shared between the session orchestrator and the
//! memory engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One exchange in a conversation, as persisted by the memory engine and
/// replayed back into prompts by the main layer. `turn_id` is assigned at
/// creation so a turn can be referenced (and partially superseded, in the
/// barge-in case) without relying on position in a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: Uuid,
    pub user_id: String,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(user_id: impl Into<String>, role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            user_id: user_id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

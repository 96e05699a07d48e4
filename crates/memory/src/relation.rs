//! Relations: directed, typed edges between two entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `relation_type` is free text in active voice (e.g. `"commands"`,
/// `"docked_at"`) rather than a closed enum — unlike entity type, the set
/// of verbs connecting entities isn't bounded by the spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub id: Uuid,
    pub user_id: String,
    pub from_entity: Uuid,
    pub to_entity: Uuid,
    pub relation_type: String,
    pub created_at: DateTime<Utc>,
}

impl Relation {
    pub fn new(
        user_id: impl Into<String>,
        from_entity: Uuid,
        to_entity: Uuid,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            from_entity,
            to_entity,
            relation_type: relation_type.into(),
            created_at: Utc::now(),
        }
    }

    /// Identity used to enforce the `(from, to, type)` uniqueness invariant.
    pub fn triple(&self) -> (Uuid, Uuid, &str) {
        (self.from_entity, self.to_entity, &self.relation_type)
    }
}

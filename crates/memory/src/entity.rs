//! Entities: the nodes of the per-user knowledge graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of entity kinds. Unlike the wire protocol's message
/// types, there is no reject-unknown path here: the model only ever
/// supplies one of these through the `remember` tool's schema, which
/// enumerates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Fleet,
    Ship,
    Location,
    Concept,
    Event,
    Preference,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Fleet => "fleet",
            EntityType::Ship => "ship",
            EntityType::Location => "location",
            EntityType::Concept => "concept",
            EntityType::Event => "event",
            EntityType::Preference => "preference",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "person" => EntityType::Person,
            "organization" => EntityType::Organization,
            "fleet" => EntityType::Fleet,
            "ship" => EntityType::Ship,
            "location" => EntityType::Location,
            "concept" => EntityType::Concept,
            "event" => EntityType::Event,
            "preference" => EntityType::Preference,
            _ => return None,
        })
    }
}

/// A node in a user's knowledge graph. `name` is unique within the user's
/// scope (case-sensitive); `id` is a surrogate key so relations can
/// reference an entity without embedding the user-visible name twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub entity_type: EntityType,
    pub observations: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_edited: bool,
}

impl Entity {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, entity_type: EntityType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            name: name.into(),
            entity_type,
            observations: Vec::new(),
            created_at: now,
            updated_at: now,
            user_edited: false,
        }
    }

    /// Appends facts, skipping exact duplicates. Returns the number actually
    /// added.
    pub fn add_observations(&mut self, facts: &[String], is_user_edit: bool) -> usize {
        let mut added = 0;
        for fact in facts {
            if !self.observations.iter().any(|existing| existing == fact) {
                self.observations.push(fact.clone());
                added += 1;
            }
        }
        if added > 0 {
            self.updated_at = Utc::now();
            self.user_edited = self.user_edited || is_user_edit;
        }
        added
    }

    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query)
            || self
                .observations
                .iter()
                .any(|obs| obs.to_lowercase().contains(&query))
    }
}

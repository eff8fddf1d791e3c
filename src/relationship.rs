use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcRelationship {
    pub npc_id: String,
    pub affinity: f32,
    pub relationship: String,
    pub interaction_count: u32,
    pub last_interaction: DateTime<Utc>,
}

impl NpcRelationship {
    pub fn new(npc_id: impl Into<String>) -> Self {
        Self {
            npc_id: npc_id.into(),
            affinity: 0.0,
            relationship: "Stranger".to_string(),
            interaction_count: 0,
            last_interaction: Utc::now(),
        }
    }
}

/// Player relationships and faction standing, saved under one slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipBook {
    pub relationships: BTreeMap<String, NpcRelationship>,
    pub player_name: String,
    pub save_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub faction_reputation: BTreeMap<String, f32>,
}

impl Default for RelationshipBook {
    fn default() -> Self {
        Self {
            relationships: BTreeMap::new(),
            player_name: "Player".to_string(),
            save_timestamp: Utc::now(),
            faction_reputation: BTreeMap::new(),
        }
    }
}

impl RelationshipBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, npc_id: &str) -> Option<&NpcRelationship> {
        self.relationships.get(npc_id)
    }

    /// Existing record, or a fresh Stranger at zero affinity
    pub fn get_or_create(&mut self, npc_id: &str) -> &mut NpcRelationship {
        self.relationships
            .entry(npc_id.to_string())
            .or_insert_with(|| NpcRelationship::new(npc_id))
    }

    /// Copy an agent's current standing in and count the interaction
    pub fn update_from_client(&mut self, npc_id: &str, affinity: f32, relationship: &str) {
        let now = Utc::now();
        let record = self.get_or_create(npc_id);
        record.affinity = affinity.clamp(-1.0, 1.0);
        record.relationship = relationship.to_string();
        record.interaction_count += 1;
        record.last_interaction = now;
        self.save_timestamp = now;
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}

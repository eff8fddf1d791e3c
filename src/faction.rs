use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A named group the player can be in good or bad standing with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faction {
    pub id: String,
    pub display_name: String,
    pub default_mood: String,
    reputation: f32,
    pub allies: BTreeSet<String>,
    pub enemies: BTreeSet<String>,
}

impl Faction {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            default_mood: "Neutral".to_string(),
            reputation: 0.0,
            allies: BTreeSet::new(),
            enemies: BTreeSet::new(),
        }
    }

    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        self.default_mood = mood.into();
        self
    }

    pub fn with_reputation(mut self, reputation: f32) -> Self {
        self.reputation = reputation.clamp(-100.0, 100.0);
        self
    }

    pub fn with_ally(mut self, faction_id: impl Into<String>) -> Self {
        self.allies.insert(faction_id.into());
        self
    }

    pub fn with_enemy(mut self, faction_id: impl Into<String>) -> Self {
        self.enemies.insert(faction_id.into());
        self
    }

    pub fn reputation(&self) -> f32 {
        self.reputation
    }

    fn shift(&mut self, delta: f32) -> f32 {
        self.reputation = (self.reputation + delta).clamp(-100.0, 100.0);
        self.reputation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReputationTier {
    Hostile,
    Unfriendly,
    Neutral,
    Friendly,
    Allied,
}

impl ReputationTier {
    pub fn from_value(reputation: f32) -> Self {
        if reputation <= -60.0 {
            ReputationTier::Hostile
        } else if reputation <= -20.0 {
            ReputationTier::Unfriendly
        } else if reputation <= 20.0 {
            ReputationTier::Neutral
        } else if reputation <= 60.0 {
            ReputationTier::Friendly
        } else {
            ReputationTier::Allied
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReputationTier::Hostile => "Hostile",
            ReputationTier::Unfriendly => "Unfriendly",
            ReputationTier::Neutral => "Neutral",
            ReputationTier::Friendly => "Friendly",
            ReputationTier::Allied => "Allied",
        }
    }
}

impl fmt::Display for ReputationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reputation update, after clamping
#[derive(Debug, Clone, PartialEq)]
pub struct ReputationChange {
    pub faction_id: String,
    pub reputation: f32,
}

/// Player standing with every known faction, plus the ally/enemy edges
/// reputation flows along.
#[derive(Debug, Clone, Default)]
pub struct FactionGraph {
    factions: BTreeMap<String, Faction>,
}

impl FactionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The island's standing factions
    pub fn with_defaults() -> Self {
        let mut graph = Self::new();
        graph.register(Faction::new("survivors", "Survivors").with_mood("Cautious"));
        graph.register(
            Faction::new("bandits", "Bandits")
                .with_mood("Hostile")
                .with_reputation(-40.0)
                .with_enemy("survivors")
                .with_enemy("military"),
        );
        graph.register(
            Faction::new("military", "Military")
                .with_mood("Suspicious")
                .with_reputation(20.0)
                .with_enemy("bandits"),
        );
        graph.register(
            Faction::new("merchants", "Merchants")
                .with_mood("Friendly")
                .with_reputation(30.0)
                .with_ally("survivors"),
        );
        graph.register(
            Faction::new("cultists", "The Devoted")
                .with_mood("Mysterious")
                .with_reputation(-20.0),
        );
        log::info!("Faction graph initialized with {} factions", graph.factions.len());
        graph
    }

    /// Add or replace a faction
    pub fn register(&mut self, faction: Faction) {
        log::debug!("Registered faction: {}", faction.display_name);
        self.factions.insert(faction.id.clone(), faction);
    }

    pub fn get(&self, faction_id: &str) -> Option<&Faction> {
        self.factions.get(faction_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Faction> {
        self.factions.values()
    }

    pub fn len(&self) -> usize {
        self.factions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factions.is_empty()
    }

    /// Reputation, or 0.0 for an unknown faction
    pub fn reputation(&self, faction_id: &str) -> f32 {
        self.get(faction_id).map(Faction::reputation).unwrap_or(0.0)
    }

    pub fn tier(&self, faction_id: &str) -> ReputationTier {
        ReputationTier::from_value(self.reputation(faction_id))
    }

    /// Shift standing with `faction_id` by `delta`. Allies move by half the
    /// delta, enemies by half in the opposite direction. Allies of allies are
    /// left alone.
    pub fn modify_reputation(&mut self, faction_id: &str, delta: f32) -> Vec<ReputationChange> {
        let Some(faction) = self.factions.get_mut(faction_id) else {
            log::debug!("Ignoring reputation change for unknown faction {}", faction_id);
            return Vec::new();
        };

        let reputation = faction.shift(delta);
        let allies = faction.allies.clone();
        let enemies = faction.enemies.clone();
        log::info!(
            "Faction {} reputation changed by {:.1} to {:.1}",
            faction_id,
            delta,
            reputation
        );

        let mut changes = vec![ReputationChange {
            faction_id: faction_id.to_string(),
            reputation,
        }];

        let ripples = allies
            .iter()
            .map(|id| (id, delta * 0.5))
            .chain(enemies.iter().map(|id| (id, -delta * 0.5)));
        for (id, ripple) in ripples {
            if id == faction_id {
                continue;
            }
            if let Some(other) = self.factions.get_mut(id) {
                changes.push(ReputationChange {
                    faction_id: id.clone(),
                    reputation: other.shift(ripple),
                });
            }
        }
        changes
    }

    pub fn set_reputation(&mut self, faction_id: &str, value: f32) -> Option<ReputationChange> {
        let faction = self.factions.get_mut(faction_id)?;
        faction.reputation = value.clamp(-100.0, 100.0);
        Some(ReputationChange {
            faction_id: faction_id.to_string(),
            reputation: faction.reputation,
        })
    }

    pub fn are_allied(&self, a: &str, b: &str) -> bool {
        self.get(a).is_some_and(|f| f.allies.contains(b))
    }

    pub fn are_hostile(&self, a: &str, b: &str) -> bool {
        self.get(a).is_some_and(|f| f.enemies.contains(b))
    }

    /// Reputation rescaled to an agent affinity in [-1, 1]
    pub fn affinity_from_faction(&self, faction_id: &str) -> f32 {
        self.reputation(faction_id) / 100.0
    }

    pub fn export_reputation(&self) -> BTreeMap<String, f32> {
        self.factions
            .iter()
            .map(|(id, f)| (id.clone(), f.reputation))
            .collect()
    }

    /// Apply saved reputations. Ids with no registered faction are skipped.
    pub fn import_reputation(&mut self, saved: &BTreeMap<String, f32>) {
        for (id, value) in saved {
            self.set_reputation(id, *value);
        }
    }
}

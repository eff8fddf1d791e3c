//! Witness ledger: records notable world events, who saw them, and how
//! degraded knowledge of them spreads from agent to agent.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use uuid::Uuid;

use crate::config::WitnessConfig;
use crate::types::Position;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WitnessEventType {
    Combat,
    Theft,
    Help,
    Trade,
    Murder,
    Dialogue,
    QuestComplete,
    Trespass,
    Custom,
}

impl WitnessEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WitnessEventType::Combat => "Combat",
            WitnessEventType::Theft => "Theft",
            WitnessEventType::Help => "Help",
            WitnessEventType::Trade => "Trade",
            WitnessEventType::Murder => "Murder",
            WitnessEventType::Dialogue => "Dialogue",
            WitnessEventType::QuestComplete => "Quest",
            WitnessEventType::Trespass => "Trespass",
            WitnessEventType::Custom => "Custom",
        }
    }
}

impl fmt::Display for WitnessEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the player did that bystanders may notice
#[derive(Debug, Clone, PartialEq)]
pub struct ReportedEvent {
    pub event_type: WitnessEventType,
    pub description: String,
    pub location: Position,
    pub location_name: String,
    pub target_npc_id: String,
    pub target_faction: String,
    pub importance: f32,
    pub positive: bool,
}

impl ReportedEvent {
    pub fn new(event_type: WitnessEventType, description: impl Into<String>, location: Position) -> Self {
        Self {
            event_type,
            description: description.into(),
            location,
            location_name: String::new(),
            target_npc_id: String::new(),
            target_faction: String::new(),
            importance: 0.5,
            positive: false,
        }
    }

    pub fn with_target(mut self, npc_id: impl Into<String>, faction: impl Into<String>) -> Self {
        self.target_npc_id = npc_id.into();
        self.target_faction = faction.into();
        self
    }

    pub fn with_location_name(mut self, name: impl Into<String>) -> Self {
        self.location_name = name.into();
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance;
        self
    }

    pub fn positive(mut self) -> Self {
        self.positive = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessEvent {
    pub id: Uuid,
    pub event_type: WitnessEventType,
    pub description: String,
    pub location: Position,
    pub location_name: String,
    pub target_npc_id: String,
    pub target_faction: String,
    pub importance: f32,
    pub positive: bool,
    /// Game seconds
    pub occurred_at: f64,
    pub original_witnesses: Vec<String>,
    pub informed: Vec<String>,
    pub expired: bool,
}

/// What one agent believes about one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventKnowledge {
    pub event_id: Uuid,
    /// "witnessed" or "heard from <agent>"
    pub source: String,
    pub accuracy: f32,
    pub opinion: f32,
    pub will_gossip: bool,
    pub share_count: u32,
}

impl Default for EventKnowledge {
    fn default() -> Self {
        Self {
            event_id: Uuid::nil(),
            source: String::new(),
            accuracy: 1.0,
            opinion: 0.0,
            will_gossip: true,
            share_count: 0,
        }
    }
}

/// Where an agent is this tick, and whose side it's on
#[derive(Debug, Clone, PartialEq)]
pub struct AgentPresence {
    pub id: String,
    pub faction: Option<String>,
    pub position: Position,
}

impl AgentPresence {
    pub fn new(id: impl Into<String>, position: Position) -> Self {
        Self {
            id: id.into(),
            faction: None,
            position,
        }
    }

    pub fn with_faction(mut self, faction: impl Into<String>) -> Self {
        self.faction = Some(faction.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WitnessNotice {
    Witnessed {
        event_id: Uuid,
        agent_id: String,
    },
    RumorSpread {
        event_id: Uuid,
        from: String,
        to: String,
        accuracy: f32,
    },
}

// ---------------------------------------------------------------------------
// WitnessLedger
// ---------------------------------------------------------------------------

/// Process-wide record of witnessed events and per-agent knowledge of them.
///
/// Events are kept in occurrence order; the oldest are dropped once
/// `max_tracked_events` is exceeded.
pub struct WitnessLedger {
    config: WitnessConfig,
    events: VecDeque<WitnessEvent>,
    knowledge: HashMap<String, HashMap<Uuid, EventKnowledge>>,
    rng: StdRng,
}

impl WitnessLedger {
    pub fn new(config: WitnessConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            events: VecDeque::new(),
            knowledge: HashMap::new(),
            rng,
        }
    }

    pub fn config(&self) -> &WitnessConfig {
        &self.config
    }

    /// Record an event and make every agent within the witness radius an
    /// eyewitness at full accuracy.
    pub fn record_event(
        &mut self,
        report: ReportedEvent,
        agents: &[AgentPresence],
        now: f64,
    ) -> (Uuid, Vec<WitnessNotice>) {
        let witnesses: Vec<&AgentPresence> = agents
            .iter()
            .filter(|a| a.position.distance(&report.location) <= self.config.witness_radius)
            .collect();

        let event = WitnessEvent {
            id: Uuid::new_v4(),
            event_type: report.event_type,
            description: report.description,
            location: report.location,
            location_name: report.location_name,
            target_npc_id: report.target_npc_id,
            target_faction: report.target_faction,
            importance: report.importance.clamp(0.0, 1.0),
            positive: report.positive,
            occurred_at: now,
            original_witnesses: witnesses.iter().map(|a| a.id.clone()).collect(),
            informed: Vec::new(),
            expired: false,
        };
        let event_id = event.id;
        self.events.push_back(event);

        let mut notices = Vec::with_capacity(witnesses.len());
        for witness in &witnesses {
            self.register(event_id, &witness.id, witness.faction.as_deref(), 1.0, "witnessed".to_string());
            notices.push(WitnessNotice::Witnessed {
                event_id,
                agent_id: witness.id.clone(),
            });
        }

        while self.events.len() > self.config.max_tracked_events {
            if let Some(old) = self.events.pop_front() {
                self.forget(&old.id);
            }
        }

        if let Some(event) = self.event(&event_id) {
            log::info!(
                "👁 Recorded event: {} (witnessed by {} NPCs)",
                event.description,
                witnesses.len()
            );
        }
        (event_id, notices)
    }

    fn register(&mut self, event_id: Uuid, agent_id: &str, faction: Option<&str>, accuracy: f32, source: String) {
        let Some(event) = self.events.iter_mut().find(|e| e.id == event_id) else {
            return;
        };

        let knowledge = EventKnowledge {
            event_id,
            source,
            accuracy,
            opinion: opinion_of(event, faction),
            will_gossip: self.rng.random::<f32>() < self.config.gossip_chance,
            share_count: 0,
        };

        if !event.informed.iter().any(|id| id == agent_id) {
            event.informed.push(agent_id.to_string());
        }
        self.knowledge
            .entry(agent_id.to_string())
            .or_default()
            .insert(event_id, knowledge);
    }

    fn forget(&mut self, event_id: &Uuid) {
        for known in self.knowledge.values_mut() {
            known.remove(event_id);
        }
    }

    pub fn event(&self, event_id: &Uuid) -> Option<&WitnessEvent> {
        self.events.iter().find(|e| e.id == *event_id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn does_know(&self, agent_id: &str, event_id: &Uuid) -> bool {
        self.knowledge
            .get(agent_id)
            .is_some_and(|known| known.contains_key(event_id))
    }

    /// Knowledge record, or the default record when the agent doesn't know
    pub fn knowledge(&self, agent_id: &str, event_id: &Uuid) -> EventKnowledge {
        self.knowledge
            .get(agent_id)
            .and_then(|known| known.get(event_id))
            .cloned()
            .unwrap_or_default()
    }

    /// False once the event is flagged or older than the memory duration at `now`
    fn is_live(&self, event: &WitnessEvent, now: f64) -> bool {
        !event.expired && now - event.occurred_at <= self.config.expiry_seconds()
    }

    /// Unexpired events the agent knows about at `now`, oldest first
    pub fn known_events(&self, agent_id: &str, now: f64) -> Vec<&WitnessEvent> {
        let Some(known) = self.knowledge.get(agent_id) else {
            return Vec::new();
        };
        self.events
            .iter()
            .filter(|e| self.is_live(e, now) && known.contains_key(&e.id))
            .collect()
    }

    /// Up to `max` events still unexpired at `now`, newest first
    pub fn recent_events(&self, max: usize, now: f64) -> Vec<&WitnessEvent> {
        let start = self.events.len().saturating_sub(max);
        self.events
            .iter()
            .skip(start)
            .rev()
            .filter(|e| self.is_live(e, now))
            .collect()
    }

    /// A line of gossip about the most important event the agent is still
    /// willing to talk about, or an empty string.
    pub fn gossip_for(&self, agent_id: &str, now: f64) -> String {
        let mut best: Option<&WitnessEvent> = None;
        for event in self.known_events(agent_id, now) {
            let knowledge = self.knowledge(agent_id, &event.id);
            if !knowledge.will_gossip || knowledge.share_count >= 3 {
                continue;
            }
            if best.map_or(true, |b| event.importance > b.importance) {
                best = Some(event);
            }
        }

        best.map(|event| format!("I heard that {}", event.description))
            .unwrap_or_default()
    }

    /// Summary of up to three known events for a dialogue prompt
    pub fn witness_context(&self, agent_id: &str, now: f64) -> String {
        let known = self.known_events(agent_id, now);
        if known.is_empty() {
            return String::new();
        }

        let mut context = String::from("This NPC knows about: ");
        for event in known.into_iter().take(3) {
            let accuracy = self.knowledge(agent_id, &event.id).accuracy;
            let certainty = if accuracy > 0.8 {
                "clearly saw"
            } else if accuracy > 0.5 {
                "heard about"
            } else {
                "vaguely heard"
            };
            context.push_str(&format!("[{} {}: {}] ", certainty, event.event_type, event.description));
        }
        context
    }

    /// Pass knowledge of one event from `from` to `to`, one hop worse.
    ///
    /// Does nothing if `from` doesn't know the event or `to` already does.
    pub fn spread_rumor(
        &mut self,
        event_id: &Uuid,
        from: &str,
        to: &str,
        to_faction: Option<&str>,
    ) -> Option<WitnessNotice> {
        if !self.does_know(from, event_id) || self.does_know(to, event_id) {
            return None;
        }

        let source_accuracy = self.knowledge(from, event_id).accuracy;
        let accuracy = (source_accuracy - self.config.accuracy_decay_per_hop).max(0.1);
        self.register(*event_id, to, to_faction, accuracy, format!("heard from {}", from));

        if let Some(known) = self.knowledge.get_mut(from).and_then(|k| k.get_mut(event_id)) {
            known.share_count += 1;
        }

        log::info!("🗣 Rumor spread: {} -> {} (accuracy: {:.2})", from, to, accuracy);
        Some(WitnessNotice::RumorSpread {
            event_id: *event_id,
            from: from.to_string(),
            to: to.to_string(),
            accuracy,
        })
    }

    /// One round of gossip between agents standing close enough to talk.
    ///
    /// Each ordered pair rolls once against `spread_chance`; a successful
    /// roll passes on at most one event.
    pub fn propagate(&mut self, agents: &[AgentPresence], now: f64) -> Vec<WitnessNotice> {
        let mut notices = Vec::new();

        for speaker in agents {
            for listener in agents {
                if speaker.id == listener.id {
                    continue;
                }
                if speaker.position.distance(&listener.position) >= self.config.conversation_distance {
                    continue;
                }
                if self.rng.random::<f32>() > self.config.spread_chance {
                    continue;
                }

                let candidate = self
                    .known_events(&speaker.id, now)
                    .into_iter()
                    .find(|event| {
                        !self.does_know(&listener.id, &event.id)
                            && self.knowledge(&speaker.id, &event.id).will_gossip
                    })
                    .map(|event| event.id);

                if let Some(event_id) = candidate {
                    notices.extend(self.spread_rumor(
                        &event_id,
                        &speaker.id,
                        &listener.id,
                        listener.faction.as_deref(),
                    ));
                }
            }
        }
        notices
    }

    /// Mark events past their lifetime as expired and drop those past twice
    /// that. Returns how many were dropped.
    pub fn cleanup(&mut self, now: f64) -> usize {
        let expiry = self.config.expiry_seconds();

        for event in self.events.iter_mut() {
            if !event.expired && now - event.occurred_at > expiry {
                event.expired = true;
            }
        }

        let (keep, purge): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(|e| !(e.expired && now - e.occurred_at > expiry * 2.0));
        self.events = keep;

        for event in &purge {
            self.forget(&event.id);
        }
        if !purge.is_empty() {
            log::debug!("Purged {} expired witness events", purge.len());
        }
        purge.len()
    }
}

fn opinion_of(event: &WitnessEvent, faction: Option<&str>) -> f32 {
    let mut opinion: f32 = if event.positive { 0.5 } else { -0.5 };

    if let Some(faction) = faction {
        if !event.target_faction.is_empty() && faction.eq_ignore_ascii_case(&event.target_faction) {
            opinion *= 2.0;
        }
    }

    match event.event_type {
        WitnessEventType::Murder => opinion = if event.positive { 0.2 } else { -0.9 },
        WitnessEventType::Help => opinion = 0.7,
        WitnessEventType::Theft => opinion = -0.6,
        _ => {}
    }
    opinion.clamp(-1.0, 1.0)
}

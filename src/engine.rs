use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::backstory::{Backstory, BackstoryGenerator, BackstoryRequest};
use crate::config::RuntimeConfig;
use crate::director::{alert_modifier_for_action, AlertTracker, DirectorBridge, Directive};
use crate::emotion::{ContagionSource, CoreEmotion, EmotionChange, EmotionEngine};
use crate::faction::{FactionGraph, ReputationChange};
use crate::lattice::{build_action, rank_candidates, ExpandedAction, ScoredAction};
use crate::llm::{HttpOrchestrator, OrchestratorClient};
use crate::memory::{ActionBias, Situation, TemporalMemory};
use crate::relationship::RelationshipBook;
use crate::session::DialogueSession;
use crate::storage::JsonStore;
use crate::traits::NpcStorage;
use crate::types::{DialogueEvent, Npc, NpcAction, NpcStatePayload, Position, Sentence};
use crate::witness::{AgentPresence, ReportedEvent, WitnessLedger, WitnessNotice};

/// Everything the engine keeps for one registered agent
pub struct AgentHandle {
    pub npc: Npc,
    pub memory: TemporalMemory,
    pub emotion: EmotionEngine,
    pub session: DialogueSession,
    pub backstory: Option<Backstory>,
    /// Hints sent when the backstory is first generated
    pub backstory_request: BackstoryRequest,
    pub position: Position,
    interacted: bool,
}

impl AgentHandle {
    pub fn situation(&self) -> Situation<'_> {
        Situation::from(&self.npc)
    }

    pub fn presence(&self) -> AgentPresence {
        let presence = AgentPresence::new(self.npc.id.clone(), self.position);
        match &self.npc.faction {
            Some(faction) => presence.with_faction(faction.clone()),
            None => presence,
        }
    }

    pub fn has_interacted(&self) -> bool {
        self.interacted
    }
}

/// Candidates for one conversational turn, best first, plus the action the
/// agent would pick on its own
#[derive(Debug, Clone)]
pub struct TurnPlan {
    pub action: ExpandedAction,
    pub candidates: Vec<ScoredAction>,
    pub biases: Vec<ActionBias>,
}

/// A locally chosen line for when the orchestrator can't answer
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackLine {
    pub action: ExpandedAction,
    pub sentence: Sentence,
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub emotion_changes: Vec<(String, EmotionChange)>,
    pub notices: Vec<WitnessNotice>,
    pub purged_events: usize,
}

/// The social simulation for every registered agent.
///
/// Owns the process-wide services (faction graph, witness ledger,
/// relationship book, alert level) and drives them from `tick` and the
/// dialogue calls. All mutation goes through `&mut self`.
pub struct NpcEngine {
    config: RuntimeConfig,
    client: Arc<dyn OrchestratorClient>,
    agents: BTreeMap<String, AgentHandle>,
    factions: FactionGraph,
    witnesses: WitnessLedger,
    relationships: RelationshipBook,
    backstories: BackstoryGenerator,
    director: Option<DirectorBridge>,
    alert: AlertTracker,
    /// Game time in seconds
    clock: f64,
}

impl NpcEngine {
    pub fn new(config: RuntimeConfig, client: Arc<dyn OrchestratorClient>) -> Self {
        let backstories = BackstoryGenerator::new(Arc::clone(&client), config.backstory.endpoint.clone());
        let director = (!config.director.endpoint.is_empty())
            .then(|| DirectorBridge::new(Arc::clone(&client), config.director.endpoint.clone()));

        Self {
            witnesses: WitnessLedger::new(config.witness.clone()),
            factions: FactionGraph::with_defaults(),
            relationships: RelationshipBook::new(),
            agents: BTreeMap::new(),
            alert: AlertTracker::default(),
            clock: 0.0,
            backstories,
            director,
            client,
            config,
        }
    }

    /// Create an engine talking to the configured HTTP orchestrator
    pub fn from_config(config: RuntimeConfig) -> Result<Self> {
        let client = HttpOrchestrator::from_config(&config.dialogue)?;
        Ok(Self::new(config, Arc::new(client)))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Game time in seconds since the engine started
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn factions(&self) -> &FactionGraph {
        &self.factions
    }

    pub fn factions_mut(&mut self) -> &mut FactionGraph {
        &mut self.factions
    }

    pub fn witnesses(&self) -> &WitnessLedger {
        &self.witnesses
    }

    pub fn relationships(&self) -> &RelationshipBook {
        &self.relationships
    }

    pub fn alert_level(&self) -> f32 {
        self.alert.level()
    }

    /// Store rooted at the configured save directory
    pub fn default_store(&self) -> JsonStore {
        JsonStore::new(&self.config.save_dir)
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Add an agent, replacing any previous one with the same id.
    ///
    /// A saved relationship restores affinity and relationship tag. Without
    /// one, an agent that starts at zero affinity inherits its faction's
    /// standing.
    pub fn register_agent(&mut self, mut npc: Npc, position: Position) -> &mut AgentHandle {
        if let Some(saved) = self.relationships.get(&npc.id) {
            npc.set_affinity(saved.affinity);
            npc.relationship = saved.relationship.clone();
        } else if npc.affinity() == 0.0 {
            if let Some(faction) = &npc.faction {
                npc.set_affinity(self.factions.affinity_from_faction(faction));
            }
        }

        let mut backstory_request = BackstoryRequest::new(npc.id.clone(), npc.name.clone()).with_mood(npc.mood.clone());
        if let Some(faction) = &npc.faction {
            backstory_request = backstory_request.with_faction(faction.clone());
        }

        log::info!("🧍 Registered agent {} ({})", npc.name, npc.id);
        let id = npc.id.clone();
        let handle = AgentHandle {
            memory: TemporalMemory::new(self.config.memory.clone()),
            emotion: EmotionEngine::new(self.config.emotion.clone()),
            session: DialogueSession::new(Arc::clone(&self.client), self.config.dialogue.tts_engine.clone()),
            backstory: None,
            backstory_request,
            position,
            interacted: false,
            npc,
        };
        match self.agents.entry(id) {
            Entry::Occupied(mut entry) => {
                entry.insert(handle);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(handle),
        }
    }

    pub fn agent(&self, agent_id: &str) -> Option<&AgentHandle> {
        self.agents.get(agent_id)
    }

    pub fn agent_mut(&mut self, agent_id: &str) -> Option<&mut AgentHandle> {
        self.agents.get_mut(agent_id)
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    /// Registered agents, then any extra presences from `world`
    fn presences(&self, world: &[AgentPresence]) -> Vec<AgentPresence> {
        let mut presences: Vec<AgentPresence> = self.agents.values().map(AgentHandle::presence).collect();
        presences.extend(world.iter().filter(|p| !self.agents.contains_key(&p.id)).cloned());
        presences
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Advance the simulation by `dt` seconds.
    ///
    /// `world` carries this tick's positions. Entries for registered agents
    /// move them; the rest take part in gossip as bystanders.
    pub fn tick(&mut self, dt: f32, world: &[AgentPresence]) -> TickReport {
        self.clock += f64::from(dt);
        let mut report = TickReport::default();

        for presence in world {
            if let Some(handle) = self.agents.get_mut(&presence.id) {
                handle.position = presence.position;
            }
        }

        for (id, handle) in self.agents.iter_mut() {
            if let Some(change) = handle.emotion.tick(dt) {
                log::debug!("{} emotion changed: {} -> {}", id, change.from, change.to);
                report.emotion_changes.push((id.clone(), change));
            }
        }

        if self.config.emotion.contagion_enabled && self.agents.len() > 1 {
            let sources: Vec<(String, ContagionSource)> = self
                .agents
                .iter()
                .map(|(id, handle)| {
                    let source = ContagionSource {
                        position: handle.position,
                        emotion: handle.emotion.current(),
                        influence: handle.emotion.config().contagion_influence,
                    };
                    (id.clone(), source)
                })
                .collect();

            for (id, handle) in self.agents.iter_mut() {
                let others: Vec<ContagionSource> = sources
                    .iter()
                    .filter(|(other, _)| other != id)
                    .map(|(_, source)| *source)
                    .collect();
                handle.emotion.apply_contagion(handle.position, &others);
            }
        }

        let presences = self.presences(world);
        report.notices = self.witnesses.propagate(&presences, self.clock);
        report.purged_events = self.witnesses.cleanup(self.clock);
        self.alert.decay(dt);

        report
    }

    // -----------------------------------------------------------------------
    // Decisions
    // -----------------------------------------------------------------------

    /// Rank what the agent could do next and build the top pick
    pub fn plan_turn(&self, agent_id: &str, player_signal: &str) -> Option<TurnPlan> {
        let handle = self.agents.get(agent_id)?;
        let situation = handle.situation();

        let biases = handle.memory.action_biases(situation, player_signal, self.clock);
        let candidates = rank_candidates(situation, &biases);
        let best = candidates.first()?.action.base;

        let bias = biases
            .iter()
            .find(|b| b.action == best)
            .map(|b| b.bias)
            .unwrap_or(0.0);
        let action = build_action(
            best,
            situation.affinity,
            bias,
            handle.memory.has_negative_memory(situation),
        );
        log::debug!("Planned turn for {}: {} ({} candidates)", agent_id, action, candidates.len());

        Some(TurnPlan {
            action,
            candidates,
            biases,
        })
    }

    /// Something to say without the orchestrator
    pub fn fallback_line(&self, agent_id: &str) -> Option<FallbackLine> {
        let plan = self.plan_turn(agent_id, "")?;

        let gossip = self.witnesses.gossip_for(agent_id, self.clock);
        let chatty = matches!(plan.action.base, NpcAction::Talk | NpcAction::Explain | NpcAction::Inquire);
        let text = if chatty && !gossip.is_empty() {
            gossip
        } else {
            canned_line(plan.action.base).to_string()
        };

        Some(FallbackLine {
            action: plan.action,
            sentence: Sentence {
                text,
                is_final: true,
                latency_ms: 0.0,
            },
        })
    }

    /// Remember how an action went for this agent in its current situation
    pub fn record_outcome(&mut self, agent_id: &str, action: NpcAction, outcome: f32, player_signal: &str) -> bool {
        let Some(handle) = self.agents.get_mut(agent_id) else {
            log::debug!("Ignoring outcome for unknown agent {}", agent_id);
            return false;
        };
        let situation = Situation::from(&handle.npc);
        handle.memory.record_outcome(action, outcome, situation, player_signal, self.clock);
        true
    }

    pub fn modify_reputation(&mut self, faction_id: &str, delta: f32) -> Vec<ReputationChange> {
        self.factions.modify_reputation(faction_id, delta)
    }

    /// Report a world event; registered agents and `world` bystanders in
    /// range become witnesses
    pub fn record_world_event(&mut self, report: ReportedEvent, world: &[AgentPresence]) -> (Uuid, Vec<WitnessNotice>) {
        let presences = self.presences(world);
        self.witnesses.record_event(report, &presences, self.clock)
    }

    // -----------------------------------------------------------------------
    // Dialogue
    // -----------------------------------------------------------------------

    /// Send the player's line to an agent. Returns `None` for unknown agents.
    ///
    /// The first interaction with an agent generates its backstory (or the
    /// fallback) before the utterance goes out.
    pub async fn send_utterance(&mut self, agent_id: &str, text: &str) -> Option<UnboundedReceiver<DialogueEvent>> {
        let Some(handle) = self.agents.get_mut(agent_id) else {
            log::warn!("No agent registered as {}", agent_id);
            return None;
        };

        if !handle.interacted {
            handle.interacted = true;
            if handle.backstory.is_none() {
                handle.backstory_request.current_mood = handle.npc.mood.clone();
                handle.backstory = Some(self.backstories.generate(&handle.backstory_request).await);
            }
        }

        let mut payload = NpcStatePayload::from_npc(&handle.npc);
        payload.dialogue_tone = handle.emotion.dialogue_tone();
        let mut context = handle
            .backstory
            .as_ref()
            .map(Backstory::dialogue_context)
            .unwrap_or_default();
        context.push_str(&self.witnesses.witness_context(agent_id, self.clock));
        payload.backstory_context = context;

        self.relationships
            .update_from_client(agent_id, handle.npc.affinity(), &handle.npc.relationship);

        Some(handle.session.send_utterance(text, payload))
    }

    /// Side effects of a dialogue event the caller pulled from the receiver.
    ///
    /// Meta pushes the alert level by the chosen action; each sentence nudges
    /// the agent's emotion toward what it is doing.
    pub fn apply_event(&mut self, agent_id: &str, event: &DialogueEvent) {
        let Some(handle) = self.agents.get_mut(agent_id) else {
            return;
        };

        match event {
            DialogueEvent::Meta(meta) => {
                let modifier = alert_modifier_for_action(meta.action);
                if modifier != 0.0 {
                    self.alert.add(modifier);
                    log::info!(
                        "NPC action {} -> alert modifier {:.1} (alert {:.1})",
                        meta.action,
                        modifier,
                        self.alert.level()
                    );
                }
            }
            DialogueEvent::Sentence(_) => match handle.session.last_action() {
                NpcAction::Attack | NpcAction::Threaten => handle.emotion.apply_stimulus(CoreEmotion::Anger, 0.5),
                NpcAction::Flee => handle.emotion.apply_stimulus(CoreEmotion::Fear, 0.5),
                NpcAction::Greet | NpcAction::Help => handle.emotion.apply_stimulus(CoreEmotion::Joy, 0.3),
                _ => {}
            },
            DialogueEvent::Error { message } => {
                log::error!("Dialogue with {} failed: {}", agent_id, message);
            }
            DialogueEvent::Complete | DialogueEvent::Cancelled => {}
        }
    }

    /// Report the alert state to the director and apply whatever it says
    pub async fn sync_director(&mut self) -> Result<Option<Directive>> {
        let Some(director) = &self.director else {
            return Ok(None);
        };

        let directive = director.request_directive(&self.alert.snapshot()).await?;
        if let Some(directive) = &directive {
            self.alert.add(directive.alert_delta());
        }
        Ok(directive)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub async fn save(&self, store: &dyn NpcStorage) -> Result<()> {
        let saves = self.agents.iter().map(|(id, handle)| async move {
            store.save_memory(id, &handle.memory.traces()).await?;
            store.save_emotion(id, &handle.emotion.snapshot()).await?;
            if let Some(backstory) = &handle.backstory {
                store.save_backstory(id, backstory).await?;
            }
            Ok::<(), anyhow::Error>(())
        });
        for result in join_all(saves).await {
            result?;
        }

        let mut book = self.relationships.clone();
        for (id, handle) in &self.agents {
            let record = book.get_or_create(id);
            record.affinity = handle.npc.affinity();
            record.relationship = handle.npc.relationship.clone();
        }
        book.faction_reputation = self.factions.export_reputation();
        book.save_timestamp = Utc::now();
        store.save_relationships(&self.config.save_slot, &book).await?;

        log::info!("💾 Saved {} agents to slot {}", self.agents.len(), self.config.save_slot);
        Ok(())
    }

    /// Restore saved state for every registered agent. Agents with nothing
    /// saved keep their current state.
    pub async fn load(&mut self, store: &dyn NpcStorage) -> Result<()> {
        if let Some(book) = store.load_relationships(&self.config.save_slot).await? {
            self.factions.import_reputation(&book.faction_reputation);
            self.relationships = book;
        }

        for (id, handle) in self.agents.iter_mut() {
            if let Some(traces) = store.load_memory(id).await? {
                handle.memory.restore(traces);
            }
            if let Some(snapshot) = store.load_emotion(id).await? {
                handle.emotion.restore(&snapshot);
            }
            if let Some(backstory) = store.load_backstory(id).await? {
                handle.backstory = Some(backstory);
            }
            if let Some(saved) = self.relationships.get(id) {
                handle.npc.set_affinity(saved.affinity);
                handle.npc.relationship = saved.relationship.clone();
            }
        }

        log::info!("📂 Loaded slot {} for {} agents", self.config.save_slot, self.agents.len());
        Ok(())
    }
}

fn canned_line(action: NpcAction) -> &'static str {
    match action {
        NpcAction::Greet => "Hey there!",
        NpcAction::Warn => "I'm warning you.",
        NpcAction::Threaten => "Don't test me.",
        NpcAction::Attack => "You asked for it!",
        NpcAction::Flee => "I'm getting out of here!",
        NpcAction::Agree | NpcAction::Accept => "Alright then.",
        NpcAction::Disagree | NpcAction::Refuse => "I don't think so.",
        NpcAction::Help => "I can help with that.",
        NpcAction::Trade => "Looking to trade?",
        NpcAction::Offer => "Here, take this.",
        NpcAction::Apologize => "Sorry about that.",
        NpcAction::Inquire | NpcAction::Request => "What do you want?",
        NpcAction::Explain | NpcAction::Answer => "Let me think...",
        NpcAction::Idle | NpcAction::Ignore => "...",
        NpcAction::Talk => "Well...",
    }
}

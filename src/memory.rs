use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::config::MemoryConfig;
use crate::types::{Npc, NpcAction};

/// The part of an agent's state that memory keys on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Situation<'a> {
    pub mood: &'a str,
    pub relationship: &'a str,
    pub affinity: f32,
}

impl<'a> Situation<'a> {
    pub fn new(mood: &'a str, relationship: &'a str, affinity: f32) -> Self {
        Self {
            mood,
            relationship,
            affinity,
        }
    }

    /// Positional key: affinity bucket, then mood and relationship slots.
    ///
    /// `bucket * 10000 + mood * 100 + relationship`, with each string folded
    /// into 0..100 so the parts can be compared without the original text.
    pub fn state_hash(&self) -> u32 {
        let bucket = ((self.affinity + 1.0) * 2.5).round().clamp(0.0, 5.0) as u32;
        bucket * 10_000 + slot(self.mood) * 100 + slot(self.relationship)
    }
}

impl<'a> From<&'a Npc> for Situation<'a> {
    fn from(npc: &'a Npc) -> Self {
        Self::new(&npc.mood, &npc.relationship, npc.affinity())
    }
}

/// FNV-1a folded into 0..100; stable across runs so saved traces stay comparable
fn slot(text: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in text.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash % 100
}

/// Similarity of two state keys in [0, 1]
pub fn state_similarity(a: u32, b: u32) -> f32 {
    if a == b {
        return 1.0;
    }

    let affinity_a = (a / 10_000) as f32;
    let affinity_b = (b / 10_000) as f32;
    let affinity_sim = 1.0 - (affinity_a - affinity_b).abs() / 5.0;
    let mood_sim = if (a / 100) % 100 == (b / 100) % 100 { 1.0 } else { 0.3 };
    let rel_sim = if a % 100 == b % 100 { 1.0 } else { 0.3 };

    affinity_sim * 0.4 + mood_sim * 0.3 + rel_sim * 0.3
}

/// Word-overlap similarity of two player signals; 0.5 when either is missing
pub fn signal_similarity(a: &str, b: &str) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.5;
    }
    if a == b {
        return 1.0;
    }

    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let words_a: Vec<&str> = a.split_whitespace().collect();
    let words_b: Vec<&str> = b.split_whitespace().collect();

    let matches = words_a.iter().filter(|w| words_b.contains(w)).count();
    let total = words_a.len().max(words_b.len());
    if total == 0 {
        0.5
    } else {
        matches as f32 / total as f32
    }
}

/// One remembered (context, action, outcome) triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTrace {
    pub state_hash: u32,
    pub action: NpcAction,
    /// -1.0 (went badly) to 1.0 (went well)
    pub outcome: f32,
    pub player_signal: String,
    /// Game time in seconds
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionBias {
    pub action: NpcAction,
    pub bias: f32,
    pub confidence: f32,
}

/// Bounded FIFO of outcome traces that turns similar past experience into
/// per-action biases.
#[derive(Debug, Clone)]
pub struct TemporalMemory {
    config: MemoryConfig,
    traces: VecDeque<MemoryTrace>,
}

impl TemporalMemory {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            traces: VecDeque::with_capacity(config.max_traces),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Remember how `action` turned out in `situation`. Outcome is clamped to [-1, 1].
    pub fn record_outcome(
        &mut self,
        action: NpcAction,
        outcome: f32,
        situation: Situation<'_>,
        player_signal: impl Into<String>,
        now: f64,
    ) {
        let trace = MemoryTrace {
            state_hash: situation.state_hash(),
            action,
            outcome: outcome.clamp(-1.0, 1.0),
            player_signal: player_signal.into(),
            timestamp: now,
        };
        log::debug!(
            "Memory recorded: action={}, outcome={:.2}, state={}",
            trace.action,
            trace.outcome,
            trace.state_hash
        );

        self.traces.push_back(trace);
        self.enforce_capacity();
    }

    /// Biases for every action with enough similar history.
    ///
    /// An empty `player_signal` compares on state alone; otherwise the
    /// signal overlap is blended in at 0.3 against 0.7 for state.
    pub fn action_biases(&self, situation: Situation<'_>, player_signal: &str, now: f64) -> Vec<ActionBias> {
        let current = situation.state_hash();
        // action -> (weighted outcome sum, weight sum)
        let mut totals: BTreeMap<NpcAction, (f32, f32)> = BTreeMap::new();

        for trace in self.traces.iter().rev() {
            let state_sim = state_similarity(current, trace.state_hash);
            let similarity = if player_signal.is_empty() {
                state_sim
            } else {
                state_sim * 0.7 + signal_similarity(player_signal, &trace.player_signal) * 0.3
            };
            if similarity < self.config.similarity_threshold {
                continue;
            }

            let age_minutes = ((now - trace.timestamp).max(0.0) / 60.0) as f32;
            let weight = similarity * self.config.recency_weight.powf(age_minutes);

            let entry = totals.entry(trace.action).or_insert((0.0, 0.0));
            entry.0 += trace.outcome * weight;
            entry.1 += weight;
        }

        totals
            .into_iter()
            .filter(|(_, (_, weight))| *weight >= 0.01)
            .map(|(action, (sum, weight))| ActionBias {
                action,
                bias: sum / weight,
                confidence: (weight / 3.0).min(1.0),
            })
            .filter(|bias| bias.confidence >= self.config.min_confidence)
            .collect()
    }

    /// Confidence-weighted bias for one action, or 0.0 without history
    pub fn action_bias(&self, action: NpcAction, situation: Situation<'_>, now: f64) -> f32 {
        self.action_biases(situation, "", now)
            .into_iter()
            .find(|b| b.action == action)
            .map(|b| b.bias * b.confidence)
            .unwrap_or(0.0)
    }

    /// Whether any of the last 10 traces went badly in a similar situation
    pub fn has_negative_memory(&self, situation: Situation<'_>) -> bool {
        let current = situation.state_hash();
        self.traces.iter().rev().take(10).any(|trace| {
            trace.outcome < -0.3
                && state_similarity(current, trace.state_hash) > self.config.similarity_threshold
        })
    }

    /// Up to `count` most recent traces, oldest first
    pub fn recent_traces(&self, count: usize) -> Vec<MemoryTrace> {
        let start = self.traces.len().saturating_sub(count);
        self.traces.iter().skip(start).cloned().collect()
    }

    pub fn traces(&self) -> Vec<MemoryTrace> {
        self.traces.iter().cloned().collect()
    }

    /// Replace the history with saved traces, keeping only the newest that fit
    pub fn restore(&mut self, traces: Vec<MemoryTrace>) {
        self.traces = traces.into();
        self.enforce_capacity();
    }

    pub fn clear(&mut self) {
        self.traces.clear();
        log::info!("Temporal memory cleared");
    }

    fn enforce_capacity(&mut self) {
        while self.traces.len() > self.config.max_traces {
            if let Some(evicted) = self.traces.pop_front() {
                log::debug!("Evicted memory trace for {}", evicted.action);
            }
        }
    }
}

impl Default for TemporalMemory {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn friendly() -> Situation<'static> {
        Situation::new("Happy", "Friend", 0.6)
    }

    #[test]
    fn empty_memory_has_no_biases() {
        let memory = TemporalMemory::default();
        assert!(memory.action_biases(friendly(), "", 0.0).is_empty());
        assert_eq!(memory.action_bias(NpcAction::Greet, friendly(), 0.0), 0.0);
    }

    #[test]
    fn single_matching_trace_yields_its_outcome() {
        let mut memory = TemporalMemory::default();
        memory.record_outcome(NpcAction::Greet, 0.8, friendly(), "", 0.0);

        let biases = memory.action_biases(friendly(), "", 60.0);
        assert_eq!(biases.len(), 1);
        assert_eq!(biases[0].action, NpcAction::Greet);
        assert!((biases[0].bias - 0.8).abs() < 1e-5);
        assert!((biases[0].confidence - 0.85 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn confidence_saturates_after_three_fresh_samples() {
        let mut memory = TemporalMemory::default();
        for _ in 0..4 {
            memory.record_outcome(NpcAction::Help, 0.5, friendly(), "", 10.0);
        }
        let biases = memory.action_biases(friendly(), "", 10.0);
        assert_eq!(biases[0].confidence, 1.0);
        assert!((memory.action_bias(NpcAction::Help, friendly(), 10.0) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn dissimilar_traces_are_ignored() {
        let mut memory = TemporalMemory::default();
        memory.record_outcome(NpcAction::Attack, -1.0, Situation::new("Angry", "Enemy", -0.9), "", 0.0);
        assert!(memory.action_biases(friendly(), "", 0.0).is_empty());
    }

    #[test]
    fn player_signal_is_blended_in_when_supplied() {
        let mut memory = TemporalMemory::default();
        memory.record_outcome(NpcAction::Trade, 1.0, friendly(), "wants to trade", 0.0);

        // 0.7 * 1.0 + 0.3 * 1.0
        let exact = memory.action_biases(friendly(), "wants to trade", 0.0);
        assert!((exact[0].confidence - 1.0 / 3.0).abs() < 1e-5);

        // 0.7 * 1.0 + 0.3 * (2 / 3)
        let partial = memory.action_biases(friendly(), "wants to fight", 0.0);
        assert!((partial[0].confidence - 0.9 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn fifo_capacity_evicts_oldest() {
        let config = MemoryConfig {
            max_traces: 3,
            ..MemoryConfig::default()
        };
        let mut memory = TemporalMemory::new(config);
        for (i, action) in [NpcAction::Greet, NpcAction::Warn, NpcAction::Trade, NpcAction::Help]
            .into_iter()
            .enumerate()
        {
            memory.record_outcome(action, 0.1, friendly(), "", i as f64);
        }

        let actions: Vec<_> = memory.traces().iter().map(|t| t.action).collect();
        assert_eq!(actions, vec![NpcAction::Warn, NpcAction::Trade, NpcAction::Help]);
        assert_eq!(memory.recent_traces(2).len(), 2);
        assert_eq!(memory.recent_traces(2)[1].action, NpcAction::Help);
    }

    #[test]
    fn outcome_is_clamped() {
        let mut memory = TemporalMemory::default();
        memory.record_outcome(NpcAction::Refuse, -4.0, friendly(), "", 0.0);
        assert_eq!(memory.traces()[0].outcome, -1.0);
    }

    #[test]
    fn negative_memory_only_looks_at_last_ten() {
        let mut memory = TemporalMemory::default();
        memory.record_outcome(NpcAction::Trade, -0.9, friendly(), "", 0.0);
        assert!(memory.has_negative_memory(friendly()));

        for i in 0..10 {
            memory.record_outcome(NpcAction::Greet, 0.4, friendly(), "", f64::from(i));
        }
        assert!(!memory.has_negative_memory(friendly()));
    }

    #[test]
    fn similarity_is_positional() {
        let a = Situation::new("Happy", "Friend", 0.6).state_hash();
        let b = Situation::new("Happy", "Friend", -1.0).state_hash();
        assert_eq!(state_similarity(a, a), 1.0);
        // bucket 4 vs 0 → 0.4 * 0.2 + 0.3 + 0.3
        assert!((state_similarity(a, b) - 0.68).abs() < 1e-5);
    }

    #[test]
    fn signal_similarity_edges() {
        assert_eq!(signal_similarity("", "hello"), 0.5);
        assert_eq!(signal_similarity("hi there", "hi there"), 1.0);
        assert_eq!(signal_similarity("Hi There", "hi friend"), 0.5);
    }

    #[test]
    fn restore_reapplies_capacity() {
        let mut source = TemporalMemory::default();
        for i in 0..5 {
            source.record_outcome(NpcAction::Talk, 0.0, friendly(), "", f64::from(i));
        }
        let mut small = TemporalMemory::new(MemoryConfig {
            max_traces: 2,
            ..MemoryConfig::default()
        });
        small.restore(source.traces());
        assert_eq!(small.len(), 2);
        assert_eq!(small.traces()[0].timestamp, 3.0);
    }
}

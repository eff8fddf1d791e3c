//! Action lattice: a base action expanded with intensity, compliance and
//! motive modifiers, plus the deterministic scoring used to rank candidates
//! before (or instead of) asking the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::memory::{ActionBias, Situation};
use crate::types::NpcAction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionIntensity {
    Subdued,
    #[default]
    Normal,
    Emphatic,
}

impl ActionIntensity {
    pub fn modifier(&self) -> &'static str {
        match self {
            ActionIntensity::Subdued => "hesitantly",
            ActionIntensity::Normal => "",
            ActionIntensity::Emphatic => "emphatically",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionCompliance {
    #[default]
    Full,
    Partial,
    Reluctant,
    Deferred,
}

impl ActionCompliance {
    pub fn modifier(&self) -> &'static str {
        match self {
            ActionCompliance::Full => "",
            ActionCompliance::Partial => "only partially",
            ActionCompliance::Reluctant => "reluctantly",
            ActionCompliance::Deferred => "promising to do so later",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionMotive {
    #[default]
    Sincere,
    Guarded,
    Calculated,
    Conflicted,
}

impl ActionMotive {
    pub fn modifier(&self) -> &'static str {
        match self {
            ActionMotive::Sincere => "",
            ActionMotive::Guarded => "guarded",
            ActionMotive::Calculated => "with ulterior motive",
            ActionMotive::Conflicted => "conflicted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedAction {
    pub base: NpcAction,
    pub intensity: ActionIntensity,
    pub compliance: ActionCompliance,
    pub motive: ActionMotive,
    pub qualifier: Option<String>,
}

impl ExpandedAction {
    pub fn simple(base: NpcAction) -> Self {
        Self {
            base,
            intensity: ActionIntensity::Normal,
            compliance: ActionCompliance::Full,
            motive: ActionMotive::Sincere,
            qualifier: None,
        }
    }

    pub fn hesitant(base: NpcAction) -> Self {
        Self {
            intensity: ActionIntensity::Subdued,
            qualifier: Some("with hesitation".to_string()),
            ..Self::simple(base)
        }
    }

    pub fn reluctant(base: NpcAction) -> Self {
        Self {
            compliance: ActionCompliance::Reluctant,
            motive: ActionMotive::Conflicted,
            ..Self::simple(base)
        }
    }

    pub fn calculated(base: NpcAction) -> Self {
        Self {
            motive: ActionMotive::Calculated,
            ..Self::simple(base)
        }
    }

    /// Doing `base` while leaning toward `inclination`
    pub fn conflicted(base: NpcAction, inclination: NpcAction) -> Self {
        Self {
            compliance: ActionCompliance::Partial,
            motive: ActionMotive::Conflicted,
            qualifier: Some(format!("while wanting to {}", inclination.as_str().to_lowercase())),
            ..Self::simple(base)
        }
    }

    /// e.g. "hesitantly Help, reluctantly (conflicted) with hesitation"
    pub fn to_prompt_hint(&self) -> String {
        let mut hint = self.base.as_str().to_string();

        let intensity = self.intensity.modifier();
        if !intensity.is_empty() {
            hint = format!("{} {}", intensity, hint);
        }
        let compliance = self.compliance.modifier();
        if !compliance.is_empty() {
            hint.push_str(", ");
            hint.push_str(compliance);
        }
        let motive = self.motive.modifier();
        if !motive.is_empty() {
            hint.push_str(&format!(" ({})", motive));
        }
        if let Some(qualifier) = self.qualifier.as_deref().filter(|q| !q.is_empty()) {
            hint.push(' ');
            hint.push_str(qualifier);
        }
        hint
    }
}

impl fmt::Display for ExpandedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_prompt_hint())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredAction {
    pub action: ExpandedAction,
    pub score: f32,
}

fn mood_contains(mood: &str, words: &[&str]) -> bool {
    let mood = mood.to_lowercase();
    words.iter().any(|w| mood.contains(w))
}

fn is_hostile_mood(mood: &str) -> bool {
    mood_contains(mood, &["hostile", "angry", "anger"])
}

fn is_wary_mood(mood: &str) -> bool {
    mood_contains(mood, &["fearful", "cautious"])
}

fn is_friendly_mood(mood: &str) -> bool {
    mood_contains(mood, &["friendly"])
}

fn is_positive_action(action: NpcAction) -> bool {
    matches!(
        action,
        NpcAction::Help | NpcAction::Greet | NpcAction::Offer | NpcAction::Agree
    )
}

/// Expand `base` from affinity and memory.
///
/// Rules run in a fixed order: affinity sets intensity; a negative memory
/// downgrades Normal to Subdued and makes the motive Guarded; then a strong
/// negative bias forces Reluctant/Conflicted, while a strong positive bias
/// only claims Sincere if the negative-memory rule didn't fire.
pub fn build_action(base: NpcAction, affinity: f32, bias: f32, has_negative_memory: bool) -> ExpandedAction {
    let mut action = ExpandedAction::simple(base);

    action.intensity = if affinity > 0.5 {
        ActionIntensity::Emphatic
    } else if affinity < -0.5 {
        ActionIntensity::Subdued
    } else {
        ActionIntensity::Normal
    };

    if has_negative_memory {
        if action.intensity == ActionIntensity::Normal {
            action.intensity = ActionIntensity::Subdued;
        }
        action.motive = ActionMotive::Guarded;
    }

    if bias < -0.3 {
        action.compliance = ActionCompliance::Reluctant;
        action.motive = ActionMotive::Conflicted;
    } else if bias > 0.3 && !has_negative_memory {
        action.motive = ActionMotive::Sincere;
    }

    action
}

/// Expand `base` from mood, relationship and remembered biases
pub fn apply_context_modifiers(base: NpcAction, situation: Situation<'_>, biases: &[ActionBias]) -> ExpandedAction {
    let mut action = ExpandedAction::simple(base);
    let bias = biases
        .iter()
        .find(|b| b.action == base)
        .map(|b| b.bias * b.confidence)
        .unwrap_or(0.0);

    if is_hostile_mood(situation.mood) {
        action.intensity = ActionIntensity::Emphatic;
        if matches!(base, NpcAction::Help | NpcAction::Offer) {
            action.motive = ActionMotive::Calculated;
        }
    } else if is_wary_mood(situation.mood) {
        action.intensity = ActionIntensity::Subdued;
        action.motive = ActionMotive::Guarded;
    }

    if situation.relationship.eq_ignore_ascii_case("enemy") {
        if matches!(base, NpcAction::Trade | NpcAction::Help) {
            action.compliance = ActionCompliance::Reluctant;
        }
    } else if situation.relationship.eq_ignore_ascii_case("stranger") && situation.affinity.abs() < 0.2 {
        action.motive = ActionMotive::Guarded;
    }

    if bias < -0.2 {
        action.compliance = ActionCompliance::Partial;
    }

    action
}

/// Every candidate worth considering in this situation
pub fn valid_actions(situation: Situation<'_>) -> Vec<ExpandedAction> {
    let affinity = situation.affinity;
    let mut bases = vec![NpcAction::Talk, NpcAction::Greet, NpcAction::Explain, NpcAction::Inquire];

    if affinity > 0.0 {
        bases.extend([NpcAction::Help, NpcAction::Offer, NpcAction::Agree]);
    }
    if affinity < 0.0 || is_hostile_mood(situation.mood) {
        bases.extend([NpcAction::Warn, NpcAction::Threaten, NpcAction::Disagree, NpcAction::Refuse]);
    }
    let relationship = situation.relationship;
    if relationship.eq_ignore_ascii_case("merchant") || relationship.eq_ignore_ascii_case("trader") {
        bases.push(NpcAction::Trade);
    }

    let mut actions = Vec::new();
    for base in bases {
        actions.push(ExpandedAction::simple(base));
        if affinity.abs() < 0.3 {
            actions.push(ExpandedAction::hesitant(base));
        }
        if affinity < 0.0 && matches!(base, NpcAction::Help | NpcAction::Trade) {
            actions.push(ExpandedAction::reluctant(base));
        }
    }
    actions
}

/// Deterministic fitness of `action` in [0, 1]
pub fn score_action(action: &ExpandedAction, mood: &str, affinity: f32) -> f32 {
    let positive = is_positive_action(action.base);
    let mut score = 0.5;

    if positive {
        score += affinity * 0.3;
    } else {
        score -= affinity * 0.2;
    }

    match action.intensity {
        ActionIntensity::Subdued if affinity < 0.0 => score += 0.1,
        ActionIntensity::Emphatic if affinity > 0.5 => score += 0.1,
        _ => {}
    }

    if (is_friendly_mood(mood) && positive) || (is_hostile_mood(mood) && !positive) {
        score += 0.15;
    }

    score.clamp(0.0, 1.0)
}

/// Score every valid candidate, nudge by confidence-weighted memory bias,
/// and sort best first. Equal scores keep enumeration order.
pub fn rank_candidates(situation: Situation<'_>, biases: &[ActionBias]) -> Vec<ScoredAction> {
    let mut ranked: Vec<ScoredAction> = valid_actions(situation)
        .into_iter()
        .map(|action| {
            let memory = biases
                .iter()
                .find(|b| b.action == action.base)
                .map(|b| b.bias * b.confidence)
                .unwrap_or(0.0);
            let score = score_action(&action, situation.mood, situation.affinity) + memory;
            ScoredAction { action, score }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

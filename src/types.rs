use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Represents a Non-Player Character's conversational identity and state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Npc {
    pub id: String,
    pub name: String,
    pub mood: String,
    pub relationship: String,
    affinity: f32,
    pub faction: Option<String>,
}

impl Npc {
    /// Creates a new NPC with neutral mood, stranger relationship and zero affinity
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mood: "Neutral".to_string(),
            relationship: "Stranger".to_string(),
            affinity: 0.0,
            faction: None,
        }
    }

    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        self.mood = mood.into();
        self
    }

    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = relationship.into();
        self
    }

    pub fn with_affinity(mut self, affinity: f32) -> Self {
        self.set_affinity(affinity);
        self
    }

    pub fn with_faction(mut self, faction: impl Into<String>) -> Self {
        self.faction = Some(faction.into());
        self
    }

    pub fn affinity(&self) -> f32 {
        self.affinity
    }

    /// Sets affinity, clamped to [-1, 1]
    pub fn set_affinity(&mut self, affinity: f32) {
        self.affinity = affinity.clamp(-1.0, 1.0);
    }

    pub fn adjust_affinity(&mut self, delta: f32) {
        self.set_affinity(self.affinity + delta);
    }
}

/// Closed catalog of actions an NPC can take in a conversational turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NpcAction {
    Greet,
    Warn,
    Idle,
    Flee,
    Attack,
    Trade,
    Offer,
    Talk,
    Apologize,
    Threaten,
    Explain,
    Answer,
    Inquire,
    Help,
    Request,
    Agree,
    Disagree,
    Accept,
    Refuse,
    Ignore,
}

impl NpcAction {
    pub const ALL: [NpcAction; 20] = [
        NpcAction::Greet,
        NpcAction::Warn,
        NpcAction::Idle,
        NpcAction::Flee,
        NpcAction::Attack,
        NpcAction::Trade,
        NpcAction::Offer,
        NpcAction::Talk,
        NpcAction::Apologize,
        NpcAction::Threaten,
        NpcAction::Explain,
        NpcAction::Answer,
        NpcAction::Inquire,
        NpcAction::Help,
        NpcAction::Request,
        NpcAction::Agree,
        NpcAction::Disagree,
        NpcAction::Accept,
        NpcAction::Refuse,
        NpcAction::Ignore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NpcAction::Greet => "Greet",
            NpcAction::Warn => "Warn",
            NpcAction::Idle => "Idle",
            NpcAction::Flee => "Flee",
            NpcAction::Attack => "Attack",
            NpcAction::Trade => "Trade",
            NpcAction::Offer => "Offer",
            NpcAction::Talk => "Talk",
            NpcAction::Apologize => "Apologize",
            NpcAction::Threaten => "Threaten",
            NpcAction::Explain => "Explain",
            NpcAction::Answer => "Answer",
            NpcAction::Inquire => "Inquire",
            NpcAction::Help => "Help",
            NpcAction::Request => "Request",
            NpcAction::Agree => "Agree",
            NpcAction::Disagree => "Disagree",
            NpcAction::Accept => "Accept",
            NpcAction::Refuse => "Refuse",
            NpcAction::Ignore => "Ignore",
        }
    }

    /// Parses an action name case-insensitively; anything unknown becomes `Talk`
    pub fn parse_lenient(text: &str) -> Self {
        text.parse().unwrap_or(NpcAction::Talk)
    }
}

impl FromStr for NpcAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        NpcAction::ALL
            .iter()
            .copied()
            .find(|action| action.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or(())
    }
}

impl fmt::Display for NpcAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision metadata the orchestrator sends ahead of any dialogue text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueMeta {
    pub player_signal: String,
    pub bandit_key: String,
    pub action: NpcAction,
    pub mode: String,
}

/// One sentence of streamed NPC dialogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub text: String,
    pub is_final: bool,
    pub latency_ms: f32,
}

/// Everything a dialogue session can report to its consumer, in delivery order.
///
/// `Complete`, `Error` and `Cancelled` are terminal: exactly one of them ends
/// every session that was started.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogueEvent {
    Meta(DialogueMeta),
    Sentence(Sentence),
    Complete,
    Error { message: String },
    Cancelled,
}

impl DialogueEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DialogueEvent::Complete | DialogueEvent::Error { .. } | DialogueEvent::Cancelled
        )
    }
}

/// Compact agent snapshot sent with every utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcStatePayload {
    pub npc_name: String,
    pub npc_id: String,
    pub affinity: f32,
    pub mood: String,
    pub relationship: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dialogue_tone: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub backstory_context: String,
}

impl NpcStatePayload {
    pub fn from_npc(npc: &Npc) -> Self {
        Self {
            npc_name: npc.name.clone(),
            npc_id: npc.id.clone(),
            affinity: npc.affinity(),
            mood: npc.mood.clone(),
            relationship: npc.relationship.clone(),
            dialogue_tone: String::new(),
            backstory_context: String::new(),
        }
    }
}

/// Body of the streaming dialogue POST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueRequest {
    pub user_input: String,
    pub npc_state: NpcStatePayload,
    pub tts_engine: String,
}

/// A point in world space, in engine units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affinity_is_clamped() {
        let mut npc = Npc::new("npc_001", "Mara").with_affinity(3.0);
        assert_eq!(npc.affinity(), 1.0);
        npc.adjust_affinity(-5.0);
        assert_eq!(npc.affinity(), -1.0);
    }

    #[test]
    fn action_parsing_is_case_insensitive_with_talk_fallback() {
        assert_eq!(NpcAction::parse_lenient("greet"), NpcAction::Greet);
        assert_eq!(NpcAction::parse_lenient("THREATEN"), NpcAction::Threaten);
        assert_eq!(NpcAction::parse_lenient(" Trade "), NpcAction::Trade);
        assert_eq!(NpcAction::parse_lenient("dance"), NpcAction::Talk);
    }

    #[test]
    fn request_serializes_expected_shape() {
        let npc = Npc::new("npc_001", "Mara").with_affinity(0.25);
        let request = DialogueRequest {
            user_input: "hello".into(),
            npc_state: NpcStatePayload::from_npc(&npc),
            tts_engine: "piper".into(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["user_input"], "hello");
        assert_eq!(value["npc_state"]["npc_id"], "npc_001");
        assert_eq!(value["npc_state"]["relationship"], "Stranger");
        assert!(value["npc_state"].get("dialogue_tone").is_none());
        assert_eq!(value["tts_engine"], "piper");
    }
}

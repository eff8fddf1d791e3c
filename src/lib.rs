//! # NPC Social Core
//!
//! The decision core behind conversational NPCs: what an NPC says and does,
//! independent of rendering, audio or navigation.
//!
//! ## Features
//!
//! - **Streaming Dialogue**: One in-flight request per agent, decoded line by line from a `data:` event stream
//! - **Temporal Memory**: Bounded outcome history turned into per-action biases
//! - **Witnesses & Rumors**: World events seen by nearby agents and passed on with decaying accuracy
//! - **Emotion Blending**: Continuous valence/arousal/dominance affect with facial and voice readouts
//! - **Faction Reputation**: Ally/enemy graph with one-hop reputation propagation
//! - **Action Lattice**: Modifier-expanded candidate actions with deterministic scoring
//! - **Backstories & Director**: Generated agent backgrounds and pacing hooks, with local fallbacks
//!
//! ## Example
//!
//! ```rust,no_run
//! use npc_social_core::{NpcEngine, Npc, Position, RuntimeConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RuntimeConfig::load("runtime.json")?;
//! let mut engine = NpcEngine::from_config(config)?;
//! engine.register_agent(Npc::new("npc_mara", "Mara").with_faction("survivors"), Position::default());
//!
//! // Stream a reply, feeding each event back into the simulation
//! if let Some(mut events) = engine.send_utterance("npc_mara", "Any news?").await {
//!     while let Some(event) = events.recv().await {
//!         engine.apply_event("npc_mara", &event);
//!         if event.is_terminal() {
//!             break;
//!         }
//!     }
//! }
//!
//! // Advance the world
//! engine.tick(0.1, &[]);
//! # Ok(())
//! # }
//! ```

pub mod backstory;
pub mod config;
pub mod director;
pub mod emotion;
pub mod engine;
pub mod error;
pub mod faction;
pub mod lattice;
pub mod llm;
pub mod memory;
pub mod parser;
pub mod relationship;
pub mod session;
pub mod storage;
pub mod traits;
pub mod types;
pub mod witness;

// Re-export main types for convenience
pub use backstory::{Backstory, BackstoryElement, BackstoryGenerator, BackstoryRequest};
pub use config::RuntimeConfig;
pub use director::{AlertTracker, DirectorBridge, DirectorSnapshot, Directive};
pub use emotion::{CoreEmotion, EmotionAxis, EmotionEngine, FacialExpression};
pub use engine::{AgentHandle, FallbackLine, NpcEngine, TickReport, TurnPlan};
pub use error::RuntimeError;
pub use faction::{Faction, FactionGraph, ReputationTier};
pub use lattice::{ActionCompliance, ActionIntensity, ActionMotive, ExpandedAction, ScoredAction};
pub use llm::{HttpOrchestrator, OrchestratorClient};
pub use memory::{ActionBias, MemoryTrace, Situation, TemporalMemory};
pub use parser::StreamParser;
pub use relationship::{NpcRelationship, RelationshipBook};
pub use session::{DialogueSession, SessionState};
pub use storage::JsonStore;
pub use traits::NpcStorage;
pub use types::{
    DialogueEvent, DialogueMeta, DialogueRequest, Npc, NpcAction, NpcStatePayload, Position, Sentence,
};
pub use witness::{AgentPresence, ReportedEvent, WitnessEventType, WitnessLedger, WitnessNotice};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use anyhow::Result;
use async_trait::async_trait;

use crate::backstory::Backstory;
use crate::emotion::EmotionSnapshot;
use crate::memory::MemoryTrace;
use crate::relationship::RelationshipBook;

/// Trait for loading and saving per-agent state.
///
/// Loads return `Ok(None)` when nothing has been saved yet.
#[async_trait]
pub trait NpcStorage: Send + Sync {
    /// Loads the memory traces for an agent, oldest first
    async fn load_memory(&self, npc_id: &str) -> Result<Option<Vec<MemoryTrace>>>;

    async fn save_memory(&self, npc_id: &str, traces: &[MemoryTrace]) -> Result<()>;

    async fn load_backstory(&self, npc_id: &str) -> Result<Option<Backstory>>;

    async fn save_backstory(&self, npc_id: &str, backstory: &Backstory) -> Result<()>;

    async fn load_emotion(&self, npc_id: &str) -> Result<Option<EmotionSnapshot>>;

    async fn save_emotion(&self, npc_id: &str, snapshot: &EmotionSnapshot) -> Result<()>;

    /// Loads the relationship book saved under a slot name
    async fn load_relationships(&self, slot: &str) -> Result<Option<RelationshipBook>>;

    async fn save_relationships(&self, slot: &str, book: &RelationshipBook) -> Result<()>;

    /// Lists every agent with saved memory
    async fn list_npcs(&self) -> Result<Vec<String>>;
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::backstory::Backstory;
use crate::emotion::EmotionSnapshot;
use crate::memory::MemoryTrace;
use crate::relationship::RelationshipBook;
use crate::traits::NpcStorage;

/// One JSON document per agent and kind, plus one per save slot:
///
/// ```text
/// <root>/memory/<npc_id>.json
/// <root>/backstory/<npc_id>.json
/// <root>/emotion/<npc_id>.json
/// <root>/slots/<slot>.json
/// ```
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, kind: &str, key: &str) -> PathBuf {
        self.root.join(kind).join(format!("{}.json", sanitize(key)))
    }

    async fn read<T: DeserializeOwned>(&self, path: PathBuf) -> Result<Option<T>> {
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("Nothing saved at {:?}", path);
                return Ok(None);
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };

        let value = serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?;
        log::info!("Loaded {:?}", path);
        Ok(Some(value))
    }

    async fn write<T: Serialize + ?Sized>(&self, path: PathBuf, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        log::info!("💾 Saved {:?}", path);
        Ok(())
    }
}

/// Keep ids usable as file names
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait]
impl NpcStorage for JsonStore {
    async fn load_memory(&self, npc_id: &str) -> Result<Option<Vec<MemoryTrace>>> {
        self.read(self.path("memory", npc_id)).await
    }

    async fn save_memory(&self, npc_id: &str, traces: &[MemoryTrace]) -> Result<()> {
        self.write(self.path("memory", npc_id), traces).await
    }

    async fn load_backstory(&self, npc_id: &str) -> Result<Option<Backstory>> {
        self.read(self.path("backstory", npc_id)).await
    }

    async fn save_backstory(&self, npc_id: &str, backstory: &Backstory) -> Result<()> {
        self.write(self.path("backstory", npc_id), backstory).await
    }

    async fn load_emotion(&self, npc_id: &str) -> Result<Option<EmotionSnapshot>> {
        self.read(self.path("emotion", npc_id)).await
    }

    async fn save_emotion(&self, npc_id: &str, snapshot: &EmotionSnapshot) -> Result<()> {
        self.write(self.path("emotion", npc_id), snapshot).await
    }

    async fn load_relationships(&self, slot: &str) -> Result<Option<RelationshipBook>> {
        self.read(self.path("slots", slot)).await
    }

    async fn save_relationships(&self, slot: &str, book: &RelationshipBook) -> Result<()> {
        self.write(self.path("slots", slot), book).await
    }

    async fn list_npcs(&self) -> Result<Vec<String>> {
        let dir = self.root.join("memory");
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to list {:?}", dir)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NpcAction;

    #[tokio::test]
    async fn missing_documents_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());

        assert!(store.load_memory("nobody").await.unwrap().is_none());
        assert!(store.load_backstory("nobody").await.unwrap().is_none());
        assert!(store.load_relationships("slot").await.unwrap().is_none());
        assert!(store.list_npcs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let traces = vec![MemoryTrace {
            state_hash: 30_512,
            action: NpcAction::Trade,
            outcome: 0.5,
            player_signal: "fair price".to_string(),
            timestamp: 12.0,
        }];

        store.save_memory("npc_b", &traces).await.unwrap();
        store.save_memory("npc_a", &[]).await.unwrap();

        assert_eq!(store.load_memory("npc_b").await.unwrap(), Some(traces));
        assert_eq!(store.list_npcs().await.unwrap(), vec!["npc_a", "npc_b"]);
        assert!(dir.path().join("memory").join("npc_b.json").exists());
    }

    #[tokio::test]
    async fn corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("emotion")).unwrap();
        std::fs::write(dir.path().join("emotion").join("npc_a.json"), "{oops").unwrap();

        assert!(store.load_emotion("npc_a").await.is_err());
    }

    #[test]
    fn ids_become_safe_file_names() {
        assert_eq!(sanitize("npc/../x y"), "npc____x_y");
        assert_eq!(sanitize("Guard_01-b"), "Guard_01-b");
    }
}

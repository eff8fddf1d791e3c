use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level runtime configuration. Every section falls back to its defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub dialogue: DialogueConfig,
    pub backstory: BackstoryConfig,
    pub director: DirectorConfig,
    pub memory: MemoryConfig,
    pub witness: WitnessConfig,
    pub emotion: EmotionConfig,
    pub save_dir: PathBuf,
    pub save_slot: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dialogue: DialogueConfig::default(),
            backstory: BackstoryConfig::default(),
            director: DirectorConfig::default(),
            memory: MemoryConfig::default(),
            witness: WitnessConfig::default(),
            emotion: EmotionConfig::default(),
            save_dir: PathBuf::from("saved"),
            save_slot: "RfsnRelationships".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file, using defaults if it doesn't exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        log::debug!("Loading runtime config from: {:?}", path);
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse config {:?}", path))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    pub endpoint: String,
    pub tts_engine: String,
    /// Zero disables the timeout
    pub request_timeout_ms: u64,
}

impl DialogueConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/api/dialogue/stream".to_string(),
            tts_engine: "piper".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackstoryConfig {
    pub endpoint: String,
}

impl Default for BackstoryConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/api/backstory/generate".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    pub endpoint: String,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/api/director/control".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_traces: usize,
    /// Per-minute decay factor applied to older traces
    pub recency_weight: f32,
    pub min_confidence: f32,
    pub similarity_threshold: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_traces: 50,
            recency_weight: 0.85,
            min_confidence: 0.2,
            similarity_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WitnessConfig {
    pub witness_radius: f32,
    pub conversation_distance: f32,
    pub spread_chance: f32,
    pub accuracy_decay_per_hop: f32,
    pub gossip_chance: f32,
    /// Game hours before an event is forgotten
    pub memory_duration_hours: f32,
    pub max_tracked_events: usize,
    /// Fixed RNG seed for reproducible gossip rolls
    pub seed: Option<u64>,
}

impl WitnessConfig {
    pub fn expiry_seconds(&self) -> f64 {
        f64::from(self.memory_duration_hours) * 3600.0
    }
}

impl Default for WitnessConfig {
    fn default() -> Self {
        Self {
            witness_radius: 1500.0,
            conversation_distance: 500.0,
            spread_chance: 0.1,
            accuracy_decay_per_hop: 0.15,
            gossip_chance: 0.7,
            memory_duration_hours: 72.0,
            max_tracked_events: 100,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    pub blend_speed: f32,
    pub inertia: f32,
    pub decay_rate: f32,
    pub expression_intensity: f32,
    pub contagion_enabled: bool,
    pub contagion_radius: f32,
    pub contagion_susceptibility: f32,
    pub contagion_influence: f32,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            blend_speed: 2.0,
            inertia: 0.3,
            decay_rate: 0.1,
            expression_intensity: 1.0,
            contagion_enabled: true,
            contagion_radius: 500.0,
            contagion_susceptibility: 0.3,
            contagion_influence: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = RuntimeConfig::load("/definitely/not/here.json").unwrap();
        assert_eq!(config.memory.max_traces, 50);
        assert_eq!(config.witness.witness_radius, 1500.0);
        assert_eq!(config.dialogue.tts_engine, "piper");
    }

    #[test]
    fn partial_file_fills_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.json");
        fs::write(&path, r#"{"memory": {"max_traces": 8}, "save_slot": "slot_a"}"#).unwrap();

        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.memory.max_traces, 8);
        assert_eq!(config.memory.recency_weight, 0.85);
        assert_eq!(config.save_slot, "slot_a");
        assert_eq!(config.emotion.blend_speed, 2.0);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.json");
        fs::write(&path, "{not json").unwrap();
        assert!(RuntimeConfig::load(&path).is_err());
    }

    #[test]
    fn zero_timeout_disables_it() {
        let mut dialogue = DialogueConfig::default();
        assert_eq!(dialogue.request_timeout(), Some(Duration::from_secs(30)));
        dialogue.request_timeout_ms = 0;
        assert_eq!(dialogue.request_timeout(), None);
    }
}

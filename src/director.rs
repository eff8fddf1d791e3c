use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::llm::OrchestratorClient;
use crate::types::NpcAction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntensityState {
    #[default]
    Passive,
    Alerted,
    Hostile,
    Overwhelmed,
}

/// Game pacing state reported upstream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectorSnapshot {
    pub alert_level: f32,
    /// Normalized to [0, 1]
    pub intensity: f32,
    pub intensity_state: IntensityState,
    pub can_use_tower: bool,
    pub can_transmit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectorCommand {
    SpawnHorde,
    Escalate,
    Respite,
}

impl DirectorCommand {
    pub fn parse(command: &str) -> Option<Self> {
        match command {
            "spawn_horde" => Some(DirectorCommand::SpawnHorde),
            "escalate" => Some(DirectorCommand::Escalate),
            "respite" => Some(DirectorCommand::Respite),
            _ => None,
        }
    }

    pub fn alert_delta(&self) -> f32 {
        match self {
            DirectorCommand::SpawnHorde => 25.0,
            DirectorCommand::Escalate => 15.0,
            DirectorCommand::Respite => 0.0,
        }
    }
}

/// What the director asked for in one reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directive {
    pub command: Option<DirectorCommand>,
    pub alert_modifier: f32,
}

impl Directive {
    pub fn from_json(value: &Value) -> Self {
        Self {
            command: value
                .get("command")
                .and_then(Value::as_str)
                .and_then(DirectorCommand::parse),
            alert_modifier: value
                .get("alert_modifier")
                .and_then(Value::as_f64)
                .unwrap_or(0.0) as f32,
        }
    }

    /// Combined alert change from the command and the explicit modifier
    pub fn alert_delta(&self) -> f32 {
        self.command.map(|c| c.alert_delta()).unwrap_or(0.0) + self.alert_modifier
    }
}

/// Island-wide alert level in [0, 100] that NPC actions and the director push around
#[derive(Debug, Clone, PartialEq)]
pub struct AlertTracker {
    level: f32,
    /// Points lost per second
    pub decay_rate: f32,
    pub min_alert_for_tower: f32,
    pub min_alert_for_transmit: f32,
}

impl Default for AlertTracker {
    fn default() -> Self {
        Self {
            level: 0.0,
            decay_rate: 5.0,
            min_alert_for_tower: 30.0,
            min_alert_for_transmit: 50.0,
        }
    }
}

impl AlertTracker {
    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn add(&mut self, amount: f32) {
        self.level = (self.level + amount).clamp(0.0, 100.0);
    }

    pub fn decay(&mut self, dt: f32) {
        self.level = (self.level - self.decay_rate * dt).max(0.0);
    }

    pub fn intensity_state(&self) -> IntensityState {
        if self.level >= 90.0 {
            IntensityState::Overwhelmed
        } else if self.level >= 60.0 {
            IntensityState::Hostile
        } else if self.level >= 30.0 {
            IntensityState::Alerted
        } else {
            IntensityState::Passive
        }
    }

    pub fn snapshot(&self) -> DirectorSnapshot {
        DirectorSnapshot {
            alert_level: self.level,
            intensity: self.level / 100.0,
            intensity_state: self.intensity_state(),
            can_use_tower: self.level >= self.min_alert_for_tower,
            can_transmit: self.level >= self.min_alert_for_transmit,
        }
    }
}

/// Alert-level nudge caused by an agent's chosen action
pub fn alert_modifier_for_action(action: NpcAction) -> f32 {
    match action {
        NpcAction::Attack | NpcAction::Threaten => 10.0,
        NpcAction::Warn | NpcAction::Flee => 5.0,
        NpcAction::Greet | NpcAction::Help | NpcAction::Trade | NpcAction::Agree => -2.0,
        NpcAction::Apologize => -5.0,
        _ => 0.0,
    }
}

pub struct DirectorBridge {
    client: Arc<dyn OrchestratorClient>,
    endpoint: String,
}

impl DirectorBridge {
    pub fn new(client: Arc<dyn OrchestratorClient>, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Post the snapshot and read back a directive.
    ///
    /// The director service is optional, so an unreachable service or a
    /// non-200 reply is `Ok(None)` rather than an error.
    pub async fn request_directive(&self, snapshot: &DirectorSnapshot) -> Result<Option<Directive>, RuntimeError> {
        let body = serde_json::to_value(snapshot)?;
        log::debug!(
            "Sent director state: alert={:.1}, intensity={:?}",
            snapshot.alert_level,
            snapshot.intensity_state
        );

        match self.client.post_json(&self.endpoint, &body).await {
            Ok(reply) => {
                let directive = Directive::from_json(&reply);
                if let Some(command) = directive.command {
                    log::info!("🎬 Director command: {:?}", command);
                }
                Ok(Some(directive))
            }
            Err(e) => {
                log::debug!("Director unavailable: {}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockOrchestrator;
    use serde_json::json;

    #[tokio::test]
    async fn reads_command_and_modifier() {
        let mock = Arc::new(MockOrchestrator::with_json(vec![Ok(json!({
            "command": "spawn_horde",
            "alert_modifier": -5.0
        }))]));
        let bridge = DirectorBridge::new(mock.clone(), "http://director");

        let snapshot = DirectorSnapshot {
            alert_level: 40.0,
            intensity: 0.4,
            intensity_state: IntensityState::Alerted,
            can_use_tower: true,
            can_transmit: false,
        };
        let directive = bridge.request_directive(&snapshot).await.unwrap().unwrap();
        assert_eq!(directive.command, Some(DirectorCommand::SpawnHorde));
        assert_eq!(directive.alert_delta(), 20.0);

        let posts = mock.posts.lock().unwrap();
        assert_eq!(posts[0].1["intensity_state"], "alerted");
        assert_eq!(posts[0].1["can_use_tower"], true);
    }

    #[tokio::test]
    async fn failures_are_silent() {
        let mock = Arc::new(MockOrchestrator::with_json(vec![Err(RuntimeError::ServerError {
            status: 503,
            body: "down".to_string(),
        })]));
        let bridge = DirectorBridge::new(mock, "http://director");
        assert_eq!(bridge.request_directive(&DirectorSnapshot::default()).await.unwrap(), None);
    }

    #[test]
    fn unknown_command_is_ignored() {
        let directive = Directive::from_json(&json!({"command": "dance"}));
        assert_eq!(directive, Directive::default());
        assert_eq!(Directive::from_json(&json!({"command": "escalate"})).alert_delta(), 15.0);
        assert_eq!(Directive::from_json(&json!({"command": "respite"})).alert_delta(), 0.0);
    }

    #[test]
    fn alert_tracker_thresholds() {
        let mut alert = AlertTracker::default();
        alert.add(-10.0);
        assert_eq!(alert.level(), 0.0);

        alert.add(35.0);
        let snapshot = alert.snapshot();
        assert_eq!(snapshot.intensity_state, IntensityState::Alerted);
        assert!(snapshot.can_use_tower);
        assert!(!snapshot.can_transmit);

        alert.add(200.0);
        assert_eq!(alert.level(), 100.0);
        assert_eq!(alert.intensity_state(), IntensityState::Overwhelmed);

        alert.decay(4.0);
        assert_eq!(alert.level(), 80.0);
        assert_eq!(alert.intensity_state(), IntensityState::Hostile);
    }

    #[test]
    fn action_modifiers() {
        assert_eq!(alert_modifier_for_action(NpcAction::Attack), 10.0);
        assert_eq!(alert_modifier_for_action(NpcAction::Flee), 5.0);
        assert_eq!(alert_modifier_for_action(NpcAction::Trade), -2.0);
        assert_eq!(alert_modifier_for_action(NpcAction::Apologize), -5.0);
        assert_eq!(alert_modifier_for_action(NpcAction::Explain), 0.0);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::llm::OrchestratorClient;

/// One tagged fact about an agent's past
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackstoryElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub description: String,
    #[serde(default)]
    pub importance: f32,
    #[serde(rename = "public", default)]
    pub public_knowledge: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BackstoryElement {
    pub fn new(element_type: impl Into<String>, description: impl Into<String>, importance: f32) -> Self {
        Self {
            element_type: element_type.into(),
            description: description.into(),
            importance,
            public_knowledge: true,
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Generated background for one agent. Version 0 marks the local fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backstory {
    pub npc_id: String,
    pub summary: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub faction_history: String,
    #[serde(default)]
    pub personal_goal: String,
    #[serde(default)]
    pub fear: String,
    #[serde(rename = "secret", default)]
    pub secret_or_shame: String,
    #[serde(rename = "trait", default)]
    pub distinguishing_trait: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub elements: Vec<BackstoryElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

impl Backstory {
    pub fn is_fallback(&self) -> bool {
        self.version == 0
    }

    /// Multi-line context block for the dialogue request
    pub fn dialogue_context(&self) -> String {
        let mut context = format!(
            "Background: {}\nOccupation: {}\nGoal: {}\nFear: {}\n",
            self.summary, self.occupation, self.personal_goal, self.fear
        );
        for element in &self.elements {
            if element.public_knowledge && element.importance > 0.5 {
                context.push_str(&format!("{}: {}\n", element.element_type, element.description));
            }
        }
        context
    }

    pub fn short_context(&self) -> String {
        format!(
            "A {} who is known for being {}.",
            self.occupation, self.distinguishing_trait
        )
    }

    /// Description of the first element of this type, case-insensitive
    pub fn element_by_type(&self, element_type: &str) -> Option<&str> {
        self.elements
            .iter()
            .find(|e| e.element_type.eq_ignore_ascii_case(element_type))
            .map(|e| e.description.as_str())
    }

    pub fn elements_by_tag(&self, tag: &str) -> Vec<&BackstoryElement> {
        self.elements
            .iter()
            .filter(|e| e.tags.iter().any(|t| t == tag))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackstoryRequest {
    pub npc_id: String,
    pub npc_name: String,
    pub faction_id: String,
    pub hint: String,
    pub occupation: String,
    pub current_mood: String,
    pub personality_traits: Vec<String>,
    pub summary_paragraphs: u32,
}

impl BackstoryRequest {
    pub fn new(npc_id: impl Into<String>, npc_name: impl Into<String>) -> Self {
        Self {
            npc_id: npc_id.into(),
            npc_name: npc_name.into(),
            faction_id: "survivors".to_string(),
            hint: String::new(),
            occupation: String::new(),
            current_mood: "Neutral".to_string(),
            personality_traits: Vec::new(),
            summary_paragraphs: 2,
        }
    }

    pub fn with_faction(mut self, faction_id: impl Into<String>) -> Self {
        self.faction_id = faction_id.into();
        self
    }

    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        self.current_mood = mood.into();
        self
    }

    pub fn with_occupation(mut self, occupation: impl Into<String>) -> Self {
        self.occupation = occupation.into();
        self
    }

    pub fn with_trait(mut self, personality_trait: impl Into<String>) -> Self {
        self.personality_traits.push(personality_trait.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }
}

/// Asks the orchestrator for a backstory, falling back to a canned one
pub struct BackstoryGenerator {
    client: Arc<dyn OrchestratorClient>,
    endpoint: String,
}

impl BackstoryGenerator {
    pub fn new(client: Arc<dyn OrchestratorClient>, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Never fails: any transport or parse problem yields the fallback
    pub async fn generate(&self, request: &BackstoryRequest) -> Backstory {
        log::info!("Sending backstory generation request for {}", request.npc_id);

        let mut backstory = match self.request(request).await {
            Ok(backstory) => backstory,
            Err(e) => {
                log::error!("Backstory generation failed for {} ({}), using fallback", request.npc_id, e);
                fallback_backstory(request)
            }
        };
        backstory.generated_at = Some(Utc::now());

        let preview: String = backstory.summary.chars().take(100).collect();
        log::info!("Backstory generated for {}: {}", backstory.npc_id, preview);
        backstory
    }

    async fn request(&self, request: &BackstoryRequest) -> Result<Backstory, RuntimeError> {
        let body = serde_json::to_value(request)?;
        let response = self.client.post_json(&self.endpoint, &body).await?;
        parse_backstory(response)
    }
}

/// A response without a summary is treated as unparseable
pub fn parse_backstory(value: serde_json::Value) -> Result<Backstory, RuntimeError> {
    let backstory: Backstory = serde_json::from_value(value)?;
    if backstory.summary.trim().is_empty() {
        return Err(RuntimeError::ProtocolParse("backstory response has no summary".to_string()));
    }
    Ok(backstory)
}

/// Deterministic two-paragraph backstory used when the service is unreachable
pub fn fallback_backstory(request: &BackstoryRequest) -> Backstory {
    let name = if request.npc_name.is_empty() {
        "This person"
    } else {
        request.npc_name.as_str()
    };
    let occupation = if request.occupation.is_empty() {
        "Survivor".to_string()
    } else {
        request.occupation.clone()
    };
    let personality = request
        .personality_traits
        .first()
        .cloned()
        .unwrap_or_else(|| "cautious".to_string());

    let first = format!(
        "{name} has lived on the island for as long as anyone can remember. \
         Before the collapse, they led a quiet life, but circumstances forced them to adapt quickly. \
         Now they work as a {occupation}, doing what they can to survive."
    );
    let second = format!(
        "Known for being {personality}, {name} doesn't easily trust newcomers. \
         They've seen too many people come and go, and have learned to rely on themselves first. \
         Still, those who earn their respect find a loyal ally."
    );

    Backstory {
        npc_id: request.npc_id.clone(),
        summary: format!("{first}\n\n{second}"),
        occupation,
        faction_history: "Joined seeking protection after losing their previous group".to_string(),
        personal_goal: "To find safety and stability".to_string(),
        fear: "Being alone when it matters most".to_string(),
        secret_or_shame: "Once abandoned someone who needed help".to_string(),
        distinguishing_trait: personality.clone(),
        version: 0,
        elements: vec![
            BackstoryElement::new("origin", "Has been on the island since before the collapse", 0.8)
                .with_tag("history"),
            BackstoryElement::new("personality", personality, 0.9).with_tag("personality"),
        ],
        generated_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockOrchestrator;
    use serde_json::json;

    fn request() -> BackstoryRequest {
        BackstoryRequest::new("npc_mara", "Mara")
            .with_occupation("Fisher")
            .with_trait("stubborn")
    }

    #[tokio::test]
    async fn parses_service_response() {
        let reply = json!({
            "npc_id": "npc_mara",
            "summary": "Mara mends nets by the harbor.",
            "occupation": "Fisher",
            "faction_history": "Founding survivor",
            "personal_goal": "Rebuild the boat",
            "fear": "Storms",
            "secret": "Sank the old ferry",
            "trait": "stubborn",
            "version": 3,
            "elements": [
                {"type": "Skill", "description": "Reads the weather", "importance": 0.7, "public": true, "tags": ["sea"]},
                {"type": "secret", "description": "Hides a radio", "importance": 0.9, "public": false, "tags": ["sea", "radio"]}
            ]
        });
        let mock = Arc::new(MockOrchestrator::with_json(vec![Ok(reply)]));
        let generator = BackstoryGenerator::new(mock.clone(), "http://backstory");

        let backstory = generator.generate(&request()).await;
        assert_eq!(backstory.version, 3);
        assert!(!backstory.is_fallback());
        assert!(backstory.generated_at.is_some());
        assert_eq!(backstory.secret_or_shame, "Sank the old ferry");
        assert_eq!(backstory.element_by_type("skill"), Some("Reads the weather"));
        assert_eq!(backstory.elements_by_tag("sea").len(), 2);

        let context = backstory.dialogue_context();
        assert!(context.starts_with("Background: Mara mends nets by the harbor.\n"));
        assert!(context.contains("Skill: Reads the weather\n"));
        assert!(!context.contains("Hides a radio"));

        let posts = mock.posts.lock().unwrap();
        assert_eq!(posts[0].0, "http://backstory");
        assert_eq!(posts[0].1["summary_paragraphs"], 2);
        assert_eq!(posts[0].1["personality_traits"][0], "stubborn");
    }

    #[tokio::test]
    async fn falls_back_on_transport_failure() {
        let mock = Arc::new(MockOrchestrator::with_json(vec![Err(RuntimeError::Timeout)]));
        let generator = BackstoryGenerator::new(mock, "http://backstory");

        let backstory = generator.generate(&request()).await;
        assert!(backstory.is_fallback());
        assert_eq!(backstory.occupation, "Fisher");
        assert!(backstory.summary.contains("Known for being stubborn, Mara"));
        assert_eq!(backstory.short_context(), "A Fisher who is known for being stubborn.");
    }

    #[tokio::test]
    async fn falls_back_on_empty_summary() {
        let mock = Arc::new(MockOrchestrator::with_json(vec![Ok(json!({"npc_id": "npc_mara", "summary": ""}))]));
        let generator = BackstoryGenerator::new(mock, "http://backstory");
        assert!(generator.generate(&request()).await.is_fallback());
    }

    #[test]
    fn fallback_defaults() {
        let backstory = fallback_backstory(&BackstoryRequest::new("npc_x", ""));
        assert_eq!(backstory.occupation, "Survivor");
        assert_eq!(backstory.distinguishing_trait, "cautious");
        assert!(backstory.summary.starts_with("This person has lived on the island"));
        assert_eq!(backstory.summary.split("\n\n").count(), 2);
        assert_eq!(backstory.element_by_type("origin"), Some("Has been on the island since before the collapse"));
        assert_eq!(backstory.elements_by_tag("history").len(), 1);
        assert_eq!(backstory.element_by_type("secret"), None);
    }
}

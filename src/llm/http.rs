use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use super::{ByteStream, OrchestratorClient};
use crate::config::DialogueConfig;
use crate::error::RuntimeError;
use crate::types::DialogueRequest;

/// Orchestrator reached over HTTP
pub struct HttpOrchestrator {
    client: Client,
    dialogue_endpoint: String,
}

impl HttpOrchestrator {
    /// Create a client for the given dialogue endpoint. A `None` timeout waits forever.
    pub fn new(dialogue_endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self, RuntimeError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| RuntimeError::ConnectionFailure(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            dialogue_endpoint: dialogue_endpoint.into(),
        })
    }

    pub fn from_config(config: &DialogueConfig) -> Result<Self, RuntimeError> {
        Self::new(config.endpoint.clone(), config.request_timeout())
    }

    pub fn dialogue_endpoint(&self) -> &str {
        &self.dialogue_endpoint
    }
}

async fn reject(response: reqwest::Response) -> RuntimeError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    RuntimeError::ServerError { status, body }
}

#[async_trait]
impl OrchestratorClient for HttpOrchestrator {
    async fn open_dialogue(&self, request: &DialogueRequest) -> Result<ByteStream, RuntimeError> {
        log::debug!("POST {} for {}", self.dialogue_endpoint, request.npc_state.npc_id);

        let response = self
            .client
            .post(&self.dialogue_endpoint)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(reject(response).await);
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(RuntimeError::from));
        Ok(Box::pin(body))
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, RuntimeError> {
        let response = self.client.post(url).json(body).send().await?;

        if response.status() != StatusCode::OK {
            return Err(reject(response).await);
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

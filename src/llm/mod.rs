pub mod http;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;

use crate::error::RuntimeError;
use crate::types::DialogueRequest;

/// Raw response body chunks, in arrival order
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, RuntimeError>> + Send>>;

/// Remote dialogue orchestrator (the LLM service behind the NPCs).
///
/// The service itself is opaque; this trait only covers the two shapes of
/// call the runtime makes: one streamed dialogue turn, and plain JSON POSTs
/// for backstory generation and director control.
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// Start a dialogue turn and hand back the body as it arrives.
    ///
    /// Non-200 responses must fail here with `RuntimeError::ServerError`.
    async fn open_dialogue(&self, request: &DialogueRequest) -> Result<ByteStream, RuntimeError>;

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, RuntimeError>;
}

pub use http::HttpOrchestrator;

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use futures::StreamExt;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// One scripted dialogue response
    pub enum Script {
        Chunks(Vec<&'static str>),
        Slow(Vec<&'static str>, Duration),
        Broken(Vec<&'static str>, RuntimeError),
        Refused(RuntimeError),
    }

    /// In-memory orchestrator that replays scripted responses in order
    #[derive(Default)]
    pub struct MockOrchestrator {
        dialogues: Mutex<VecDeque<Script>>,
        json: Mutex<VecDeque<Result<Value, RuntimeError>>>,
        pub requests: Mutex<Vec<DialogueRequest>>,
        pub posts: Mutex<Vec<(String, Value)>>,
    }

    impl MockOrchestrator {
        pub fn with_dialogues(scripts: Vec<Script>) -> Self {
            Self {
                dialogues: Mutex::new(scripts.into()),
                ..Default::default()
            }
        }

        pub fn with_json(replies: Vec<Result<Value, RuntimeError>>) -> Self {
            Self {
                json: Mutex::new(replies.into()),
                ..Default::default()
            }
        }
    }

    fn chunk_stream(chunks: Vec<&'static str>) -> Vec<Result<Vec<u8>, RuntimeError>> {
        chunks.into_iter().map(|c| Ok(c.as_bytes().to_vec())).collect()
    }

    #[async_trait]
    impl OrchestratorClient for MockOrchestrator {
        async fn open_dialogue(&self, request: &DialogueRequest) -> Result<ByteStream, RuntimeError> {
            self.requests.lock().unwrap().push(request.clone());
            let script = self
                .dialogues
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::Refused(RuntimeError::ConnectionFailure("no script".into())));

            match script {
                Script::Chunks(chunks) => Ok(Box::pin(futures::stream::iter(chunk_stream(chunks)))),
                Script::Slow(chunks, delay) => Ok(Box::pin(
                    futures::stream::iter(chunk_stream(chunks)).then(move |chunk| async move {
                        tokio::time::sleep(delay).await;
                        chunk
                    }),
                )),
                Script::Broken(chunks, err) => {
                    let mut items = chunk_stream(chunks);
                    items.push(Err(err));
                    Ok(Box::pin(futures::stream::iter(items)))
                }
                Script::Refused(err) => Err(err),
            }
        }

        async fn post_json(&self, url: &str, body: &Value) -> Result<Value, RuntimeError> {
            self.posts.lock().unwrap().push((url.to_string(), body.clone()));
            self.json
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(RuntimeError::ConnectionFailure("no reply".into())))
        }
    }
}

//! Per-agent dialogue session.
//!
//! A session owns at most one in-flight request. Starting a new utterance
//! cancels whatever the previous one was doing; the old receiver gets a
//! single `Cancelled` and nothing after it. Every started request ends with
//! exactly one terminal event.

use futures::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::error::RuntimeError;
use crate::llm::OrchestratorClient;
use crate::parser::StreamParser;
use crate::types::{DialogueEvent, DialogueRequest, NpcAction, NpcStatePayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Sending,
    Streaming,
    Error,
}

struct Shared {
    state: SessionState,
    generation: u64,
    tx: Option<UnboundedSender<DialogueEvent>>,
    last_action: NpcAction,
}

impl Shared {
    /// The sender for `generation`, if that request is still the live one
    fn live_sender(&self, generation: u64) -> Option<&UnboundedSender<DialogueEvent>> {
        if self.generation == generation {
            self.tx.as_ref()
        } else {
            None
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct DialogueSession {
    client: Arc<dyn OrchestratorClient>,
    tts_engine: String,
    shared: Arc<Mutex<Shared>>,
    task: Option<JoinHandle<()>>,
}

impl DialogueSession {
    pub fn new(client: Arc<dyn OrchestratorClient>, tts_engine: impl Into<String>) -> Self {
        Self {
            client,
            tts_engine: tts_engine.into(),
            shared: Arc::new(Mutex::new(Shared {
                state: SessionState::Idle,
                generation: 0,
                tx: None,
                last_action: NpcAction::Talk,
            })),
            task: None,
        }
    }

    pub fn state(&self) -> SessionState {
        lock(&self.shared).state
    }

    /// True while a request is being sent or streamed
    pub fn is_active(&self) -> bool {
        matches!(self.state(), SessionState::Sending | SessionState::Streaming)
    }

    /// Action named by the most recent Meta event
    pub fn last_action(&self) -> NpcAction {
        lock(&self.shared).last_action
    }

    /// Send one utterance upstream and return the stream of events for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn send_utterance(
        &mut self,
        user_input: impl Into<String>,
        npc_state: NpcStatePayload,
    ) -> UnboundedReceiver<DialogueEvent> {
        self.cancel();

        let request = DialogueRequest {
            user_input: user_input.into(),
            npc_state,
            tts_engine: self.tts_engine.clone(),
        };
        log::info!("💬 Sending utterance for {}: {}", request.npc_state.npc_id, request.user_input);

        let (tx, rx) = mpsc::unbounded_channel();
        let generation = {
            let mut shared = lock(&self.shared);
            shared.generation += 1;
            shared.state = SessionState::Sending;
            shared.tx = Some(tx);
            shared.generation
        };

        let client = Arc::clone(&self.client);
        let shared = Arc::clone(&self.shared);
        self.task = Some(tokio::spawn(run_request(client, request, shared, generation)));
        rx
    }

    /// Abandon the in-flight request, if any.
    ///
    /// Emits `Cancelled` to the current receiver. Does nothing when idle.
    pub fn cancel(&mut self) {
        let tx = {
            let mut shared = lock(&self.shared);
            let tx = shared.tx.take();
            if tx.is_some() {
                shared.state = SessionState::Idle;
            }
            tx
        };

        if let Some(tx) = tx {
            log::info!("Cancelling in-flight dialogue");
            let _ = tx.send(DialogueEvent::Cancelled);
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for DialogueSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_request(
    client: Arc<dyn OrchestratorClient>,
    request: DialogueRequest,
    shared: Arc<Mutex<Shared>>,
    generation: u64,
) {
    let mut body = match client.open_dialogue(&request).await {
        Ok(body) => body,
        Err(e) => {
            finish(&shared, generation, Err(e));
            return;
        }
    };

    {
        let mut guard = lock(&shared);
        if guard.live_sender(generation).is_none() {
            return;
        }
        guard.state = SessionState::Streaming;
    }

    let mut parser = StreamParser::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                if !deliver(&shared, generation, parser.feed(&bytes)) {
                    return;
                }
            }
            Err(e) => {
                finish(&shared, generation, Err(e));
                return;
            }
        }
    }

    if deliver(&shared, generation, parser.finish()) {
        finish(&shared, generation, Ok(()));
    }
}

/// Forward events under the lock so a concurrent cancel can't interleave.
/// Returns false once the request is no longer live.
fn deliver(shared: &Mutex<Shared>, generation: u64, events: Vec<DialogueEvent>) -> bool {
    let mut guard = lock(shared);
    if guard.live_sender(generation).is_none() {
        return false;
    }

    for event in events {
        if let DialogueEvent::Meta(meta) = &event {
            guard.last_action = meta.action;
        }
        if let Some(tx) = guard.live_sender(generation) {
            let _ = tx.send(event);
        }
    }
    true
}

fn finish(shared: &Mutex<Shared>, generation: u64, outcome: Result<(), RuntimeError>) {
    let mut guard = lock(shared);
    if guard.live_sender(generation).is_none() {
        return;
    }
    let Some(tx) = guard.tx.take() else {
        return;
    };

    match outcome {
        Ok(()) => {
            guard.state = SessionState::Idle;
            log::info!("✅ Dialogue stream complete");
            let _ = tx.send(DialogueEvent::Complete);
        }
        Err(e) => {
            guard.state = SessionState::Error;
            log::error!("Dialogue request failed: {}", e);
            let _ = tx.send(DialogueEvent::Error { message: e.to_string() });
        }
    }
}

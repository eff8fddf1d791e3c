//! Incremental decoder for the orchestrator's `data:`-prefixed event stream.
//!
//! Bytes arrive in arbitrary chunks. Only complete lines are decoded; the
//! trailing partial line stays buffered until its newline shows up (or the
//! stream ends and [`StreamParser::finish`] flushes it).

use serde_json::{Map, Value};

use crate::error::RuntimeError;
use crate::types::{DialogueEvent, DialogueMeta, NpcAction, Sentence};

const DATA_PREFIX: &str = "data:";

/// Turns a chunked response body into ordered dialogue events
#[derive(Debug, Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
    scanned: usize,
    got_meta: bool,
    sentence_seen: bool,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the Meta event of this stream has been emitted
    pub fn got_meta(&self) -> bool {
        self.got_meta
    }

    /// Append a chunk and decode every line it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DialogueEvent> {
        let mut events = Vec::new();
        self.buffer.extend_from_slice(chunk);

        let Some(offset) = self.buffer[self.scanned..].iter().rposition(|b| *b == b'\n') else {
            self.scanned = self.buffer.len();
            return events;
        };

        let split_at = self.scanned + offset + 1;
        let rest = self.buffer.split_off(split_at);
        let complete = std::mem::replace(&mut self.buffer, rest);
        self.scanned = 0;

        for line in complete.split(|b| *b == b'\n') {
            self.process_line(line, &mut events);
        }
        events
    }

    /// Decode whatever is left once the body has ended
    pub fn finish(&mut self) -> Vec<DialogueEvent> {
        let mut events = Vec::new();
        let remaining = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if !remaining.is_empty() {
            self.process_line(&remaining, &mut events);
        }
        events
    }

    /// Drop buffered bytes and per-session state
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn process_line(&mut self, raw: &[u8], events: &mut Vec<DialogueEvent>) {
        let line = String::from_utf8_lossy(raw);
        let payload = match decode_line(&line) {
            Ok(Some(payload)) => payload,
            Ok(None) => return,
            Err(e) => {
                log::warn!("Skipping stream line: {}", e);
                return;
            }
        };

        if payload.contains_key("npc_action") && !self.got_meta && !self.sentence_seen {
            self.got_meta = true;
            let meta = parse_meta(&payload);
            log::info!(
                "Meta: action={}, mode={}, signal={}",
                meta.action,
                meta.mode,
                meta.player_signal
            );
            events.push(DialogueEvent::Meta(meta));
            return;
        }

        if payload.contains_key("sentence") {
            match parse_sentence(&payload) {
                Ok(Some(sentence)) => {
                    self.sentence_seen = true;
                    log::debug!("Sentence: {}", sentence.text);
                    events.push(DialogueEvent::Sentence(sentence));
                }
                Ok(None) => {}
                Err(e) => log::warn!("Skipping sentence event: {}", e),
            }
            return;
        }

        if payload.contains_key("npc_action") {
            log::debug!("Ignoring late or duplicate meta event");
        }
    }
}

/// Extract the JSON object carried by a `data:` line.
///
/// Returns `Ok(None)` for lines that carry nothing (comments, blank lines,
/// `data:` with no body). Payloads wrapped as `{"type": .., "data": {..}}`
/// are unwrapped.
pub fn decode_line(line: &str) -> Result<Option<Map<String, Value>>, RuntimeError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(body) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    let body = body.trim();
    if body.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| RuntimeError::ProtocolParse(format!("{}: {}", e, body)))?;

    let Value::Object(mut object) = value else {
        return Err(RuntimeError::ProtocolParse(format!("not an object: {}", body)));
    };

    if !object.contains_key("npc_action") && !object.contains_key("sentence") {
        if let Some(Value::Object(inner)) = object.remove("data") {
            return Ok(Some(inner));
        }
    }
    Ok(Some(object))
}

fn string_field(payload: &Map<String, Value>, key: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn parse_meta(payload: &Map<String, Value>) -> DialogueMeta {
    let action = payload
        .get("npc_action")
        .and_then(Value::as_str)
        .map(NpcAction::parse_lenient)
        .unwrap_or(NpcAction::Talk);

    DialogueMeta {
        player_signal: string_field(payload, "player_signal"),
        bandit_key: string_field(payload, "bandit_key"),
        action,
        mode: string_field(payload, "action_mode"),
    }
}

fn parse_sentence(payload: &Map<String, Value>) -> Result<Option<Sentence>, RuntimeError> {
    let text = payload
        .get("sentence")
        .and_then(Value::as_str)
        .ok_or_else(|| RuntimeError::ProtocolParse("sentence is not a string".to_string()))?;

    if text.is_empty() {
        return Ok(None);
    }

    Ok(Some(Sentence {
        text: text.to_string(),
        is_final: payload.get("is_final").and_then(Value::as_bool).unwrap_or(false),
        latency_ms: payload.get("latency_ms").and_then(Value::as_f64).unwrap_or(0.0) as f32,
    }))
}

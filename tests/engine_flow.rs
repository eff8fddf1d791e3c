use npc_social_core::{
    DialogueEvent, Npc, NpcAction, NpcEngine, Position, ReportedEvent, RuntimeConfig, WitnessEventType,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Log = Arc<Mutex<Vec<(String, Value)>>>;

async fn read_request(socket: &mut TcpStream) -> (String, String) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return (String::new(), String::new());
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf).to_string();
        let Some(split) = text.find("\r\n\r\n") else {
            continue;
        };
        let head = &text[..split];
        let path = head
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or_default()
            .to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        if buf.len() >= split + 4 + content_length {
            let body = String::from_utf8_lossy(&buf[split + 4..split + 4 + content_length]).to_string();
            return (path, body);
        }
    }
}

async fn respond(socket: &mut TcpStream, content_type: &str, body: &str) {
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        content_type,
        body.len()
    );
    socket.write_all(head.as_bytes()).await.unwrap();
    socket.write_all(body.as_bytes()).await.unwrap();
    socket.shutdown().await.unwrap();
}

/// A fake orchestrator: backstory, director and dialogue routes
async fn orchestrator(log: Log) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let (path, body) = read_request(&mut socket).await;
                let value: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
                log.lock().unwrap().push((path.clone(), value));

                match path.as_str() {
                    "/api/backstory/generate" => {
                        let reply = json!({
                            "npc_id": "npc_ivo",
                            "summary": "Ivo runs the salvage stall by the pier.",
                            "occupation": "Salvager",
                            "personal_goal": "Buy passage off the island",
                            "fear": "The deep water",
                            "trait": "shrewd",
                            "version": 2,
                            "elements": [{"type": "skill", "description": "Appraises anything", "importance": 0.8, "public": true, "tags": ["trade"]}]
                        });
                        respond(&mut socket, "application/json", &reply.to_string()).await;
                    }
                    "/api/director/control" => {
                        respond(&mut socket, "application/json", r#"{"command": "respite"}"#).await;
                    }
                    _ => {
                        let stream = concat!(
                            "data: {\"type\": \"meta\", \"data\": {\"npc_action\": \"warn\", \"player_signal\": \"haggle\", \"bandit_key\": \"b2\", \"action_mode\": \"firm\"}}\n\n",
                            "data: not json\n\n",
                            "data: {\"sentence\": \"Prices are fixed.\"}\n\n",
                            "data: {\"sentence\": \"Take it or leave it.\", \"is_final\": true}\n\n",
                        );
                        respond(&mut socket, "text/event-stream", stream).await;
                    }
                }
            });
        }
    });
    base
}

fn config(base: &str) -> RuntimeConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut config = RuntimeConfig::default();
    config.dialogue.endpoint = format!("{}/api/dialogue/stream", base);
    config.dialogue.request_timeout_ms = 5_000;
    config.backstory.endpoint = format!("{}/api/backstory/generate", base);
    config.director.endpoint = format!("{}/api/director/control", base);
    config.witness.seed = Some(3);
    config
}

#[tokio::test]
async fn conversation_turn_end_to_end() {
    let log: Log = Arc::default();
    let base = orchestrator(Arc::clone(&log)).await;
    let mut engine = NpcEngine::from_config(config(&base)).unwrap();

    engine.register_agent(
        Npc::new("npc_ivo", "Ivo")
            .with_relationship("Merchant")
            .with_faction("merchants"),
        Position::default(),
    );
    engine.register_agent(Npc::new("npc_ada", "Ada"), Position::new(100.0, 0.0, 0.0));

    let theft = ReportedEvent::new(WitnessEventType::Theft, "someone lifted a crate of nails", Position::default())
        .with_importance(0.8);
    let (event_id, _) = engine.record_world_event(theft, &[]);
    assert!(engine.witnesses().does_know("npc_ivo", &event_id));

    let plan = engine.plan_turn("npc_ivo", "how much for the rope").unwrap();
    assert!(plan.candidates.iter().any(|c| c.action.base == NpcAction::Trade));

    let mut rx = engine
        .send_utterance("npc_ivo", "How much for the rope?")
        .await
        .unwrap();
    let mut events = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap() {
        engine.apply_event("npc_ivo", &event);
        let done = event.is_terminal();
        events.push(event);
        if done {
            break;
        }
    }

    assert!(matches!(&events[0], DialogueEvent::Meta(meta) if meta.action == NpcAction::Warn));
    let sentences: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            DialogueEvent::Sentence(s) => Some(s.text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(sentences, vec!["Prices are fixed.", "Take it or leave it."]);
    assert_eq!(events.last(), Some(&DialogueEvent::Complete));
    assert_eq!(engine.alert_level(), 5.0);

    let handle = engine.agent("npc_ivo").unwrap();
    assert_eq!(handle.session.last_action(), NpcAction::Warn);
    let backstory = handle.backstory.as_ref().unwrap();
    assert_eq!(backstory.version, 2);
    assert_eq!(backstory.short_context(), "A Salvager who is known for being shrewd.");

    {
        let log = log.lock().unwrap();
        let (_, backstory_request) = log.iter().find(|(p, _)| p == "/api/backstory/generate").unwrap();
        assert_eq!(backstory_request["faction_id"], "merchants");
        let (_, dialogue) = log.iter().find(|(p, _)| p == "/api/dialogue/stream").unwrap();
        let context = dialogue["npc_state"]["backstory_context"].as_str().unwrap();
        assert!(context.contains("Occupation: Salvager"));
        assert!(context.contains("clearly saw Theft: someone lifted a crate of nails"));
    }

    engine.record_outcome("npc_ivo", NpcAction::Warn, -0.5, "how much for the rope");
    let directive = engine.sync_director().await.unwrap().unwrap();
    assert_eq!(directive.alert_delta(), 0.0);
    assert_eq!(engine.alert_level(), 5.0);
}

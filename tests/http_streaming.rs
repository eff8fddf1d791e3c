use npc_social_core::{
    DialogueEvent, DialogueSession, HttpOrchestrator, Npc, NpcAction, NpcStatePayload, SessionState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Read one HTTP request and return its body
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(split) = text.find("\r\n\r\n") {
            let content_length = text[..split]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= split + 4 + content_length {
                return String::from_utf8_lossy(&buf[split + 4..split + 4 + content_length]).to_string();
            }
        }
    }
    String::new()
}

/// Answer a single request with `status` and then `chunks`, one write each
async fn serve_once(status: &'static str, chunks: Vec<&'static str>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/api/dialogue/stream", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let body = read_request(&mut socket).await;

        let head = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n",
            status
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        for chunk in chunks {
            socket.write_all(chunk.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        socket.shutdown().await.unwrap();
        body
    });
    (url, server)
}

fn session(url: &str, timeout: Option<Duration>) -> DialogueSession {
    let _ = env_logger::builder().is_test(true).try_init();
    let client = HttpOrchestrator::new(url, timeout).unwrap();
    DialogueSession::new(Arc::new(client), "piper")
}

fn payload() -> NpcStatePayload {
    NpcStatePayload::from_npc(&Npc::new("npc_mara", "Mara").with_mood("Friendly").with_affinity(0.4))
}

async fn drain(rx: &mut UnboundedReceiver<DialogueEvent>) -> Vec<DialogueEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let done = event.is_terminal();
        events.push(event);
        if done {
            break;
        }
    }
    events
}

#[tokio::test]
async fn streams_meta_then_sentences() {
    let (url, server) = serve_once(
        "200 OK",
        vec![
            "data: {\"npc_action\": \"greet\", \"player_signal\": \"friendly\", ",
            "\"bandit_key\": \"k7\", \"action_mode\": \"warm\"}\n",
            "data: {\"sentence\": \"Hello there.\", \"latency_ms\": 120}\ndata: {\"sent",
            "ence\": \"Welcome to the docks.\", \"is_final\": true}\n",
        ],
    )
    .await;

    let mut session = session(&url, Some(Duration::from_secs(5)));
    let mut rx = session.send_utterance("Hi!", payload());
    let events = drain(&mut rx).await;

    assert_eq!(events.len(), 4);
    match &events[0] {
        DialogueEvent::Meta(meta) => {
            assert_eq!(meta.action, NpcAction::Greet);
            assert_eq!(meta.bandit_key, "k7");
            assert_eq!(meta.mode, "warm");
        }
        other => panic!("expected meta, got {:?}", other),
    }
    match (&events[1], &events[2]) {
        (DialogueEvent::Sentence(first), DialogueEvent::Sentence(second)) => {
            assert_eq!(first.text, "Hello there.");
            assert_eq!(first.latency_ms, 120.0);
            assert!(!first.is_final);
            assert_eq!(second.text, "Welcome to the docks.");
            assert!(second.is_final);
        }
        other => panic!("expected two sentences, got {:?}", other),
    }
    assert_eq!(events[3], DialogueEvent::Complete);
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.last_action(), NpcAction::Greet);

    let request: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(request["user_input"], "Hi!");
    assert_eq!(request["tts_engine"], "piper");
    assert_eq!(request["npc_state"]["npc_id"], "npc_mara");
    assert_eq!(request["npc_state"]["mood"], "Friendly");
}

#[tokio::test]
async fn server_error_becomes_error_event() {
    let (url, server) = serve_once("503 Service Unavailable", vec!["orchestrator overloaded"]).await;

    let mut session = session(&url, Some(Duration::from_secs(5)));
    let mut rx = session.send_utterance("Hi!", payload());
    let events = drain(&mut rx).await;
    server.await.unwrap();

    assert_eq!(events.len(), 1);
    match &events[0] {
        DialogueEvent::Error { message } => {
            assert!(message.contains("503"), "{}", message);
            assert!(message.contains("orchestrator overloaded"), "{}", message);
        }
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Error);
}

#[tokio::test]
async fn refused_connection_becomes_error_event() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/api/dialogue/stream", listener.local_addr().unwrap());
    drop(listener);

    let mut session = session(&url, Some(Duration::from_secs(5)));
    let mut rx = session.send_utterance("Anyone there?", payload());
    let events = drain(&mut rx).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], DialogueEvent::Error { .. }));
}

#[tokio::test]
async fn timeout_becomes_error_event() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/api/dialogue/stream", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        // hold the connection open without answering
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let mut session = session(&url, Some(Duration::from_millis(200)));
    let mut rx = session.send_utterance("Hello?", payload());
    let events = drain(&mut rx).await;

    assert_eq!(
        events,
        vec![DialogueEvent::Error {
            message: "request timed out".to_string()
        }]
    );
    server.abort();
}

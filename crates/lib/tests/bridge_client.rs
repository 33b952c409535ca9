//! BridgeClient against an in-process WebSocket bridge.

use futures_util::{SinkExt, StreamExt};
use lib::channels::{
    BridgeClient, ClientError, InboundMessage, SessionClient, SessionOptions, SessionState,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Accept one connection and answer requests like a whatsapp-web.js bridge would.
async fn spawn_bridge() -> (String, Arc<Mutex<Vec<Value>>>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let frames = Arc::new(Mutex::new(Vec::new()));
    let recorded = frames.clone();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let req: Value = serde_json::from_str(&text).unwrap();
            recorded.lock().unwrap().push(req.clone());
            let id = req["id"].clone();
            let mut replies = Vec::new();
            match req["type"].as_str() {
                Some("connect") => {
                    replies.push(json!({ "type": "qr", "code": "2@pairing-code" }));
                    replies.push(json!({ "type": "status", "status": "isLogged" }));
                    replies.push(json!({ "type": "result", "id": id, "ok": true }));
                    replies.push(json!({
                        "type": "message",
                        "from": "5511999999999@c.us",
                        "body": "oi",
                        "isGroupMsg": false,
                        "fromMe": false
                    }));
                    replies.push(json!({ "type": "typing", "from": "5511999999999@c.us" }));
                    replies.push(json!({ "type": "state", "state": "CONNECTED" }));
                }
                Some("sendText") => match req["chatId"].as_str() {
                    Some("silent@c.us") => {}
                    Some("fail@c.us") => replies.push(
                        json!({ "type": "result", "id": id, "ok": false, "error": "chat not found" }),
                    ),
                    _ => replies.push(json!({ "type": "result", "id": id, "ok": true })),
                },
                Some("close") => {
                    let _ = ws
                        .send(Message::Text(json!({ "type": "result", "id": id, "ok": true }).to_string()))
                        .await;
                    break;
                }
                _ => {}
            }
            for r in replies {
                ws.send(Message::Text(r.to_string())).await.unwrap();
            }
        }
    });
    (format!("ws://127.0.0.1:{}/ws", port), frames)
}

#[tokio::test]
async fn bridge_round_trip() {
    let (url, frames) = spawn_bridge().await;
    let client = BridgeClient::new(
        url,
        "chatbot-session".to_string(),
        SessionOptions::default(),
        Duration::from_millis(300),
    );
    let (msg_tx, mut msg_rx) = mpsc::channel::<InboundMessage>(8);
    let (state_tx, mut state_rx) = mpsc::channel::<SessionState>(8);
    client.on_message(msg_tx);
    client.on_state_change(state_tx);

    client.connect().await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), msg_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        msg,
        InboundMessage {
            sender_id: "5511999999999@c.us".to_string(),
            body: "oi".to_string(),
            is_group_message: false,
            is_from_self: false,
            is_broadcast: false,
        }
    );
    let state = tokio::time::timeout(Duration::from_secs(5), state_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state, SessionState::Connected);

    client.send_text("5511999999999@c.us", "olá").await.unwrap();
    match client.send_text("fail@c.us", "olá").await {
        Err(ClientError::Rejected(e)) => assert_eq!(e, "chat not found"),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(matches!(
        client.send_text("silent@c.us", "olá").await,
        Err(ClientError::Timeout(300))
    ));

    client.close().await.unwrap();
    assert!(matches!(
        client.send_text("5511999999999@c.us", "depois").await,
        Err(ClientError::NotConnected)
    ));

    let frames = frames.lock().unwrap().clone();
    let types: Vec<&str> = frames.iter().filter_map(|f| f["type"].as_str()).collect();
    assert_eq!(types, vec!["connect", "sendText", "sendText", "sendText", "close"]);
    assert_eq!(frames[0]["session"], "chatbot-session");
    assert_eq!(frames[0]["headless"], true);
    assert_eq!(frames[1]["chatId"], "5511999999999@c.us");
    assert_eq!(frames[1]["text"], "olá");
}

#[tokio::test]
async fn connect_fails_without_bridge() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let client = BridgeClient::new(
        format!("ws://127.0.0.1:{}/ws", port),
        "s".to_string(),
        SessionOptions::default(),
        Duration::from_millis(300),
    );
    assert!(matches!(
        client.connect().await,
        Err(ClientError::Transport(_))
    ));
}

/// Accept one connection, confirm the connect request, then hang up.
async fn spawn_bridge_that_hangs_up() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let req: Value = serde_json::from_str(&text).unwrap();
            let ok = json!({ "type": "result", "id": req["id"], "ok": true });
            ws.send(Message::Text(ok.to_string())).await.unwrap();
        }
        let _ = ws.close(None).await;
    });
    format!("ws://127.0.0.1:{}/ws", port)
}

#[tokio::test]
async fn lost_bridge_closes_event_streams() {
    let url = spawn_bridge_that_hangs_up().await;
    let client = BridgeClient::new(
        url,
        "chatbot-session".to_string(),
        SessionOptions::default(),
        Duration::from_secs(5),
    );
    let (msg_tx, mut msg_rx) = mpsc::channel::<InboundMessage>(8);
    let (state_tx, mut state_rx) = mpsc::channel::<SessionState>(8);
    client.on_message(msg_tx);
    client.on_state_change(state_tx);

    client.connect().await.unwrap();

    let state = tokio::time::timeout(Duration::from_secs(2), state_rx.recv())
        .await
        .expect("state stream should close, not hang");
    assert_eq!(state, None);
    let msg = tokio::time::timeout(Duration::from_secs(2), msg_rx.recv())
        .await
        .expect("message stream should close, not hang");
    assert_eq!(msg, None);

    let started = std::time::Instant::now();
    assert!(matches!(
        client.send_text("5511999999999@c.us", "oi").await,
        Err(ClientError::NotConnected)
    ));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(client.close().await.is_ok());
}

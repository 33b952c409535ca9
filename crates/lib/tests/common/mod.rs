//! Shared test doubles: an in-memory session client and a scripted backend.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use lib::channels::{ClientError, InboundMessage, SessionClient, SessionState};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Session client that records sends and lets the test push events.
#[derive(Default)]
pub struct FakeClient {
    sent: Mutex<Vec<(String, String)>>,
    pub fail_sends: AtomicBool,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    messages: Mutex<Option<mpsc::Sender<InboundMessage>>>,
    states: Mutex<Option<mpsc::Sender<SessionState>>>,
}

impl FakeClient {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub async fn push_message(&self, msg: InboundMessage) {
        let tx = self.messages.lock().unwrap().clone().expect("no message subscriber");
        tx.send(msg).await.expect("relay stopped");
    }

    pub async fn push_state(&self, state: SessionState) {
        let tx = self.states.lock().unwrap().clone().expect("no state subscriber");
        tx.send(state).await.expect("relay stopped");
    }

    /// Drop both subscribers, closing the relay's event streams.
    pub fn drop_subscribers(&self) {
        self.messages.lock().unwrap().take();
        self.states.lock().unwrap().take();
    }

    /// Wait until at least `n` sends were recorded (up to 5s).
    pub async fn wait_for_sends(&self, n: usize) -> Vec<(String, String)> {
        for _ in 0..100 {
            let sent = self.sent();
            if sent.len() >= n {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("expected {} sends, got {:?}", n, self.sent());
    }
}

#[async_trait]
impl SessionClient for FakeClient {
    async fn connect(&self) -> Result<(), ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_message(&self, tx: mpsc::Sender<InboundMessage>) {
        *self.messages.lock().unwrap() = Some(tx);
    }

    fn on_state_change(&self, tx: mpsc::Sender<SessionState>) {
        *self.states.lock().unwrap() = Some(tx);
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), ClientError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ClientError::Rejected("send blocked by test".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Canned backend answer.
#[derive(Clone)]
pub struct BackendReply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl BackendReply {
    pub fn ok(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }
}

#[derive(Clone)]
struct BackendState {
    reply: BackendReply,
    requests: Arc<Mutex<Vec<serde_json::Value>>>,
}

pub struct FakeBackend {
    pub url: String,
    requests: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl FakeBackend {
    pub fn requests(&self) -> Vec<serde_json::Value> {
        self.requests.lock().unwrap().clone()
    }
}

async fn webhook(
    State(state): State<BackendState>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, [(&'static str, &'static str); 1], String) {
    state.requests.lock().unwrap().push(body);
    if !state.reply.delay.is_zero() {
        tokio::time::sleep(state.reply.delay).await;
    }
    (
        StatusCode::from_u16(state.reply.status).unwrap(),
        [("content-type", "application/json")],
        state.reply.body.clone(),
    )
}

/// Start a backend on a free port that answers every POST /webhook with `reply`.
pub async fn spawn_backend(reply: BackendReply) -> FakeBackend {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/webhook", post(webhook))
        .with_state(BackendState {
            reply,
            requests: requests.clone(),
        });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    FakeBackend {
        url: format!("http://127.0.0.1:{}/webhook", port),
        requests,
    }
}

pub fn direct_message(sender: &str, body: &str) -> InboundMessage {
    InboundMessage {
        sender_id: sender.to_string(),
        body: body.to_string(),
        ..Default::default()
    }
}

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

//! WebSocket bridge to a WhatsApp Web automation process (whatsapp-web.js, venom, ...).
//!
//! Frames are JSON text. Requests (`connect`, `sendText`, `close`) carry an `id` and are
//! answered by a `result` frame with the same id. Events (`message`, `state`, `qr`,
//! `status`) arrive unsolicited and are forwarded to the registered subscribers.

use crate::channels::client::{ClientError, SessionClient, SessionState};
use crate::channels::inbound::InboundMessage;
use crate::channels::options::{QrDisplay, SessionOptions};
use crate::channels::qr;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Result<(), String>>>>>;
type Subscriber<T> = Arc<RwLock<Option<mpsc::Sender<T>>>>;
type Outbound = Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>;

/// Frames the bridge sends to us.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum BridgeEvent {
    Result {
        id: String,
        ok: bool,
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Message {
        from: String,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        is_group_msg: bool,
        #[serde(default)]
        from_me: bool,
        #[serde(default)]
        broadcast: bool,
    },
    State {
        state: String,
    },
    Qr {
        code: String,
    },
    Status {
        status: String,
    },
    #[serde(other)]
    Unknown,
}

/// Session client backed by a bridge process reachable over WebSocket.
pub struct BridgeClient {
    url: String,
    session_name: String,
    options: SessionOptions,
    timeout: Duration,
    data_dir: Option<PathBuf>,
    outbound: Outbound,
    pending: Pending,
    messages: Subscriber<InboundMessage>,
    states: Subscriber<SessionState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BridgeClient {
    pub fn new(url: String, session_name: String, options: SessionOptions, timeout: Duration) -> Self {
        Self {
            url,
            session_name,
            options,
            timeout,
            data_dir: None,
            outbound: Arc::new(Mutex::new(None)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            messages: Arc::new(RwLock::new(None)),
            states: Arc::new(RwLock::new(None)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Directory where the bridge keeps this session's browser profile.
    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        self.data_dir = Some(dir);
        self
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    fn connect_frame(&self, id: &str) -> serde_json::Value {
        json!({
            "type": "connect",
            "id": id,
            "session": self.session_name,
            "headless": self.options.headless,
            "multidevice": self.options.multidevice,
            "browserArgs": self.options.browser_args,
            "logQr": self.options.qr_display != QrDisplay::Off,
            "dataDir": self.data_dir.as_ref().map(|d| d.display().to_string()),
        })
    }

    /// Send one request frame and wait for its `result`.
    async fn request(&self, id: String, frame: serde_json::Value) -> Result<(), ClientError> {
        let outbound = self
            .outbound
            .lock()
            .map_err(|_| ClientError::Transport("outbound lock poisoned".to_string()))?
            .clone()
            .ok_or(ClientError::NotConnected)?;
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id.clone(), tx);
        }
        if outbound.send(Message::Text(frame.to_string())).is_err() {
            self.forget(&id);
            return Err(ClientError::NotConnected);
        }
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(ClientError::Rejected(e)),
            Ok(Err(_)) => Err(ClientError::Transport("bridge connection closed".to_string())),
            Err(_) => {
                self.forget(&id);
                Err(ClientError::Timeout(self.timeout.as_millis() as u64))
            }
        }
    }

    fn forget(&self, id: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(id);
        }
    }
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn subscriber<T>(slot: &Subscriber<T>) -> Option<mpsc::Sender<T>> {
    slot.read().ok().and_then(|g| g.clone())
}

/// Read frames until the socket closes, resolving pending requests and forwarding events.
/// On exit the client is marked disconnected and both subscribers are dropped, so the
/// relay sees its event streams close.
async fn run_reader<S>(
    mut stream: S,
    outbound: Outbound,
    pending: Pending,
    messages: Subscriber<InboundMessage>,
    states: Subscriber<SessionState>,
    session_name: String,
    options: SessionOptions,
) where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                log::warn!("bridge: read error: {}", e);
                break;
            }
        };
        let event: BridgeEvent = match serde_json::from_str(&text) {
            Ok(e) => e,
            Err(e) => {
                log::debug!("bridge: ignoring unparseable frame: {}", e);
                continue;
            }
        };
        match event {
            BridgeEvent::Result { id, ok, error } => {
                let waiter = pending.lock().ok().and_then(|mut p| p.remove(&id));
                if let Some(waiter) = waiter {
                    let outcome = if ok {
                        Ok(())
                    } else {
                        Err(error.unwrap_or_else(|| "request failed".to_string()))
                    };
                    let _ = waiter.send(outcome);
                } else {
                    log::debug!("bridge: result for unknown request {}", id);
                }
            }
            BridgeEvent::Message {
                from,
                body,
                is_group_msg,
                from_me,
                broadcast,
            } => {
                let msg = InboundMessage {
                    sender_id: from,
                    body: body.unwrap_or_default(),
                    is_group_message: is_group_msg,
                    is_from_self: from_me,
                    is_broadcast: broadcast,
                };
                match subscriber(&messages) {
                    Some(tx) => {
                        if tx.send(msg).await.is_err() {
                            log::debug!("bridge: message subscriber closed");
                        }
                    }
                    None => log::debug!("bridge: no message subscriber, dropping message"),
                }
            }
            BridgeEvent::State { state } => {
                let state = SessionState::parse(&state);
                log::info!("session state: {}", state);
                if let Some(tx) = subscriber(&states) {
                    let _ = tx.send(state).await;
                }
            }
            BridgeEvent::Qr { code } => qr::show_pairing_code(options.qr_display, &code),
            BridgeEvent::Status { status } => {
                log::info!("session {} status: {}", session_name, status);
            }
            BridgeEvent::Unknown => log::debug!("bridge: ignoring unknown frame type"),
        }
    }

    if let Ok(mut g) = outbound.lock() {
        g.take();
    }
    // Wake every waiter; their senders drop here.
    if let Ok(mut p) = pending.lock() {
        p.clear();
    }
    if let Ok(mut g) = messages.write() {
        g.take();
    }
    if let Ok(mut g) = states.write() {
        g.take();
    }
    log::warn!("bridge connection closed");
}

#[async_trait]
impl SessionClient for BridgeClient {
    async fn connect(&self) -> Result<(), ClientError> {
        log::info!("connecting to bridge at {} (session {})", self.url, self.session_name);
        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let (mut sink, stream) = ws.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = sink.send(frame).await {
                    log::warn!("bridge: write failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });
        if let Ok(mut g) = self.outbound.lock() {
            *g = Some(out_tx);
        }
        let reader = tokio::spawn(run_reader(
            stream,
            self.outbound.clone(),
            self.pending.clone(),
            self.messages.clone(),
            self.states.clone(),
            self.session_name.clone(),
            self.options.clone(),
        ));
        if let Ok(mut g) = self.tasks.lock() {
            g.push(writer);
            g.push(reader);
        }

        let id = new_request_id();
        let frame = self.connect_frame(&id);
        self.request(id, frame).await?;
        log::info!("session {} connected", self.session_name);
        Ok(())
    }

    fn on_message(&self, tx: mpsc::Sender<InboundMessage>) {
        if let Ok(mut g) = self.messages.write() {
            *g = Some(tx);
        }
    }

    fn on_state_change(&self, tx: mpsc::Sender<SessionState>) {
        if let Ok(mut g) = self.states.write() {
            *g = Some(tx);
        }
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), ClientError> {
        let id = new_request_id();
        let frame = json!({ "type": "sendText", "id": id, "chatId": chat_id, "text": text });
        self.request(id, frame).await
    }

    async fn close(&self) -> Result<(), ClientError> {
        let connected = self
            .outbound
            .lock()
            .map(|g| g.is_some())
            .unwrap_or(false);
        let result = if connected {
            let id = new_request_id();
            self.request(id.clone(), json!({ "type": "close", "id": id }))
                .await
        } else {
            Ok(())
        };
        if let Ok(mut g) = self.outbound.lock() {
            // Dropping the sender ends the writer task, which closes the socket.
            g.take();
        }
        let tasks = self
            .tasks
            .lock()
            .map(|mut g| std::mem::take(&mut *g))
            .unwrap_or_default();
        for t in tasks {
            t.abort();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_message_event() {
        let ev: BridgeEvent = serde_json::from_str(
            r#"{"type":"message","from":"5511@c.us","body":"oi","isGroupMsg":false,"fromMe":true}"#,
        )
        .unwrap();
        match ev {
            BridgeEvent::Message {
                from,
                body,
                is_group_msg,
                from_me,
                broadcast,
            } => {
                assert_eq!(from, "5511@c.us");
                assert_eq!(body.as_deref(), Some("oi"));
                assert!(!is_group_msg);
                assert!(from_me);
                assert!(!broadcast);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn message_without_body_parses() {
        let ev: BridgeEvent =
            serde_json::from_str(r#"{"type":"message","from":"5511@c.us","body":null}"#).unwrap();
        assert!(matches!(ev, BridgeEvent::Message { body: None, .. }));
    }

    #[test]
    fn unknown_frame_type_is_tolerated() {
        let ev: BridgeEvent = serde_json::from_str(r#"{"type":"presence","who":"x"}"#).unwrap();
        assert!(matches!(ev, BridgeEvent::Unknown));
    }

    #[test]
    fn connect_frame_carries_session_options() {
        let client = BridgeClient::new(
            "ws://127.0.0.1:1/ws".to_string(),
            "chatbot-session".to_string(),
            SessionOptions::default(),
            Duration::from_secs(1),
        );
        let frame = client.connect_frame("abc");
        assert_eq!(frame["type"], "connect");
        assert_eq!(frame["id"], "abc");
        assert_eq!(frame["session"], "chatbot-session");
        assert_eq!(frame["headless"], true);
        assert_eq!(frame["logQr"], false);
        assert_eq!(frame["browserArgs"][0], "--no-sandbox");
        assert!(frame["dataDir"].is_null());

        let client = client.with_data_dir(PathBuf::from("/srv/zaprelay/sessions/chatbot-session"));
        let frame = client.connect_frame("abc");
        assert_eq!(frame["dataDir"], "/srv/zaprelay/sessions/chatbot-session");
    }

    #[tokio::test]
    async fn send_before_connect_fails() {
        let client = BridgeClient::new(
            "ws://127.0.0.1:1/ws".to_string(),
            "s".to_string(),
            SessionOptions::default(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            client.send_text("1@c.us", "hi").await,
            Err(ClientError::NotConnected)
        ));
        assert!(client.close().await.is_ok());
    }
}

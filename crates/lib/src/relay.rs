//! Inbound relay: filter session messages, forward them to the backend, send the reply back.
//!
//! Every message is handled in its own task. Failures stay inside that task; the user gets a
//! fixed fallback text and nothing is retried. Only a fatal session state ends the relay.

use crate::backend::{BackendClient, RelayPayload};
use crate::channels::{strip_chat_suffix, FilterReason, InboundMessage, SessionClient, SessionState};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;

/// Sent when the backend answers with an empty reply.
pub const EMPTY_REPLY_TEXT: &str =
    "Desculpe, não consegui processar sua mensagem. Pode tentar novamente?";

/// Sent when the backend call fails in any way.
pub const TEMPORARY_ERROR_TEXT: &str =
    "Desculpe, ocorreu um erro temporário. Tente novamente em alguns momentos.";

/// Last session state seen by the relay (shared with the health endpoint).
pub type SharedSessionState = Arc<RwLock<Option<SessionState>>>;

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Filtered(FilterReason),
    /// Backend reply delivered to the chat.
    Replied,
    /// Backend reply was blank; the apology text was sent instead.
    EmptyReply,
    /// Backend call failed; the temporary-error text was sent.
    BackendFailed,
    /// A reply or fallback could not be delivered.
    SendFailed,
}

/// Why the relay loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayExit {
    /// The session reported CONFLICT or UNPAIRED.
    SessionFatal(SessionState),
    /// The client dropped both event streams.
    StreamsClosed,
}

/// Build the backend payload for a message that passed the filters.
pub fn build_payload(msg: &InboundMessage) -> RelayPayload {
    RelayPayload {
        user_number: strip_chat_suffix(&msg.sender_id).to_string(),
        message: msg.body.trim().to_string(),
    }
}

#[derive(Clone)]
pub struct Relay {
    client: Arc<dyn SessionClient>,
    backend: BackendClient,
    session_state: SharedSessionState,
}

impl Relay {
    pub fn new(
        client: Arc<dyn SessionClient>,
        backend: BackendClient,
        session_state: SharedSessionState,
    ) -> Self {
        Self {
            client,
            backend,
            session_state,
        }
    }

    /// Handle one inbound message end to end.
    pub async fn handle_message(&self, msg: InboundMessage) -> RelayOutcome {
        if let Some(reason) = msg.filter_reason() {
            log::debug!("inbound: dropping message from {} ({})", msg.sender_id, reason.as_str());
            return RelayOutcome::Filtered(reason);
        }

        let payload = build_payload(&msg);
        log::info!(
            "inbound: message from {}: {}",
            payload.user_number,
            payload.message
        );
        log::debug!("inbound: forwarding to {}: {:?}", self.backend.url(), payload);

        let (text, outcome) = match self.backend.forward(&payload).await {
            Ok(reply) if !reply.trim().is_empty() => (reply, RelayOutcome::Replied),
            Ok(_) => {
                log::warn!("inbound: empty reply from backend for {}", payload.user_number);
                (EMPTY_REPLY_TEXT.to_string(), RelayOutcome::EmptyReply)
            }
            Err(e) => {
                if e.is_invalid_response() {
                    log::error!("inbound: invalid backend response: {}", e);
                } else {
                    log::error!("inbound: backend call failed: {}", e);
                }
                (TEMPORARY_ERROR_TEXT.to_string(), RelayOutcome::BackendFailed)
            }
        };

        match self.client.send_text(&msg.sender_id, &text).await {
            Ok(()) => {
                log::info!("inbound: reply sent to {}", payload.user_number);
                outcome
            }
            Err(e) => {
                log::error!("inbound: send_text to {} failed: {}", msg.sender_id, e);
                RelayOutcome::SendFailed
            }
        }
    }

    /// Process messages and state changes until a fatal state or both streams close.
    pub async fn run(
        self,
        mut messages: mpsc::Receiver<InboundMessage>,
        mut states: mpsc::Receiver<SessionState>,
    ) -> RelayExit {
        let mut tasks: JoinSet<RelayOutcome> = JoinSet::new();
        let mut messages_open = true;
        let mut states_open = true;
        loop {
            tokio::select! {
                msg = messages.recv(), if messages_open => match msg {
                    Some(msg) => {
                        let relay = self.clone();
                        tasks.spawn(async move { relay.handle_message(msg).await });
                    }
                    None => messages_open = false,
                },
                state = states.recv(), if states_open => match state {
                    Some(state) => {
                        log::info!("session state changed: {}", state);
                        *self.session_state.write().await = Some(state.clone());
                        if state.is_fatal() {
                            log::error!("session lost ({}), stopping relay", state);
                            // Dropping `tasks` aborts replies still in flight.
                            return RelayExit::SessionFatal(state);
                        }
                    }
                    None => states_open = false,
                },
                Some(done) = tasks.join_next() => {
                    if let Err(e) = done {
                        log::error!("inbound: message task failed: {}", e);
                    }
                },
                else => break,
            }
        }
        RelayExit::StreamsClosed
    }
}

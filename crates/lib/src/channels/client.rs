//! Session client: the WhatsApp Web automation session seen from the relay.
//!
//! The session engine itself (pairing, browser automation, persistence) lives outside
//! this crate. Implementations forward its events into the senders registered here.

use crate::channels::inbound::InboundMessage;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// Errors from a session client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("session not connected")]
    NotConnected,
    #[error("bridge transport error: {0}")]
    Transport(String),
    #[error("bridge did not answer within {0} ms")]
    Timeout(u64),
    #[error("session rejected request: {0}")]
    Rejected(String),
}

/// Session state reported by the automation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Opening,
    Pairing,
    Timeout,
    Conflict,
    Unpaired,
    Unlaunched,
    UnpairedIdle,
    Other(String),
}

impl SessionState {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "CONNECTED" => SessionState::Connected,
            "OPENING" => SessionState::Opening,
            "PAIRING" => SessionState::Pairing,
            "TIMEOUT" => SessionState::Timeout,
            "CONFLICT" => SessionState::Conflict,
            "UNPAIRED" => SessionState::Unpaired,
            "UNLAUNCHED" => SessionState::Unlaunched,
            "UNPAIRED_IDLE" => SessionState::UnpairedIdle,
            other => SessionState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Connected => "CONNECTED",
            SessionState::Opening => "OPENING",
            SessionState::Pairing => "PAIRING",
            SessionState::Timeout => "TIMEOUT",
            SessionState::Conflict => "CONFLICT",
            SessionState::Unpaired => "UNPAIRED",
            SessionState::Unlaunched => "UNLAUNCHED",
            SessionState::UnpairedIdle => "UNPAIRED_IDLE",
            SessionState::Other(s) => s,
        }
    }

    /// Another device took over the session, or the phone unlinked it. Not recoverable here.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionState::Conflict | SessionState::Unpaired)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to an authenticated WhatsApp Web session.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Open (or resume) the session. Returns once the session can send and receive.
    async fn connect(&self) -> Result<(), ClientError>;

    /// Deliver every incoming message to `tx`. Replaces any previous subscriber.
    fn on_message(&self, tx: mpsc::Sender<InboundMessage>);

    /// Deliver every session state change to `tx`. Replaces any previous subscriber.
    fn on_state_change(&self, tx: mpsc::Sender<SessionState>);

    /// Send a text message to a chat id (`<number>@c.us`).
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), ClientError>;

    /// Release the session. Safe to call more than once.
    async fn close(&self) -> Result<(), ClientError>;
}

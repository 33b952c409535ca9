//! WhatsApp session access.
//!
//! `SessionClient` is the seam between the relay and the external automation engine.
//! `BridgeClient` implements it over a WebSocket bridge; tests use in-memory fakes.

mod bridge;
mod client;
mod inbound;
mod options;
pub mod qr;

pub use bridge::BridgeClient;
pub use client::{ClientError, SessionClient, SessionState};
pub use inbound::{
    strip_chat_suffix, to_chat_id, FilterReason, InboundMessage, BROADCAST_CHAT, CHAT_SUFFIX,
};
pub use options::{QrDisplay, SessionNaming, SessionOptions};

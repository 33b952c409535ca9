//! Inbound message from the WhatsApp session, plus chat-id helpers.

/// Suffix that marks a personal chat address (`5511999999999@c.us`).
pub const CHAT_SUFFIX: &str = "@c.us";

/// Pseudo-chat that carries status updates.
pub const BROADCAST_CHAT: &str = "status@broadcast";

/// A message delivered by the session client. Consumed once, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    /// Chat id of the sender (e.g. `5511999999999@c.us`).
    pub sender_id: String,
    pub body: String,
    pub is_group_message: bool,
    pub is_from_self: bool,
    pub is_broadcast: bool,
}

/// Why a message was dropped before reaching the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    EmptyBody,
    Group,
    Broadcast,
    FromSelf,
}

impl FilterReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterReason::EmptyBody => "empty body",
            FilterReason::Group => "group message",
            FilterReason::Broadcast => "broadcast",
            FilterReason::FromSelf => "sent by self",
        }
    }
}

impl InboundMessage {
    /// Apply the filter chain in order; the first match wins. `None` means relay it.
    pub fn filter_reason(&self) -> Option<FilterReason> {
        if self.body.is_empty() {
            return Some(FilterReason::EmptyBody);
        }
        if self.is_group_message {
            return Some(FilterReason::Group);
        }
        if self.is_broadcast || self.sender_id == BROADCAST_CHAT {
            return Some(FilterReason::Broadcast);
        }
        if self.is_from_self {
            return Some(FilterReason::FromSelf);
        }
        None
    }
}

/// Chat id to user number: drop the `@c.us` suffix.
pub fn strip_chat_suffix(chat_id: &str) -> &str {
    chat_id.strip_suffix(CHAT_SUFFIX).unwrap_or(chat_id)
}

/// Phone number to chat id: append `@c.us` unless it is already there.
pub fn to_chat_id(number: &str) -> String {
    if number.contains(CHAT_SUFFIX) {
        number.to_string()
    } else {
        format!("{}{}", number, CHAT_SUFFIX)
    }
}

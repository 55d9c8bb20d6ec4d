//! Chat panel state — displayed messages, the buffer reducer, and notices.
//!
//! DESIGN
//! ======
//! The buffer is append-only: the only way to grow it is `apply_batch`, which
//! runs exactly once per emitted batch, and nothing can remove or reorder an
//! entry. Notices are kept separately so a failure never disturbs messages.

use std::fmt;

use crate::services::names::LookupError;
use crate::services::subscription::SubscriptionError;

/// Decorative suffix shown after the room owner's name.
pub const OWNER_MARKER: &str = "👑";
pub const JOINED_MESSAGE_ID: &str = "joined";
pub const JOINED_MESSAGE_TEXT: &str = "You have joined the room.";

/// Most recent notices kept for display.
pub const MAX_NOTICES: usize = 20;

// =============================================================================
// MESSAGE
// =============================================================================

/// A displayed chat message. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    /// Resolved display name, possibly carrying the owner marker. Empty for
    /// system messages.
    pub sender: String,
    pub content: String,
}

impl Message {
    /// Synthetic message shown when the panel mounts.
    #[must_use]
    pub fn joined(user_id: &str) -> Self {
        Self {
            id: JOINED_MESSAGE_ID.to_owned(),
            sender_id: user_id.to_owned(),
            sender: String::new(),
            content: JOINED_MESSAGE_TEXT.to_owned(),
        }
    }
}

/// Display name for a sender: owner gets the marker, nobody else does.
#[must_use]
pub fn decorate_sender(name: &str, sender_id: &str, owner_id: &str) -> String {
    let trimmed = name.trim_end();
    let bare = trimmed.strip_suffix(OWNER_MARKER).map_or(trimmed, str::trim_end);
    if sender_id == owner_id {
        format!("{bare} {OWNER_MARKER}")
    } else {
        bare.to_owned()
    }
}

// =============================================================================
// BUFFER
// =============================================================================

/// Ordered, append-only list of displayed messages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageBuffer {
    messages: Vec<Message>,
}

impl MessageBuffer {
    /// Buffer holding only the joined-room message.
    #[must_use]
    pub fn joined(user_id: &str) -> Self {
        Self { messages: vec![Message::joined(user_id)] }
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Append one emitted batch to the buffer.
#[must_use]
pub fn apply_batch(mut buffer: MessageBuffer, batch: Vec<Message>) -> MessageBuffer {
    buffer.messages.extend(batch);
    buffer
}

// =============================================================================
// NOTICES
// =============================================================================

/// Inline warning shown in the panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PanelNotice {
    Subscription(SubscriptionError),
    Lookup(LookupError),
}

impl fmt::Display for PanelNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscription(e) => write!(f, "{e}"),
            Self::Lookup(e) => write!(f, "{e}"),
        }
    }
}

// =============================================================================
// CHAT STATE
// =============================================================================

/// Everything one mounted panel displays.
#[derive(Clone, Debug, Default)]
pub struct ChatState {
    pub buffer: MessageBuffer,
    pub notices: Vec<PanelNotice>,
}

impl ChatState {
    #[must_use]
    pub fn mounted(user_id: &str) -> Self {
        Self { buffer: MessageBuffer::joined(user_id), notices: Vec::new() }
    }

    /// Record a notice, dropping the oldest past `MAX_NOTICES`.
    pub fn push_notice(&mut self, notice: PanelNotice) {
        self.notices.push(notice);
        if self.notices.len() > MAX_NOTICES {
            let excess = self.notices.len() - MAX_NOTICES;
            self.notices.drain(..excess);
        }
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod chat_test;

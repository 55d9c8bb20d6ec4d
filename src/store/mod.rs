//! Message store seam — live queries and user lookups.
//!
//! DESIGN
//! ======
//! The panel never talks to a database directly. It consumes a
//! `MessageStore`: a live query that pushes batches of document changes, and
//! a point lookup for user profiles. Ordering and delivery guarantees are the
//! store's business; the panel only preserves what it is given.
//!
//! Two implementations live here: `memory` (tests and demos) and `postgres`
//! (`LISTEN/NOTIFY` backed).

pub mod memory;
pub mod postgres;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

// =============================================================================
// TYPES
// =============================================================================

/// Record type marking internal room-state updates. Never displayed.
pub const UPDATE_STATE_TYPE: &str = "updateState";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("malformed change payload: {0}")]
    Decode(String),
    #[error("live query closed")]
    Closed,
}

/// A message document as stored in a room's message collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDoc {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub doc_type: Option<String>,
    pub created_at_ms: i64,
}

impl MessageDoc {
    /// True for internal state-update records.
    #[must_use]
    pub fn is_state_update(&self) -> bool {
        self.doc_type.as_deref() == Some(UPDATE_STATE_TYPE)
    }
}

/// User profile returned by a point lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocChange {
    pub kind: ChangeKind,
    pub doc: MessageDoc,
}

impl DocChange {
    #[must_use]
    pub fn added(doc: MessageDoc) -> Self {
        Self { kind: ChangeKind::Added, doc }
    }
}

/// Changes delivered together, in store order.
pub type ChangeBatch = Vec<DocChange>;

/// Live stream of change batches. Ends when the store closes the query.
pub type ChangeStream = BoxStream<'static, Result<ChangeBatch, StoreError>>;

/// Live query parameters: one room, records created strictly after `since_ms`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub room_id: String,
    pub since_ms: i64,
}

impl MessageQuery {
    /// Whether a document falls inside this query.
    #[must_use]
    pub fn matches(&self, doc: &MessageDoc) -> bool {
        doc.room_id == self.room_id && doc.created_at_ms > self.since_ms
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// External message store. Enables the in-memory double in tests.
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    /// Open a live query over a room's messages, ordered by creation time.
    ///
    /// The first batch carries the records already matching the query as
    /// `Added` changes; later batches carry incremental changes.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query cannot be established.
    async fn watch_messages(&self, query: MessageQuery) -> Result<ChangeStream, StoreError>;

    /// Fetch a user profile by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserNotFound`] for unknown ids, or a backend error.
    async fn fetch_user(&self, user_id: &str) -> Result<UserProfile, StoreError>;

    /// Current time on the clock that stamps `created_at_ms`, used as a
    /// subscription cursor. Defaults to the host clock.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store clock cannot be read.
    async fn cursor_ms(&self) -> Result<i64, StoreError> {
        Ok(now_ms())
    }
}

/// Host clock in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let elapsed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

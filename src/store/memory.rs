//! In-memory live store.
//!
//! DESIGN
//! ======
//! Documents and users live in a mutex-guarded map. Every `publish` applies a
//! change batch and fans it out to the watchers whose query matches, the way
//! a managed document store pushes snapshot changes. Closed watchers are
//! pruned on the next publish.
//!
//! Time is a logical clock: each new document is stamped one tick after the
//! previous one, so cursors taken with `cursor_ms` are strictly ordered against
//! later inserts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use futures::channel::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::{ChangeBatch, ChangeKind, ChangeStream, DocChange, MessageDoc, MessageQuery, MessageStore, StoreError, UserProfile};

struct Watcher {
    query: MessageQuery,
    tx: mpsc::UnboundedSender<Result<ChangeBatch, StoreError>>,
}

#[derive(Default)]
struct Inner {
    clock_ms: i64,
    docs: Vec<MessageDoc>,
    users: HashMap<String, UserProfile>,
    lookup_delays: HashMap<String, Duration>,
    lookup_counts: HashMap<String, usize>,
    watchers: Vec<Watcher>,
    fail_next_watch: bool,
    fail_next_cursor: bool,
}

/// Shared handle to an in-memory store. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a user profile.
    pub fn put_user(&self, id: &str, name: &str) {
        self.lock()
            .users
            .insert(id.to_owned(), UserProfile { id: id.to_owned(), name: name.to_owned() });
    }

    /// Delay every lookup of `user_id` by `delay`.
    pub fn set_lookup_delay(&self, user_id: &str, delay: Duration) {
        self.lock().lookup_delays.insert(user_id.to_owned(), delay);
    }

    /// Number of `fetch_user` calls made for `user_id`.
    #[must_use]
    pub fn lookup_count(&self, user_id: &str) -> usize {
        self.lock().lookup_counts.get(user_id).copied().unwrap_or(0)
    }

    /// Make the next `watch_messages` call fail.
    pub fn fail_next_watch(&self) {
        self.lock().fail_next_watch = true;
    }

    /// Make the next `cursor_ms` call fail.
    pub fn fail_next_cursor(&self) {
        self.lock().fail_next_cursor = true;
    }

    /// Current logical clock value.
    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.lock().clock_ms
    }

    /// Number of open watchers on `room_id`.
    #[must_use]
    pub fn watcher_count(&self, room_id: &str) -> usize {
        self.lock()
            .watchers
            .iter()
            .filter(|w| w.query.room_id == room_id && !w.tx.is_closed())
            .count()
    }

    /// Build a new document stamped with the next clock tick. Not stored.
    #[must_use]
    pub fn new_doc(&self, room_id: &str, sender_id: &str, content: &str, doc_type: Option<&str>) -> MessageDoc {
        let mut inner = self.lock();
        inner.clock_ms += 1;
        MessageDoc {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.to_owned(),
            sender_id: sender_id.to_owned(),
            content: content.to_owned(),
            doc_type: doc_type.map(str::to_owned),
            created_at_ms: inner.clock_ms,
        }
    }

    /// Add one chat message and publish it as a single-change batch.
    pub fn add_message(&self, room_id: &str, sender_id: &str, content: &str) -> MessageDoc {
        let doc = self.new_doc(room_id, sender_id, content, None);
        self.publish(vec![DocChange::added(doc.clone())]);
        doc
    }

    /// Replace a document's content and publish a `Modified` change.
    pub fn modify_message(&self, id: &str, content: &str) -> Option<MessageDoc> {
        let mut doc = self.lock().docs.iter().find(|d| d.id == id).cloned()?;
        doc.content = content.to_owned();
        self.publish(vec![DocChange { kind: ChangeKind::Modified, doc: doc.clone() }]);
        Some(doc)
    }

    /// Remove a document and publish a `Removed` change.
    pub fn remove_message(&self, id: &str) -> Option<MessageDoc> {
        let doc = self.lock().docs.iter().find(|d| d.id == id).cloned()?;
        self.publish(vec![DocChange { kind: ChangeKind::Removed, doc: doc.clone() }]);
        Some(doc)
    }

    /// Apply a batch and deliver it to matching watchers.
    ///
    /// Returns the number of watchers that received a non-empty batch.
    pub fn publish(&self, batch: ChangeBatch) -> usize {
        let mut inner = self.lock();

        for change in &batch {
            match change.kind {
                ChangeKind::Added => inner.docs.push(change.doc.clone()),
                ChangeKind::Modified => {
                    if let Some(existing) = inner.docs.iter_mut().find(|d| d.id == change.doc.id) {
                        *existing = change.doc.clone();
                    }
                }
                ChangeKind::Removed => inner.docs.retain(|d| d.id != change.doc.id),
            }
        }

        inner.watchers.retain(|w| !w.tx.is_closed());

        let mut delivered = 0;
        for watcher in &inner.watchers {
            let visible: ChangeBatch = batch
                .iter()
                .filter(|c| watcher.query.matches(&c.doc))
                .cloned()
                .collect();
            if visible.is_empty() {
                continue;
            }
            if watcher.tx.unbounded_send(Ok(visible)).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Terminate every live query on `room_id` with an error.
    pub fn interrupt_watchers(&self, room_id: &str) {
        let mut inner = self.lock();
        inner.watchers.retain(|w| {
            if w.query.room_id != room_id {
                return true;
            }
            let _ = w.tx.unbounded_send(Err(StoreError::Closed));
            false
        });
    }
}

#[async_trait::async_trait]
impl MessageStore for MemoryStore {
    async fn watch_messages(&self, query: MessageQuery) -> Result<ChangeStream, StoreError> {
        let mut inner = self.lock();
        if std::mem::take(&mut inner.fail_next_watch) {
            return Err(StoreError::Closed);
        }

        let (tx, rx) = mpsc::unbounded();

        let mut existing: Vec<MessageDoc> = inner.docs.iter().filter(|d| query.matches(d)).cloned().collect();
        existing.sort_by_key(|d| d.created_at_ms);
        if !existing.is_empty() {
            let _ = tx.unbounded_send(Ok(existing.into_iter().map(DocChange::added).collect()));
        }

        debug!(room_id = %query.room_id, since_ms = query.since_ms, "memory watcher registered");
        inner.watchers.push(Watcher { query, tx });

        Ok(rx.boxed())
    }

    async fn fetch_user(&self, user_id: &str) -> Result<UserProfile, StoreError> {
        let (profile, delay) = {
            let mut inner = self.lock();
            *inner.lookup_counts.entry(user_id.to_owned()).or_default() += 1;
            (inner.users.get(user_id).cloned(), inner.lookup_delays.get(user_id).copied())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        profile.ok_or_else(|| StoreError::UserNotFound(user_id.to_owned()))
    }

    async fn cursor_ms(&self) -> Result<i64, StoreError> {
        if std::mem::take(&mut self.lock().fail_next_cursor) {
            return Err(StoreError::Closed);
        }
        Ok(self.now_ms())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;

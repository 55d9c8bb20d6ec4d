//! Subscription manager — live query → enriched message batches.
//!
//! ARCHITECTURE
//! ============
//! Each subscription is one tokio task owning the store's change stream.
//! For every delivered batch it keeps `Added` chat records, resolves sender
//! names through the shared `NameCache`, decorates the owner, and forwards
//! the batch to the panel tagged with its generation.
//!
//! ERROR HANDLING
//! ==============
//! A failed or interrupted live query becomes a `SubscriptionError` notice
//! and ends the task. A failed name lookup becomes a `LookupError` notice
//! while the message is still emitted under the raw sender id.
//!
//! Cancelling aborts the task, which drops the stream (closing the live
//! query) and any lookups this task was awaiting.

use std::sync::Arc;

use futures::StreamExt;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::names::{LookupError, NameCache};
use crate::state::chat::{Message, PanelNotice, decorate_sender};
use crate::store::{ChangeBatch, ChangeKind, MessageQuery, MessageStore, StoreError};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    #[error("could not subscribe to room {room_id}: {reason}")]
    Establish { room_id: String, reason: String },
    #[error("live updates for room {room_id} stopped: {reason}")]
    Interrupted { room_id: String, reason: String },
}

/// What a subscription reports to its panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    Batch(Vec<Message>),
    Notice(PanelNotice),
}

/// Event tagged with the subscription generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub generation: u64,
    pub event: SubscriptionEvent,
}

/// Scope of one live query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionParams {
    pub room_id: String,
    pub owner_id: String,
    pub since_ms: i64,
}

/// Handle to a running subscription. Dropping it cancels the task.
pub struct Subscription {
    generation: u64,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Start a live query task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(
        store: Arc<dyn MessageStore>,
        names: Arc<NameCache>,
        params: SubscriptionParams,
        generation: u64,
        tx: mpsc::UnboundedSender<Envelope>,
    ) -> Self {
        let task = tokio::spawn(run(store, names, params, generation, tx));
        Self { generation, task }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Abort the task and wait until it has been torn down.
    pub async fn cancel(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
        debug!(generation = self.generation, "subscription cancelled");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// TASK
// =============================================================================

async fn run(
    store: Arc<dyn MessageStore>,
    names: Arc<NameCache>,
    params: SubscriptionParams,
    generation: u64,
    tx: mpsc::UnboundedSender<Envelope>,
) {
    let send = |event: SubscriptionEvent| tx.send(Envelope { generation, event }).is_ok();

    let query = MessageQuery { room_id: params.room_id.clone(), since_ms: params.since_ms };
    let mut stream = match store.watch_messages(query).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(room_id = %params.room_id, error = %e, "live query failed to start");
            let err = SubscriptionError::Establish { room_id: params.room_id.clone(), reason: e.to_string() };
            send(SubscriptionEvent::Notice(PanelNotice::Subscription(err)));
            return;
        }
    };

    info!(
        room_id = %params.room_id,
        owner_id = %params.owner_id,
        since_ms = params.since_ms,
        generation,
        "subscription started"
    );

    loop {
        let reason = match stream.next().await {
            Some(Ok(batch)) => {
                let (messages, failures) = enrich_batch(&names, &params.owner_id, batch).await;
                if !messages.is_empty() && !send(SubscriptionEvent::Batch(messages)) {
                    return;
                }
                for failure in failures {
                    send(SubscriptionEvent::Notice(PanelNotice::Lookup(failure)));
                }
                continue;
            }
            Some(Err(e)) => e.to_string(),
            None => StoreError::Closed.to_string(),
        };

        warn!(room_id = %params.room_id, %reason, "live query interrupted");
        let err = SubscriptionError::Interrupted { room_id: params.room_id.clone(), reason };
        send(SubscriptionEvent::Notice(PanelNotice::Subscription(err)));
        return;
    }
}

/// Turn one change batch into displayable messages.
///
/// Only `Added` chat records survive. Names are looked up concurrently, but
/// the output keeps change order. Lookup failures fall back to the raw
/// sender id and are returned alongside.
pub async fn enrich_batch(names: &NameCache, owner_id: &str, batch: ChangeBatch) -> (Vec<Message>, Vec<LookupError>) {
    let docs: Vec<_> = batch
        .into_iter()
        .filter(|change| change.kind == ChangeKind::Added)
        .map(|change| change.doc)
        .filter(|doc| !doc.is_state_update())
        .collect();

    let resolved = join_all(docs.iter().map(|doc| names.resolve(&doc.sender_id))).await;

    let mut messages = Vec::with_capacity(docs.len());
    let mut failures = Vec::new();
    for (doc, name) in docs.into_iter().zip(resolved) {
        let name = match name {
            Ok(name) => name,
            Err(e) => {
                failures.push(e);
                doc.sender_id.clone()
            }
        };
        messages.push(Message {
            id: doc.id,
            sender: decorate_sender(&name, &doc.sender_id, owner_id),
            sender_id: doc.sender_id,
            content: doc.content,
        });
    }

    (messages, failures)
}

#[cfg(test)]
#[path = "subscription_test.rs"]
mod tests;

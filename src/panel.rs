//! Chat panel — mounts a live subscription and owns everything it displays.
//!
//! ARCHITECTURE
//! ============
//! `mount` reads the cursor from the store clock, seeds the buffer with the joined message and
//! starts subscription generation 1. The host drives the panel by awaiting
//! `next_update`, which folds exactly one subscription event into the state:
//! batches go through `apply_batch`, notices into the notice list. Each
//! applied batch requests a scroll that the host collects via
//! `content_settled` after drawing.
//!
//! Changing the room or owner cancels the current subscription and starts a
//! new generation with a fresh cursor, so records already shown are not
//! replayed. Events from older generations that are still queued are
//! discarded.
//!
//! When the store clock cannot be read the host clock stands in; a skewed host
//! can then hide or replay records near the cursor, so it is logged.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::render::{self, MessageRow};
use crate::services::names::NameCache;
use crate::services::subscription::{Envelope, Subscription, SubscriptionEvent, SubscriptionParams};
use crate::state::chat::{ChatState, Message, PanelNotice, apply_batch};
use crate::state::scroll::{DEFAULT_SCROLL_DURATION_MS, ScrollCommand, ScrollController};
use crate::store::MessageStore;

/// Inputs the host passes to the panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelProps {
    /// User whose messages carry the owner marker.
    pub owner_id: String,
    /// Room to subscribe to.
    pub room_id: String,
    /// Viewing user; decides row alignment.
    pub user_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelOptions {
    pub scroll_duration: Duration,
}

impl Default for PanelOptions {
    fn default() -> Self {
        Self { scroll_duration: Duration::from_millis(DEFAULT_SCROLL_DURATION_MS) }
    }
}

/// Result of folding one event into the panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PanelUpdate {
    Appended { count: usize },
    Notice(PanelNotice),
}

impl PanelUpdate {
    /// True when the live query is gone and no further messages will arrive
    /// until the props change.
    #[must_use]
    pub fn ends_subscription(&self) -> bool {
        matches!(self, Self::Notice(PanelNotice::Subscription(_)))
    }
}

pub struct ChatPanel {
    store: Arc<dyn MessageStore>,
    names: Arc<NameCache>,
    props: PanelProps,
    since_ms: i64,
    state: ChatState,
    scroll: ScrollController,
    generation: u64,
    subscription: Subscription,
    tx: mpsc::UnboundedSender<Envelope>,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl ChatPanel {
    /// Mount the panel and open its live query.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub async fn mount(store: Arc<dyn MessageStore>, props: PanelProps, options: PanelOptions) -> Self {
        let since_ms = take_cursor(store.as_ref()).await;
        let names = Arc::new(NameCache::new(Arc::clone(&store)));
        let (tx, rx) = mpsc::unbounded_channel();

        let generation = 1;
        let subscription = Subscription::spawn(
            Arc::clone(&store),
            Arc::clone(&names),
            subscription_params(&props, since_ms),
            generation,
            tx.clone(),
        );

        let mut scroll = ScrollController::new(options.scroll_duration);
        let state = ChatState::mounted(&props.user_id);
        scroll.request(state.buffer.len());

        info!(room_id = %props.room_id, user_id = %props.user_id, owner_id = %props.owner_id, since_ms, "chat panel mounted");

        Self { store, names, props, since_ms, state, scroll, generation, subscription, tx, rx }
    }

    #[must_use]
    pub fn props(&self) -> &PanelProps {
        &self.props
    }

    #[must_use]
    pub fn since_ms(&self) -> i64 {
        self.since_ms
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.state.buffer.messages()
    }

    #[must_use]
    pub fn notices(&self) -> &[PanelNotice] {
        &self.state.notices
    }

    #[must_use]
    pub fn rows(&self) -> Vec<MessageRow> {
        render::rows(self.messages(), &self.props.user_id)
    }

    /// Replace the props. A room or owner change re-subscribes; a user change
    /// only affects rendering.
    pub async fn set_props(&mut self, props: PanelProps) {
        let resubscribe = props.room_id != self.props.room_id || props.owner_id != self.props.owner_id;
        self.props = props;
        if !resubscribe {
            return;
        }

        self.generation += 1;
        self.since_ms = take_cursor(self.store.as_ref()).await;
        let next = Subscription::spawn(
            Arc::clone(&self.store),
            Arc::clone(&self.names),
            subscription_params(&self.props, self.since_ms),
            self.generation,
            self.tx.clone(),
        );
        let previous = std::mem::replace(&mut self.subscription, next);
        previous.cancel().await;

        info!(
            room_id = %self.props.room_id,
            owner_id = %self.props.owner_id,
            since_ms = self.since_ms,
            generation = self.generation,
            "chat panel re-subscribed"
        );
    }

    /// Wait for the next subscription event and fold it into the panel.
    pub async fn next_update(&mut self) -> Option<PanelUpdate> {
        loop {
            let envelope = self.rx.recv().await?;
            if let Some(update) = self.accept(envelope) {
                return Some(update);
            }
        }
    }

    /// Fold every event already queued, without waiting.
    pub fn drain_pending(&mut self) -> Vec<PanelUpdate> {
        let mut updates = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            updates.extend(self.accept(envelope));
        }
        updates
    }

    /// The host finished laying out `rendered_rows` rows.
    pub fn content_settled(&mut self, rendered_rows: usize) -> Option<ScrollCommand> {
        self.scroll.content_settled(rendered_rows)
    }

    /// Cancel the live query and discard the panel.
    pub async fn unmount(self) {
        let room_id = self.props.room_id;
        self.subscription.cancel().await;
        info!(%room_id, "chat panel unmounted");
    }

    fn accept(&mut self, envelope: Envelope) -> Option<PanelUpdate> {
        if envelope.generation != self.generation {
            debug!(stale = envelope.generation, current = self.generation, "dropping stale subscription event");
            return None;
        }

        let update = match envelope.event {
            SubscriptionEvent::Batch(batch) => {
                let count = batch.len();
                let buffer = std::mem::take(&mut self.state.buffer);
                self.state.buffer = apply_batch(buffer, batch);
                self.scroll.request(self.state.buffer.len());
                debug!(count, total = self.state.buffer.len(), "messages appended");
                PanelUpdate::Appended { count }
            }
            SubscriptionEvent::Notice(notice) => {
                self.state.push_notice(notice.clone());
                PanelUpdate::Notice(notice)
            }
        };
        Some(update)
    }
}

async fn take_cursor(store: &dyn MessageStore) -> i64 {
    match store.cursor_ms().await {
        Ok(ms) => ms,
        Err(e) => {
            warn!(error = %e, "store clock unavailable; using host clock for cursor");
            crate::store::now_ms()
        }
    }
}

fn subscription_params(props: &PanelProps, since_ms: i64) -> SubscriptionParams {
    SubscriptionParams { room_id: props.room_id.clone(), owner_id: props.owner_id.clone(), since_ms }
}

#[cfg(test)]
#[path = "panel_test.rs"]
mod tests;

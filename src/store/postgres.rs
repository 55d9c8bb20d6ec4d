//! `PostgreSQL` store — live queries over `LISTEN/NOTIFY`.
//!
//! ARCHITECTURE
//! ============
//! A trigger on `messages` publishes every row change on the
//! `room_messages` channel as a JSON payload. `watch_messages` starts
//! listening first, then reads the rows already past the cursor, so no insert
//! can fall between the snapshot and the first notification. A row committed
//! in that window shows up in both; insert notifications for snapshot ids are
//! dropped.
//!
//! Cursors come from the database clock (`clock_timestamp()`), the same clock
//! that stamps `created_at`, so host clock skew cannot move the window.
//!
//! TRADE-OFFS
//! ==========
//! Every watcher holds its own listener connection. Notifications for other
//! rooms are filtered client-side; acceptable for one panel per process.
//! Payloads above the `pg_notify` size limit fail the insert. A transaction
//! that inserts before the cursor is taken but commits after it stays
//! invisible.

use std::collections::HashSet;

use futures::StreamExt;
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tracing::{info, warn};

use super::{ChangeKind, ChangeStream, DocChange, MessageDoc, MessageQuery, MessageStore, StoreError, UserProfile};

/// Channel the `messages` trigger notifies on.
pub const NOTIFY_CHANNEL: &str = "room_messages";

/// Current database time in milliseconds, on the clock that stamps rows.
pub(crate) const CURSOR_SQL: &str = "SELECT (EXTRACT(EPOCH FROM clock_timestamp()) * 1000)::BIGINT";

type MessageRow = (String, String, String, String, Option<String>, i64);

#[derive(Debug, Deserialize)]
struct NotifyPayload {
    op: String,
    #[serde(flatten)]
    doc: MessageDoc,
}

/// Store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn snapshot(&self, query: &MessageQuery) -> Result<Vec<DocChange>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"SELECT id, room_id, sender_id, content, "type",
                      (EXTRACT(EPOCH FROM created_at) * 1000)::BIGINT AS created_at_ms
               FROM messages
               WHERE room_id = $1
                 AND (EXTRACT(EPOCH FROM created_at) * 1000)::BIGINT > $2
               ORDER BY created_at ASC"#,
        )
        .bind(&query.room_id)
        .bind(query.since_ms)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_doc).map(DocChange::added).collect())
    }
}

fn row_to_doc((id, room_id, sender_id, content, doc_type, created_at_ms): MessageRow) -> MessageDoc {
    MessageDoc { id, room_id, sender_id, content, doc_type, created_at_ms }
}

/// Decode one trigger payload into a change.
pub(crate) fn decode_notification(payload: &str) -> Result<DocChange, StoreError> {
    let parsed: NotifyPayload = serde_json::from_str(payload).map_err(|e| StoreError::Decode(e.to_string()))?;
    let kind = match parsed.op.as_str() {
        "INSERT" => ChangeKind::Added,
        "UPDATE" => ChangeKind::Modified,
        "DELETE" => ChangeKind::Removed,
        other => return Err(StoreError::Decode(format!("unknown op: {other}"))),
    };
    Ok(DocChange { kind, doc: parsed.doc })
}

/// Whether a decoded notification belongs in the live stream: inside the
/// query and not an insert already delivered by the snapshot.
pub(crate) fn admit_notification(query: &MessageQuery, snapshot_ids: &HashSet<String>, change: &DocChange) -> bool {
    if !query.matches(&change.doc) {
        return false;
    }
    !(change.kind == ChangeKind::Added && snapshot_ids.contains(&change.doc.id))
}

#[async_trait::async_trait]
impl MessageStore for PgMessageStore {
    async fn watch_messages(&self, query: MessageQuery) -> Result<ChangeStream, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;

        let snapshot = self.snapshot(&query).await?;
        info!(room_id = %query.room_id, since_ms = query.since_ms, existing = snapshot.len(), "live query established");

        let snapshot_ids: HashSet<String> = snapshot.iter().map(|c| c.doc.id.clone()).collect();
        let live = listener.into_stream().filter_map(move |item| {
            let admitted = match item {
                Err(e) => Some(Err(StoreError::Database(e))),
                Ok(notification) => match decode_notification(notification.payload()) {
                    Ok(change) if admit_notification(&query, &snapshot_ids, &change) => Some(Ok(vec![change])),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(error = %e, "skipping malformed message notification");
                        None
                    }
                },
            };
            futures::future::ready(admitted)
        });

        let initial = futures::stream::iter((!snapshot.is_empty()).then(|| Ok(snapshot)));
        Ok(initial.chain(live).boxed())
    }

    async fn fetch_user(&self, user_id: &str) -> Result<UserProfile, StoreError> {
        let row = sqlx::query_as::<_, (String, String)>("SELECT id, name FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(id, name)| UserProfile { id, name })
            .ok_or_else(|| StoreError::UserNotFound(user_id.to_owned()))
    }

    async fn cursor_ms(&self) -> Result<i64, StoreError> {
        let (now_ms,) = sqlx::query_as::<_, (i64,)>(CURSOR_SQL).fetch_one(&self.pool).await?;
        Ok(now_ms)
    }
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;

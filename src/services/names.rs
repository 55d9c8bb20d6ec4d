//! Sender name cache — one lookup per sender, shared by concurrent callers.
//!
//! DESIGN
//! ======
//! Each sender id maps to a shared future. The first caller starts the
//! profile fetch; everyone asking while it runs (or after it succeeds)
//! awaits the same result. Failed lookups are evicted so the next message
//! from that sender retries.
//!
//! The map lock is only held to find or insert an entry, never across an
//! await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, warn};

use crate::store::MessageStore;

/// Sender profile could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not load sender {user_id}: {reason}")]
pub struct LookupError {
    pub user_id: String,
    pub reason: String,
}

type PendingName = Shared<BoxFuture<'static, Result<String, LookupError>>>;

pub struct NameCache {
    store: Arc<dyn MessageStore>,
    entries: Mutex<HashMap<String, PendingName>>,
}

impl NameCache {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store, entries: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingName>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve a sender's display name.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] if the store lookup fails.
    pub async fn resolve(&self, user_id: &str) -> Result<String, LookupError> {
        let pending = {
            let mut entries = self.lock();
            entries
                .entry(user_id.to_owned())
                .or_insert_with(|| {
                    debug!(%user_id, "fetching sender profile");
                    let store = Arc::clone(&self.store);
                    let user_id = user_id.to_owned();
                    async move {
                        store
                            .fetch_user(&user_id)
                            .await
                            .map(|profile| profile.name)
                            .map_err(|e| LookupError { user_id, reason: e.to_string() })
                    }
                    .boxed()
                    .shared()
                })
                .clone()
        };

        let result = pending.await;

        if let Err(e) = &result {
            warn!(user_id = %e.user_id, reason = %e.reason, "sender lookup failed");
            let mut entries = self.lock();
            if entries.get(user_id).is_some_and(|p| matches!(p.peek(), Some(Err(_)))) {
                entries.remove(user_id);
            }
        }

        result
    }

    /// Name already resolved for `user_id`, without starting a lookup.
    #[must_use]
    pub fn cached(&self, user_id: &str) -> Option<String> {
        match self.lock().get(user_id)?.peek()? {
            Ok(name) => Some(name.clone()),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
#[path = "names_test.rs"]
mod tests;

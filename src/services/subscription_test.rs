use std::time::Duration;

use super::*;
use crate::store::memory::MemoryStore;
use crate::store::{DocChange, UPDATE_STATE_TYPE};

const ROOM: &str = "R1";
const OWNER: &str = "U2";

struct Harness {
    store: MemoryStore,
    rx: mpsc::UnboundedReceiver<Envelope>,
    subscription: Subscription,
}

fn start(store: &MemoryStore, generation: u64) -> Harness {
    let shared: Arc<dyn MessageStore> = Arc::new(store.clone());
    let names = Arc::new(NameCache::new(Arc::clone(&shared)));
    let (tx, rx) = mpsc::unbounded_channel();
    let params = SubscriptionParams { room_id: ROOM.into(), owner_id: OWNER.into(), since_ms: store.now_ms() };
    let subscription = Subscription::spawn(shared, names, params, generation, tx);
    Harness { store: store.clone(), rx, subscription }
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.put_user("U1", "Bob");
    store.put_user("U2", "Alice");
    store.put_user("U3", "Carol");
    store
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Envelope {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for subscription event")
        .expect("channel closed")
}

async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Envelope>) {
    let waited = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(!matches!(waited, Ok(Some(_))), "unexpected event: {waited:?}");
}

fn batch(envelope: Envelope) -> Vec<Message> {
    match envelope.event {
        SubscriptionEvent::Batch(messages) => messages,
        SubscriptionEvent::Notice(notice) => panic!("expected batch, got notice: {notice}"),
    }
}

// =============================================================================
// Live batches
// =============================================================================

#[tokio::test]
async fn owner_message_is_decorated() {
    let mut h = start(&seeded_store(), 1);
    h.store.add_message(ROOM, "U2", "hi");

    let envelope = next_event(&mut h.rx).await;
    assert_eq!(envelope.generation, 1);
    let messages = batch(envelope);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender, "Alice 👑");
    assert_eq!(messages[0].sender_id, "U2");
    assert_eq!(messages[0].content, "hi");
}

#[tokio::test]
async fn other_sender_is_not_decorated() {
    let mut h = start(&seeded_store(), 1);
    h.store.add_message(ROOM, "U3", "hello");

    let messages = batch(next_event(&mut h.rx).await);
    assert_eq!(messages[0].sender, "Carol");
}

#[tokio::test]
async fn state_updates_are_skipped_without_lookup() {
    let store = seeded_store();
    store.put_user("U9", "System");
    let mut h = start(&store, 1);

    let state = store.new_doc(ROOM, "U9", "", Some(UPDATE_STATE_TYPE));
    store.publish(vec![DocChange::added(state)]);
    assert_quiet(&mut h.rx).await;
    assert_eq!(store.lookup_count("U9"), 0);

    let state = store.new_doc(ROOM, "U9", "", Some(UPDATE_STATE_TYPE));
    let chat = store.new_doc(ROOM, "U1", "after state", None);
    store.publish(vec![DocChange::added(state), DocChange::added(chat)]);
    let messages = batch(next_event(&mut h.rx).await);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "after state");
}

#[tokio::test]
async fn modifications_and_removals_are_ignored() {
    let mut h = start(&seeded_store(), 1);
    let doc = h.store.add_message(ROOM, "U1", "original");
    let _ = next_event(&mut h.rx).await;

    h.store.modify_message(&doc.id, "edited");
    h.store.remove_message(&doc.id);
    assert_quiet(&mut h.rx).await;
}

#[tokio::test]
async fn batch_order_survives_out_of_order_lookups() {
    let store = seeded_store();
    store.set_lookup_delay("U3", Duration::from_millis(40));
    let mut h = start(&store, 1);

    let slow = store.new_doc(ROOM, "U3", "first", None);
    let fast = store.new_doc(ROOM, "U1", "second", None);
    let owner = store.new_doc(ROOM, "U2", "third", None);
    store.publish(vec![DocChange::added(slow), DocChange::added(fast), DocChange::added(owner)]);

    let messages = batch(next_event(&mut h.rx).await);
    let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
    assert_eq!(messages[0].sender, "Carol");
    assert_eq!(messages[2].sender, "Alice 👑");
}

#[tokio::test]
async fn repeat_senders_share_one_lookup() {
    let store = seeded_store();
    let mut h = start(&store, 1);

    let a = store.new_doc(ROOM, "U1", "a", None);
    let b = store.new_doc(ROOM, "U1", "b", None);
    store.publish(vec![DocChange::added(a), DocChange::added(b)]);
    let _ = next_event(&mut h.rx).await;
    store.add_message(ROOM, "U1", "c");
    let _ = next_event(&mut h.rx).await;

    assert_eq!(store.lookup_count("U1"), 1);
}

#[tokio::test]
async fn records_before_cursor_are_not_replayed() {
    let store = seeded_store();
    store.add_message(ROOM, "U1", "history");
    let mut h = start(&store, 1);

    assert_quiet(&mut h.rx).await;
    store.add_message(ROOM, "U1", "live");
    let messages = batch(next_event(&mut h.rx).await);
    assert_eq!(messages[0].content, "live");
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn failed_lookup_falls_back_to_sender_id_and_reports() {
    let mut h = start(&seeded_store(), 1);
    h.store.add_message(ROOM, "ghost", "boo");

    let messages = batch(next_event(&mut h.rx).await);
    assert_eq!(messages[0].sender, "ghost");
    assert_eq!(messages[0].content, "boo");

    let notice = next_event(&mut h.rx).await;
    let SubscriptionEvent::Notice(PanelNotice::Lookup(err)) = notice.event else {
        panic!("expected lookup notice");
    };
    assert_eq!(err.user_id, "ghost");
}

#[tokio::test]
async fn failed_owner_lookup_still_gets_marker() {
    let store = MemoryStore::new();
    let mut h = start(&store, 1);
    store.add_message(ROOM, OWNER, "unnamed owner");

    let messages = batch(next_event(&mut h.rx).await);
    assert_eq!(messages[0].sender, "U2 👑");
}

#[tokio::test]
async fn establish_failure_reports_notice() {
    let store = seeded_store();
    store.fail_next_watch();
    let mut h = start(&store, 4);

    let envelope = next_event(&mut h.rx).await;
    assert_eq!(envelope.generation, 4);
    assert!(matches!(
        envelope.event,
        SubscriptionEvent::Notice(PanelNotice::Subscription(SubscriptionError::Establish { ref room_id, .. })) if room_id == ROOM
    ));
}

#[tokio::test]
async fn interruption_reports_notice_and_ends_task() {
    let mut h = start(&seeded_store(), 1);
    h.store.add_message(ROOM, "U1", "before");
    let _ = next_event(&mut h.rx).await;

    h.store.interrupt_watchers(ROOM);
    let envelope = next_event(&mut h.rx).await;
    assert!(matches!(
        envelope.event,
        SubscriptionEvent::Notice(PanelNotice::Subscription(SubscriptionError::Interrupted { .. }))
    ));

    tokio::time::timeout(Duration::from_secs(2), async {
        while !h.subscription.is_finished() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test]
async fn cancel_closes_live_query() {
    let mut h = start(&seeded_store(), 2);
    h.store.add_message(ROOM, "U1", "one");
    let _ = next_event(&mut h.rx).await;
    assert_eq!(h.store.watcher_count(ROOM), 1);
    assert_eq!(h.subscription.generation(), 2);

    h.subscription.cancel().await;
    assert_eq!(h.store.watcher_count(ROOM), 0);
    assert_eq!(h.store.publish(vec![]), 0);
    h.store.add_message(ROOM, "U1", "two");
    assert_quiet(&mut h.rx).await;
}

// =============================================================================
// enrich_batch
// =============================================================================

#[tokio::test]
async fn enrich_batch_empty_input() {
    let store = seeded_store();
    let names = NameCache::new(Arc::new(store));
    let (messages, failures) = enrich_batch(&names, OWNER, Vec::new()).await;
    assert!(messages.is_empty());
    assert!(failures.is_empty());
}

use super::*;

// =============================================================
// ScrollController
// =============================================================

#[test]
fn default_uses_200ms_animation() {
    let mut scroll = ScrollController::default();
    scroll.request(1);
    assert_eq!(
        scroll.content_settled(1),
        Some(ScrollCommand::ToBottom { last_index: 0, duration: Duration::from_millis(200) })
    );
}

#[test]
fn settle_without_request_emits_nothing() {
    let mut scroll = ScrollController::default();
    assert!(!scroll.is_pending());
    assert_eq!(scroll.content_settled(10), None);
}

#[test]
fn waits_until_rendered_rows_catch_up() {
    let mut scroll = ScrollController::new(Duration::from_millis(50));
    scroll.request(3);
    assert_eq!(scroll.content_settled(2), None);
    assert!(scroll.is_pending());
    assert_eq!(
        scroll.content_settled(3),
        Some(ScrollCommand::ToBottom { last_index: 2, duration: Duration::from_millis(50) })
    );
    assert!(!scroll.is_pending());
}

#[test]
fn scroll_emitted_once_per_update() {
    let mut scroll = ScrollController::default();
    scroll.request(2);
    assert!(scroll.content_settled(2).is_some());
    assert_eq!(scroll.content_settled(2), None);
}

#[test]
fn multiple_requests_collapse_to_latest_target() {
    let mut scroll = ScrollController::default();
    scroll.request(2);
    scroll.request(5);
    scroll.request(4);
    assert_eq!(scroll.content_settled(4), None);
    let Some(ScrollCommand::ToBottom { last_index, .. }) = scroll.content_settled(5) else {
        panic!("expected scroll");
    };
    assert_eq!(last_index, 4);
}

#[test]
fn empty_render_never_scrolls() {
    let mut scroll = ScrollController::default();
    scroll.request(0);
    assert_eq!(scroll.content_settled(0), None);
}

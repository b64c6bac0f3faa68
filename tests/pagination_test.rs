use room_timeline::types::{Direction, EventType, RelationType, TimelineEvent};
use room_timeline::types::events::TimelineUpdate;
use room_timeline::{MemorySession, PaginationError, RoomTimeline, TimelineConfig, TimelineError};
use std::sync::Arc;
use tokio::sync::Notify;

fn message(id: &str, ts: u64) -> TimelineEvent {
    TimelineEvent::new(id, EventType::Message, "@alice:example.org", ts).with_content("body", id)
}

fn ids(events: &[TimelineEvent]) -> Vec<&str> {
    events.iter().map(|e| e.id.as_str()).collect()
}

async fn open_room(session: &Arc<MemorySession>, config: TimelineConfig) -> RoomTimeline {
    let timeline = RoomTimeline::new("!room:example.org", session.clone(), config);
    timeline.handle_event(message("e5", 5_000), Direction::Forward).await;
    timeline.handle_event(message("e6", 6_000), Direction::Forward).await;
    timeline
}

#[tokio::test]
async fn test_paginate_until_walks_back_to_target() {
    let session = Arc::new(MemorySession::new());
    session
        .push_page(vec![message("e4", 4_000), message("e3", 3_000)], true)
        .await;
    session
        .push_page(vec![message("e2", 2_000), message("e1", 1_000)], true)
        .await;
    let timeline = open_room(&session, TimelineConfig::default()).await;

    timeline.paginate_until("e1").await.unwrap();

    let snapshot = timeline.snapshot().await;
    assert_eq!(ids(&snapshot), vec!["e1", "e2", "e3", "e4", "e5", "e6"]);
    assert_eq!(session.page_requests(), 2);
    assert!(timeline.has_more_backward_history().await);
}

#[tokio::test]
async fn test_paginate_until_cached_target_fetches_nothing() {
    let session = Arc::new(MemorySession::new());
    let timeline = open_room(&session, TimelineConfig::default()).await;

    timeline.paginate_until("e5").await.unwrap();

    assert_eq!(session.page_requests(), 0);
}

#[tokio::test]
async fn test_paginate_until_stops_when_history_runs_out() {
    let session = Arc::new(MemorySession::new());
    session
        .push_page(vec![message("e2", 2_000), message("e1", 1_000)], false)
        .await;
    let timeline = open_room(&session, TimelineConfig::default()).await;
    let mut updates = timeline.subscribe();

    let err = timeline.paginate_until("missing").await.unwrap_err();

    assert!(matches!(
        err,
        TimelineError::Pagination(PaginationError::HistoryExhausted(ref id)) if id == "missing"
    ));
    assert_eq!(session.page_requests(), 1);
    assert!(!timeline.has_more_backward_history().await);

    let mut seen = Vec::new();
    while let Ok(update) = updates.try_recv() {
        seen.push(update);
    }
    assert!(seen.contains(&TimelineUpdate::Inserted {
        event_id: "e1".to_string(),
        prepended: true,
    }));
    assert_eq!(seen.last(), Some(&TimelineUpdate::BackwardHistoryExhausted));
}

#[tokio::test]
async fn test_paginate_until_gives_up_after_page_limit() {
    let session = Arc::new(MemorySession::new());
    session.set_endless_history(true);
    let config = TimelineConfig {
        max_pages: 3,
        ..Default::default()
    };
    let timeline = open_room(&session, config).await;

    let err = timeline.paginate_until("missing").await.unwrap_err();

    assert!(matches!(
        err,
        TimelineError::Pagination(PaginationError::PageLimitReached { pages: 3, .. })
    ));
    assert_eq!(session.page_requests(), 3);
}

#[tokio::test]
async fn test_fetch_failure_surfaces_and_retry_succeeds() {
    let session = Arc::new(MemorySession::new());
    session.push_page(vec![message("e4", 4_000)], true).await;
    session.fail_next_page();
    let timeline = open_room(&session, TimelineConfig::default()).await;

    let err = timeline.paginate_until("e4").await.unwrap_err();
    assert!(matches!(err, TimelineError::Pagination(PaginationError::Fetch(_))));
    assert_eq!(timeline.snapshot().await.len(), 2);

    timeline.paginate_until("e4").await.unwrap();
    assert_eq!(ids(&timeline.snapshot().await), vec!["e4", "e5", "e6"]);
}

fn redaction(id: &str, target: &str, ts: u64) -> TimelineEvent {
    TimelineEvent::new(id, EventType::Redaction, "@alice:example.org", ts).redacting(target)
}

fn edit(id: &str, target: &str, body: &str, ts: u64) -> TimelineEvent {
    message(id, ts)
        .relating_to(target, RelationType::Replace)
        .with_content("new_content", serde_json::json!({ "body": body }))
}

#[tokio::test]
async fn test_backfilled_edits_and_redactions_apply_to_older_targets() {
    let session = Arc::new(MemorySession::new());
    session
        .push_page(
            vec![
                redaction("x4", "e2", 4_000),
                edit("e3", "e1", "fixed", 3_000),
                message("e2", 2_000),
                message("e1", 1_000),
            ],
            false,
        )
        .await;
    let timeline = open_room(&session, TimelineConfig::default()).await;
    let mut updates = timeline.subscribe();

    timeline.paginate().await.unwrap();

    let snapshot = timeline.snapshot().await;
    assert_eq!(ids(&snapshot), vec!["e1", "e5", "e6"]);
    assert_eq!(snapshot[0].body(), Some("fixed"));
    assert!(snapshot[0].is_edited());

    let mut seen = Vec::new();
    while let Ok(update) = updates.try_recv() {
        seen.push(update);
    }
    assert!(seen.contains(&TimelineUpdate::Replaced {
        event_id: "e1".to_string()
    }));
    assert!(!seen.contains(&TimelineUpdate::Inserted {
        event_id: "e2".to_string(),
        prepended: true,
    }));
}

#[tokio::test]
async fn test_relations_wait_for_targets_in_older_pages() {
    let session = Arc::new(MemorySession::new());
    session
        .push_page(
            vec![
                edit("e4", "e1", "fixed", 4_000),
                redaction("x3", "e2", 3_000),
            ],
            true,
        )
        .await;
    session
        .push_page(vec![message("e2", 2_000), message("e1", 1_000)], false)
        .await;
    let timeline = open_room(&session, TimelineConfig::default()).await;

    timeline.paginate_until("e1").await.unwrap();

    let snapshot = timeline.snapshot().await;
    assert_eq!(ids(&snapshot), vec!["e1", "e5", "e6"]);
    assert_eq!(snapshot[0].body(), Some("fixed"));
    assert_eq!(session.page_requests(), 2);
}

#[tokio::test]
async fn test_backfilled_redaction_of_cached_event_removes_it() {
    let session = Arc::new(MemorySession::new());
    session
        .push_page(vec![redaction("x7", "e5", 7_000)], true)
        .await;
    let timeline = open_room(&session, TimelineConfig::default()).await;

    timeline.paginate().await.unwrap();

    assert_eq!(ids(&timeline.snapshot().await), vec!["e6"]);
}

#[tokio::test]
async fn test_duplicate_events_across_pages_are_dropped() {
    let session = Arc::new(MemorySession::new());
    session
        .push_page(vec![message("e6", 6_000), message("e4", 4_000)], true)
        .await;
    let timeline = open_room(&session, TimelineConfig::default()).await;

    let has_more = timeline.paginate().await.unwrap();

    assert!(has_more);
    assert_eq!(ids(&timeline.snapshot().await), vec!["e4", "e5", "e6"]);
}

#[tokio::test]
async fn test_cancel_all_aborts_in_flight_fetch() {
    let _ = env_logger::builder().is_test(true).try_init();
    let gate = Arc::new(Notify::new());
    let session = Arc::new(MemorySession::new().with_page_gate(gate.clone()));
    session.push_page(vec![message("e4", 4_000)], true).await;
    let timeline = Arc::new(open_room(&session, TimelineConfig::default()).await);

    let running = {
        let timeline = timeline.clone();
        tokio::spawn(async move { timeline.paginate_until("e1").await })
    };
    while session.page_requests() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(timeline.pagination_in_flight(), 1);

    timeline.cancel_all();

    let result = running.await.unwrap();
    assert!(matches!(
        result,
        Err(TimelineError::Pagination(PaginationError::Cancelled))
    ));
    assert_eq!(timeline.pagination_in_flight(), 0);
    assert_eq!(timeline.snapshot().await.len(), 2);

    // A fresh request after cancellation is not affected by it.
    gate.notify_one();
    assert!(timeline.paginate().await.unwrap());
    assert_eq!(ids(&timeline.snapshot().await), vec!["e4", "e5", "e6"]);
}

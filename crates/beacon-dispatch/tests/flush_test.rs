//! Integration tests for the flush scheduler and retry timer lifecycle.
//!
//! Covers the queue/timer invariant, head-first removal, idempotent empty
//! flushes, degraded-store cycles, and the disabled-scheduling configuration.

use std::{sync::Arc, time::Duration};

use beacon_core::{Event, EventKind, NoOpEventHandler, RealClock};
use beacon_dispatch::{
    store::memory::{InMemoryEventStore, StoreOp},
    transport::mock::{ok_receipt, MockTransport},
    DispatchConfig, EventDispatcher, EventStore, TransportError,
};

fn test_config() -> DispatchConfig {
    DispatchConfig {
        impression_url: "https://impressions.test/v1".to_string(),
        conversion_url: "https://conversions.test/v1".to_string(),
        ..Default::default()
    }
}

fn build_dispatcher(
    store: Arc<InMemoryEventStore>,
    transport: Arc<MockTransport>,
    config: DispatchConfig,
) -> EventDispatcher {
    EventDispatcher::with_parts(
        store,
        transport,
        config,
        Arc::new(RealClock),
        Arc::new(NoOpEventHandler),
    )
    .expect("dispatcher should construct")
}

fn sample_event(tag: i64) -> Event {
    Event::new().with("seq", tag)
}

async fn wait_for_count(store: &InMemoryEventStore, kind: EventKind, expected: usize) {
    for _ in 0..200 {
        if store.count(kind).await.unwrap() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("queue {kind} never reached count {expected}");
}

async fn wait_for_timer(dispatcher: &EventDispatcher, armed: bool) {
    for _ in 0..200 {
        if dispatcher.timer_armed().await == armed {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timer never became armed={armed}");
}

#[tokio::test]
async fn empty_flush_is_idempotent() {
    let store = Arc::new(InMemoryEventStore::new());
    let transport = Arc::new(MockTransport::new());
    let dispatcher = build_dispatcher(store.clone(), transport.clone(), test_config());

    dispatcher.flush_and_wait().await;
    dispatcher.flush_and_wait().await;

    assert!(!dispatcher.timer_armed().await);
    assert_eq!(store.count(EventKind::Impression).await.unwrap(), 0);
    assert_eq!(store.count(EventKind::Conversion).await.unwrap(), 0);
    assert_eq!(transport.send_count().await, 0);
    assert_eq!(dispatcher.stats().await.flush_cycles, 2);
}

#[tokio::test]
async fn timer_arms_on_failed_dispatch_and_survives_failed_flushes() {
    let store = Arc::new(InMemoryEventStore::new());
    let transport = Arc::new(MockTransport::failing());
    let dispatcher = build_dispatcher(store.clone(), transport.clone(), test_config());

    let outcome =
        dispatcher.dispatch(sample_event(1), EventKind::Impression).await.expect("outcome");
    assert!(!outcome.is_delivered());

    wait_for_timer(&dispatcher, true).await;

    // A flush whose resends all fail leaves the timer armed and the queue
    // intact.
    dispatcher.flush_and_wait().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(dispatcher.timer_armed().await);
    assert_eq!(store.count(EventKind::Impression).await.unwrap(), 1);
}

#[tokio::test]
async fn timer_disarms_once_both_queues_drain() {
    let store = Arc::new(InMemoryEventStore::new());
    store.save(sample_event(1), EventKind::Impression).await.unwrap();
    store.save(sample_event(2), EventKind::Conversion).await.unwrap();

    let transport = Arc::new(MockTransport::new());
    let dispatcher = build_dispatcher(store.clone(), transport.clone(), test_config());

    dispatcher.flush_and_wait().await;

    wait_for_count(&store, EventKind::Impression, 0).await;
    wait_for_count(&store, EventKind::Conversion, 0).await;
    wait_for_timer(&dispatcher, false).await;
}

#[tokio::test]
async fn removal_is_always_the_queue_head() {
    let store = Arc::new(InMemoryEventStore::new());
    for tag in 1..=3 {
        store.save(sample_event(tag), EventKind::Impression).await.unwrap();
    }

    let transport = Arc::new(MockTransport::failing());
    // Exactly one of the three resends succeeds, in whichever order the
    // spawned attempts happen to run.
    transport.enqueue_outcome(Ok(ok_receipt())).await;
    let dispatcher = build_dispatcher(store.clone(), transport.clone(), test_config());

    dispatcher.flush_and_wait().await;
    wait_for_count(&store, EventKind::Impression, 2).await;

    // Whichever resend succeeded, the head (oldest) event is the one gone.
    assert_eq!(
        store.list_all(EventKind::Impression).await.unwrap(),
        vec![sample_event(2), sample_event(3)]
    );
}

#[tokio::test]
async fn partial_failure_then_clean_cycle_empties_queue() {
    let store = Arc::new(InMemoryEventStore::new());
    store.save(sample_event(1), EventKind::Impression).await.unwrap();
    store.save(sample_event(2), EventKind::Impression).await.unwrap();

    let transport = Arc::new(MockTransport::new());
    // First cycle: one resend fails, one succeeds.
    transport.enqueue_outcome(Err(TransportError::network("connection reset"))).await;
    let dispatcher = build_dispatcher(store.clone(), transport.clone(), test_config());

    dispatcher.flush_and_wait().await;
    wait_for_count(&store, EventKind::Impression, 1).await;
    assert!(dispatcher.timer_armed().await);

    // Second cycle: the remaining resend succeeds and the timer disarms.
    dispatcher.flush_and_wait().await;
    wait_for_count(&store, EventKind::Impression, 0).await;
    wait_for_timer(&dispatcher, false).await;
}

#[tokio::test]
async fn disabled_interval_never_arms_the_timer() {
    let store = Arc::new(InMemoryEventStore::new());
    let transport = Arc::new(MockTransport::failing());
    let config = DispatchConfig { dispatch_interval_ms: 0, ..test_config() };
    let dispatcher = build_dispatcher(store.clone(), transport.clone(), config);

    let outcome =
        dispatcher.dispatch(sample_event(1), EventKind::Impression).await.expect("outcome");
    assert!(!outcome.is_delivered());

    // The event is persisted, but retry scheduling stays off.
    assert_eq!(store.count(EventKind::Impression).await.unwrap(), 1);
    assert!(!dispatcher.timer_armed().await);

    dispatcher.flush_and_wait().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!dispatcher.timer_armed().await);
    assert_eq!(store.count(EventKind::Impression).await.unwrap(), 1);
}

#[tokio::test]
async fn overlapping_flushes_do_not_corrupt_the_queue() {
    let store = Arc::new(InMemoryEventStore::new());
    store.save(sample_event(1), EventKind::Conversion).await.unwrap();

    let transport = Arc::new(MockTransport::new());
    let dispatcher = build_dispatcher(store.clone(), transport.clone(), test_config());

    // Two cycles may both resend the same queued event; the duplicate
    // delivery is accepted and the second head removal is a no-op.
    dispatcher.flush();
    dispatcher.flush_and_wait().await;

    wait_for_count(&store, EventKind::Conversion, 0).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.count(EventKind::Conversion).await.unwrap(), 0);
    wait_for_timer(&dispatcher, false).await;
}

#[tokio::test]
async fn read_failure_skips_that_kind_for_one_cycle() {
    let store = Arc::new(InMemoryEventStore::new());
    store.save(sample_event(1), EventKind::Impression).await.unwrap();
    store.save(sample_event(2), EventKind::Conversion).await.unwrap();

    let transport = Arc::new(MockTransport::new());
    let dispatcher = build_dispatcher(store.clone(), transport.clone(), test_config());

    // Impressions are listed first, so the injected read failure lands on
    // that kind; conversions still drain this cycle.
    store.inject_error(StoreOp::ListAll, "read failed").await;
    dispatcher.flush_and_wait().await;

    wait_for_count(&store, EventKind::Conversion, 0).await;
    assert_eq!(store.count(EventKind::Impression).await.unwrap(), 1);
    assert!(dispatcher.timer_armed().await);

    // The next cycle retries the skipped kind.
    dispatcher.flush_and_wait().await;
    wait_for_count(&store, EventKind::Impression, 0).await;
    wait_for_timer(&dispatcher, false).await;
}

#[tokio::test]
async fn count_failure_aborts_the_cycle_but_still_completes() {
    let store = Arc::new(InMemoryEventStore::new());
    store.save(sample_event(1), EventKind::Impression).await.unwrap();

    let transport = Arc::new(MockTransport::new());
    let dispatcher = build_dispatcher(store.clone(), transport.clone(), test_config());

    store.inject_error(StoreOp::Count, "store offline").await;
    // Completion fires even though the cycle was aborted.
    dispatcher.flush_and_wait().await;
    assert_eq!(store.count(EventKind::Impression).await.unwrap(), 1);
    assert_eq!(transport.send_count().await, 0);

    // A later cycle drains normally.
    dispatcher.flush_and_wait().await;
    wait_for_count(&store, EventKind::Impression, 0).await;
}

#[tokio::test]
async fn armed_timer_ticks_drain_the_queue_without_manual_flushes() {
    let store = Arc::new(InMemoryEventStore::new());
    let transport = Arc::new(MockTransport::failing());
    let config = DispatchConfig { dispatch_interval_ms: 25, ..test_config() };
    let dispatcher = build_dispatcher(store.clone(), transport.clone(), config);

    let outcome =
        dispatcher.dispatch(sample_event(1), EventKind::Impression).await.expect("outcome");
    assert!(!outcome.is_delivered());
    wait_for_timer(&dispatcher, true).await;

    // Once the endpoint recovers, a timer tick delivers the event with no
    // explicit flush call.
    transport.set_default_outcome(Ok(ok_receipt())).await;
    wait_for_count(&store, EventKind::Impression, 0).await;
    wait_for_timer(&dispatcher, false).await;
}

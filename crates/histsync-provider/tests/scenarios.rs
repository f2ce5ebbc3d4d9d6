//! End-to-end provider behaviour against the synthetic server and the memory
//! cache, on a paused clock.

use histsync_config::ProviderConfig;
use histsync_core::test_support::RecordingServer;
use histsync_core::{
    Filters, FitStore, ListHandle, ListId, MemoryCache, Row, ScrollPosition, SyntheticServer,
};
use histsync_provider::{ContentProvider, SyncPhase};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

type Recorded = Arc<RecordingServer<SyntheticServer>>;

fn config(polling: bool) -> ProviderConfig {
    ProviderConfig::default()
        .with_page_size(10)
        .with_polling(polling)
}

fn recorded(rows: usize) -> Recorded {
    Arc::new(RecordingServer::new(SyntheticServer::new().with_rows("h1", rows)))
}

fn spawn(server: &Recorded, handle: ListHandle, polling: bool) -> ContentProvider {
    ContentProvider::builder(handle, server.clone(), Arc::new(MemoryCache::new()))
        .with_config(config(polling))
        .spawn()
        .unwrap()
}

fn head_hinted() -> ListHandle {
    ListHandle::new("h1").with_head_hint(100)
}

async fn settle_at(provider: &ContentProvider, position: ScrollPosition, key: i64) {
    provider.set_scroll_position(position).unwrap();
    provider
        .wait_until(|state| state.is_settled() && state.payload.target_key == Some(key))
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_hundred_rows_head_then_middle() {
    let server = recorded(100);
    let provider = spawn(&server, head_hinted(), false);

    settle_at(&provider, ScrollPosition::top(), 100).await;
    let head = provider.payload();
    assert_eq!(head.top_rows, 0);
    assert!(head.contents.len() >= 20);
    assert_eq!(head.start_key, Some(100));
    assert_eq!(head.total_matches, 100);
    assert!(head.is_consistent());

    provider
        .set_scroll_position(ScrollPosition::at_cursor(0.5))
        .unwrap();
    let middle = provider
        .wait_until(|state| {
            state.is_settled() && state.payload.target_key.is_some_and(|key| key != 100)
        })
        .await
        .unwrap()
        .payload;

    assert!(middle.top_rows > 0);
    assert_eq!(
        middle.bottom_rows,
        middle.total_matches - middle.top_rows - middle.contents.len() as u64
    );
    assert!(middle.hids().contains(&50), "window {:?}", middle.hids());
    assert_eq!(server.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_equal_positions_do_not_refetch() {
    let server = recorded(100);
    let provider = spawn(&server, head_hinted(), false);
    settle_at(&provider, ScrollPosition::top(), 100).await;

    provider.set_scroll_position(ScrollPosition::top()).unwrap();
    // Different position, same resolved key
    provider
        .set_scroll_position(ScrollPosition::at_key(100))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(server.request_count(), 1);
    assert_eq!(provider.state().position, Some(ScrollPosition::at_key(100)));
}

#[tokio::test(start_paused = true)]
async fn test_rapid_positions_only_load_the_last() {
    let server = recorded(100);
    let provider = spawn(&server, head_hinted(), false);

    provider
        .set_scroll_position(ScrollPosition::at_key(80))
        .unwrap();
    provider
        .set_scroll_position(ScrollPosition::at_key(30))
        .unwrap();
    provider
        .wait_until(|state| state.is_settled() && state.payload.target_key == Some(30))
        .await
        .unwrap();

    assert_eq!(server.requested_keys(), vec![30]);
}

#[tokio::test(start_paused = true)]
async fn test_switch_stops_previous_chain() {
    let server = recorded(100);
    let provider = spawn(&server, head_hinted(), true);

    settle_at(&provider, ScrollPosition::at_key(80), 80).await;
    settle_at(&provider, ScrollPosition::at_key(30), 30).await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    let keys = server.requested_keys();
    let switched = keys.iter().position(|key| *key == 30).unwrap();
    assert!(keys[..switched].iter().all(|key| *key == 80));
    assert!(keys[switched..].iter().all(|key| *key == 30));
    assert!(keys.len() - switched > 1, "polling continued: {:?}", keys);
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_keeps_previous_payload() {
    let server = recorded(100);
    let provider = spawn(&server, head_hinted(), false);
    settle_at(&provider, ScrollPosition::top(), 100).await;
    let before = provider.payload();

    server.inner().fail_next(1);
    provider.manual_reload().unwrap();
    let failed = provider
        .wait_until(|state| state.last_error.is_some())
        .await
        .unwrap();
    assert_eq!(failed.payload, before);
    assert!(!failed.loading);

    // No placeholder replaces the payload while the error is shown
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(provider.payload(), before);

    provider.manual_reload().unwrap();
    let recovered = provider
        .wait_until(|state| state.last_error.is_none() && state.is_settled())
        .await
        .unwrap();
    assert_eq!(recovered.payload.hids(), before.hids());
    assert_eq!(server.stats().failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unresolved_cursor_loads_nothing() {
    let server = recorded(100);
    let provider = spawn(&server, ListHandle::new("h1"), false);

    provider.set_scroll_position(ScrollPosition::top()).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let state = provider.state();
    assert_eq!(server.request_count(), 0);
    assert_eq!(state.phase, SyncPhase::Idle);
    assert_eq!(state.position, Some(ScrollPosition::top()));
    assert!(!state.scrolling);

    // An exact key needs no fit
    settle_at(&provider, ScrollPosition::at_key(42), 42).await;
    assert_eq!(server.requested_keys(), vec![42]);
}

#[tokio::test(start_paused = true)]
async fn test_placeholder_until_slow_results() {
    let server = Arc::new(
        SyntheticServer::new()
            .with_rows("h1", 100)
            .with_latency(Duration::from_secs(3)),
    );
    let provider = ContentProvider::builder(head_hinted(), server, Arc::new(MemoryCache::new()))
        .with_config(config(false))
        .spawn()
        .unwrap();

    provider.set_scroll_position(ScrollPosition::top()).unwrap();
    let waiting = provider
        .wait_until(|state| state.payload.pending)
        .await
        .unwrap();
    assert!(waiting.payload.contents.is_empty());
    assert_eq!(waiting.payload.target_key, Some(100));
    assert!(waiting.payload.is_consistent());
    assert!(waiting.loading);

    let loaded = provider
        .wait_until(|state| state.is_settled() && !state.payload.contents.is_empty())
        .await
        .unwrap();
    assert_eq!(loaded.payload.start_key, Some(100));
}

#[tokio::test(start_paused = true)]
async fn test_head_follows_new_rows() {
    let server = Arc::new(SyntheticServer::new().with_rows("h1", 100));
    let provider = ContentProvider::builder(
        head_hinted(),
        server.clone(),
        Arc::new(MemoryCache::new()),
    )
    .with_config(config(true))
    .with_mutations(Arc::new(server.mutations().clone()))
    .spawn()
    .unwrap();
    settle_at(&provider, ScrollPosition::top(), 100).await;

    let hid = server.append(&ListId::new("h1"), "new upload");
    let followed = provider
        .wait_until(|state| state.is_settled() && state.payload.start_key == Some(hid))
        .await
        .unwrap();

    assert_eq!(followed.position, Some(ScrollPosition::at_head(hid)));
    assert_eq!(followed.payload.top_rows, 0);
    assert_eq!(followed.payload.total_matches, 101);
}

#[tokio::test(start_paused = true)]
async fn test_scrolled_away_does_not_follow() {
    let server = Arc::new(SyntheticServer::new().with_rows("h1", 100));
    let provider = ContentProvider::builder(
        head_hinted(),
        server.clone(),
        Arc::new(MemoryCache::new()),
    )
    .with_config(config(true))
    .with_mutations(Arc::new(server.mutations().clone()))
    .spawn()
    .unwrap();
    settle_at(&provider, ScrollPosition::at_key(50), 50).await;

    server.append(&ListId::new("h1"), "new upload");
    tokio::time::sleep(Duration::from_secs(5)).await;

    let state = provider.state();
    assert_eq!(state.position, Some(ScrollPosition::at_key(50)));
    assert_eq!(state.payload.target_key, Some(50));
    assert_eq!(state.phase, SyncPhase::Watching(50));
}

#[tokio::test(start_paused = true)]
async fn test_filter_switch_reloads_through_new_filters() {
    let server = recorded(100);
    server.inner().delete(&ListId::new("h1"), 20).unwrap();
    server.inner().delete(&ListId::new("h1"), 10).unwrap();
    let provider = spawn(&server, head_hinted(), false);
    settle_at(&provider, ScrollPosition::top(), 100).await;
    assert_eq!(provider.payload().total_matches, 98);

    provider
        .set_filters(Filters::parse("deleted:true").unwrap())
        .unwrap();
    let deleted = provider
        .wait_until(|state| state.is_settled() && state.payload.total_matches == 2)
        .await
        .unwrap();

    assert_eq!(deleted.payload.hids(), vec![20, 10]);
    assert_eq!(provider.fit_store().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cache_failure_aborts_chain() {
    let server = recorded(100);
    let cache = Arc::new(MemoryCache::new());
    cache.fail_next_watch();
    let provider = ContentProvider::builder(head_hinted(), server.clone(), cache)
        .with_config(config(false))
        .spawn()
        .unwrap();

    provider.set_scroll_position(ScrollPosition::top()).unwrap();
    let failed = provider
        .wait_until(|state| state.last_error.is_some())
        .await
        .unwrap();
    assert_eq!(failed.phase, SyncPhase::Idle);
    assert!(!failed.loading);

    // The key is forgotten, so a reload starts over
    provider.manual_reload().unwrap();
    provider
        .wait_until(|state| state.is_settled() && !state.payload.contents.is_empty())
        .await
        .unwrap();
    assert_eq!(server.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shared_fit_store_survives_remount() {
    let server = recorded(100);
    let fits = Arc::new(FitStore::new(config(false).fit));

    let first = ContentProvider::builder(head_hinted(), server.clone(), Arc::new(MemoryCache::new()))
        .with_config(config(false))
        .with_fit_store(fits.clone())
        .spawn()
        .unwrap();
    settle_at(&first, ScrollPosition::top(), 100).await;
    first.shutdown().await;

    // No head hint this time: the cursor resolves from the learned fit
    let second = ContentProvider::builder(
        ListHandle::new("h1"),
        server.clone(),
        Arc::new(MemoryCache::new()),
    )
    .with_config(config(false))
    .with_fit_store(fits)
    .spawn()
    .unwrap();
    second
        .set_scroll_position(ScrollPosition::at_cursor(0.5))
        .unwrap();
    let state = second
        .wait_until(|state| state.is_settled() && !state.payload.contents.is_empty())
        .await
        .unwrap();

    assert!(state.payload.top_rows > 0);
    assert_eq!(server.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_state_stream_reports_scroll_then_settle() {
    use futures::StreamExt;

    let server = recorded(100);
    let provider = spawn(&server, head_hinted(), false);
    let mut states = provider.states();
    assert!(states.next().await.unwrap().payload.contents.is_empty());

    provider.set_scroll_position(ScrollPosition::top()).unwrap();
    let mut saw_scrolling = false;
    while let Some(state) = states.next().await {
        saw_scrolling |= state.scrolling;
        if state.is_settled() && !state.payload.contents.is_empty() {
            break;
        }
    }
    assert!(saw_scrolling);
}

#[tokio::test(start_paused = true)]
async fn test_filter_switch_clears_unresolvable_view() {
    let server = recorded(100);
    let provider = spawn(&server, ListHandle::new("h1"), false);
    settle_at(&provider, ScrollPosition::at_key(50), 50).await;

    provider
        .set_scroll_position(ScrollPosition::at_cursor(0.5))
        .unwrap();
    provider
        .wait_until(|state| {
            state.is_settled() && state.payload.target_key.is_some_and(|key| key != 50)
        })
        .await
        .unwrap();
    assert_eq!(server.request_count(), 2);

    // Nothing matches and the new fit pair knows nothing
    provider
        .set_filters(Filters::parse("deleted:true").unwrap())
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let state = provider.state();
    assert!(state.payload.contents.is_empty());
    assert_eq!(state.payload.target_key, None);
    assert_eq!(state.phase, SyncPhase::Idle);
    assert!(!state.loading);
    assert_eq!(server.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cache_write_failure_keeps_previous_payload() {
    let server = recorded(100);
    let cache = Arc::new(MemoryCache::new());
    let provider = ContentProvider::builder(head_hinted(), server.clone(), cache.clone())
        .with_config(config(false))
        .spawn()
        .unwrap();
    settle_at(&provider, ScrollPosition::top(), 100).await;
    let before = provider.payload();

    cache.fail_next_write();
    provider.manual_reload().unwrap();
    let failed = provider
        .wait_until(|state| state.last_error.is_some())
        .await
        .unwrap();

    assert!(failed.last_error.unwrap().contains("Cache error"));
    assert_eq!(failed.payload, before);
    assert!(!failed.loading);
    assert_eq!(server.stats().ok, 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_first_load_returns_to_idle() {
    let server = recorded(100);
    server.inner().fail_next(1);
    let provider = spawn(&server, head_hinted(), false);

    provider
        .set_scroll_position(ScrollPosition::at_key(50))
        .unwrap();
    let failed = provider
        .wait_until(|state| state.last_error.is_some())
        .await
        .unwrap();
    assert_eq!(failed.phase, SyncPhase::Idle);
    assert!(!failed.loading);

    provider.manual_reload().unwrap();
    let recovered = provider
        .wait_until(|state| state.is_settled() && !state.payload.contents.is_empty())
        .await
        .unwrap();
    assert_eq!(recovered.phase, SyncPhase::Watching(50));
    assert_eq!(server.requested_keys(), vec![50, 50]);
}

#[tokio::test(start_paused = true)]
async fn test_stale_cache_waits_for_first_response() {
    let server = Arc::new(
        SyntheticServer::new()
            .with_rows("h1", 100)
            .with_latency(Duration::from_millis(500)),
    );
    let cache = Arc::new(MemoryCache::new());
    cache.seed(
        &ListId::new("h1"),
        (1..=100).map(|hid| Row::new(hid, format!("stale {}", hid))),
    );
    let provider = ContentProvider::builder(head_hinted(), server, cache)
        .with_config(config(false))
        .spawn()
        .unwrap();

    let mut states = provider.subscribe();
    let start = Instant::now();
    provider.set_scroll_position(ScrollPosition::top()).unwrap();
    let first = loop {
        states.changed().await.unwrap();
        let state = states.borrow_and_update().clone();
        if !state.payload.contents.is_empty() {
            break state;
        }
    };

    assert!(start.elapsed() >= Duration::from_millis(500));
    assert!(
        first.payload.contents.iter().all(|row| row.name.starts_with("dataset")),
        "rendered {:?}",
        first.payload.contents.first()
    );
}

#[tokio::test(start_paused = true)]
async fn test_cache_write_burst_renders_once() {
    let server = recorded(100);
    let cache = Arc::new(MemoryCache::new());
    let provider = ContentProvider::builder(head_hinted(), server.clone(), cache.clone())
        .with_config(config(false))
        .spawn()
        .unwrap();
    settle_at(&provider, ScrollPosition::top(), 100).await;

    let mut states = provider.subscribe();
    states.borrow_and_update();
    for n in 1..=3 {
        cache.seed(&ListId::new("h1"), [Row::new(100, format!("renamed {}", n))]);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut publishes = 0;
    while let Ok(changed) = tokio::time::timeout(Duration::from_secs(1), states.changed()).await {
        changed.unwrap();
        states.borrow_and_update();
        publishes += 1;
    }
    assert_eq!(publishes, 1);
    assert_eq!(provider.payload().contents[0].name, "renamed 3");
}

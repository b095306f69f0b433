mod common;

use std::sync::Arc;

use common::{hourly, png_with_metric, ts, wait_until, ScriptedSource, STATION};
use forecast_player::{CacheError, ForecastCache, SourceError};
use futures_util::future::join_all;

#[tokio::test]
async fn concurrent_resolves_share_one_fetch() {
    let source = Arc::new(ScriptedSource::new(hourly(3), "run-a").gated());
    let cache = ForecastCache::new(Arc::clone(&source));
    let key = ts("2024010101");

    let waiters = join_all((0..10).map(|_| cache.resolve(STATION, &key)));
    let release = async {
        wait_until(|| source.images() == 1).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(source.images(), 1, "joiners must not issue their own fetch");
        source.release(1);
    };
    let (results, ()) = tokio::join!(waiters, release);

    assert_eq!(source.images(), 1);
    for frame in results {
        let frame = frame.unwrap();
        assert_eq!(frame.timestamp, key);
        assert_eq!(frame.metric, Some(0.5));
    }
    assert!(cache.is_resolved(STATION, &key));
}

#[tokio::test]
async fn resolved_frames_do_not_refetch() {
    let source = Arc::new(ScriptedSource::new(hourly(2), "run-a"));
    let cache = ForecastCache::new(Arc::clone(&source));
    let key = ts("2024010100");

    let first = cache.resolve(STATION, &key).await.unwrap();
    let second = cache.resolve(STATION, &key).await.unwrap();
    assert!(Arc::ptr_eq(&first.image, &second.image));
    assert_eq!(cache.get(STATION, &key).unwrap().metric, Some(0.0));
    assert_eq!(source.images(), 1);
}

#[tokio::test]
async fn listing_is_memoized_and_concurrent_calls_join() {
    let source = Arc::new(ScriptedSource::new(hourly(4), "run-a"));
    let cache = ForecastCache::new(Arc::clone(&source));

    let (a, b) = tokio::join!(cache.list_timestamps(STATION), cache.list_timestamps(STATION));
    assert_eq!(a.unwrap().len(), 4);
    assert_eq!(b.unwrap().len(), 4);
    cache.list_timestamps(STATION).await.unwrap();
    assert_eq!(source.listings(), 1);
}

#[tokio::test]
async fn listing_failure_is_source_unavailable_and_retryable() {
    let source = Arc::new(ScriptedSource::new(hourly(2), "run-a"));
    source.set_times(None);
    let cache = ForecastCache::new(Arc::clone(&source));

    let err = cache.list_timestamps(STATION).await.unwrap_err();
    assert_eq!(
        err,
        CacheError::SourceUnavailable {
            station: STATION.to_string(),
            reason: SourceError::Status(500),
        }
    );

    source.set_times(Some(hourly(2)));
    assert_eq!(cache.list_timestamps(STATION).await.unwrap().len(), 2);
    assert_eq!(source.listings(), 2);
}

#[tokio::test]
async fn failed_frame_is_discarded_and_retried() {
    let source = Arc::new(ScriptedSource::new(hourly(2), "run-a"));
    let key = ts("2024010101");
    source.set_image(&key, None);
    let cache = ForecastCache::new(Arc::clone(&source));

    match cache.resolve(STATION, &key).await {
        Err(CacheError::FetchFailed { timestamp, reason, .. }) => {
            assert_eq!(timestamp, key);
            assert_eq!(reason, SourceError::Status(404));
        }
        other => panic!("expected FetchFailed, got {:?}", other),
    }
    assert!(!cache.is_resolved(STATION, &key));

    source.set_image(&key, Some(png_with_metric(1.75)));
    assert_eq!(cache.resolve(STATION, &key).await.unwrap().metric, Some(1.75));
    assert_eq!(source.images(), 2);
}

#[tokio::test]
async fn undecodable_metric_keeps_image() {
    let source = Arc::new(ScriptedSource::new(hourly(1), "run-a"));
    let key = ts("2024010100");
    source.set_image(&key, Some(b"\x89PNG but no text chunk".to_vec()));
    let cache = ForecastCache::new(Arc::clone(&source));

    let frame = cache.resolve(STATION, &key).await.unwrap();
    assert_eq!(frame.metric, None);
    assert_eq!(&frame.image[..4], b"\x89PNG");
}

#[tokio::test]
async fn stale_fetch_does_not_repopulate_after_invalidate() {
    let source = Arc::new(ScriptedSource::new(hourly(2), "run-a").gated());
    let cache = ForecastCache::new(Arc::clone(&source));
    let key = ts("2024010101");

    let stale = tokio::spawn({
        let cache = cache.clone();
        let key = key.clone();
        async move { cache.resolve(STATION, &key).await }
    });
    wait_until(|| source.images() == 1).await;

    cache.invalidate_all();
    source.set_image(&key, Some(png_with_metric(9.0)));

    // Old fetch completes after the invalidation: its caller still gets the
    // bytes it asked for, but the cache does not keep them.
    source.release(1);
    let old = stale.await.unwrap().unwrap();
    assert_eq!(old.metric, Some(0.5));
    assert!(cache.get(STATION, &key).is_none());

    // A post-invalidation request starts from scratch.
    source.release(1);
    let fresh = cache.resolve(STATION, &key).await.unwrap();
    assert_eq!(fresh.metric, Some(9.0));
    assert_eq!(source.images(), 2);
    assert_eq!(cache.generation(), 1);
}

#[tokio::test]
async fn resolve_after_invalidate_does_not_join_old_fetch() {
    let source = Arc::new(ScriptedSource::new(hourly(2), "run-a").gated());
    let cache = ForecastCache::new(Arc::clone(&source));
    let key = ts("2024010100");

    let old = tokio::spawn({
        let cache = cache.clone();
        let key = key.clone();
        async move { cache.resolve(STATION, &key).await }
    });
    wait_until(|| source.images() == 1).await;
    cache.invalidate_all();

    let new = tokio::spawn({
        let cache = cache.clone();
        let key = key.clone();
        async move { cache.resolve(STATION, &key).await }
    });
    wait_until(|| source.images() == 2).await;

    source.release(2);
    old.await.unwrap().unwrap();
    new.await.unwrap().unwrap();
    assert!(cache.is_resolved(STATION, &key));
}

#[tokio::test]
async fn stale_listing_does_not_repopulate_after_invalidate() {
    let source = Arc::new(ScriptedSource::new(hourly(3), "run-a").gated());
    let cache = ForecastCache::new(Arc::clone(&source));

    let pending = tokio::spawn({
        let cache = cache.clone();
        async move { cache.list_timestamps(STATION).await }
    });
    wait_until(|| source.listings() == 1).await;
    cache.invalidate_all();

    source.release(1);
    assert_eq!(pending.await.unwrap().unwrap().len(), 3);

    source.set_times(Some(hourly(5)));
    source.release(1);
    assert_eq!(cache.list_timestamps(STATION).await.unwrap().len(), 5);
    assert_eq!(source.listings(), 2);
}

#[tokio::test]
async fn prefetch_resolves_every_frame_once() {
    let source = Arc::new(ScriptedSource::new(hourly(6), "run-a"));
    let broken = ts("2024010103");
    source.set_image(&broken, None);
    let cache = ForecastCache::new(Arc::clone(&source));

    assert_eq!(cache.prefetch_all(STATION).await, 5);
    assert_eq!(source.images(), 6);
    assert!(!cache.is_resolved(STATION, &broken));
    assert!(cache.is_resolved(STATION, &ts("2024010105")));

    // Playback after prefetch is served from memory.
    cache.resolve(STATION, &ts("2024010100")).await.unwrap();
    assert_eq!(source.images(), 6);
}

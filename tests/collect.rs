mod common;

use common::{fast_settings, test_db, ChannelSimulator, CHANNEL, GUILD};
use parrot::corpus::{ChannelRef, Filter};
use parrot::db::Database;
use parrot::engine::{CollectLimit, CollectRequest, Engine, ProgressEvent, ProgressReporter};
use std::collections::HashSet;
use std::sync::Arc;

fn engine(db: &Database, sim: &Arc<ChannelSimulator>) -> Engine {
    Engine::new(Arc::new(db.clone()), sim.clone(), fast_settings())
}

fn request(limit: CollectLimit) -> CollectRequest {
    CollectRequest {
        channel: ChannelRef::new(GUILD, CHANNEL),
        author_id: None,
        limit,
    }
}

#[tokio::test]
async fn test_entire_collection_is_idempotent() {
    let db = test_db();
    let sim = Arc::new(ChannelSimulator::with_messages(250));
    let engine = engine(&db, &sim);

    let first = engine
        .collect(&request(CollectLimit::Entire), &ProgressReporter::silent())
        .await
        .unwrap();
    assert_eq!(first, 250);
    assert!(db.channel_fully_collected(GUILD, CHANNEL).unwrap());

    let fetches_before = sim.fetches();
    let second = engine
        .collect(&request(CollectLimit::Entire), &ProgressReporter::silent())
        .await
        .unwrap();
    assert_eq!(second, 0);
    assert_eq!(db.count_messages().unwrap(), 250);
    // The first page already starts with known history.
    assert_eq!(sim.fetches() - fetches_before, 1);
}

#[tokio::test]
async fn test_resume_collects_only_new_history() {
    let db = test_db();
    let sim = Arc::new(ChannelSimulator::with_messages(180));
    let engine = engine(&db, &sim);

    engine
        .collect(&request(CollectLimit::Entire), &ProgressReporter::silent())
        .await
        .unwrap();

    for _ in 0..130 {
        sim.post(None);
    }
    let resumed = engine
        .collect(&request(CollectLimit::Entire), &ProgressReporter::silent())
        .await
        .unwrap();
    assert_eq!(resumed, 130);
    assert_eq!(db.count_messages().unwrap(), 310);

    // Resuming also applies to bounded runs once a channel has been swept.
    for _ in 0..5 {
        sim.post(None);
    }
    let bounded = engine
        .collect(&request(CollectLimit::Count(100)), &ProgressReporter::silent())
        .await
        .unwrap();
    assert_eq!(bounded, 5);
}

#[tokio::test]
async fn test_live_capture_does_not_hide_offline_gap() {
    let db = test_db();
    let sim = Arc::new(ChannelSimulator::with_messages(180));
    let engine = engine(&db, &sim);

    engine
        .collect(&request(CollectLimit::Entire), &ProgressReporter::silent())
        .await
        .unwrap();

    // Twenty messages arrive while the bot is away; it only sees the newest.
    for _ in 0..20 {
        sim.post(None);
    }
    db.insert_live_messages(&[sim.newest()], GUILD).unwrap();
    assert_eq!(db.count_messages().unwrap(), 181);

    let resumed = engine
        .collect(&request(CollectLimit::Entire), &ProgressReporter::silent())
        .await
        .unwrap();
    assert_eq!(resumed, 20);
    assert_eq!(db.count_messages().unwrap(), 200);

    // Everything is collected history again, so the next run stops immediately.
    let again = engine
        .collect(&request(CollectLimit::Entire), &ProgressReporter::silent())
        .await
        .unwrap();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn test_numeric_limit_stops_early() {
    let db = test_db();
    let sim = Arc::new(ChannelSimulator::with_messages(200));
    let engine = engine(&db, &sim);

    let count = engine
        .collect(&request(CollectLimit::Count(50)), &ProgressReporter::silent())
        .await
        .unwrap();
    assert_eq!(count, 50);
    assert_eq!(sim.fetches(), 1);
    assert!(!db.channel_fully_collected(GUILD, CHANNEL).unwrap());

    // The newest fifty were taken.
    let stored = db.query_messages(&Filter::for_guild(GUILD)).unwrap();
    let newest_kept = stored.iter().map(|r| r.timestamp_millis).min().unwrap();
    assert_eq!(newest_kept, 151_000);
}

#[tokio::test]
async fn test_repeated_runs_never_duplicate() {
    let db = test_db();
    let sim = Arc::new(ChannelSimulator::with_messages(120));
    let engine = engine(&db, &sim);

    for _ in 0..2 {
        engine
            .collect(&request(CollectLimit::Count(100)), &ProgressReporter::silent())
            .await
            .unwrap();
    }

    let stored = db.query_messages(&Filter::for_guild(GUILD)).unwrap();
    assert_eq!(stored.len(), 100);
    let ids: HashSet<_> = stored
        .iter()
        .map(|r| (r.channel_id.clone(), r.message_id.clone()))
        .collect();
    assert_eq!(ids.len(), stored.len());
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let db = test_db();
    let sim = Arc::new(ChannelSimulator::with_messages(500));
    let engine = engine(&db, &sim);
    let (reporter, mut rx) = ProgressReporter::channel();

    engine
        .collect(&request(CollectLimit::Count(230)), &reporter)
        .await
        .unwrap();

    let mut percents = Vec::new();
    let mut completed = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            ProgressEvent::Collect {
                percent_complete, ..
            } => percents.push(percent_complete),
            ProgressEvent::CollectComplete {
                total_collected, ..
            } => completed = Some(total_collected),
            other => panic!("unexpected event {:?}", other),
        }
    }

    assert_eq!(percents.len(), 3);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert!(percents.iter().all(|p| *p <= 100.0));
    assert_eq!(percents.last().copied(), Some(100.0));
    assert_eq!(completed, Some(230));
}

#[tokio::test]
async fn test_unknown_total_keeps_percent_at_zero() {
    let db = test_db();
    let sim = Arc::new(ChannelSimulator::with_messages(150).without_total());
    let engine = engine(&db, &sim);
    let (reporter, mut rx) = ProgressReporter::channel();

    let count = engine
        .collect(&request(CollectLimit::Entire), &reporter)
        .await
        .unwrap();
    assert_eq!(count, 150);

    while let Ok(event) = rx.try_recv() {
        if let ProgressEvent::Collect {
            percent_complete,
            estimated_time_remaining_seconds,
            ..
        } = event
        {
            assert_eq!(percent_complete, 0.0);
            assert_eq!(estimated_time_remaining_seconds, None);
        }
    }
}

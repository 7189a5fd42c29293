mod common;

use common::{
    fast_settings, test_db, ChannelSimulator, CrashOnceSource, PanickingSource, CHANNEL, GUILD,
};
use parrot::bridge::protocol::EngineCredentials;
use parrot::bridge::EngineBridge;
use parrot::corpus::{ChannelRef, Filter, MessageSource};
use parrot::db::Database;
use parrot::engine::{
    CollectLimit, CollectRequest, Engine, EngineError, GenerateRequest, ProgressEvent, TaskRequest,
};
use parrot::markov::TokenMode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn credentials() -> EngineCredentials {
    EngineCredentials {
        discord_token: "test-token".to_string(),
        database_url: ":memory:".to_string(),
    }
}

fn bridge_over(db: &Database, source: Arc<dyn MessageSource>) -> EngineBridge {
    let db = db.clone();
    EngineBridge::new(move |_: &EngineCredentials| -> anyhow::Result<Engine> {
        Ok(Engine::new(
            Arc::new(db.clone()),
            source.clone(),
            fast_settings(),
        ))
    })
}

fn collect_entire() -> CollectRequest {
    CollectRequest {
        channel: ChannelRef::new(GUILD, CHANNEL),
        author_id: None,
        limit: CollectLimit::Entire,
    }
}

fn generate_request() -> GenerateRequest {
    GenerateRequest {
        filter: Filter::for_guild(GUILD),
        min_length: 3,
        max_length: 12,
        seed: None,
        order: 2,
        token_mode: TokenMode::Word,
    }
}

#[tokio::test]
async fn test_collect_then_stats_through_bridge() {
    let db = test_db();
    let bridge = bridge_over(&db, Arc::new(ChannelSimulator::with_messages(150)));
    bridge.initialize(credentials()).await.unwrap();
    assert!(bridge.is_available());

    let mut handle = bridge.collect(collect_entire()).unwrap();
    let mut events = Vec::new();
    while let Some(event) = handle.next_progress().await {
        events.push(event);
    }
    let count = handle.wait().await.unwrap().into_collected().unwrap();
    assert_eq!(count, 150);
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::Collect { .. })));
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::CollectComplete {
            total_collected: 150,
            ..
        })
    ));

    let stats = bridge
        .stats(Filter::for_guild(GUILD))
        .unwrap()
        .wait()
        .await
        .unwrap()
        .into_stats()
        .unwrap();
    assert_eq!(stats.message_count, 150);
    assert_eq!(stats.author_count, 2);
    assert_eq!(stats.channel_count, 1);
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    let db = test_db();
    let bridge = EngineBridge::new(move |_: &EngineCredentials| -> anyhow::Result<Engine> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Engine::new(
            Arc::new(db.clone()),
            Arc::new(ChannelSimulator::with_messages(0)),
            fast_settings(),
        ))
    });

    bridge.initialize(credentials()).await.unwrap();
    bridge.initialize(credentials()).await.unwrap();
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(bridge.is_available());
}

#[tokio::test]
async fn test_failed_initialize_leaves_bridge_unavailable() {
    let bridge = EngineBridge::new(|_: &EngineCredentials| -> anyhow::Result<Engine> {
        anyhow::bail!("bad token")
    });

    let err = bridge.initialize(credentials()).await.unwrap_err();
    assert!(matches!(err, EngineError::EngineUnavailable(ref msg) if msg.contains("bad token")));
    assert!(!bridge.is_available());
    assert!(matches!(
        bridge.stats(Filter::global()).err(),
        Some(EngineError::EngineUnavailable(_))
    ));
}

#[tokio::test]
async fn test_empty_corpus_error_crosses_the_boundary() {
    let db = test_db();
    let bridge = bridge_over(&db, Arc::new(ChannelSimulator::with_messages(0)));
    bridge.initialize(credentials()).await.unwrap();

    let err = bridge
        .generate(generate_request())
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::EmptyCorpus);
    // A failed task leaves the worker running.
    assert!(bridge.is_available());
}

#[tokio::test]
async fn test_queued_requests_resolve_in_order() {
    let db = test_db();
    let bridge = bridge_over(&db, Arc::new(ChannelSimulator::with_messages(120)));
    bridge.initialize(credentials()).await.unwrap();

    let collect = bridge.collect(collect_entire()).unwrap();
    let generate = bridge.generate(generate_request()).unwrap();
    let stats = bridge.stats(Filter::for_guild(GUILD)).unwrap();
    assert!(collect.task_id() < generate.task_id());
    assert!(generate.task_id() < stats.task_id());

    // Awaited out of order, each handle still gets its own result.
    let stats = stats.wait().await.unwrap().into_stats().unwrap();
    let text = generate.wait().await.unwrap().into_text().unwrap();
    let count = collect.wait().await.unwrap().into_collected().unwrap();

    assert_eq!(count, 120);
    assert_eq!(stats.message_count, 120);
    assert!(!text.trim().is_empty());
}

#[tokio::test]
async fn test_worker_crash_rejects_pending_requests() {
    let db = test_db();
    let bridge = bridge_over(&db, Arc::new(PanickingSource));
    bridge.initialize(credentials()).await.unwrap();

    let first = bridge.collect(collect_entire()).unwrap();
    let err = first.wait().await.unwrap_err();
    assert!(matches!(err, EngineError::EngineUnavailable(_)));
    assert!(!bridge.is_available());
    assert!(matches!(
        bridge.stats(Filter::global()).err(),
        Some(EngineError::EngineUnavailable(_))
    ));

    // A fresh initialize replaces the dead worker.
    bridge.initialize(credentials()).await.unwrap();
    assert!(bridge.is_available());
}

#[tokio::test]
async fn test_command_path_recovers_after_crash() {
    let db = test_db();
    let source = Arc::new(CrashOnceSource::new(ChannelSimulator::with_messages(40)));
    let bridge = bridge_over(&db, source);
    bridge.initialize(credentials()).await.unwrap();

    let crashed = bridge
        .submit_or_restart(TaskRequest::Collect(collect_entire()))
        .await
        .unwrap();
    assert!(matches!(
        crashed.wait().await.unwrap_err(),
        EngineError::EngineUnavailable(_)
    ));
    assert!(!bridge.is_available());

    // The next request brings the worker back with the remembered credentials.
    let count = bridge
        .submit_or_restart(TaskRequest::Collect(collect_entire()))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap()
        .into_collected()
        .unwrap();
    assert_eq!(count, 40);
    assert!(bridge.is_available());
}

#[tokio::test]
async fn test_shutdown_forgets_credentials() {
    let db = test_db();
    let bridge = bridge_over(&db, Arc::new(ChannelSimulator::with_messages(5)));
    bridge.initialize(credentials()).await.unwrap();
    bridge.shutdown();

    let err = bridge
        .submit_or_restart(TaskRequest::Stats(Filter::global()))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::EngineUnavailable(_)));
    assert!(!bridge.is_available());
}

#[tokio::test]
async fn test_shutdown_detaches_worker() {
    let db = test_db();
    let bridge = bridge_over(&db, Arc::new(ChannelSimulator::with_messages(10)));
    bridge.initialize(credentials()).await.unwrap();

    // Already queued work still completes.
    let queued = bridge.collect(collect_entire()).unwrap();
    bridge.shutdown();
    assert!(!bridge.is_available());
    assert_eq!(queued.wait().await.unwrap().into_collected().unwrap(), 10);

    assert!(matches!(
        bridge.stats(Filter::global()).err(),
        Some(EngineError::EngineUnavailable(_))
    ));
}

use super::progress::StepTracker;
use super::{EngineError, GenerateRequest, ProgressReporter, Step};
use crate::corpus::CorpusStore;
use crate::markov::{ChainModel, GenerateOptions};
use tracing::{debug, info};

/// Trains a throwaway chain on the filtered corpus and samples one text from it.
pub async fn generate(
    store: &dyn CorpusStore,
    request: &GenerateRequest,
    chunk_size: usize,
    progress: &ProgressReporter,
) -> Result<String, EngineError> {
    let mut model = ChainModel::new(request.order, request.token_mode)?;
    let tracker = StepTracker::generate();

    progress.emit(tracker.event(Step::Querying, 0, 0));
    let records = store
        .get_messages(&request.filter)
        .await
        .map_err(EngineError::transport)?;
    if records.is_empty() {
        return Err(EngineError::EmptyCorpus);
    }

    let total = records.len();
    let mut processed = 0usize;
    for chunk in records.chunks(chunk_size.max(1)) {
        for record in chunk {
            model.train(&record.text);
        }
        processed += chunk.len();
        progress.emit(tracker.event(Step::Training, processed, total));
        tokio::task::yield_now().await;
    }
    drop(records);

    debug!(
        "Generation: trained order-{} model with {} contexts and {} transitions",
        model.order(),
        model.context_count(),
        model.transition_count()
    );

    progress.emit(tracker.event(Step::Generating, total, total));
    let options = GenerateOptions {
        min_length: request.min_length,
        max_length: request.max_length,
        seed: request.seed.clone(),
    };
    let text = model.generate(&options, &mut rand::rng())?;

    info!("Generation: produced {} characters from {} messages", text.len(), total);
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{Filter, MessageRecord};
    use crate::db::Database;
    use crate::engine::ProgressEvent;
    use crate::markov::TokenMode;

    fn seeded_db(texts: &[&str]) -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        let records: Vec<MessageRecord> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| MessageRecord {
                message_id: i.to_string(),
                author_id: "u1".to_string(),
                channel_id: "c1".to_string(),
                guild_id: "g1".to_string(),
                text: text.to_string(),
                timestamp_millis: i as i64,
            })
            .collect();
        db.insert_messages(&records, "g1", None).unwrap();
        db
    }

    fn request(filter: Filter, order: usize, seed: Option<&str>) -> GenerateRequest {
        GenerateRequest {
            filter,
            min_length: 2,
            max_length: 4,
            seed: seed.map(str::to_string),
            order,
            token_mode: TokenMode::Word,
        }
    }

    #[tokio::test]
    async fn test_generates_from_seed() {
        let db = seeded_db(&["the cat sat", "the dog sat"]);
        let text = generate(
            &db,
            &request(Filter::for_guild("g1"), 1, Some("the")),
            1000,
            &ProgressReporter::silent(),
        )
        .await
        .unwrap();
        assert!(
            text.starts_with("the cat") || text.starts_with("the dog"),
            "got {:?}",
            text
        );
    }

    #[tokio::test]
    async fn test_empty_corpus() {
        let db = seeded_db(&["hello world"]);
        let err = generate(
            &db,
            &request(Filter::for_guild("nowhere"), 2, None),
            1000,
            &ProgressReporter::silent(),
        )
        .await
        .unwrap_err();
        assert_eq!(err, EngineError::EmptyCorpus);
    }

    #[tokio::test]
    async fn test_too_short_for_order_is_model_empty() {
        let db = seeded_db(&["hi", "hello there"]);
        let err = generate(
            &db,
            &request(Filter::for_guild("g1"), 3, None),
            1000,
            &ProgressReporter::silent(),
        )
        .await
        .unwrap_err();
        assert_eq!(err, EngineError::ModelEmpty);
    }

    #[tokio::test]
    async fn test_invalid_order_is_rejected_before_querying() {
        let db = seeded_db(&["a b c"]);
        let (reporter, mut rx) = ProgressReporter::channel();
        let err = generate(&db, &request(Filter::default(), 9, None), 1000, &reporter)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_progress_steps() {
        let texts: Vec<String> = (0..5).map(|i| format!("line {} of text", i)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let db = seeded_db(&refs);
        let (reporter, mut rx) = ProgressReporter::channel();

        generate(&db, &request(Filter::for_guild("g1"), 1, None), 2, &reporter)
            .await
            .unwrap();

        let mut steps = Vec::new();
        while let Ok(ProgressEvent::Generate(p)) = rx.try_recv() {
            steps.push((p.step, p.progress, p.total));
        }
        assert_eq!(
            steps,
            vec![
                (Step::Querying, 0, 0),
                (Step::Training, 2, 5),
                (Step::Training, 4, 5),
                (Step::Training, 5, 5),
                (Step::Generating, 5, 5),
            ]
        );
    }
}

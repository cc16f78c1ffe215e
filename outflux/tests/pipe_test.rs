#![cfg(feature = "test-utils")]

use std::time::Duration;

use outflux::destination::memory::{MemoryDestination, TransactionEvent};
use outflux::error::ErrorKind;
use outflux::etl_error;
use outflux::ingestion::BatchIngestor;
use outflux::pipe::Pipe;
use outflux::stage::Transformer;
use outflux::test_utils::data::{cpu_data_set, cpu_rows};
use outflux::test_utils::stages::{MemoryExtractor, PassThroughTransformer};
use outflux::transformation::SchemaRenamer;
use outflux_config::shared::{CommitStrategy, IngestionConfig, SchemaStrategy};
use outflux_telemetry::tracing::init_test_tracing;

fn ingestion_config(batch_size: usize, commit_strategy: CommitStrategy) -> IngestionConfig {
    IngestionConfig {
        batch_size,
        commit_strategy,
        ..IngestionConfig::default()
    }
}

fn build_pipe(
    extractor: MemoryExtractor,
    transformers: Vec<Box<dyn Transformer>>,
    destination: MemoryDestination,
    config: IngestionConfig,
) -> Pipe {
    Pipe::new(
        "cpu",
        Box::new(extractor),
        transformers,
        Box::new(BatchIngestor::new("ingest", destination, config)),
        false,
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn three_rows_in_single_row_chunks_commit_in_two_batches() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let rows = cpu_rows(3);
    let extractor = MemoryExtractor::chunked("extract", cpu_data_set(), rows.clone(), 1);
    let pipe = build_pipe(
        extractor,
        vec![],
        destination.clone(),
        ingestion_config(2, CommitStrategy::CommitOnEachBatch),
    );

    pipe.run().await.unwrap();

    assert_eq!(
        destination.commits().await,
        vec![rows[..2].to_vec(), rows[2..].to_vec()]
    );
    assert_eq!(destination.rollbacks().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn commit_count_is_batches_rounded_up() {
    init_test_tracing();

    for (rows, batch_size, expected_commits) in [(4, 2, 2), (5, 2, 3), (1, 10, 1), (10, 3, 4)] {
        let destination = MemoryDestination::new();
        let extractor = MemoryExtractor::chunked("extract", cpu_data_set(), cpu_rows(rows), 3);
        let pipe = build_pipe(
            extractor,
            vec![],
            destination.clone(),
            ingestion_config(batch_size, CommitStrategy::CommitOnEachBatch),
        );

        pipe.run().await.unwrap();

        assert_eq!(destination.commits().await.len(), expected_commits);
        assert_eq!(destination.committed_rows().await, cpu_rows(rows));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn commit_on_end_commits_once() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let extractor = MemoryExtractor::chunked("extract", cpu_data_set(), cpu_rows(7), 2);
    let pipe = build_pipe(
        extractor,
        vec![],
        destination.clone(),
        ingestion_config(2, CommitStrategy::CommitOnEnd),
    );

    pipe.run().await.unwrap();

    assert_eq!(destination.commits().await, vec![cpu_rows(7)]);
    assert_eq!(destination.begins().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_input_commits_an_empty_transaction() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let extractor = MemoryExtractor::new("extract", cpu_data_set(), vec![]);
    let pipe = build_pipe(
        extractor,
        vec![],
        destination.clone(),
        ingestion_config(2, CommitStrategy::CommitOnEachBatch),
    );

    pipe.run().await.unwrap();

    assert_eq!(
        destination.events().await,
        vec![TransactionEvent::Begin, TransactionEvent::Commit]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn source_failure_rolls_back_accumulating_batch() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let extractor = MemoryExtractor::chunked("extract", cpu_data_set(), cpu_rows(5), 1)
        .fail_at_chunk(3, etl_error!(ErrorKind::SourceProtocolError, "Malformed chunk"));
    let pipe = build_pipe(
        extractor,
        vec![],
        destination.clone(),
        ingestion_config(10, CommitStrategy::CommitOnEnd),
    );

    let err = pipe.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceProtocolError);
    assert_eq!(err.stage_ids(), vec!["extract"]);
    assert!(destination.commits().await.is_empty());
    assert_eq!(destination.rollbacks().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn source_failure_without_rollback_commits_received_rows() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let extractor = MemoryExtractor::chunked("extract", cpu_data_set(), cpu_rows(5), 1)
        .fail_at_chunk(3, etl_error!(ErrorKind::SourceProtocolError, "Malformed chunk"));
    let config = IngestionConfig {
        rollback_on_external_error: false,
        ..ingestion_config(10, CommitStrategy::CommitOnEnd)
    };
    let pipe = build_pipe(extractor, vec![], destination.clone(), config);

    let err = pipe.run().await.unwrap_err();

    assert_eq!(err.stage_ids(), vec!["extract"]);
    assert_eq!(destination.committed_rows().await, cpu_rows(3));
    assert_eq!(destination.rollbacks().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn source_failure_keeps_only_whole_committed_batches() {
    init_test_tracing();

    // The delay lets the ingestor commit two full batches before the source fails, while the
    // fifth row is still waiting for its batch to fill.
    let destination = MemoryDestination::new();
    let extractor = MemoryExtractor::chunked("extract", cpu_data_set(), cpu_rows(6), 1)
        .with_chunk_delay(Duration::from_millis(50))
        .fail_at_chunk(5, etl_error!(ErrorKind::SourceConnectionFailed, "Connection reset"));
    let pipe = build_pipe(
        extractor,
        vec![],
        destination.clone(),
        ingestion_config(2, CommitStrategy::CommitOnEachBatch),
    );

    let err = pipe.run().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);

    let rows = cpu_rows(4);
    assert_eq!(
        destination.commits().await,
        vec![rows[..2].to_vec(), rows[2..].to_vec()]
    );
    assert_eq!(destination.committed_rows().await, rows);
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_source_rolls_back_accumulating_batch() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let extractor =
        MemoryExtractor::chunked("extract", cpu_data_set(), cpu_rows(3), 1).panic_at_chunk(1);
    let pipe = build_pipe(
        extractor,
        vec![],
        destination.clone(),
        ingestion_config(10, CommitStrategy::CommitOnEnd),
    );

    let err = pipe.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StagePanic);
    assert_eq!(err.stage_ids(), vec!["extract"]);
    assert!(destination.commits().await.is_empty());
    assert_eq!(destination.rollbacks().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn transformer_failure_fails_the_pipe() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let extractor = MemoryExtractor::chunked("extract", cpu_data_set(), cpu_rows(4), 1);
    let transformer = PassThroughTransformer::new("transform")
        .fail_after(2, etl_error!(ErrorKind::ConversionError, "Bad value"));
    let pipe = build_pipe(
        extractor,
        vec![Box::new(transformer)],
        destination.clone(),
        ingestion_config(10, CommitStrategy::CommitOnEnd),
    );

    let err = pipe.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConversionError);
    assert_eq!(err.stage_ids(), vec!["transform"]);
    assert!(destination.commits().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn ingestion_failure_fails_the_pipe() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    destination.fail_write_at(0).await;
    let extractor = MemoryExtractor::chunked("extract", cpu_data_set(), cpu_rows(4), 1);
    let pipe = build_pipe(
        extractor,
        vec![Box::new(PassThroughTransformer::new("transform"))],
        destination.clone(),
        ingestion_config(2, CommitStrategy::CommitOnEachBatch),
    );

    let err = pipe.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);
    assert_eq!(err.stage_ids(), vec!["ingest"]);
    assert!(destination.commits().await.is_empty());
    assert_eq!(destination.rollbacks().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn succeeds_when_every_stage_succeeds() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let extractor = MemoryExtractor::chunked("extract", cpu_data_set(), cpu_rows(5), 2);
    let pipe = build_pipe(
        extractor,
        vec![
            Box::new(PassThroughTransformer::new("first")),
            Box::new(SchemaRenamer::new("rename", "metrics")),
            Box::new(PassThroughTransformer::new("second")),
        ],
        destination.clone(),
        ingestion_config(2, CommitStrategy::CommitOnEachBatch),
    );

    pipe.run().await.unwrap();

    let prepared = destination.prepared_data_sets().await;
    assert_eq!(prepared.len(), 1);
    assert_eq!(prepared[0].0.name().schema, "metrics");
    assert_eq!(prepared[0].1, SchemaStrategy::CreateIfMissing);
    assert_eq!(destination.committed_rows().await, cpu_rows(5));
}

#[tokio::test(flavor = "multi_thread")]
async fn schema_only_prepares_without_moving_rows() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let extractor = MemoryExtractor::chunked("extract", cpu_data_set(), cpu_rows(3), 1);
    let pipe = Pipe::new(
        "cpu",
        Box::new(extractor),
        vec![],
        Box::new(BatchIngestor::new(
            "ingest",
            destination.clone(),
            IngestionConfig::default(),
        )),
        true,
    );

    pipe.run().await.unwrap();

    assert_eq!(destination.prepared_data_sets().await.len(), 1);
    assert!(destination.events().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn prepare_failure_aborts_before_any_stage_runs() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    destination
        .fail_prepare(etl_error!(ErrorKind::SchemaIncompatible, "Not a hypertable"))
        .await;
    let extractor = MemoryExtractor::chunked("extract", cpu_data_set(), cpu_rows(3), 1);
    let pipe = build_pipe(extractor, vec![], destination.clone(), IngestionConfig::default());

    let err = pipe.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SchemaIncompatible);
    assert!(destination.events().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_stage_ids_are_rejected() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let extractor = MemoryExtractor::chunked("same", cpu_data_set(), cpu_rows(3), 1);
    let pipe = Pipe::new(
        "cpu",
        Box::new(extractor),
        vec![],
        Box::new(BatchIngestor::new(
            "same",
            destination.clone(),
            IngestionConfig::default(),
        )),
        false,
    );

    let err = pipe.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DuplicateSubscriber);
    assert!(destination.events().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn external_cancellation_stops_every_stage() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let extractor = MemoryExtractor::chunked("extract", cpu_data_set(), cpu_rows(100), 1)
        .with_chunk_delay(Duration::from_millis(20));
    let pipe = build_pipe(
        extractor,
        vec![Box::new(PassThroughTransformer::new("transform"))],
        destination.clone(),
        ingestion_config(1_000, CommitStrategy::CommitOnEnd),
    );
    let bus = pipe.cancellation_bus();

    let handle = tokio::spawn(pipe.run());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bus.broadcast(
        "test",
        etl_error!(ErrorKind::Cancelled, "Cancelled by test")
    ));

    handle.await.unwrap().unwrap();

    assert!(destination.commits().await.is_empty());
    assert_eq!(destination.rollbacks().await, 1);
    assert!(bus.is_closed());
}

#![cfg(feature = "test-utils")]

use std::time::Duration;

use outflux::concurrency::shutdown::create_shutdown_channel;
use outflux::destination::memory::MemoryDestination;
use outflux::error::ErrorKind;
use outflux::etl_error;
use outflux::ingestion::BatchIngestor;
use outflux::pipe::Pipe;
use outflux::runner::run_pipes;
use outflux::test_utils::data::{cpu_data_set, cpu_rows};
use outflux::test_utils::stages::MemoryExtractor;
use outflux::types::TableName;
use outflux_config::shared::IngestionConfig;
use outflux_telemetry::tracing::init_test_tracing;

fn measure_pipe(measure: &str, extractor: MemoryExtractor, destination: MemoryDestination) -> Pipe {
    Pipe::new(
        measure,
        Box::new(extractor),
        vec![],
        Box::new(BatchIngestor::new(
            "ingest",
            destination,
            IngestionConfig::default(),
        )),
        false,
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn reports_every_measure() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let measures = vec!["cpu".to_string(), "mem".to_string(), "disk".to_string()];

    let factory_destination = destination.clone();
    let report = run_pipes(measures, 2, shutdown_rx, move |measure| {
        let destination = factory_destination.clone();
        async move {
            let data_set = cpu_data_set().renamed(TableName::new("public", measure.as_str()));
            let mut extractor = MemoryExtractor::chunked("extract", data_set, cpu_rows(3), 1);
            if measure == "mem" {
                extractor = extractor
                    .fail_at_chunk(1, etl_error!(ErrorKind::SourceQueryFailed, "Bad query"));
            }

            Ok(measure_pipe(&measure, extractor, destination))
        }
    })
    .await;

    assert_eq!(report.succeeded, vec!["cpu".to_string(), "disk".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "mem");
    assert_eq!(report.failed[0].1.kind(), ErrorKind::SourceQueryFailed);
    assert!(report.skipped.is_empty());
    assert!(!report.is_success());

    assert_eq!(destination.prepared_data_sets().await.len(), 3);
    assert_eq!(destination.committed_rows().await.len(), 6);
}

#[tokio::test(flavor = "multi_thread")]
async fn factory_errors_fail_only_their_measure() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let measures = vec!["cpu".to_string(), "broken".to_string()];

    let factory_destination = destination.clone();
    let report = run_pipes(measures, 4, shutdown_rx, move |measure| {
        let destination = factory_destination.clone();
        async move {
            if measure == "broken" {
                return Err(etl_error!(ErrorKind::UnsupportedType, "Unsupported field"));
            }
            let extractor = MemoryExtractor::chunked("extract", cpu_data_set(), cpu_rows(2), 1);

            Ok(measure_pipe(&measure, extractor, destination))
        }
    })
    .await;

    assert_eq!(report.succeeded, vec!["cpu".to_string()]);
    assert_eq!(report.failed[0].1.kind(), ErrorKind::UnsupportedType);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_cancels_running_and_skips_waiting_measures() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let measures = vec!["cpu".to_string(), "mem".to_string(), "disk".to_string()];

    let factory_destination = destination.clone();
    let runner = tokio::spawn(run_pipes(measures, 1, shutdown_rx, move |measure| {
        let destination = factory_destination.clone();
        async move {
            let extractor = MemoryExtractor::chunked("extract", cpu_data_set(), cpu_rows(100), 1)
                .with_chunk_delay(Duration::from_millis(20));

            Ok(measure_pipe(&measure, extractor, destination))
        }
    }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.shutdown().unwrap();

    let report = runner.await.unwrap();

    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].1.kind(), ErrorKind::Cancelled);
    assert_eq!(report.skipped.len(), 2);
    assert!(destination.committed_rows().await.is_empty());
}

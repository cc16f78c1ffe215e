use std::sync::Arc;

use anyhow::bail;
use outflux::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use outflux::destination::memory::MemoryDestination;
use outflux::destination::timescale::TimescaleDestination;
use outflux::error::EtlResult;
use outflux::extraction::influx::{
    InfluxClient, InfluxExtractor, discover_data_sets, fetch_data_set,
};
use outflux::ingestion::BatchIngestor;
use outflux::pipe::Pipe;
use outflux::runner::run_pipes;
use outflux::stage::{Ingestor, Transformer};
use outflux::transformation::{JsonCombiner, SchemaRenamer};
use outflux::types::DEFAULT_SCHEMA;
use outflux_config::shared::{
    DestinationConfig, ExtractionConfig, InfluxConnectionConfig, IngestionConfig,
    MigratorConfig, PgConnectionConfig, PipeConfig, TransformConfig,
};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};

/// Migrates every configured measure and fails if any of them did not complete.
pub async fn start_migrator_with_config(migrator_config: MigratorConfig) -> anyhow::Result<()> {
    info!("starting migrator");

    log_config(&migrator_config);

    let client = InfluxClient::new(&migrator_config.source)?;
    client.ping().await?;

    let measures = if migrator_config.measures.is_empty() {
        discover_data_sets(&client).await?
    } else {
        migrator_config.measures.clone()
    };

    if measures.is_empty() {
        warn!(database = client.database(), "no measures to migrate");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let shutdown_handle = spawn_shutdown_listener(shutdown_tx);

    let max_parallel = migrator_config.max_parallel as usize;
    let config = Arc::new(migrator_config);
    let report = run_pipes(measures, max_parallel, shutdown_rx, move |measure| {
        let config = config.clone();
        let client = client.clone();
        async move { build_pipe(&config, client, &measure).await }
    })
    .await;

    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    for (measure, err) in &report.failed {
        error!(measure = %measure, "measure was not migrated: {err}");
    }

    if !report.is_success() {
        bail!(
            "{} measures failed and {} were skipped out of {}",
            report.failed.len(),
            report.skipped.len(),
            report.failed.len() + report.skipped.len() + report.succeeded.len()
        );
    }

    info!(measures = report.succeeded.len(), "migrator completed");

    Ok(())
}

/// Builds the pipe of one measure: extraction, the configured transforms and ingestion.
async fn build_pipe(
    config: &MigratorConfig,
    client: InfluxClient,
    measure: &str,
) -> EtlResult<Pipe> {
    let pipe_config: PipeConfig = config.pipe_config(measure);
    pipe_config.validate()?;

    let schema = fetch_data_set(
        &client,
        measure,
        pipe_config.extraction.retention_policy.as_deref(),
        DEFAULT_SCHEMA,
    )
    .await?;

    let buffer = pipe_config.extraction.data_buffer;
    let mut transformers: Vec<Box<dyn Transformer>> = Vec::new();
    let transform = &pipe_config.transform;
    if transform.tags_as_json && !schema.tag_keys.is_empty() {
        transformers.push(Box::new(JsonCombiner::new(
            "tags",
            schema.tag_keys.clone(),
            transform.tags_column.clone(),
            buffer,
        )));
    }
    if transform.fields_as_json && !schema.field_keys.is_empty() {
        transformers.push(Box::new(JsonCombiner::new(
            "fields",
            schema.field_keys.clone(),
            transform.fields_column.clone(),
            buffer,
        )));
    }
    if let Some(output_schema) = &transform.output_schema {
        transformers.push(Box::new(SchemaRenamer::new("rename", output_schema.clone())));
    }

    let extractor = InfluxExtractor::new("extract", client, schema, pipe_config.extraction);
    let ingestor: Box<dyn Ingestor> = match &config.destination {
        DestinationConfig::Memory => Box::new(BatchIngestor::new(
            "ingest",
            MemoryDestination::new(),
            pipe_config.ingestion,
        )),
        DestinationConfig::Timescale { connection } => Box::new(BatchIngestor::new(
            "ingest",
            TimescaleDestination::connect(connection).await?,
            pipe_config.ingestion,
        )),
    };

    Ok(Pipe::new(
        measure,
        Box::new(extractor),
        transformers,
        ingestor,
        pipe_config.schema_only,
    ))
}

/// Triggers `shutdown_tx` on SIGINT or SIGTERM.
fn spawn_shutdown_listener(shutdown_tx: ShutdownTx) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!("failed to register SIGTERM handler: {}", err);
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT (Ctrl+C) received, shutting down migrator");
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down migrator");
            }
        }

        if let Err(e) = shutdown_tx.shutdown() {
            warn!("failed to send shutdown signal: {:?}", e);
            return;
        }

        info!("shutdown signal sent to running pipes")
    })
}

fn log_config(config: &MigratorConfig) {
    debug!(
        measures = ?config.measures,
        max_parallel = config.max_parallel,
        schema_only = config.schema_only,
        "migrator config"
    );
    log_source_config(&config.source);
    log_destination_config(&config.destination);
    log_extraction_config(&config.pipe.extraction);
    log_transform_config(&config.pipe.transform);
    log_ingestion_config(&config.pipe.ingestion);
}

fn log_source_config(config: &InfluxConnectionConfig) {
    debug!(
        url = config.url,
        database = config.database,
        username = config.username,
        "influxdb source config"
    );
}

fn log_destination_config(config: &DestinationConfig) {
    match config {
        DestinationConfig::Memory => {
            debug!("using memory destination config");
        }
        DestinationConfig::Timescale { connection } => log_pg_connection_config(connection),
    }
}

fn log_pg_connection_config(config: &PgConnectionConfig) {
    debug!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        tls_enabled = config.tls.enabled,
        "timescale destination connection config",
    );
}

fn log_extraction_config(config: &ExtractionConfig) {
    debug!(
        retention_policy = config.retention_policy,
        from = config.from,
        to = config.to,
        limit = config.limit,
        chunk_size = config.chunk_size,
        data_buffer = config.data_buffer,
        "extraction config"
    );
}

fn log_transform_config(config: &TransformConfig) {
    debug!(
        tags_as_json = config.tags_as_json,
        tags_column = config.tags_column,
        fields_as_json = config.fields_as_json,
        fields_column = config.fields_column,
        output_schema = config.output_schema,
        "transform config"
    );
}

fn log_ingestion_config(config: &IngestionConfig) {
    debug!(
        batch_size = config.batch_size,
        commit_strategy = ?config.commit_strategy,
        rollback_on_external_error = config.rollback_on_external_error,
        schema_strategy = ?config.schema_strategy,
        "ingestion config"
    );
}

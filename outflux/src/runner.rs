//! Runs the pipes of many measures with bounded parallelism.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::pipe::Pipe;

/// Source id used when a shutdown cancels running pipes.
const SHUTDOWN_SOURCE: &str = "shutdown";

/// Outcome of a migration, one entry per measure.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, EtlError)>,
    /// Measures that never started because of a shutdown.
    pub skipped: Vec<String>,
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

enum Outcome {
    Succeeded,
    Failed(EtlError),
    Skipped,
}

/// Resolves once a shutdown was requested. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown_rx: &mut ShutdownRx) {
    if shutdown_rx.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn run_measure<F, Fut>(
    measure: String,
    semaphore: Arc<Semaphore>,
    mut shutdown_rx: ShutdownRx,
    factory: Arc<F>,
) -> Outcome
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = EtlResult<Pipe>>,
{
    debug!("waiting for a run permit");

    let _permit = tokio::select! {
        biased;

        _ = shutdown_requested(&mut shutdown_rx) => {
            info!("shutdown requested before the measure started");
            return Outcome::Skipped;
        }
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return Outcome::Skipped,
        },
    };

    let pipe = match factory(measure).await {
        Ok(pipe) => pipe,
        Err(err) => return Outcome::Failed(err),
    };

    let bus = pipe.cancellation_bus();
    let run = pipe.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => match result {
            Ok(()) => Outcome::Succeeded,
            Err(err) => Outcome::Failed(err),
        },
        _ = shutdown_requested(&mut shutdown_rx) => {
            warn!("shutdown requested, cancelling running pipe");
            let cancelled = etl_error!(ErrorKind::Cancelled, "Migration is shutting down");
            bus.broadcast(SHUTDOWN_SOURCE, cancelled.clone());

            match run.await {
                Ok(()) => Outcome::Failed(cancelled),
                Err(err) => Outcome::Failed(err),
            }
        }
    }
}

/// Migrates every measure with at most `max_parallel` pipes running at once.
///
/// `factory` builds the pipe of a measure once it may run. A shutdown cancels the running
/// pipes and skips the measures still waiting.
pub async fn run_pipes<F, Fut>(
    measures: Vec<String>,
    max_parallel: usize,
    shutdown_rx: ShutdownRx,
    factory: F,
) -> MigrationReport
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = EtlResult<Pipe>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let factory = Arc::new(factory);

    info!(measures = measures.len(), max_parallel, "starting migration");

    let mut handles: Vec<(String, JoinHandle<Outcome>)> = Vec::with_capacity(measures.len());
    for measure in measures {
        let span = tracing::info_span!("measure", measure = %measure);
        let task = run_measure(
            measure.clone(),
            semaphore.clone(),
            shutdown_rx.clone(),
            factory.clone(),
        )
        .instrument(span);
        handles.push((measure, tokio::spawn(task)));
    }

    let mut report = MigrationReport::default();
    for (measure, handle) in handles {
        let outcome = handle.await.unwrap_or_else(|err| {
            Outcome::Failed(etl_error!(
                ErrorKind::StagePanic,
                "Measure task panicked or was aborted",
                err
            ))
        });

        match outcome {
            Outcome::Succeeded => {
                info!(measure = %measure, "measure migrated");
                report.succeeded.push(measure);
            }
            Outcome::Failed(err) => {
                error!(measure = %measure, "measure failed: {}", err);
                report.failed.push((measure, err));
            }
            Outcome::Skipped => {
                warn!(measure = %measure, "measure skipped");
                report.skipped.push(measure);
            }
        }
    }

    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        "migration finished"
    );

    report
}

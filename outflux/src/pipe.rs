//! A pipe moves one data set from an extractor, through transformers, into an ingestor.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::bail;
use crate::concurrency::cancellation::{CancellationBus, CancellationRx};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::stage::{Extractor, Ingestor, Transformer};

/// Any stage of a pipe, so that every stage runs through the same task wrapper.
enum Stage {
    Extractor(Box<dyn Extractor>),
    Transformer(Box<dyn Transformer>),
    Ingestor(Box<dyn Ingestor>),
}

impl Stage {
    fn id(&self) -> &str {
        match self {
            Stage::Extractor(stage) => stage.id(),
            Stage::Transformer(stage) => stage.id(),
            Stage::Ingestor(stage) => stage.id(),
        }
    }

    async fn start(&mut self, cancel: CancellationRx) -> EtlResult<()> {
        match self {
            Stage::Extractor(stage) => stage.start(cancel).await,
            Stage::Transformer(stage) => stage.start(cancel).await,
            Stage::Ingestor(stage) => stage.start(cancel).await,
        }
    }
}

pub struct Pipe {
    id: String,
    extractor: Box<dyn Extractor>,
    transformers: Vec<Box<dyn Transformer>>,
    ingestor: Box<dyn Ingestor>,
    schema_only: bool,
    prepared: bool,
    bus: Arc<CancellationBus>,
}

impl Pipe {
    pub fn new(
        id: impl Into<String>,
        extractor: Box<dyn Extractor>,
        transformers: Vec<Box<dyn Transformer>>,
        ingestor: Box<dyn Ingestor>,
        schema_only: bool,
    ) -> Self {
        Self {
            id: id.into(),
            extractor,
            transformers,
            ingestor,
            schema_only,
            prepared: false,
            bus: Arc::new(CancellationBus::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the bus the stages of this pipe listen on.
    ///
    /// Broadcasting on it from outside the pipe cancels every stage.
    pub fn cancellation_bus(&self) -> Arc<CancellationBus> {
        self.bus.clone()
    }

    /// Negotiates the schema from the extractor down to the ingestor.
    ///
    /// Stages are prepared one after the other. Nothing runs before every stage is prepared.
    pub async fn prepare(&mut self) -> EtlResult<()> {
        if self.prepared {
            return Ok(());
        }

        let mut bundle = self.extractor.prepare().await?;
        debug!(pipe = %self.id, data_set = %bundle.data_set.name(), "prepared extractor");

        for transformer in &mut self.transformers {
            bundle = transformer.prepare(bundle).await?;
            debug!(
                pipe = %self.id,
                stage = transformer.id(),
                data_set = %bundle.data_set.name(),
                "prepared transformer"
            );
        }

        self.ingestor.prepare(bundle).await?;
        self.prepared = true;

        info!(pipe = %self.id, "pipe prepared");

        Ok(())
    }

    /// Runs every stage until all of them returned.
    ///
    /// Returns `Ok` only if every stage did. Otherwise the error of each failing stage is
    /// returned, attributed to that stage.
    pub async fn run(mut self) -> EtlResult<()> {
        self.prepare().await?;

        if self.schema_only {
            info!(pipe = %self.id, "schema only, not moving any rows");
            return Ok(());
        }

        if self.bus.is_closed() {
            bail!(
                ErrorKind::Cancelled,
                "Pipe was cancelled before it started",
                self.id
            );
        }

        let mut stages = Vec::with_capacity(self.transformers.len() + 2);
        stages.push(Stage::Extractor(self.extractor));
        stages.extend(self.transformers.into_iter().map(Stage::Transformer));
        stages.push(Stage::Ingestor(self.ingestor));

        let mut subscribed = Vec::with_capacity(stages.len());
        for stage in stages {
            let cancel = self.bus.subscribe(stage.id())?;
            subscribed.push((stage, cancel));
        }

        let mut handles: Vec<(String, JoinHandle<EtlResult<()>>)> =
            Vec::with_capacity(subscribed.len());
        for (stage, cancel) in subscribed {
            let stage_id = stage.id().to_string();
            let span = tracing::info_span!("stage", pipe = %self.id, stage = %stage_id);
            let task = run_stage(stage, cancel, self.bus.clone()).instrument(span);
            handles.push((stage_id, tokio::spawn(task)));
        }

        let mut errors = Vec::new();
        for (stage_id, handle) in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => errors.push(err),
                Err(join_err) => {
                    let err = etl_error!(
                        ErrorKind::StagePanic,
                        "Stage task was aborted",
                        join_err
                    )
                    .with_stage(stage_id.as_str());
                    self.bus.broadcast(&stage_id, err.clone());
                    errors.push(err);
                }
            }
        }

        self.bus.close();

        match errors.len() {
            0 => {
                info!(pipe = %self.id, "pipe finished");
                Ok(())
            }
            1 => Err(errors.remove(0)),
            _ => Err(EtlError::many(errors)),
        }
    }
}

/// Runs one stage and broadcasts its error before its output channel closes.
///
/// A panic inside the stage is caught and reported as [`ErrorKind::StagePanic`], so consumers
/// downstream see the cancellation before they see their input close.
async fn run_stage(
    mut stage: Stage,
    cancel: CancellationRx,
    bus: Arc<CancellationBus>,
) -> EtlResult<()> {
    let stage_id = stage.id().to_string();
    debug!("stage started");

    let result = match AssertUnwindSafe(stage.start(cancel)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(etl_error!(
            ErrorKind::StagePanic,
            "Stage panicked",
            panic_message(payload.as_ref())
        )),
    }
    .map_err(|err| err.with_stage(stage_id.as_str()));

    if let Err(err) = &result {
        error!("stage failed: {}", err);
        bus.broadcast(&stage_id, err.clone());
    }

    if let Err(err) = bus.unsubscribe(&stage_id) {
        warn!("failed to unsubscribe stage: {}", err);
    }

    // Dropping the stage closes its output channel.
    drop(stage);
    debug!("stage finished");

    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

use std::time::Duration;

use async_trait::async_trait;

use crate::bail;
use crate::concurrency::cancellation::CancellationRx;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::stage::{Extractor, Transformer};
use crate::transformation::pump;
use crate::types::{Bundle, DataSet, Row, RowReceiver, RowSender};

/// Extractor publishing scripted chunks of rows.
///
/// Like a real source it checks for cancellation before every chunk and can be told to
/// fail at a given chunk.
pub struct MemoryExtractor {
    id: String,
    data_set: DataSet,
    chunks: Vec<Vec<Row>>,
    fail_at_chunk: Option<(usize, EtlError)>,
    panic_at_chunk: Option<usize>,
    chunk_delay: Option<Duration>,
    buffer: usize,
    output: Option<RowSender>,
}

impl MemoryExtractor {
    pub fn new(id: impl Into<String>, data_set: DataSet, chunks: Vec<Vec<Row>>) -> Self {
        Self {
            id: id.into(),
            data_set,
            chunks,
            fail_at_chunk: None,
            panic_at_chunk: None,
            chunk_delay: None,
            buffer: 16,
            output: None,
        }
    }

    /// Splits `rows` into chunks of `chunk_size` rows.
    pub fn chunked(
        id: impl Into<String>,
        data_set: DataSet,
        rows: Vec<Row>,
        chunk_size: usize,
    ) -> Self {
        let chunks = rows.chunks(chunk_size).map(<[Row]>::to_vec).collect();
        Self::new(id, data_set, chunks)
    }

    /// Fails with `err` instead of publishing the chunk at `chunk`.
    pub fn fail_at_chunk(mut self, chunk: usize, err: EtlError) -> Self {
        self.fail_at_chunk = Some((chunk, err));
        self
    }

    /// Panics instead of publishing the chunk at `chunk`.
    pub fn panic_at_chunk(mut self, chunk: usize) -> Self {
        self.panic_at_chunk = Some(chunk);
        self
    }

    /// Waits `delay` after every chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }
}

#[async_trait]
impl Extractor for MemoryExtractor {
    fn id(&self) -> &str {
        &self.id
    }

    async fn prepare(&mut self) -> EtlResult<Bundle> {
        let (tx, bundle) = Bundle::channel(self.data_set.clone(), self.buffer)?;
        self.output = Some(tx);

        Ok(bundle)
    }

    async fn start(&mut self, mut cancel: CancellationRx) -> EtlResult<()> {
        let Some(output) = self.output.as_ref() else {
            bail!(ErrorKind::InvalidState, "Extractor started before it was prepared");
        };

        for (index, chunk) in self.chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(());
            }

            if let Some((fail_at, err)) = &self.fail_at_chunk
                && *fail_at == index
            {
                return Err(err.clone());
            }

            if self.panic_at_chunk == Some(index) {
                panic!("extractor panicked at chunk {index}");
            }

            for row in chunk {
                if output.send(row.clone()).await.is_err() {
                    return Ok(());
                }
            }

            if let Some(delay) = self.chunk_delay {
                tokio::time::sleep(delay).await;
            }
        }

        Ok(())
    }
}

struct Running {
    input: RowReceiver,
    output: RowSender,
}

/// Transformer forwarding rows unchanged, optionally failing after a number of rows.
pub struct PassThroughTransformer {
    id: String,
    fail_after: Option<(usize, EtlError)>,
    running: Option<Running>,
}

impl PassThroughTransformer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fail_after: None,
            running: None,
        }
    }

    /// Fails with `err` when row number `rows` (zero based) arrives.
    pub fn fail_after(mut self, rows: usize, err: EtlError) -> Self {
        self.fail_after = Some((rows, err));
        self
    }
}

#[async_trait]
impl Transformer for PassThroughTransformer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn prepare(&mut self, input: Bundle) -> EtlResult<Bundle> {
        let (output, bundle) = Bundle::channel(input.data_set.clone(), 16)?;
        self.running = Some(Running {
            input: input.rows,
            output,
        });

        Ok(bundle)
    }

    async fn start(&mut self, mut cancel: CancellationRx) -> EtlResult<()> {
        let Some(running) = self.running.as_mut() else {
            bail!(ErrorKind::InvalidState, "Transformer started before it was prepared");
        };

        let fail_after = &self.fail_after;
        let mut seen = 0;
        pump(&mut running.input, &running.output, &mut cancel, |row| {
            if let Some((rows, err)) = fail_after
                && seen == *rows
            {
                return Err(err.clone());
            }
            seen += 1;

            Ok(row)
        })
        .await
    }
}

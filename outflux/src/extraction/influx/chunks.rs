use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use pin_project_lite::pin_project;
use serde::Deserialize;
use serde_json::Value;

use crate::bail;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;

/// One JSON document returned by `/query`. Chunked responses are a sequence of these.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub statement_id: Option<u64>,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub partial: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
    #[serde(default)]
    pub partial: bool,
}

impl QueryResponse {
    /// Returns every series of every statement, failing on the first reported error.
    pub fn into_series(self) -> EtlResult<Vec<Series>> {
        if let Some(error) = self.error {
            bail!(ErrorKind::SourceQueryFailed, "InfluxDB rejected the query", error);
        }

        let mut series = Vec::new();
        for result in self.results {
            if let Some(error) = result.error {
                bail!(
                    ErrorKind::SourceQueryFailed,
                    "InfluxDB statement failed",
                    error
                );
            }
            series.extend(result.series);
        }

        Ok(series)
    }
}

fn parse_chunk(line: &[u8]) -> EtlResult<QueryResponse> {
    serde_json::from_slice(line).map_err(|err| {
        etl_error!(
            ErrorKind::SourceProtocolError,
            "Malformed InfluxDB response chunk",
            err
        )
    })
}

pin_project! {
    /// Splits a chunked `/query` body into [`QueryResponse`]s, one per line.
    ///
    /// A trailing document without newline is parsed at end of body. Once an error was
    /// returned the stream ends.
    pub struct ChunkStream<S> {
        #[pin]
        inner: S,
        buffer: BytesMut,
        done: bool,
    }
}

impl<S> ChunkStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            done: false,
        }
    }
}

impl<S, E> Stream for ChunkStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<EtlError>,
{
    type Item = EtlResult<QueryResponse>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(pos) = this.buffer.iter().position(|b| *b == b'\n') {
                let line = this.buffer.split_to(pos + 1);
                let line = line[..pos].trim_ascii();
                if line.is_empty() {
                    continue;
                }

                return Poll::Ready(Some(parse_chunk(line)));
            }

            if *this.done {
                let rest = this.buffer.split();
                let rest = rest.trim_ascii();
                if rest.is_empty() {
                    return Poll::Ready(None);
                }

                return Poll::Ready(Some(parse_chunk(rest)));
            }

            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(bytes)) => this.buffer.extend_from_slice(&bytes),
                Some(Err(err)) => {
                    *this.done = true;
                    this.buffer.clear();

                    return Poll::Ready(Some(Err(err.into())));
                }
                None => *this.done = true,
            }
        }
    }
}

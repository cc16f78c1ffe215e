use async_trait::async_trait;
use futures::StreamExt;
use outflux_config::shared::ExtractionConfig;
use serde_json::Value;
use tracing::{debug, info};

use crate::bail;
use crate::concurrency::cancellation::CancellationRx;
use crate::conversions::influx::{CellConverter, converter_for};
use crate::error::{ErrorKind, EtlResult};
use crate::extraction::influx::chunks::Series;
use crate::extraction::influx::client::InfluxClient;
use crate::extraction::influx::query::SelectQuery;
use crate::extraction::influx::schema::MeasureSchema;
use crate::stage::Extractor;
use crate::types::{Bundle, Cell, DataSet, Row, RowSender};

/// Where the value of a data set column is found in a series.
#[derive(Debug, Clone)]
enum ValueSource {
    Column(usize),
    /// Tag value shared by every row of a grouped series.
    Tag(Value),
}

/// Converts the rows of one series into rows of a [`DataSet`].
struct SeriesMapper {
    sources: Vec<(ValueSource, CellConverter)>,
}

impl SeriesMapper {
    fn new(data_set: &DataSet, converters: &[CellConverter], series: &Series) -> EtlResult<Self> {
        let mut sources = Vec::with_capacity(data_set.columns().len());
        for (column, converter) in data_set.columns().iter().zip(converters) {
            let source = if let Some(index) = series.columns.iter().position(|c| *c == column.name)
            {
                ValueSource::Column(index)
            } else if let Some(tag) = series.tags.as_ref().and_then(|tags| tags.get(&column.name))
            {
                ValueSource::Tag(Value::String(tag.clone()))
            } else {
                bail!(
                    ErrorKind::SourceProtocolError,
                    "Column missing from InfluxDB response",
                    format!("column '{}' in {}", column.name, data_set.name())
                );
            };
            sources.push((source, *converter));
        }

        Ok(Self { sources })
    }

    fn map(&self, values: &[Value]) -> EtlResult<Row> {
        let mut cells: Vec<Cell> = Vec::with_capacity(self.sources.len());
        for (source, converter) in &self.sources {
            let value = match source {
                ValueSource::Column(index) => match values.get(*index) {
                    Some(value) => value,
                    None => bail!(
                        ErrorKind::SourceProtocolError,
                        "Short row in InfluxDB response",
                        format!("expected a value at position {index}, row has {}", values.len())
                    ),
                },
                ValueSource::Tag(value) => value,
            };
            cells.push(converter(value)?);
        }

        Ok(Row::new(cells))
    }
}

/// Streams one measure out of InfluxDB.
#[derive(Debug)]
pub struct InfluxExtractor {
    id: String,
    client: InfluxClient,
    schema: MeasureSchema,
    config: ExtractionConfig,
    output: Option<RowSender>,
}

impl InfluxExtractor {
    pub fn new(
        id: impl Into<String>,
        client: InfluxClient,
        schema: MeasureSchema,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            id: id.into(),
            client,
            schema,
            config,
            output: None,
        }
    }

    fn measure(&self) -> &str {
        &self.schema.data_set.name().name
    }

    fn build_query(&self) -> EtlResult<String> {
        let (from, to) = self.config.time_bounds()?;
        let query = SelectQuery {
            measure: self.measure(),
            retention_policy: self.config.retention_policy.as_deref(),
            tags: &self.schema.tag_keys,
            fields: &self.schema.field_keys,
            from,
            to,
            limit: self.config.limit,
        };

        Ok(query.build())
    }
}

#[async_trait]
impl Extractor for InfluxExtractor {
    fn id(&self) -> &str {
        &self.id
    }

    async fn prepare(&mut self) -> EtlResult<Bundle> {
        self.config.validate()?;
        self.config.time_bounds()?;

        let (tx, bundle) = Bundle::channel(self.schema.data_set.clone(), self.config.data_buffer)?;
        self.output = Some(tx);

        Ok(bundle)
    }

    async fn start(&mut self, mut cancel: CancellationRx) -> EtlResult<()> {
        let Some(output) = self.output.as_ref() else {
            bail!(
                ErrorKind::InvalidState,
                "Extractor started before it was prepared",
                self.id
            );
        };

        if self.config.limit == Some(0) {
            info!(measure = self.measure(), "row limit is zero, nothing to extract");
            return Ok(());
        }

        let data_set = &self.schema.data_set;
        let converters = data_set
            .columns()
            .iter()
            .map(|column| converter_for(column.data_type))
            .collect::<EtlResult<Vec<_>>>()?;

        let query = self.build_query()?;
        let mut chunks = self
            .client
            .query_chunked(&query, self.config.chunk_size)
            .await?;

        let mut rows_sent: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                info!(rows_sent, "extraction cancelled");
                return Ok(());
            }

            let chunk = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!(rows_sent, "extraction cancelled");
                    return Ok(());
                }
                chunk = chunks.next() => chunk,
            };

            let Some(response) = chunk else {
                break;
            };

            for series in response?.into_series()? {
                let mapper = SeriesMapper::new(data_set, &converters, &series)?;
                for values in &series.values {
                    let row = mapper.map(values)?;

                    let sent = tokio::select! {
                        biased;

                        _ = cancel.cancelled() => {
                            info!(rows_sent, "extraction cancelled");
                            return Ok(());
                        }
                        sent = output.send(row) => sent,
                    };

                    if sent.is_err() {
                        debug!(rows_sent, "row consumer went away, stopping extraction");
                        return Ok(());
                    }
                    rows_sent += 1;
                }
            }
        }

        info!(measure = self.measure(), rows_sent, "extraction finished");

        Ok(())
    }
}

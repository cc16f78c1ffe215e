use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::bail;
use crate::concurrency::cancellation::CancellationRx;
use crate::error::{ErrorKind, EtlResult};
use crate::stage::Transformer;
use crate::transformation::pump;
use crate::types::{Bundle, Cell, Column, DataSet, DataType, Row, RowReceiver, RowSender};

/// Where the value of an output column comes from.
#[derive(Debug, Clone)]
enum Slot {
    Keep(usize),
    Combined,
}

/// Layout of the output rows, computed once in `prepare`.
#[derive(Debug, Clone)]
struct Plan {
    input: DataSet,
    slots: Vec<Slot>,
    /// Input positions and names of the folded columns.
    combined: Vec<(usize, String)>,
}

impl Plan {
    fn apply(&self, row: Row) -> EtlResult<Row> {
        row.check_arity(&self.input)?;

        let mut object = Map::with_capacity(self.combined.len());
        for (index, name) in &self.combined {
            let cell = &row.values[*index];
            if !cell.is_null() {
                object.insert(name.clone(), cell.to_json());
            }
        }

        let mut values = row.values;
        let mut object = Some(Value::Object(object));
        let mut cells = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let cell = match slot {
                Slot::Keep(index) => std::mem::replace(&mut values[*index], Cell::Null),
                Slot::Combined => Cell::Json(object.take().unwrap_or(Value::Null)),
            };
            cells.push(cell);
        }

        Ok(Row::new(cells))
    }
}

struct Running {
    plan: Plan,
    input: RowReceiver,
    output: RowSender,
}

/// Folds a set of columns into a single JSON object column.
///
/// The JSON column takes the position of the first folded column. Null values are left out
/// of the object.
pub struct JsonCombiner {
    id: String,
    columns: Vec<String>,
    target: String,
    buffer: usize,
    running: Option<Running>,
}

impl JsonCombiner {
    /// Creates a combiner folding `columns` into `target`, with an output channel of
    /// `buffer` rows.
    pub fn new(
        id: impl Into<String>,
        columns: Vec<String>,
        target: impl Into<String>,
        buffer: usize,
    ) -> Self {
        Self {
            id: id.into(),
            columns,
            target: target.into(),
            buffer,
            running: None,
        }
    }

    fn plan(&self, input: &DataSet) -> EtlResult<(DataSet, Plan)> {
        if self.columns.is_empty() {
            bail!(
                ErrorKind::InvalidSchema,
                "No columns to combine",
                format!("target column '{}'", self.target)
            );
        }

        let folded: HashSet<&str> = self.columns.iter().map(String::as_str).collect();

        if folded.contains(input.time_column()) {
            bail!(
                ErrorKind::InvalidSchema,
                "The time column cannot be combined",
                input.time_column()
            );
        }

        for name in &self.columns {
            if input.column(name).is_none() {
                bail!(
                    ErrorKind::InvalidSchema,
                    "Column to combine does not exist",
                    format!("column '{name}' of {}", input.name())
                );
            }
        }

        if input.column(&self.target).is_some() && !folded.contains(self.target.as_str()) {
            bail!(
                ErrorKind::InvalidSchema,
                "Combined column collides with an existing column",
                format!("column '{}' of {}", self.target, input.name())
            );
        }

        let mut columns = Vec::with_capacity(input.columns().len() - folded.len() + 1);
        let mut slots = Vec::with_capacity(columns.capacity());
        let mut combined = Vec::with_capacity(folded.len());
        for (index, column) in input.columns().iter().enumerate() {
            if folded.contains(column.name.as_str()) {
                if combined.is_empty() {
                    columns.push(Column::new(self.target.clone(), DataType::Json));
                    slots.push(Slot::Combined);
                }
                combined.push((index, column.name.clone()));
            } else {
                columns.push(column.clone());
                slots.push(Slot::Keep(index));
            }
        }

        let output = DataSet::new(input.name().clone(), columns, input.time_column())?;
        let plan = Plan {
            input: input.clone(),
            slots,
            combined,
        };

        Ok((output, plan))
    }
}

#[async_trait]
impl Transformer for JsonCombiner {
    fn id(&self) -> &str {
        &self.id
    }

    async fn prepare(&mut self, input: Bundle) -> EtlResult<Bundle> {
        let (data_set, plan) = self.plan(&input.data_set)?;
        debug!(
            data_set = %data_set.name(),
            target = %self.target,
            columns = ?self.columns,
            "combining columns into json"
        );

        let (output, bundle) = Bundle::channel(data_set, self.buffer)?;
        self.running = Some(Running {
            plan,
            input: input.rows,
            output,
        });

        Ok(bundle)
    }

    async fn start(&mut self, mut cancel: CancellationRx) -> EtlResult<()> {
        let Some(running) = self.running.as_mut() else {
            bail!(
                ErrorKind::InvalidState,
                "Transformer started before it was prepared",
                self.id
            );
        };

        let plan = &running.plan;
        pump(&mut running.input, &running.output, &mut cancel, |row| {
            plan.apply(row)
        })
        .await
    }
}

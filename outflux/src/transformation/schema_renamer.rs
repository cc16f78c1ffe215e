use async_trait::async_trait;
use tracing::debug;

use crate::concurrency::cancellation::CancellationRx;
use crate::error::EtlResult;
use crate::stage::Transformer;
use crate::types::{Bundle, TableName};

/// Moves the data set into another destination schema.
///
/// Rows are not touched: the input receiver is handed on as is, so `start` has nothing to do.
#[derive(Debug)]
pub struct SchemaRenamer {
    id: String,
    schema: String,
}

impl SchemaRenamer {
    pub fn new(id: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            schema: schema.into(),
        }
    }
}

#[async_trait]
impl Transformer for SchemaRenamer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn prepare(&mut self, input: Bundle) -> EtlResult<Bundle> {
        let name = TableName::new(self.schema.clone(), input.data_set.name().name.clone());
        debug!(from = %input.data_set.name(), to = %name, "renaming data set");

        let data_set = input.data_set.renamed(name);

        Ok(input.with_data_set(data_set))
    }

    async fn start(&mut self, _cancel: CancellationRx) -> EtlResult<()> {
        Ok(())
    }
}

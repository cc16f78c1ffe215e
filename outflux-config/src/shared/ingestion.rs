use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Default number of rows written to the destination per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5_000;

/// When the ingestion stage commits its transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStrategy {
    /// Commit after every written batch.
    #[default]
    CommitOnEachBatch,
    /// Commit once, after the input is exhausted.
    CommitOnEnd,
}

/// How the destination table of a measure is prepared before ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStrategy {
    /// The table must exist and be compatible with the measure.
    ValidateOnly,
    /// Create the table when missing, otherwise validate it.
    #[default]
    CreateIfMissing,
    /// Drop the table if it exists and recreate it.
    DropAndCreate,
    /// Like [`SchemaStrategy::DropAndCreate`], dropping dependent objects too.
    DropCascadeAndCreate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IngestionConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub commit_strategy: CommitStrategy,
    /// Whether the open transaction is rolled back when another stage of the pipe fails.
    ///
    /// When disabled, the rows received so far are committed before stopping.
    #[serde(default = "default_rollback_on_external_error")]
    pub rollback_on_external_error: bool,
    #[serde(default)]
    pub schema_strategy: SchemaStrategy,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_rollback_on_external_error() -> bool {
    true
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            commit_strategy: CommitStrategy::default(),
            rollback_on_external_error: true,
            schema_strategy: SchemaStrategy::default(),
        }
    }
}

impl IngestionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::ZeroValue("ingestion.batch_size"));
        }

        Ok(())
    }
}

use serde::{Deserialize, Serialize};

use crate::shared::{ExtractionConfig, IngestionConfig, TransformConfig, ValidationError};

/// Settings shared by every pipe unless a measure overrides them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipeDefaults {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

/// Immutable configuration of a single pipe, which migrates exactly one measure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipeConfig {
    /// Name of the measure being migrated. Also the destination table name.
    pub measure: String,
    pub extraction: ExtractionConfig,
    pub transform: TransformConfig,
    pub ingestion: IngestionConfig,
    /// Only prepare the destination schema, without moving any rows.
    pub schema_only: bool,
}

impl PipeConfig {
    pub fn new(measure: impl Into<String>, defaults: &PipeDefaults, schema_only: bool) -> Self {
        Self {
            measure: measure.into(),
            extraction: defaults.extraction.clone(),
            transform: defaults.transform.clone(),
            ingestion: defaults.ingestion.clone(),
            schema_only,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.measure.trim().is_empty() {
            return Err(ValidationError::EmptyName("measure"));
        }

        self.extraction.validate()?;
        self.transform.validate()?;
        self.ingestion.validate()?;

        Ok(())
    }
}

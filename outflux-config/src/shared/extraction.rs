use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Default number of points InfluxDB returns per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Default capacity of the channel between extraction and the next stage.
pub const DEFAULT_DATA_BUFFER: usize = 1_000;

/// Filters and sizing applied when reading a measure from InfluxDB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExtractionConfig {
    /// Retention policy the measure is read from. The database default is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_policy: Option<String>,
    /// Inclusive lower time bound, RFC3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Inclusive upper time bound, RFC3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Maximum number of points read from the measure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Number of points per chunk requested from the server.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Capacity of the bounded row channel.
    #[serde(default = "default_data_buffer")]
    pub data_buffer: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_data_buffer() -> usize {
    DEFAULT_DATA_BUFFER
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            retention_policy: None,
            from: None,
            to: None,
            limit: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            data_buffer: DEFAULT_DATA_BUFFER,
        }
    }
}

impl ExtractionConfig {
    /// Parses the configured time bounds.
    ///
    /// Fails when a bound is not RFC3339 or when `from` is after `to`.
    pub fn time_bounds(
        &self,
    ) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), ValidationError> {
        let from = parse_bound("from", self.from.as_deref())?;
        let to = parse_bound("to", self.to.as_deref())?;

        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ValidationError::InvertedTimeRange {
                    from: from.to_rfc3339(),
                    to: to.to_rfc3339(),
                });
            }
        }

        Ok((from, to))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.chunk_size == 0 {
            return Err(ValidationError::ZeroValue("extraction.chunk_size"));
        }

        if self.data_buffer == 0 {
            return Err(ValidationError::ZeroValue("extraction.data_buffer"));
        }

        if matches!(&self.retention_policy, Some(rp) if rp.trim().is_empty()) {
            return Err(ValidationError::EmptyName("extraction.retention_policy"));
        }

        self.time_bounds()?;

        Ok(())
    }
}

fn parse_bound(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, ValidationError> {
    let Some(value) = value else {
        return Ok(None);
    };

    DateTime::parse_from_rfc3339(value)
        .map(|parsed| Some(parsed.with_timezone(&Utc)))
        .map_err(|_| ValidationError::InvalidTimeBound {
            field,
            value: value.to_string(),
        })
}

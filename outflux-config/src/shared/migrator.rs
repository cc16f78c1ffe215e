use serde::{Deserialize, Serialize};

use crate::load::Config;
use crate::shared::{
    DestinationConfig, InfluxConnectionConfig, PipeConfig, PipeDefaults, ValidationError,
};

/// Default number of measures migrated at the same time.
pub const DEFAULT_MAX_PARALLEL: u16 = 4;

/// Complete configuration of the migrator binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MigratorConfig {
    /// InfluxDB instance the measures are read from.
    pub source: InfluxConnectionConfig,
    /// Where the measures are written to.
    pub destination: DestinationConfig,
    /// Measures to migrate. Every measure of the database is migrated when empty.
    #[serde(default)]
    pub measures: Vec<String>,
    /// Maximum number of pipes running concurrently.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: u16,
    /// Only prepare destination schemas.
    #[serde(default)]
    pub schema_only: bool,
    #[serde(default)]
    pub pipe: PipeDefaults,
}

fn default_max_parallel() -> u16 {
    DEFAULT_MAX_PARALLEL
}

impl MigratorConfig {
    /// Validates the complete migrator configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.destination.validate()?;

        if self.max_parallel == 0 {
            return Err(ValidationError::ZeroValue("max_parallel"));
        }

        for measure in &self.measures {
            if measure.trim().is_empty() {
                return Err(ValidationError::EmptyName("measures"));
            }
        }

        self.pipe.extraction.validate()?;
        self.pipe.transform.validate()?;
        self.pipe.ingestion.validate()?;

        Ok(())
    }

    /// Builds the configuration of the pipe migrating `measure`.
    pub fn pipe_config(&self, measure: &str) -> PipeConfig {
        PipeConfig::new(measure, &self.pipe, self.schema_only)
    }
}

impl Config for MigratorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["measures"];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::CommitStrategy;

    fn config_json() -> &'static str {
        r#"{
            "source": { "url": "http://localhost:8086", "database": "telegraf" },
            "destination": "memory",
            "measures": ["cpu", "mem"],
            "pipe": { "ingestion": { "batch_size": 100, "commit_strategy": "commit_on_end" } }
        }"#
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: MigratorConfig = serde_json::from_str(config_json()).unwrap();
        assert_eq!(config.max_parallel, DEFAULT_MAX_PARALLEL);
        assert!(!config.schema_only);
        assert!(config.validate().is_ok());

        let pipe = config.pipe_config("cpu");
        assert_eq!(pipe.measure, "cpu");
        assert_eq!(pipe.ingestion.batch_size, 100);
        assert_eq!(pipe.ingestion.commit_strategy, CommitStrategy::CommitOnEnd);
        assert!(pipe.validate().is_ok());
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let mut config: MigratorConfig = serde_json::from_str(config_json()).unwrap();
        config.max_parallel = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::ZeroValue("max_parallel"))
        ));
    }

    #[test]
    fn timescale_destination_deserializes() {
        let destination: DestinationConfig = serde_json::from_str(
            r#"{"timescale":{"connection":{"host":"localhost","port":5432,"name":"metrics","username":"postgres","password":null}}}"#,
        )
        .unwrap();
        assert!(matches!(destination, DestinationConfig::Timescale { .. }));
        assert!(destination.validate().is_ok());
    }
}

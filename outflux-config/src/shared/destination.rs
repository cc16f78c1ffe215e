use serde::{Deserialize, Serialize};

use crate::shared::{PgConnectionConfig, ValidationError};

/// Destination that migrated measures are written to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationConfig {
    /// In-memory destination, rows are kept in the process and discarded on exit.
    Memory,
    /// Postgres database with the TimescaleDB extension.
    ///
    /// Every measure becomes one hypertable partitioned on its time column.
    Timescale {
        /// Connection used for schema preparation and for the ingestion transactions.
        connection: PgConnectionConfig,
    },
}

impl DestinationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            DestinationConfig::Memory => Ok(()),
            DestinationConfig::Timescale { connection } => connection.tls.validate(),
        }
    }
}

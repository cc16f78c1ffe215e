//! Extraction from InfluxDB 1.x through its HTTP `/query` API.

mod chunks;
mod client;
mod extractor;
mod query;
mod schema;

pub use chunks::{ChunkStream, QueryResponse, Series, StatementResult};
pub use client::InfluxClient;
pub use extractor::InfluxExtractor;
pub use query::{SelectQuery, quote_identifier, quote_literal};
pub use schema::{MeasureSchema, TIME_COLUMN, discover_data_sets, fetch_data_set, field_data_type};

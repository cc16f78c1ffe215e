//! Helpers for testing pipes without InfluxDB or Postgres.
//!
//! Provides scripted stages, data set fixtures and builders for InfluxDB chunked responses.
pub mod data;
pub mod influx;
pub mod stages;

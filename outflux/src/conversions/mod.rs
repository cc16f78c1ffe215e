//! Conversions between source values, canonical [`crate::types::Cell`]s and destination
//! values.

pub mod influx;
pub mod postgres;

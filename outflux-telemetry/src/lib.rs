//! Logging setup shared by the outflux binaries and tests.

pub mod tracing;

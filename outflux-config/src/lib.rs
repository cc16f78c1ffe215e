//! Configuration for the outflux migrator.
//!
//! Provides environment detection, layered loading from YAML files and environment
//! variables, secret handling, and the configuration types of the migration pipes.

mod environment;
mod load;
mod secret;
pub mod shared;

pub use environment::*;
pub use load::*;
pub use secret::*;

mod base;
mod connection;
mod destination;
mod extraction;
mod ingestion;
mod migrator;
mod pipe;
mod transform;

pub use base::*;
pub use connection::*;
pub use destination::*;
pub use extraction::*;
pub use ingestion::*;
pub use migrator::*;
pub use pipe::*;
pub use transform::*;

//! Source side of the pipe.

pub mod influx;

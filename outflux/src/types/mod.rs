//! Data model shared by every pipe stage.

mod bundle;
mod cell;
mod data_set;
mod data_type;
mod row;

pub use bundle::*;
pub use cell::*;
pub use data_set::*;
pub use data_type::*;
pub use row::*;

pub mod cancellation;
pub mod shutdown;

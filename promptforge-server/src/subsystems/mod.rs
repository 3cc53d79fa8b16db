pub mod aggregate;
pub mod log_reader;
pub mod memory;
pub mod snapshot;
pub mod stats;
pub mod summary;

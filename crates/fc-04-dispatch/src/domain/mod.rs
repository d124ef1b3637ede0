//! Domain layer.

pub mod errors;
pub mod records;
pub mod report;
pub mod sinks;

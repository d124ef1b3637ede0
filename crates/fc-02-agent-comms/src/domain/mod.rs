//! Domain layer: timers, states and errors.

pub mod errors;
pub mod poll;
pub mod state;
pub mod stats;

//! Domain layer: trust decision and errors.

pub mod auth;
pub mod errors;

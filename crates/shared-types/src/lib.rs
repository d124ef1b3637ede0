//! # Shared Types Crate
//!
//! Domain types exchanged between agents and the server.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every crate in the workspace speaks these types.
//! - **Closed bodies**: a [`Message`] body is a tagged [`MessageBody`] variant,
//!   never an untyped blob plus a type name.
//! - **Decoder-owned trust**: [`AuthState`] on a message is only meaningful after
//!   the receiving communicator has stamped it.

pub mod entities;
pub mod errors;
pub mod message;
pub mod time;

pub use entities::*;
pub use errors::*;
pub use message::*;
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource};

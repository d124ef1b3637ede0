//! # Fleet-Comms Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # In-process fleet: one frontend, agents talking to it
//! └── integration/      # Cross-crate scenarios
//!     ├── enrollment.rs
//!     ├── delivery.rs
//!     ├── replay.rs
//!     ├── rotation.rs
//!     └── backoff.rs
//! benches/
//! └── wire_codec_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p fc-tests
//! cargo test -p fc-tests integration::replay
//! cargo bench -p fc-tests
//! ```

pub mod harness;
#[cfg(test)]
mod integration;

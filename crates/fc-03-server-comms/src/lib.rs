//! # fc-03 Server Communicator
//!
//! Server half of the secure messaging protocol.
//!
//! ## Architecture
//!
//! - **Domain:** the per-envelope trust decision and error taxonomy
//! - **Ports:** the agent metadata store this crate requires
//! - **Service:** [`ServerCommunicator`], shared by all request handlers
//! - **Adapters:** an in-memory metadata store
//!
//! ## Trust Decision
//!
//! | Condition | Result | Clock / ping |
//! |-----------|--------|--------------|
//! | No record, or no certificate the CA vouches for | `Unauthenticated` | untouched |
//! | Envelope timestamp below stored clock | `Desynchronized` | untouched |
//! | Otherwise (equality included) | `Authenticated` | advanced |
//!
//! Every message in the envelope inherits the envelope's state; whatever the
//! sender wrote into `auth_state` is discarded.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::InMemoryAgentMetadataStore;
pub use domain::errors::ServerCommsError;
pub use ports::outbound::AgentMetadataStore;
pub use service::{DecodedBatch, ServerCommsConfig, ServerCommunicator};

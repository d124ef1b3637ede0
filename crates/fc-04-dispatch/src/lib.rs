//! # fc-04 Dispatch Router
//!
//! Consumes `(agent, auth state, messages)` from the server communicator and
//! writes each message where it belongs.
//!
//! ## Routing
//!
//! | Message | Destination |
//! |---------|-------------|
//! | Parcel | Registered sink; failures logged, never propagated |
//! | Blob to `TransferStore` | Blob store, content-addressed by SHA-256 |
//! | Flow status / response | Flow store, paired with its request |
//! | Status `ClientKilled` | Crash store, then flow store |
//! | Structured response | Flow store as status or result |
//! | Other well-known session | Named handler queue |
//!
//! Only authenticated messages reach the stores. Unauthenticated or
//! desynchronized messages are accepted for open handlers (enrollment) and
//! dropped otherwise.
//!
//! Pending tasks are read with [`DispatchRouter::drain_tasks`], which never
//! deletes; a task is removed once its terminal status arrives.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::memory::{
    InMemoryBlobStore, InMemoryCrashStore, InMemoryFlowStore, InMemoryHandlerQueue,
    InMemoryTaskStore,
};
pub use domain::errors::{DispatchError, SinkError};
pub use domain::records::{
    BlobId, CrashInfo, FlowRequest, FlowResponse, HandlerRequest, ResponsePayload, Task,
};
pub use domain::report::{DispatchReport, MessageFailure};
pub use domain::sinks::{Sink, SinkRegistry};
pub use ports::outbound::{BlobStore, CrashStore, FlowStore, HandlerQueue, TaskStore};
pub use service::{DispatchConfig, DispatchRouter, DispatchStores};

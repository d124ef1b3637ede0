//! Per-batch dispatch outcome.

use crate::domain::errors::DispatchError;
use shared_types::MessageKind;

/// One message that could not be routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFailure {
    /// Position in the batch.
    pub index: usize,
    pub kind: MessageKind,
    pub error: DispatchError,
}

/// What happened to a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Messages written somewhere.
    pub dispatched: usize,
    /// Messages deliberately discarded (untrusted sender, unknown sink).
    pub dropped: usize,
    /// Messages that failed.
    pub failures: Vec<MessageFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

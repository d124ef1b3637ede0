//! # Loop and Enrollment States
//!
//! ```text
//! Idle -> Sending -> AwaitingResponse -> Idle
//!            |             |
//!            +-------------+--> BackingOff -> Sending ...
//!                                   |
//!                                   +--> Fatal (error limit exceeded)
//! ```

use shared_types::Timestamp;
use std::time::Duration;

/// Where the transport loop is within an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Sending,
    AwaitingResponse,
    BackingOff,
    Fatal,
}

/// Result of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Server answered; the out-queue was consumed.
    Success,
    /// Exchange failed; the out-queue is kept for the next attempt.
    Retryable,
    /// Error limit exceeded; the loop must stop.
    Fatal,
}

/// Agent view of its own enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentState {
    /// No response from the server yet.
    Unknown,
    /// Server rejected us as unenrolled; a request is due.
    NoCertificate,
    /// Request sent, waiting for the server to issue a certificate.
    RequestSent,
    /// Server accepted an envelope.
    Enrolled,
}

/// Tracks enrollment and rate-limits enrollment requests.
#[derive(Debug, Clone)]
pub struct EnrollmentTracker {
    state: EnrollmentState,
    last_request: Option<Timestamp>,
    retry_interval: Duration,
}

impl EnrollmentTracker {
    pub fn new(retry_interval: Duration) -> Self {
        Self {
            state: EnrollmentState::Unknown,
            last_request: None,
            retry_interval,
        }
    }

    pub fn state(&self) -> EnrollmentState {
        self.state
    }

    /// Server answered 406.
    pub fn on_rejected(&mut self) {
        if self.state != EnrollmentState::RequestSent {
            self.state = EnrollmentState::NoCertificate;
        }
    }

    /// Server answered 200.
    pub fn on_accepted(&mut self) {
        self.state = EnrollmentState::Enrolled;
    }

    /// Whether an enrollment request should go out with the next envelope.
    pub fn should_send(&self, now: Timestamp) -> bool {
        match self.state {
            EnrollmentState::NoCertificate => true,
            EnrollmentState::RequestSent => self
                .last_request
                .map_or(true, |sent| now.saturating_duration_since(sent) >= self.retry_interval),
            EnrollmentState::Unknown | EnrollmentState::Enrolled => false,
        }
    }

    /// An enrollment request was queued at `now`.
    pub fn mark_sent(&mut self, now: Timestamp) {
        self.state = EnrollmentState::RequestSent;
        self.last_request = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RETRY: Duration = Duration::from_secs(600);

    #[test]
    fn test_no_request_before_rejection() {
        let tracker = EnrollmentTracker::new(RETRY);
        assert_eq!(tracker.state(), EnrollmentState::Unknown);
        assert!(!tracker.should_send(Timestamp::from_secs(1)));
    }

    #[test]
    fn test_rejection_then_single_request() {
        let mut tracker = EnrollmentTracker::new(RETRY);
        tracker.on_rejected();
        assert!(tracker.should_send(Timestamp::from_secs(100)));

        tracker.mark_sent(Timestamp::from_secs(100));
        tracker.on_rejected();
        assert_eq!(tracker.state(), EnrollmentState::RequestSent);
        assert!(!tracker.should_send(Timestamp::from_secs(699)));
        assert!(tracker.should_send(Timestamp::from_secs(700)));
    }

    #[test]
    fn test_acceptance_enrolls() {
        let mut tracker = EnrollmentTracker::new(RETRY);
        tracker.on_rejected();
        tracker.mark_sent(Timestamp::from_secs(1));
        tracker.on_accepted();
        assert_eq!(tracker.state(), EnrollmentState::Enrolled);
        assert!(!tracker.should_send(Timestamp::from_secs(10_000)));

        tracker.on_rejected();
        assert!(tracker.should_send(Timestamp::from_secs(10_000)));
    }
}

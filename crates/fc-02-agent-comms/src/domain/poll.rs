//! # Poll Timer
//!
//! Chooses how long the transport loop sleeps between exchanges.
//!
//! - After a successful exchange: `poll_min` if the last batch asked for fast
//!   polling, `poll_max` otherwise.
//! - After a failure: exponential backoff starting at `poll_min`, doubling
//!   up to `poll_max`.

use std::time::Duration;

/// Sleep selection between exchanges.
#[derive(Debug, Clone)]
pub struct PollTimer {
    poll_min: Duration,
    poll_max: Duration,
    fastpoll: bool,
    backoff: Option<Duration>,
}

impl PollTimer {
    /// Slow polling until a batch asks otherwise.
    pub fn new(poll_min: Duration, poll_max: Duration) -> Self {
        Self {
            poll_min,
            poll_max: poll_max.max(poll_min),
            fastpoll: false,
            backoff: None,
        }
    }

    /// Record a completed exchange.
    pub fn on_success(&mut self, require_fastpoll: bool) {
        self.fastpoll = require_fastpoll;
        self.backoff = None;
    }

    /// Record a failed exchange.
    pub fn on_error(&mut self) {
        self.backoff = Some(match self.backoff {
            None => self.poll_min,
            Some(current) => current.saturating_mul(2).min(self.poll_max),
        });
    }

    /// Sleep before the next exchange.
    pub fn next_sleep(&self) -> Duration {
        match self.backoff {
            Some(backoff) => backoff,
            None if self.fastpoll => self.poll_min,
            None => self.poll_max,
        }
    }

    pub fn is_fastpoll(&self) -> bool {
        self.fastpoll
    }
}

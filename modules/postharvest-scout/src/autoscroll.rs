//! Auto-scroll stall detection.
//!
//! Each tick compares the record count and the page height against the last
//! tick. New records reset everything; a taller page halves the stall count;
//! neither counts as a stall. Too many stalls either wait and retry or end
//! the session.

use tokio::time::{Duration, Instant};

use crate::settings::HarvestSettings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollDecision {
    /// Scroll one step.
    Scroll,
    /// A stall retry is pending; do nothing this tick.
    Wait,
    /// Stalled out; wait the retry delay then try again.
    Retry { attempt: u32 },
    /// Retries exhausted. The session is over.
    Complete,
}

#[derive(Debug)]
pub struct AutoScroll {
    max_stalls: u32,
    max_retries: u32,
    retry_delay: Duration,
    last_count: usize,
    last_height: f64,
    stalls: u32,
    retries: u32,
    resume_at: Option<Instant>,
}

impl AutoScroll {
    pub fn new(settings: &HarvestSettings, count: usize, height: f64) -> Self {
        Self {
            max_stalls: settings.max_stalls,
            max_retries: settings.max_retries,
            retry_delay: settings.stall_retry_delay,
            last_count: count,
            last_height: height,
            stalls: 0,
            retries: 0,
            resume_at: None,
        }
    }

    pub fn stalls(&self) -> u32 {
        self.stalls
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn tick(&mut self, count: usize, height: f64, now: Instant) -> ScrollDecision {
        if let Some(resume_at) = self.resume_at {
            if now < resume_at {
                return ScrollDecision::Wait;
            }
            self.resume_at = None;
            self.last_count = count;
            self.last_height = height;
            return ScrollDecision::Scroll;
        }

        if count > self.last_count {
            self.stalls = 0;
            self.retries = 0;
        } else if height > self.last_height {
            self.stalls /= 2;
        } else {
            self.stalls += 1;
        }
        self.last_count = count;
        self.last_height = height;

        if self.stalls < self.max_stalls {
            return ScrollDecision::Scroll;
        }
        if self.retries < self.max_retries {
            self.retries += 1;
            self.stalls = 0;
            self.resume_at = Some(now + self.retry_delay);
            return ScrollDecision::Retry {
                attempt: self.retries,
            };
        }
        ScrollDecision::Complete
    }
}

/// Whether a scroll from `before` to `after` skipped over unscanned content.
pub fn is_jump(before: f64, after: f64, viewport: f64, threshold: f64) -> bool {
    (after - before).abs() > viewport * threshold
}

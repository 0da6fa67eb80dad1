// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Trailing-edge debounce used to coalesce autosaves.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self { delay, deadline: None }
    }

    /// (Re)start the timer from `now`.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left before firing, if scheduled.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }

    /// True once when the deadline has passed; the timer is then cleared.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescheduling_pushes_deadline() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::from_millis(100));
        debounce.schedule(start);
        debounce.schedule(start + Duration::from_millis(80));

        assert!(!debounce.fire(start + Duration::from_millis(120)));
        assert!(debounce.fire(start + Duration::from_millis(180)));
        assert!(!debounce.fire(start + Duration::from_millis(500)));
        assert!(!debounce.is_pending());
    }

    #[test]
    fn test_cancel() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::from_millis(10));
        debounce.schedule(start);
        assert_eq!(debounce.remaining(start), Some(Duration::from_millis(10)));
        debounce.cancel();
        assert!(!debounce.fire(start + Duration::from_secs(1)));
    }
}

//! Fixed-interval task scheduling for the frame loop
//!
//! Both sides run periodic work (snapshot broadcast, position report) from the
//! same loop that drains network events. A `Periodic` only answers "is the task
//! due at this instant"; it never sleeps, so the work it gates always runs
//! between event drains and never concurrently with them.

use std::time::{Duration, Instant};

/// Timer that fires at most once per interval while running
///
/// A stopped timer never fires. Missed intervals are skipped rather than
/// replayed in a burst, matching `MissedTickBehavior::Skip`.
#[derive(Debug, Clone)]
pub struct Periodic {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Periodic {
    /// Creates a stopped timer
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// Starts (or restarts) the timer; the first firing is due immediately
    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now);
    }

    /// Cancels the timer
    pub fn stop(&mut self) {
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true when the task should run at `now` and schedules the next firing
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(due) = self.next_due else {
            return false;
        };

        if now < due {
            return false;
        }

        let mut next = due + self.interval;
        if next <= now {
            next = now + self.interval;
        }
        self.next_due = Some(next);

        true
    }
}

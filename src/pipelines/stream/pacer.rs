// SPDX-License-Identifier: GPL-3.0-only

//! Fixed-cadence frame pacing
//!
//! Blocking capture devices pace themselves; still images and files don't.
//! The pacer sleeps off whatever is left of the frame interval.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    next_deadline: Option<Instant>,
}

impl FramePacer {
    pub fn new(fps: u32) -> Self {
        Self {
            interval: interval_for(fps),
            next_deadline: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Change the cadence, restarting the schedule
    pub fn set_fps(&mut self, fps: u32) {
        let interval = interval_for(fps);
        if interval != self.interval {
            self.interval = interval;
            self.next_deadline = None;
        }
    }

    /// Sleep until the next frame is due
    ///
    /// Returns how long it slept. When processing fell more than a whole
    /// interval behind, the schedule restarts from now instead of bursting.
    pub fn wait(&mut self) -> Duration {
        let now = Instant::now();
        let deadline = match self.next_deadline {
            Some(deadline) => deadline,
            None => {
                self.next_deadline = Some(now + self.interval);
                return Duration::ZERO;
            }
        };

        if deadline > now {
            let slept = deadline - now;
            std::thread::sleep(slept);
            self.next_deadline = Some(deadline + self.interval);
            slept
        } else {
            if now - deadline > self.interval {
                self.next_deadline = Some(now + self.interval);
            } else {
                self.next_deadline = Some(deadline + self.interval);
            }
            Duration::ZERO
        }
    }
}

fn interval_for(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1) as f64)
}

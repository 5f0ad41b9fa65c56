/// Free-running millisecond tick counter. Wraps around at `u32::MAX`.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Decides when the next reading is due.
///
/// Elapsed time is computed with wrapping subtraction, so the schedule keeps
/// working when the tick counter rolls over (about every 49.7 days).
#[derive(Debug, Clone)]
pub struct PublishTimer {
    interval_ms: u32,
    last_ms: Option<u32>,
}

impl PublishTimer {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_ms: None,
        }
    }

    /// Returns `true` and restarts the window when a publish is due at `now`.
    /// The very first call is always due.
    pub fn due(&mut self, now: u32) -> bool {
        let due = match self.last_ms {
            None => true,
            Some(last) => now.wrapping_sub(last) >= self.interval_ms,
        };
        if due {
            self.last_ms = Some(now);
        }
        due
    }
}

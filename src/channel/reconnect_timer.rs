//! One-shot timer that schedules the next connection attempt.
//!
//! Time is whatever microsecond clock the caller pumps the channel with
//! (normally [`crate::utils::get_micro_time`]), which keeps the timer
//! deterministic under test.  At most one attempt is ever pending: arming
//! again replaces the deadline.

pub struct ReconnectTimer {
    deadline: Option<u128>,
    delay: u128,
}

impl ReconnectTimer {
    pub fn build(delay: u128) -> ReconnectTimer {
        ReconnectTimer {
            deadline: None,
            delay: delay,
        }
    }
    pub fn delay(&self) -> u128 {
        self.delay
    }
    pub fn arm(&mut self, now: u128) -> () {
        self.deadline = Some(now + self.delay);
    }
    pub fn cancel(&mut self) -> () {
        self.deadline = None;
    }
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
    /// Fires at most once per arm: returns true and disarms when the deadline has passed.
    pub fn take_if_due(&mut self, now: u128) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

use std::time::{SystemTime, UNIX_EPOCH};

// utility functions

/// Wall clock in microseconds.  This is the time base the channel's
/// `pump`/`start` calls expect.
pub fn get_micro_time() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or(0)
}

/// Convert a millisecond setting into the microsecond time base.
pub fn ms_to_micros(ms: u32) -> u128 {
    ms as u128 * 1_000
}
